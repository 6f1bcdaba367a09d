//! spacetraveling: a blog front-end over a headless content repository
//!
//! Posts live in a Prismic repository. This crate fetches them, normalizes
//! them, and renders the blog either to static files (`generate`) or on
//! demand from a server with stale-while-revalidate caching and preview mode.

pub mod cache;
pub mod client;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod generator;
pub mod helpers;
pub mod pagination;
pub mod preview;
pub mod server;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use client::{ContentClient, PrismicClient};

/// The blog application
#[derive(Debug, Clone)]
pub struct Blog {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
}

impl Blog {
    /// Create a blog from a directory, reading `_config.yml` when present
    /// and applying environment overrides
    pub fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let config_path = base_dir.as_ref().join("_config.yml");

        let mut config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            tracing::debug!("No _config.yml in {:?}, using defaults", base_dir.as_ref());
            config::SiteConfig::default()
        };
        config.apply_env_overrides();

        Ok(Self::with_config(base_dir, config))
    }

    /// Create a blog with an explicit configuration
    pub fn with_config<P: AsRef<Path>>(base_dir: P, config: config::SiteConfig) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let public_dir = base_dir.join(&config.public_dir);
        Self {
            config,
            base_dir,
            public_dir,
        }
    }

    /// Client for the configured content repository
    pub fn client(&self) -> Result<Arc<dyn ContentClient>> {
        Ok(Arc::new(PrismicClient::new(&self.config.prismic)?))
    }

    /// Generate the static site
    pub async fn generate(&self, force: bool) -> anyhow::Result<()> {
        commands::generate::run(self, force).await
    }

    /// Clean the public directory and the rebuild cache
    pub fn clean(&self) -> anyhow::Result<()> {
        commands::clean::run(self)
    }
}
