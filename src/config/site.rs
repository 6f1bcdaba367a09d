//! Site configuration (_config.yml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub url: String,
    pub language: String,
    pub timezone: String,

    // Date / Time format (Moment.js style tokens)
    pub date_format: String,
    pub datetime_format: String,

    // Directory
    pub public_dir: String,

    // Content repository
    #[serde(default)]
    pub prismic: PrismicConfig,

    // Home page
    #[serde(default)]
    pub listing: ListingConfig,

    #[serde(default)]
    pub reading: ReadingConfig,

    /// Seconds before a generated post page is considered stale
    pub revalidate_secs: u64,

    #[serde(default)]
    pub preview: PreviewConfig,

    /// utterances comment threads on post pages
    #[serde(default)]
    pub comments: CommentsConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "spacetraveling".to_string(),
            url: "http://localhost:3000".to_string(),
            language: "pt_BR".to_string(),
            timezone: String::new(),

            date_format: "DD MMM YYYY".to_string(),
            datetime_format: "DD MMM YYYY, hh:mm".to_string(),

            public_dir: "public".to_string(),

            prismic: PrismicConfig::default(),
            listing: ListingConfig::default(),
            reading: ReadingConfig::default(),

            revalidate_secs: 60 * 60 * 2,

            preview: PreviewConfig::default(),
            comments: CommentsConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {:?}", path.as_ref()))?;
        let config: SiteConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("PRISMIC_API_ENDPOINT").filter(|v| !v.is_empty()) {
            self.prismic.endpoint = endpoint;
        }
        if let Some(token) = lookup("PRISMIC_ACCESS_TOKEN").filter(|v| !v.is_empty()) {
            self.prismic.access_token = Some(token);
        }
        if let Some(secret) = lookup("PREVIEW_SECRET").filter(|v| !v.is_empty()) {
            self.preview.secret = secret;
        }
    }

    /// Revalidation window for generated post pages
    pub fn revalidate(&self) -> Duration {
        Duration::from_secs(self.revalidate_secs)
    }
}

/// Prismic repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrismicConfig {
    pub endpoint: String,
    pub access_token: Option<String>,
    pub lang: String,
    pub post_type: String,
    pub timeout_secs: u64,
}

impl Default for PrismicConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://spacetraveling.cdn.prismic.io/api/v2".to_string(),
            access_token: None,
            lang: "pt-br".to_string(),
            post_type: "posts".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Home listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub page_size: u32,
    pub lang: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: 1,
            lang: "*".to_string(),
        }
    }
}

/// Reading-time estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub words_per_minute: usize,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            words_per_minute: 200,
        }
    }
}

/// Preview mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub secret: String,
    pub cookie_name: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: "__preview_data".to_string(),
        }
    }
}

/// Comments embed; disabled while `repo` is empty
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// GitHub repository holding the threads, `owner/name`
    pub repo: String,
    pub issue_term: String,
    pub theme: String,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            issue_term: "pathname".to_string(),
            theme: "github-dark".to_string(),
        }
    }
}
