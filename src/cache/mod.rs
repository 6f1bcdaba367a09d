//! Rebuild cache for time-based regeneration
//!
//! Tracks when each post page was last generated so that `generate` only
//! rebuilds pages older than the revalidation window, and removes pages of
//! posts that disappeared from the repository.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::config::SiteConfig;

/// Cache directory, relative to the site base directory
pub const CACHE_DIR: &str = ".spacetraveling-cache";

const CACHE_FILE: &str = "db.json";

/// A generated post page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub generated_at: DateTime<Utc>,
    /// Output path relative to the public dir
    pub output_path: String,
}

/// Generation state persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheDb {
    pub version: u32,
    /// Hash of the site config (changes trigger a full rebuild)
    pub config_hash: u64,
    /// Post pages keyed by uid
    pub posts: HashMap<String, CacheEntry>,
}

impl CacheDb {
    const VERSION: u32 = 1;

    /// Load cache from disk, or start empty
    pub fn load(base_dir: &Path) -> Self {
        let cache_path = base_dir.join(CACHE_DIR).join(CACHE_FILE);
        if let Ok(content) = fs::read_to_string(&cache_path) {
            match serde_json::from_str::<CacheDb>(&content) {
                Ok(cache) if cache.version == Self::VERSION => return cache,
                Ok(_) => tracing::info!("Cache version mismatch, rebuilding cache"),
                Err(e) => tracing::warn!("Ignoring unreadable cache {:?}: {}", cache_path, e),
            }
        }
        Self::new()
    }

    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let cache_dir = base_dir.join(CACHE_DIR);
        fs::create_dir_all(&cache_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(cache_dir.join(CACHE_FILE), content)?;
        Ok(())
    }

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            ..Default::default()
        }
    }

    /// Whether the page for `uid` was generated within `window` of `now`
    pub fn is_fresh(&self, uid: &str, now: DateTime<Utc>, window: Duration) -> bool {
        self.posts
            .get(uid)
            .is_some_and(|entry| now - entry.generated_at < window)
    }

    pub fn record(&mut self, uid: &str, output_path: &str, now: DateTime<Utc>) {
        self.posts.insert(
            uid.to_string(),
            CacheEntry {
                generated_at: now,
                output_path: output_path.to_string(),
            },
        );
    }

    pub fn forget(&mut self, uid: &str) -> Option<CacheEntry> {
        self.posts.remove(uid)
    }
}

/// Which post pages a generation run has to touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New or expired pages, in listing order
    pub regenerate: Vec<String>,
    /// Pages still inside the revalidation window
    pub fresh: Vec<String>,
    /// Pages whose post no longer exists
    pub deleted: Vec<String>,
    pub full_rebuild: bool,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        self.full_rebuild || !self.regenerate.is_empty() || !self.deleted.is_empty()
    }

    /// Summary of changes for logging
    pub fn summary(&self) -> String {
        if self.full_rebuild {
            return format!("full rebuild of {} post(s)", self.regenerate.len());
        }

        let mut parts = Vec::new();
        if !self.regenerate.is_empty() {
            parts.push(format!("{} post(s) to regenerate", self.regenerate.len()));
        }
        if !self.fresh.is_empty() {
            parts.push(format!("{} fresh", self.fresh.len()));
        }
        if !self.deleted.is_empty() {
            parts.push(format!("{} deleted", self.deleted.len()));
        }

        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Hash for file content
pub fn hash_content(content: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Hash of the effective site config, environment overrides included
pub fn hash_config(config: &SiteConfig) -> u64 {
    match serde_yaml::to_string(config) {
        Ok(content) => hash_content(&content),
        Err(e) => {
            tracing::warn!("Failed to serialize config for hashing: {}", e);
            0
        }
    }
}

/// Compare the current post uids against the cache.
///
/// `force` or a changed config regenerates every page.
pub fn detect_changes(
    cache: &CacheDb,
    config_hash: u64,
    uids: &[String],
    now: DateTime<Utc>,
    window: Duration,
    force: bool,
) -> ChangeSet {
    let full_rebuild = force || (cache.config_hash != 0 && cache.config_hash != config_hash);
    if full_rebuild && !force {
        tracing::info!("Config changed, full rebuild required");
    }

    let mut changeset = ChangeSet {
        full_rebuild,
        ..Default::default()
    };

    for uid in uids {
        if !full_rebuild && cache.is_fresh(uid, now, window) {
            changeset.fresh.push(uid.clone());
        } else {
            changeset.regenerate.push(uid.clone());
        }
    }

    let current: HashSet<&String> = uids.iter().collect();
    let mut deleted: Vec<String> = cache
        .posts
        .keys()
        .filter(|uid| !current.contains(uid))
        .cloned()
        .collect();
    deleted.sort();
    changeset.deleted = deleted;

    changeset
}
