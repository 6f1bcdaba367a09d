//! Generator module - renders the blog to static HTML files

use anyhow::{Context as _, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;

use crate::cache::{self, CacheDb, ChangeSet};
use crate::client::ContentClient;
use crate::content::ContentLoader;
use crate::helpers::{listing_path, post_path};
use crate::pagination::LoadOutcome;
use crate::templates::{TemplateRenderer, ASSETS};
use crate::Blog;

/// What a generation run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    pub listing_pages: usize,
    pub posts_written: usize,
    pub posts_fresh: usize,
    pub posts_missing: usize,
    pub posts_removed: usize,
    /// No post page needed regenerating or removing
    pub up_to_date: bool,
}

/// Static site generator
pub struct Generator<'a> {
    blog: &'a Blog,
    client: &'a dyn ContentClient,
    renderer: TemplateRenderer,
}

impl<'a> Generator<'a> {
    pub fn new(blog: &'a Blog, client: &'a dyn ContentClient) -> Result<Self> {
        Ok(Self {
            blog,
            client,
            renderer: TemplateRenderer::new(&blog.config)?,
        })
    }

    /// Generate the entire site.
    ///
    /// Listing pages are always rebuilt. Post pages are rebuilt when they are
    /// new or older than the revalidation window, or on `force`.
    pub async fn generate(&self, force: bool) -> Result<GenerateReport> {
        fs::create_dir_all(&self.blog.public_dir)?;
        self.copy_assets()?;

        let mut report = GenerateReport::default();
        let uids = self.generate_listing_pages(&mut report).await?;
        self.generate_not_found()?;

        let now = Utc::now();
        let window = chrono::Duration::from_std(self.blog.config.revalidate())
            .unwrap_or_else(|_| chrono::Duration::hours(2));
        let config_hash = cache::hash_config(&self.blog.config);

        let mut db = CacheDb::load(&self.blog.base_dir);
        let changes = cache::detect_changes(&db, config_hash, &uids, now, window, force);
        report.posts_fresh = changes.fresh.len();

        if !changes.has_changes() {
            tracing::info!("Post pages are up to date");
            report.up_to_date = true;
            return Ok(report);
        }
        tracing::info!("Post pages: {}", changes.summary());

        self.generate_post_pages(&changes, &mut db, &mut report).await?;
        self.remove_deleted(&changes, &mut db, &mut report)?;

        db.config_hash = config_hash;
        db.save(&self.blog.base_dir)?;

        Ok(report)
    }

    /// Write `index.html` and `page/{n}/index.html`, each holding every post
    /// loaded through page n. Returns the uids of all listed posts.
    async fn generate_listing_pages(&self, report: &mut GenerateReport) -> Result<Vec<String>> {
        let loader = ContentLoader::new(self.client, &self.blog.config);
        let mut listing = loader.first_page(None).await?;

        loop {
            let page = listing.current_page();
            let next = listing.has_more().then(|| listing_path(page + 1));
            let html = self.renderer.render_home(&listing, next.as_deref(), false)?;
            self.write_page(&listing_path(page), &html)?;
            report.listing_pages += 1;

            match listing.load_more(self.client).await? {
                LoadOutcome::Appended { .. } if listing.current_page() > page => {}
                _ => break,
            }
        }

        Ok(listing
            .posts()
            .iter()
            .filter_map(|post| post.uid.clone())
            .collect())
    }

    async fn generate_post_pages(
        &self,
        changes: &ChangeSet,
        db: &mut CacheDb,
        report: &mut GenerateReport,
    ) -> Result<()> {
        let loader = ContentLoader::new(self.client, &self.blog.config);

        for uid in &changes.regenerate {
            if output_path_for(&post_path(uid)).is_none() {
                tracing::warn!("Post uid {:?} is not a valid path segment, skipping", uid);
                report.posts_missing += 1;
                continue;
            }
            let Some(loaded) = loader.load_post(uid, None).await? else {
                tracing::warn!("Post {} is listed but could not be loaded, skipping", uid);
                report.posts_missing += 1;
                continue;
            };

            let html = self.renderer.render_post(&loaded, false)?;
            let output = self.write_page(&post_path(uid), &html)?;
            db.record(uid, &output, Utc::now());
            report.posts_written += 1;
        }

        Ok(())
    }

    fn remove_deleted(
        &self,
        changes: &ChangeSet,
        db: &mut CacheDb,
        report: &mut GenerateReport,
    ) -> Result<()> {
        for uid in &changes.deleted {
            let Some(entry) = db.forget(uid) else {
                continue;
            };
            let output = self.blog.public_dir.join(&entry.output_path);
            if output.exists() {
                fs::remove_file(&output)
                    .with_context(|| format!("Failed to remove {:?}", output))?;
                if let Some(parent) = output.parent() {
                    // Only removes the directory when nothing else lives there
                    let _ = fs::remove_dir(parent);
                }
            }
            tracing::info!("Removed page of deleted post {}", uid);
            report.posts_removed += 1;
        }
        Ok(())
    }

    fn generate_not_found(&self) -> Result<()> {
        let html = self.renderer.render_not_found(false)?;
        write_file(&self.blog.public_dir.join("404.html"), &html)
    }

    fn copy_assets(&self) -> Result<()> {
        for (path, _, body) in ASSETS {
            write_file(&self.blog.public_dir.join(path), body)?;
        }
        Ok(())
    }

    /// Write `html` as the index file of the site path `route`; returns the
    /// output path relative to the public dir
    fn write_page(&self, route: &str, html: &str) -> Result<String> {
        let relative = output_path_for(route)
            .ok_or_else(|| anyhow::anyhow!("Refusing to write outside the public dir: {}", route))?;
        write_file(&self.blog.public_dir.join(&relative), html)?;
        tracing::debug!("Generated {}", relative);
        Ok(relative)
    }
}

/// Map a site path to its file under the public dir
///
/// `/` -> `index.html`, `/post/a` -> `post/a/index.html`; `None` for paths
/// that would escape the public dir
fn output_path_for(route: &str) -> Option<String> {
    let decoded = percent_encoding::percent_decode_str(route).decode_utf8_lossy();
    let clean = decoded.trim_matches('/');
    if clean.is_empty() {
        return Some("index.html".to_string());
    }
    let escapes = clean
        .split('/')
        .any(|segment| matches!(segment, "" | "." | "..") || segment.contains('\\'));
    (!escapes).then(|| format!("{}/index.html", clean))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Failed to create dir {:?}: {}", parent, e))?;
    }
    fs::write(path, content).map_err(|e| anyhow::anyhow!("Failed to write {:?}: {}", path, e))
}
