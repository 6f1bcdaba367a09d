//! Built-in page templates using the Tera template engine
//!
//! Templates and static assets are embedded in the binary. The renderer
//! turns loaded posts and listings into view models and renders them.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::{as_html, reading_time, LoadedPost, NavPost, Post};
use crate::helpers::{date_xml, full_url_for, post_path, DateFormatter};
use crate::pagination::PaginationController;

/// Static assets as `(public path, content type, body)`
pub const ASSETS: &[(&str, &str, &str)] = &[
    (
        "style.css",
        "text/css; charset=utf-8",
        include_str!("spacetraveling/assets/style.css"),
    ),
    (
        "images/logo.svg",
        "image/svg+xml",
        include_str!("spacetraveling/assets/logo.svg"),
    ),
];

/// Template renderer for the blog pages
pub struct TemplateRenderer {
    tera: Tera,
    config: SiteConfig,
    dates: DateFormatter,
}

impl TemplateRenderer {
    /// Create a renderer with all templates loaded
    pub fn new(config: &SiteConfig) -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("spacetraveling/layout.html")),
            ("home.html", include_str!("spacetraveling/home.html")),
            ("post.html", include_str!("spacetraveling/post.html")),
            ("404.html", include_str!("spacetraveling/404.html")),
            (
                "partials/header.html",
                include_str!("spacetraveling/partials/header.html"),
            ),
        ])?;

        tera.register_filter("truncate_chars", truncate_chars_filter);

        Ok(Self {
            tera,
            config: config.clone(),
            dates: DateFormatter::new(&config.language, &config.timezone),
        })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }

    /// Render the home listing with the posts loaded so far
    pub fn render_home(
        &self,
        listing: &PaginationController,
        load_more_href: Option<&str>,
        preview: bool,
    ) -> Result<String> {
        let posts: Vec<PostSummary> = listing.posts().iter().map(|p| self.summary(p)).collect();

        let mut context = self.base_context(preview);
        context.insert("posts", &posts);
        context.insert("current_page", &listing.current_page());
        context.insert("load_more_href", &load_more_href);
        self.render("home.html", &context)
    }

    /// Render a post detail page
    pub fn render_post(&self, loaded: &LoadedPost, preview: bool) -> Result<String> {
        let mut context = self.base_context(preview);
        context.insert("post", &self.post_view(loaded));
        context.insert(
            "navigation",
            &NavLinks {
                prev: loaded.navigation.prev_post.as_ref().and_then(nav_link),
                next: loaded.navigation.next_post.as_ref().and_then(nav_link),
            },
        );
        context.insert("comments", &self.config.comments);
        self.render("post.html", &context)
    }

    pub fn render_not_found(&self, preview: bool) -> Result<String> {
        self.render("404.html", &self.base_context(preview))
    }

    fn base_context(&self, preview: bool) -> Context {
        let mut context = Context::new();
        context.insert(
            "site",
            &SiteData {
                title: self.config.title.clone(),
                url: self.config.url.clone(),
                language: self.config.language.replace('_', "-"),
            },
        );
        context.insert("preview", &preview);
        context
    }

    /// Listing entry for a post
    pub fn summary(&self, post: &Post) -> PostSummary {
        let published = post.published_at();
        PostSummary {
            href: post.uid.as_deref().map(post_path),
            title: post.data.title.clone().unwrap_or_default(),
            subtitle: post.data.subtitle.clone().unwrap_or_default(),
            author: post.data.author.clone().unwrap_or_default(),
            published: published
                .as_ref()
                .map(|d| self.dates.format(d, &self.config.date_format)),
            published_iso: published.as_ref().map(date_xml),
        }
    }

    /// View model of a post detail page
    pub fn post_view(&self, loaded: &LoadedPost) -> PostView {
        let post = &loaded.post;
        let published = post.published_at();

        // Only flag an edition when it differs from the first publication
        let edited = loaded
            .last_publication_date
            .as_deref()
            .filter(|last| Some(*last) != post.first_publication_date.as_deref())
            .and_then(|last| {
                self.dates
                    .format_api_date(Some(last), &self.config.datetime_format)
            });

        PostView {
            title: post.data.title.clone().unwrap_or_default(),
            subtitle: post.data.subtitle.clone().unwrap_or_default(),
            author: post.data.author.clone().unwrap_or_default(),
            canonical_url: post
                .uid
                .as_deref()
                .map(|uid| full_url_for(&self.config.url, &post_path(uid))),
            banner_url: post.data.banner.url.clone(),
            published: published
                .as_ref()
                .map(|d| self.dates.format(d, &self.config.date_format)),
            published_iso: published.as_ref().map(date_xml),
            edited,
            reading_time: reading_time(&post.data.content, self.config.reading.words_per_minute),
            sections: post
                .data
                .content
                .iter()
                .map(|block| SectionView {
                    heading: block.heading.clone().unwrap_or_default(),
                    html: as_html(&block.body),
                })
                .collect(),
        }
    }
}

fn nav_link(post: &NavPost) -> Option<NavLink> {
    let uid = post.uid.as_deref()?;
    Some(NavLink {
        title: post.title.clone().unwrap_or_default(),
        href: post_path(uid),
    })
}

/// Tera filter: truncate by character count
fn truncate_chars_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("truncate_chars", "value", String, value);
    let length = match args.get("length") {
        Some(val) => tera::try_get_value!("truncate_chars", "length", usize, val),
        None => 150,
    };
    let omission = match args.get("omission") {
        Some(val) => tera::try_get_value!("truncate_chars", "omission", String, val),
        None => "...".to_string(),
    };

    if s.chars().count() <= length {
        Ok(tera::Value::String(s))
    } else {
        let truncated: String = s.chars().take(length).collect();
        Ok(tera::Value::String(format!(
            "{}{}",
            truncated.trim_end(),
            omission
        )))
    }
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct SiteData {
    pub title: String,
    pub url: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    /// `None` for posts without a uid, which cannot be linked
    pub href: Option<String>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub published: Option<String>,
    pub published_iso: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub canonical_url: Option<String>,
    pub banner_url: Option<String>,
    pub published: Option<String>,
    pub published_iso: Option<String>,
    pub edited: Option<String>,
    /// Minutes
    pub reading_time: usize,
    pub sections: Vec<SectionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub heading: String,
    pub html: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavLinks {
    pub prev: Option<NavLink>,
    pub next: Option<NavLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavLink {
    pub title: String,
    pub href: String,
}
