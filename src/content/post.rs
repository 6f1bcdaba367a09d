//! Post model and normalization of raw documents

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::document::{ApiPage, RawDocument};
use super::richtext::RichTextBlock;
use crate::helpers::parse_api_date;

/// A blog post, normalized from a content document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// URL slug
    pub uid: Option<String>,

    /// ISO-8601 timestamp of first publication
    pub first_publication_date: Option<String>,

    pub data: PostData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostData {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub banner: Banner,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub url: Option<String>,
}

/// A section of a post: heading plus rich-text body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub heading: Option<String>,
    pub body: Vec<RichTextBlock>,
}

impl Post {
    /// Parsed first publication date
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        self.first_publication_date
            .as_deref()
            .and_then(parse_api_date)
    }
}

/// A page of normalized posts and the cursor to the next one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostPagination {
    pub next_page: Option<String>,
    pub results: Vec<Post>,
}

/// Convert a raw document into a [`Post`], keeping only the rendered fields.
///
/// Absent fields stay `None`; an absent `content` list becomes empty.
pub fn normalize(doc: &RawDocument) -> Post {
    let content = doc
        .data
        .content
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|block| ContentBlock {
            heading: block.heading.clone(),
            body: block.body.to_vec(),
        })
        .collect();

    Post {
        uid: doc.uid.clone(),
        first_publication_date: doc.first_publication_date.clone(),
        data: PostData {
            title: doc.data.title.clone(),
            subtitle: doc.data.subtitle.clone(),
            author: doc.data.author.clone(),
            banner: Banner {
                url: doc.data.banner.url.clone(),
            },
            content,
        },
    }
}

/// Normalize every result of a page
pub fn normalize_page(page: &ApiPage) -> PostPagination {
    PostPagination {
        next_page: page.next_page.clone(),
        results: page.results.iter().map(normalize).collect(),
    }
}
