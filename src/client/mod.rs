//! Content repository access
//!
//! [`ContentClient`] is the seam between rendering and the headless CMS.
//! [`PrismicClient`] talks to the Prismic REST API v2.

mod prismic;

use async_trait::async_trait;
use std::fmt;

use crate::content::{ApiPage, RawDocument};
use crate::error::Result;

pub use prismic::PrismicClient;

/// Field used to order posts by publication
pub const FIRST_PUBLICATION_DATE: &str = "document.first_publication_date";

/// Access to typed documents of a content repository
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Search documents of a custom type
    async fn query_by_type(&self, doc_type: &str, options: &QueryOptions) -> Result<ApiPage>;

    /// Fetch a single document by its uid; `None` when it does not exist
    async fn get_by_uid(
        &self,
        doc_type: &str,
        uid: &str,
        options: &QueryOptions,
    ) -> Result<Option<RawDocument>>;

    /// Fetch a single document by id; `None` when it does not exist
    async fn get_by_id(&self, id: &str, options: &QueryOptions) -> Result<Option<RawDocument>>;

    /// Follow a `next_page` cursor
    async fn fetch_page(&self, cursor: &str) -> Result<ApiPage>;
}

/// Options for a document query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub page_size: Option<u32>,
    pub page: Option<u32>,
    /// Only return documents after this document id in the result ordering
    pub after: Option<String>,
    pub orderings: Vec<Ordering>,
    pub lang: Option<String>,
    /// Restrict returned fields (`posts.title`, ...)
    pub fetch: Vec<String>,
    /// Content ref; the master ref when `None`
    pub reference: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after = Some(id.into());
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.orderings.push(ordering);
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn fetch<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Use the given ref, or keep the master ref when `None`
    pub fn reference(mut self, reference: Option<&str>) -> Self {
        self.reference = reference.map(str::to_string);
        self
    }

    /// The `orderings` query parameter, e.g. `[document.first_publication_date desc]`
    pub fn orderings_param(&self) -> Option<String> {
        if self.orderings.is_empty() {
            return None;
        }
        let fields: Vec<String> = self.orderings.iter().map(|o| o.to_string()).collect();
        Some(format!("[{}]", fields.join(",")))
    }
}

/// Sort order on a document field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub field: String,
    pub descending: bool,
}

impl Ordering {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} desc", self.field)
        } else {
            write!(f, "{}", self.field)
        }
    }
}

/// `at` predicate, e.g. `[at(document.type,"posts")]`
pub fn at(path: &str, value: &str) -> String {
    format!(
        "[at({},\"{}\")]",
        path,
        value.replace('\\', "\\\\").replace('"', "\\\"")
    )
}
