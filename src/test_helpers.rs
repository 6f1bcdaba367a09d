//! Shared test utilities.
//!
//! [`MemoryClient`] is an in-memory [`ContentClient`] that mimics the
//! search semantics of the content API closely enough for pagination,
//! navigation and preview tests: type filtering, publication-date ordering,
//! `after` cursors, page slicing with `next_page` cursors, and refs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use crate::client::{ContentClient, QueryOptions, FIRST_PUBLICATION_DATE};
use crate::content::{ApiPage, RawContentBlock, RawDocument, RawPostData, RichTextBlock};
use crate::error::{Error, Result};
use crate::helpers::parse_api_date;

const DEFAULT_PAGE_SIZE: u32 = 20;

// =========================================================================
// Fixtures
// =========================================================================

/// A `posts` document with a title, author and one content block
pub fn post_doc(id: &str, uid: &str, published: &str) -> RawDocument {
    RawDocument {
        id: id.to_string(),
        uid: Some(uid.to_string()),
        doc_type: "posts".to_string(),
        lang: Some("pt-br".to_string()),
        first_publication_date: Some(published.to_string()),
        last_publication_date: Some(published.to_string()),
        data: RawPostData {
            title: Some(format!("Title of {}", uid)),
            subtitle: Some(format!("Subtitle of {}", uid)),
            author: Some("Joseph Oliveira".to_string()),
            content: Some(vec![RawContentBlock {
                heading: Some("Intro".to_string()),
                body: vec![RichTextBlock::paragraph("Hello world")],
            }]),
            ..Default::default()
        },
    }
}

/// `count` posts published one day apart, oldest first: `post-1` .. `post-n`
pub fn corpus(count: usize) -> Vec<RawDocument> {
    (1..=count)
        .map(|i| {
            post_doc(
                &format!("id-{}", i),
                &format!("post-{}", i),
                &format!("2021-03-{:02}T10:00:00+0000", i),
            )
        })
        .collect()
}

// =========================================================================
// In-memory content client
// =========================================================================

#[derive(Default)]
pub struct MemoryClient {
    documents: Vec<RawDocument>,
    /// Documents only visible under a preview ref
    drafts: HashMap<String, Vec<RawDocument>>,
    /// Pre-registered pages served by `fetch_page`
    pages: Mutex<HashMap<String, ApiPage>>,
    /// Cursors handed out by `query_by_type`
    cursors: Mutex<HashMap<String, (String, QueryOptions)>>,
    fail_fetches: AtomicBool,
    fetches: AtomicUsize,
    queries: Mutex<Vec<(String, QueryOptions)>>,
}

impl MemoryClient {
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    /// Serve `page` when `fetch_page(cursor)` is called
    pub fn with_page(self, cursor: &str, page: ApiPage) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(cursor.to_string(), page);
        self
    }

    /// Make `reference` a valid preview ref exposing `documents`
    pub fn with_preview(mut self, reference: &str, documents: Vec<RawDocument>) -> Self {
        self.drafts.insert(reference.to_string(), documents);
        self
    }

    /// Make subsequent `fetch_page` calls fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_fetches.store(failing, AtomicOrdering::SeqCst);
    }

    /// Number of `fetch_page` calls so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    /// Every `query_by_type` call so far
    pub fn queries(&self) -> Vec<(String, QueryOptions)> {
        self.queries.lock().unwrap().clone()
    }

    fn visible(&self, reference: Option<&str>) -> Result<Vec<RawDocument>> {
        let mut docs = self.documents.clone();
        match reference {
            None | Some("master") => {}
            Some(r) => match self.drafts.get(r) {
                Some(drafts) => {
                    for draft in drafts {
                        docs.retain(|d| d.id != draft.id);
                        docs.push(draft.clone());
                    }
                }
                None => {
                    return Err(Error::Status {
                        status: 404,
                        url: format!("memory://ref/{}", r),
                    })
                }
            },
        }
        Ok(docs)
    }

    fn search(&self, doc_type: Option<&str>, options: &QueryOptions) -> Result<ApiPage> {
        let mut docs: Vec<RawDocument> = self
            .visible(options.reference.as_deref())?
            .into_iter()
            .filter(|d| doc_type.map_or(true, |t| d.doc_type == t))
            .collect();

        if let Some(ordering) = options
            .orderings
            .iter()
            .find(|o| o.field == FIRST_PUBLICATION_DATE)
        {
            docs.sort_by_key(|d| {
                d.first_publication_date
                    .as_deref()
                    .and_then(parse_api_date)
            });
            if ordering.descending {
                docs.reverse();
            }
        }

        if let Some(after) = &options.after {
            if let Some(pos) = docs.iter().position(|d| &d.id == after) {
                docs.drain(..=pos);
            }
        }

        let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let page = options.page.unwrap_or(1).max(1);
        let total = docs.len() as u32;
        let total_pages = total.div_ceil(page_size);

        let results: Vec<RawDocument> = docs
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();

        let next_page = if page < total_pages {
            let cursor = format!("memory://{}?page={}", doc_type.unwrap_or("*"), page + 1);
            let next_options = QueryOptions {
                page: Some(page + 1),
                ..options.clone()
            };
            self.cursors.lock().unwrap().insert(
                cursor.clone(),
                (doc_type.unwrap_or("*").to_string(), next_options),
            );
            Some(cursor)
        } else {
            None
        };

        Ok(ApiPage {
            page,
            results_per_page: page_size,
            results_size: results.len() as u32,
            total_results_size: total,
            total_pages,
            next_page,
            prev_page: None,
            results,
        })
    }
}

#[async_trait]
impl ContentClient for MemoryClient {
    async fn query_by_type(&self, doc_type: &str, options: &QueryOptions) -> Result<ApiPage> {
        self.queries
            .lock()
            .unwrap()
            .push((doc_type.to_string(), options.clone()));
        self.search(Some(doc_type), options)
    }

    async fn get_by_uid(
        &self,
        doc_type: &str,
        uid: &str,
        options: &QueryOptions,
    ) -> Result<Option<RawDocument>> {
        Ok(self
            .visible(options.reference.as_deref())?
            .into_iter()
            .find(|d| d.doc_type == doc_type && d.uid.as_deref() == Some(uid)))
    }

    async fn get_by_id(&self, id: &str, options: &QueryOptions) -> Result<Option<RawDocument>> {
        Ok(self
            .visible(options.reference.as_deref())?
            .into_iter()
            .find(|d| d.id == id))
    }

    async fn fetch_page(&self, cursor: &str) -> Result<ApiPage> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_fetches.load(AtomicOrdering::SeqCst) {
            return Err(Error::Status {
                status: 503,
                url: cursor.to_string(),
            });
        }

        if let Some(page) = self.pages.lock().unwrap().get(cursor) {
            return Ok(page.clone());
        }

        let query = self.cursors.lock().unwrap().get(cursor).cloned();
        match query {
            Some((doc_type, options)) => {
                let doc_type = (doc_type != "*").then_some(doc_type);
                self.search(doc_type.as_deref(), &options)
            }
            None => Err(Error::InvalidCursor(cursor.to_string())),
        }
    }
}
