//! Incremental "load more" pagination over the post listing
//!
//! [`PaginationController`] owns the posts loaded so far and the cursor of
//! the next page. Loading is split into [`begin_load`] and [`complete_load`]
//! so that callers which cannot hold the controller across the network call
//! still get a single in-flight request and can discard responses that
//! arrive after a [`reset`]. [`load_more`] runs the whole cycle.
//!
//! [`begin_load`]: PaginationController::begin_load
//! [`complete_load`]: PaginationController::complete_load
//! [`reset`]: PaginationController::reset
//! [`load_more`]: PaginationController::load_more

use std::collections::HashSet;

use crate::client::ContentClient;
use crate::content::{normalize, ApiPage, Post, PostPagination};
use crate::error::Result;

/// Why a load did not start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// There is no next page
    Exhausted,
    /// Another load is outstanding
    InFlight,
}

/// Result of a load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Skipped(SkipReason),
    /// The response belonged to a request issued before the last reset
    Stale,
    Appended { added: usize, duplicates: usize },
}

/// An outstanding page request handed out by [`PaginationController::begin_load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: String,
    id: u64,
    generation: u64,
}

/// Posts loaded so far plus the cursor to the next page
#[derive(Debug, Clone)]
pub struct PaginationController {
    posts: Vec<Post>,
    next_page: Option<String>,
    current_page: u32,
    generation: u64,
    next_request_id: u64,
    in_flight: Option<u64>,
}

impl PaginationController {
    /// Seed the controller from the first page of the listing
    pub fn new(first: PostPagination) -> Self {
        Self {
            posts: first.results,
            next_page: first.next_page,
            current_page: 1,
            generation: 0,
            next_request_id: 0,
            in_flight: None,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn next_page(&self) -> Option<&str> {
        self.next_page.as_deref()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Whether a further page can be loaded
    pub fn has_more(&self) -> bool {
        self.next_page.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }

    /// Replace the state with a new first page.
    ///
    /// Any outstanding request becomes stale.
    pub fn reset(&mut self, first: PostPagination) {
        self.posts = first.results;
        self.next_page = first.next_page;
        self.current_page = 1;
        self.generation += 1;
        self.in_flight = None;
    }

    /// Start loading the next page.
    ///
    /// Returns the request to fetch, or why nothing should be fetched.
    pub fn begin_load(&mut self) -> std::result::Result<PageRequest, SkipReason> {
        if self.in_flight.is_some() {
            return Err(SkipReason::InFlight);
        }
        // Covers the uninitialized/exhausted guard (`current_page != 1` with
        // no cursor) as well as a first page that had no successor.
        let Some(cursor) = self.next_page.clone() else {
            return Err(SkipReason::Exhausted);
        };

        let id = self.next_request_id;
        self.next_request_id += 1;
        self.in_flight = Some(id);

        Ok(PageRequest {
            cursor,
            id,
            generation: self.generation,
        })
    }

    /// Merge the page fetched for `request`.
    ///
    /// Posts are appended in order; posts whose uid is already listed are
    /// dropped. Cursor and page number are taken from the fetched page.
    pub fn complete_load(&mut self, request: PageRequest, page: &ApiPage) -> LoadOutcome {
        if request.generation != self.generation || self.in_flight != Some(request.id) {
            tracing::debug!("Discarding stale page for {}", request.cursor);
            return LoadOutcome::Stale;
        }
        self.in_flight = None;

        let mut seen: HashSet<String> = self
            .posts
            .iter()
            .filter_map(|p| p.uid.clone())
            .collect();

        let mut added = 0;
        let mut duplicates = 0;
        for post in page.results.iter().map(normalize) {
            if let Some(uid) = &post.uid {
                if !seen.insert(uid.clone()) {
                    duplicates += 1;
                    continue;
                }
            }
            self.posts.push(post);
            added += 1;
        }

        if duplicates > 0 {
            tracing::warn!(
                "Dropped {} duplicate post(s) from page {}",
                duplicates,
                page.page
            );
        }

        self.next_page = page.next_page.clone();
        self.current_page = page.page;

        LoadOutcome::Appended { added, duplicates }
    }

    /// Give up on `request` after a failed fetch, leaving the state untouched
    pub fn abort_load(&mut self, request: &PageRequest) {
        if request.generation == self.generation && self.in_flight == Some(request.id) {
            self.in_flight = None;
        }
    }

    /// Fetch, normalize and append the next page.
    ///
    /// A failed fetch is returned to the caller; nothing is merged and the
    /// cursor is kept so the load can be attempted again.
    pub async fn load_more<C>(&mut self, client: &C) -> Result<LoadOutcome>
    where
        C: ContentClient + ?Sized,
    {
        let request = match self.begin_load() {
            Ok(request) => request,
            Err(reason) => return Ok(LoadOutcome::Skipped(reason)),
        };

        tracing::debug!("Loading page after {}", self.current_page);
        match client.fetch_page(&request.cursor).await {
            Ok(page) => Ok(self.complete_load(request, &page)),
            Err(e) => {
                self.abort_load(&request);
                Err(e)
            }
        }
    }

    /// Load pages until at least `page` pages are merged or the listing ends
    pub async fn load_through<C>(&mut self, client: &C, page: u32) -> Result<()>
    where
        C: ContentClient + ?Sized,
    {
        while self.current_page < page && self.has_more() {
            let before = self.current_page;
            match self.load_more(client).await? {
                LoadOutcome::Appended { .. } if self.current_page > before => {}
                // Skipped, stale, or a page that did not advance
                _ => break,
            }
        }
        Ok(())
    }
}
