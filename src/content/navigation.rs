//! Previous/next post navigation

use serde::{Deserialize, Serialize};

use super::document::{ApiPage, RawDocument};
use crate::client::{ContentClient, Ordering, QueryOptions, FIRST_PUBLICATION_DATE};
use crate::error::Result;

/// A neighbouring post, enough to link to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPost {
    pub uid: Option<String>,
    pub title: Option<String>,
}

impl From<&RawDocument> for NavPost {
    fn from(doc: &RawDocument) -> Self {
        Self {
            uid: doc.uid.clone(),
            title: doc.data.title.clone(),
        }
    }
}

/// Siblings of a post in publication order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    /// Nearest post published before
    pub prev_post: Option<NavPost>,
    /// Nearest post published after
    pub next_post: Option<NavPost>,
}

/// Resolve the neighbours of the document `document_id`.
///
/// Issues two page-size-1 queries using `after = document_id`: descending by
/// publication date for the previous post, ascending for the next one.
/// `base` carries the ref and language of the surrounding request.
pub async fn resolve_navigation<C>(
    client: &C,
    doc_type: &str,
    document_id: &str,
    base: &QueryOptions,
) -> Result<Navigation>
where
    C: ContentClient + ?Sized,
{
    let neighbour = |ordering: Ordering| QueryOptions {
        page_size: Some(1),
        page: None,
        after: Some(document_id.to_string()),
        orderings: vec![ordering],
        fetch: Vec::new(),
        ..base.clone()
    };
    let older = neighbour(Ordering::desc(FIRST_PUBLICATION_DATE));
    let newer = neighbour(Ordering::asc(FIRST_PUBLICATION_DATE));

    let (prev_page, next_page) = tokio::try_join!(
        client.query_by_type(doc_type, &older),
        client.query_by_type(doc_type, &newer),
    )?;

    Ok(Navigation {
        prev_post: first_neighbour(&prev_page, document_id),
        next_post: first_neighbour(&next_page, document_id),
    })
}

fn first_neighbour(page: &ApiPage, document_id: &str) -> Option<NavPost> {
    page.results
        .first()
        .filter(|doc| doc.id != document_id)
        .map(NavPost::from)
}
