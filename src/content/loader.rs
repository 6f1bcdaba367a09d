//! Content loader - fetches listings and post pages from the repository

use crate::client::{ContentClient, Ordering, QueryOptions, FIRST_PUBLICATION_DATE};
use crate::config::SiteConfig;
use crate::error::Result;
use crate::pagination::PaginationController;

use super::{normalize, normalize_page, resolve_navigation, Navigation, Post};

/// A post ready to render: the normalized post plus data it does not carry
#[derive(Debug, Clone)]
pub struct LoadedPost {
    /// Repository id, the anchor for navigation queries
    pub document_id: String,
    pub post: Post,
    pub last_publication_date: Option<String>,
    pub navigation: Navigation,
}

/// Loads listings and posts through a [`ContentClient`]
pub struct ContentLoader<'a, C: ?Sized> {
    client: &'a C,
    config: &'a SiteConfig,
}

impl<'a, C> ContentLoader<'a, C>
where
    C: ContentClient + ?Sized,
{
    pub fn new(client: &'a C, config: &'a SiteConfig) -> Self {
        Self { client, config }
    }

    /// Query for the home listing, newest first
    pub fn listing_query(&self, reference: Option<&str>) -> QueryOptions {
        let post_type = &self.config.prismic.post_type;
        QueryOptions::new()
            .page_size(self.config.listing.page_size)
            .lang(self.config.listing.lang.clone())
            .order_by(Ordering::desc(FIRST_PUBLICATION_DATE))
            .fetch([
                format!("{}.title", post_type),
                format!("{}.subtitle", post_type),
                format!("{}.author", post_type),
            ])
            .reference(reference)
    }

    /// Fetch the first listing page and seed a controller with it
    pub async fn first_page(&self, reference: Option<&str>) -> Result<PaginationController> {
        self.first_page_with(&self.listing_query(reference)).await
    }

    async fn first_page_with(&self, options: &QueryOptions) -> Result<PaginationController> {
        let page = self
            .client
            .query_by_type(&self.config.prismic.post_type, options)
            .await?;
        tracing::debug!(
            "Listing has {} post(s) over {} page(s)",
            page.total_results_size,
            page.total_pages
        );
        Ok(PaginationController::new(normalize_page(&page)))
    }

    /// The listing as it looks after "load more" reached `page`
    pub async fn listing_through(
        &self,
        page: u32,
        reference: Option<&str>,
    ) -> Result<PaginationController> {
        let mut controller = self.first_page(reference).await?;
        controller.load_through(self.client, page).await?;
        Ok(controller)
    }

    /// Every published post including its content, newest first
    pub async fn all_posts_with_content(&self) -> Result<Vec<Post>> {
        let mut options = self.listing_query(None);
        options
            .fetch
            .push(format!("{}.content", self.config.prismic.post_type));

        let mut controller = self.first_page_with(&options).await?;
        controller.load_through(self.client, u32::MAX).await?;
        Ok(controller.into_posts())
    }

    /// Load a post with its navigation; `None` when the uid does not exist
    pub async fn load_post(&self, uid: &str, reference: Option<&str>) -> Result<Option<LoadedPost>> {
        let options = QueryOptions::new()
            .lang(self.config.prismic.lang.clone())
            .reference(reference);

        let Some(doc) = self
            .client
            .get_by_uid(&self.config.prismic.post_type, uid, &options)
            .await?
        else {
            return Ok(None);
        };

        let navigation = resolve_navigation(
            self.client,
            &self.config.prismic.post_type,
            &doc.id,
            &QueryOptions::new().reference(reference),
        )
        .await?;

        Ok(Some(LoadedPost {
            document_id: doc.id.clone(),
            post: normalize(&doc),
            last_publication_date: doc.last_publication_date.clone(),
            navigation,
        }))
    }
}
