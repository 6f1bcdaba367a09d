//! Prismic REST API v2 client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

use super::{at, ContentClient, QueryOptions};
use crate::config::PrismicConfig;
use crate::content::{ApiInfo, ApiPage, RawDocument};
use crate::error::{Error, Result};

/// How long a discovered master ref is reused before asking the API again
const MASTER_REF_TTL: Duration = Duration::from_secs(5);

/// HTTP client for a Prismic repository
pub struct PrismicClient {
    client: Client,
    endpoint: Url,
    search_url: Url,
    access_token: Option<String>,
    master_ref: Mutex<Option<(String, Instant)>>,
}

impl PrismicClient {
    /// Create a client from the repository configuration
    pub fn new(config: &PrismicConfig) -> Result<Self> {
        Self::with_timeout(config, Duration::from_secs(config.timeout_secs))
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(config: &PrismicConfig, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))?;
        let search_url = Url::parse(&format!("{}/documents/search", endpoint.as_str()))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("spacetraveling/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            search_url,
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            master_ref: Mutex::new(None),
        })
    }

    /// The ref currently serving published content
    pub async fn master_ref(&self) -> Result<String> {
        let mut cached = self.master_ref.lock().await;
        if let Some((reference, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < MASTER_REF_TTL {
                return Ok(reference.clone());
            }
        }

        let info: ApiInfo = self
            .get_json(self.endpoint.clone(), &self.token_params())
            .await?;
        let reference = info
            .master_ref()
            .ok_or_else(|| Error::MissingRef(self.endpoint.to_string()))?
            .to_string();
        tracing::debug!("Master ref is {}", reference);

        *cached = Some((reference.clone(), Instant::now()));
        Ok(reference)
    }

    async fn search(&self, predicates: &[String], options: &QueryOptions) -> Result<ApiPage> {
        let reference = match &options.reference {
            Some(reference) => reference.clone(),
            None => self.master_ref().await?,
        };

        let mut params: Vec<(&str, String)> = vec![
            ("ref", reference),
            ("q", format!("[{}]", predicates.concat())),
        ];
        if let Some(page_size) = options.page_size {
            params.push(("pageSize", page_size.to_string()));
        }
        if let Some(page) = options.page {
            params.push(("page", page.to_string()));
        }
        if let Some(after) = &options.after {
            params.push(("after", after.clone()));
        }
        if let Some(orderings) = options.orderings_param() {
            params.push(("orderings", orderings));
        }
        if let Some(lang) = &options.lang {
            params.push(("lang", lang.clone()));
        }
        if !options.fetch.is_empty() {
            params.push(("fetch", options.fetch.join(",")));
        }
        params.extend(self.token_params());

        self.get_json(self.search_url.clone(), &params).await
    }

    fn token_params(&self) -> Vec<(&'static str, String)> {
        self.access_token
            .iter()
            .map(|token| ("access_token", token.clone()))
            .collect()
    }

    /// Whether `url` points at the same origin as the configured endpoint
    fn is_same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.endpoint.scheme()
            && url.host_str() == self.endpoint.host_str()
            && url.port_or_known_default() == self.endpoint.port_or_known_default()
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, params: &[(&str, String)]) -> Result<T> {
        tracing::debug!("GET {}", url);
        let mut request = self.client.get(url.clone());
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ContentClient for PrismicClient {
    async fn query_by_type(&self, doc_type: &str, options: &QueryOptions) -> Result<ApiPage> {
        self.search(&[at("document.type", doc_type)], options).await
    }

    async fn get_by_uid(
        &self,
        doc_type: &str,
        uid: &str,
        options: &QueryOptions,
    ) -> Result<Option<RawDocument>> {
        let predicates = [
            at("document.type", doc_type),
            at(&format!("my.{}.uid", doc_type), uid),
        ];
        let page = self.search(&predicates, options).await?;
        Ok(page.results.into_iter().next())
    }

    async fn get_by_id(&self, id: &str, options: &QueryOptions) -> Result<Option<RawDocument>> {
        let page = self.search(&[at("document.id", id)], options).await?;
        Ok(page.results.into_iter().next())
    }

    async fn fetch_page(&self, cursor: &str) -> Result<ApiPage> {
        let url = Url::parse(cursor).map_err(|_| Error::InvalidCursor(cursor.to_string()))?;
        if !self.is_same_origin(&url) {
            return Err(Error::InvalidCursor(cursor.to_string()));
        }
        tracing::debug!("Following cursor {}", cursor);
        self.get_json(url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Ordering, FIRST_PUBLICATION_DATE};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_root() -> serde_json::Value {
        json!({
            "refs": [{"id": "master", "ref": "MASTER", "label": "Master", "isMasterRef": true}]
        })
    }

    fn post_json(id: &str, uid: &str) -> serde_json::Value {
        json!({
            "id": id,
            "uid": uid,
            "type": "posts",
            "first_publication_date": "2021-03-15T19:25:28+0000",
            "data": {"title": format!("Title {}", uid), "content": []}
        })
    }

    fn client_for(server: &MockServer, token: Option<&str>) -> PrismicClient {
        let config = PrismicConfig {
            endpoint: format!("{}/api/v2", server.uri()),
            access_token: token.map(str::to_string),
            ..Default::default()
        };
        PrismicClient::with_timeout(&config, Duration::from_secs(5)).unwrap()
    }

    async fn mount_root(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/api/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(api_root()))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_query_by_type_sends_query_parameters() {
        let server = MockServer::start().await;
        mount_root(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .and(query_param("ref", "MASTER"))
            .and(query_param("q", r#"[[at(document.type,"posts")]]"#))
            .and(query_param("pageSize", "1"))
            .and(query_param("after", "YE9a"))
            .and(query_param("orderings", "[document.first_publication_date desc]"))
            .and(query_param("access_token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "next_page": null,
                "results": [post_json("P1", "older-post")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let options = QueryOptions::new()
            .page_size(1)
            .after("YE9a")
            .order_by(Ordering::desc(FIRST_PUBLICATION_DATE));
        let page = client.query_by_type("posts", &options).await.unwrap();

        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].uid.as_deref(), Some("older-post"));
        assert!(page.next_page.is_none());
    }

    #[tokio::test]
    async fn test_master_ref_is_cached() {
        let server = MockServer::start().await;
        mount_root(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        client.query_by_type("posts", &QueryOptions::new()).await.unwrap();
        client.query_by_type("posts", &QueryOptions::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_ref_skips_master_lookup() {
        let server = MockServer::start().await;
        mount_root(&server, 0).await;

        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .and(query_param("ref", "PREVIEW"))
            .and(query_param("q", r#"[[at(document.id,"YE9a")]]"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [post_json("YE9a", "draft")]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let options = QueryOptions::new().reference(Some("PREVIEW"));
        let doc = client.get_by_id("YE9a", &options).await.unwrap().unwrap();
        assert_eq!(doc.uid.as_deref(), Some("draft"));
    }

    #[tokio::test]
    async fn test_get_by_uid_missing_returns_none() {
        let server = MockServer::start().await;
        mount_root(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .and(query_param(
                "q",
                r#"[[at(document.type,"posts")][at(my.posts.uid,"missing")]]"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let doc = client
            .get_by_uid("posts", "missing", &QueryOptions::new())
            .await
            .unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let options = QueryOptions::new().reference(Some("expired"));
        let err = client.query_by_type("posts", &options).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 404, .. }));
        assert!(err.is_rejected_ref());
    }

    #[tokio::test]
    async fn test_missing_master_ref() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refs": []})))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.master_ref().await.unwrap_err();
        assert!(matches!(err, Error::MissingRef(_)));
    }

    #[tokio::test]
    async fn test_fetch_page_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/documents/search"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 2,
                "next_page": null,
                "results": [post_json("P2", "second")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let cursor = format!("{}/api/v2/documents/search?ref=MASTER&page=2", server.uri());
        let page = client.fetch_page(&cursor).await.unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.results[0].uid.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_fetch_page_rejects_foreign_cursor() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);

        let err = client
            .fetch_page("https://evil.example.com/api/v2/documents/search?page=2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCursor(_)));

        let err = client.fetch_page("not a url").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCursor(_)));
    }
}
