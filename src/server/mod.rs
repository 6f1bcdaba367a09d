//! Blog server with stale-while-revalidate pages and preview mode

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::client::ContentClient;
use crate::content::{normalize_page, ContentLoader};
use crate::error::Error;
use crate::helpers::listing_path;
use crate::preview::{resolve_link, PreviewData, PreviewResolver, PreviewSigner};
use crate::templates::{TemplateRenderer, ASSETS};
use crate::Blog;

/// A rendered page and when it was rendered
#[derive(Debug, Clone)]
struct CachedPage {
    status: StatusCode,
    html: String,
    rendered_at: Instant,
}

impl IntoResponse for CachedPage {
    fn into_response(self) -> Response {
        (self.status, Html(self.html)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PageKey {
    /// Home listing accumulated through page n
    Home(u32),
    Post(String),
}

/// Server state
pub struct ServerState {
    blog: Blog,
    client: Arc<dyn ContentClient>,
    renderer: TemplateRenderer,
    signer: Option<PreviewSigner>,
    pages: RwLock<HashMap<PageKey, CachedPage>>,
    refreshing: Mutex<HashSet<PageKey>>,
}

impl ServerState {
    pub fn new(blog: Blog, client: Arc<dyn ContentClient>) -> Result<Self> {
        let renderer = TemplateRenderer::new(&blog.config)?;
        let signer = PreviewSigner::new(&blog.config.preview.secret);
        if signer.is_none() {
            tracing::warn!("No preview secret configured, preview mode is disabled");
        }

        Ok(Self {
            blog,
            client,
            renderer,
            signer,
            pages: RwLock::new(HashMap::new()),
            refreshing: Mutex::new(HashSet::new()),
        })
    }

    /// Render a page from the repository; `reference` selects a preview ref
    async fn render_page(&self, key: &PageKey, reference: Option<&str>) -> Result<CachedPage> {
        let preview = reference.is_some();
        let loader = ContentLoader::new(self.client.as_ref(), &self.blog.config);

        let (status, html) = match key {
            PageKey::Home(page) => {
                let listing = loader.listing_through(*page, reference).await?;
                if listing.current_page() < *page {
                    (StatusCode::NOT_FOUND, self.renderer.render_not_found(preview)?)
                } else {
                    let next = listing.has_more().then(|| listing_path(page + 1));
                    let html = self
                        .renderer
                        .render_home(&listing, next.as_deref(), preview)?;
                    (StatusCode::OK, html)
                }
            }
            PageKey::Post(uid) => match loader.load_post(uid, reference).await? {
                Some(loaded) => (StatusCode::OK, self.renderer.render_post(&loaded, preview)?),
                None => {
                    tracing::debug!("Post {} not found", uid);
                    (StatusCode::NOT_FOUND, self.renderer.render_not_found(preview)?)
                }
            },
        };

        Ok(CachedPage {
            status,
            html,
            rendered_at: Instant::now(),
        })
    }

    /// Verified preview ref from the request cookies
    fn preview_reference(&self, jar: &CookieJar) -> Option<String> {
        let signer = self.signer.as_ref()?;
        let cookie = jar.get(&self.blog.config.preview.cookie_name)?;
        match signer.verify(cookie.value()) {
            Some(data) => Some(data.reference),
            None => {
                tracing::debug!("Ignoring preview cookie with a bad signature");
                None
            }
        }
    }
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    let public_dir = state.blog.public_dir.clone();
    let static_files =
        ServeDir::new(&public_dir).not_found_service(ServeFile::new(public_dir.join("404.html")));

    let mut app = Router::new()
        .route("/", get(home_handler))
        .route("/page/:page", get(listing_handler))
        .route("/page/:page/", get(listing_handler))
        .route("/post/:uid", get(post_handler))
        .route("/post/:uid/", get(post_handler))
        .route("/api/preview", get(preview_handler))
        .route("/api/exit-preview", get(exit_preview_handler))
        .route("/api/posts", get(posts_api_handler));

    for (path, content_type, body) in ASSETS {
        let content_type = *content_type;
        let body = *body;
        app = app.route(
            &format!("/{}", path),
            get(move || async move { ([(header::CONTENT_TYPE, content_type)], body) }),
        );
    }

    app.fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server
pub async fn start(
    blog: &Blog,
    client: Arc<dyn ContentClient>,
    ip: &str,
    port: u16,
    open: bool,
) -> Result<()> {
    let state = Arc::new(ServerState::new(blog.clone(), client)?);
    let app = router(state);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let url = format!("http://{}:{}", ip, port);
    println!("Server running at {}", url);
    println!("Press Ctrl+C to stop.");

    if open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct ListingQuery {
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    token: Option<String>,
    #[serde(rename = "documentId")]
    document_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CursorQuery {
    cursor: String,
}

async fn home_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ListingQuery>,
    jar: CookieJar,
) -> Response {
    let page = query.page.unwrap_or(1).max(1);
    serve_page(state, PageKey::Home(page), &jar).await
}

async fn listing_handler(
    State(state): State<Arc<ServerState>>,
    Path(page): Path<u32>,
    jar: CookieJar,
) -> Response {
    serve_page(state, PageKey::Home(page.max(1)), &jar).await
}

async fn post_handler(
    State(state): State<Arc<ServerState>>,
    Path(uid): Path<String>,
    jar: CookieJar,
) -> Response {
    serve_page(state, PageKey::Post(uid), &jar).await
}

/// Serve from the page cache, or render directly in preview mode
async fn serve_page(state: Arc<ServerState>, key: PageKey, jar: &CookieJar) -> Response {
    if let Some(reference) = state.preview_reference(jar) {
        return match state.render_page(&key, Some(&reference)).await {
            Ok(page) => page.into_response(),
            Err(e) => error_response(e),
        };
    }

    let cached = state.pages.read().await.get(&key).cloned();
    match cached {
        Some(page) if page.rendered_at.elapsed() < state.blog.config.revalidate() => {
            page.into_response()
        }
        Some(page) => {
            spawn_refresh(state.clone(), key).await;
            page.into_response()
        }
        None => match state.render_page(&key, None).await {
            Ok(page) => {
                // Not-found renders are keyed by arbitrary request paths
                if page.status == StatusCode::OK {
                    state.pages.write().await.insert(key, page.clone());
                }
                page.into_response()
            }
            Err(e) => error_response(e),
        },
    }
}

/// Re-render a stale page in the background; at most one refresh per page
async fn spawn_refresh(state: Arc<ServerState>, key: PageKey) {
    if !state.refreshing.lock().await.insert(key.clone()) {
        tracing::debug!("Already revalidating {:?}", key);
        return;
    }

    tokio::spawn(async move {
        tracing::debug!("Revalidating {:?}", key);
        match state.render_page(&key, None).await {
            Ok(page) if page.status == StatusCode::OK => {
                state.pages.write().await.insert(key.clone(), page);
            }
            Ok(_) => {
                tracing::debug!("{:?} no longer exists, dropping it", key);
                state.pages.write().await.remove(&key);
            }
            // Keep serving the stale page
            Err(e) => tracing::warn!("Failed to revalidate {:?}: {:#}", key, e),
        }
        state.refreshing.lock().await.remove(&key);
    });
}

async fn preview_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<PreviewQuery>,
    jar: CookieJar,
) -> Response {
    let Some(signer) = &state.signer else {
        tracing::warn!("Preview requested but no preview secret is configured");
        return invalid_token();
    };
    let token = query.token.unwrap_or_default();

    let post_type = state.blog.config.prismic.post_type.clone();
    let resolver =
        PreviewResolver::new(state.client.as_ref(), &token, query.document_id.as_deref());
    let url = match resolver.resolve(|doc| resolve_link(doc, &post_type), "/").await {
        Ok(Some(url)) => url,
        Ok(None) | Err(Error::InvalidPreviewToken) => return invalid_token(),
        Err(e) => return error_response(e.into()),
    };

    let value = match signer.sign(&PreviewData { reference: token }) {
        Ok(value) => value,
        Err(e) => return error_response(e.into()),
    };
    let cookie = Cookie::build((state.blog.config.preview.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    tracing::info!("Entering preview mode, redirecting to {}", url);
    (
        jar.add(cookie),
        (StatusCode::FOUND, [(header::LOCATION, url)]),
    )
        .into_response()
}

async fn exit_preview_handler(State(state): State<Arc<ServerState>>, jar: CookieJar) -> Response {
    let cookie = Cookie::build((state.blog.config.preview.cookie_name.clone(), "")).path("/");
    (jar.remove(cookie), Redirect::temporary("/")).into_response()
}

/// Next page of the listing as JSON
async fn posts_api_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CursorQuery>,
) -> Response {
    match state.client.fetch_page(&query.cursor).await {
        Ok(page) => Json(normalize_page(&page)).into_response(),
        Err(Error::InvalidCursor(cursor)) => {
            tracing::debug!("Rejected cursor {}", cursor);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Invalid cursor" })),
            )
                .into_response()
        }
        Err(e) => error_response(e.into()),
    }
}

fn invalid_token() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid token" })),
    )
        .into_response()
}

/// Repository failures are reported as 502, anything else as 500
fn error_response(error: anyhow::Error) -> Response {
    tracing::error!("Request failed: {:#}", error);
    let status = if error.downcast_ref::<Error>().is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, status.canonical_reason().unwrap_or("Error")).into_response()
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::test_helpers::{corpus, post_doc, MemoryClient};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn state_with(dir: &TempDir, client: MemoryClient, secret: &str) -> Arc<ServerState> {
        let mut config = SiteConfig::default();
        config.preview.secret = secret.to_string();
        state_from(dir, Arc::new(client), config)
    }

    fn state_from(
        dir: &TempDir,
        client: Arc<MemoryClient>,
        config: SiteConfig,
    ) -> Arc<ServerState> {
        let blog = Blog::with_config(dir.path(), config);
        Arc::new(ServerState::new(blog, client).unwrap())
    }

    async fn cached(state: &Arc<ServerState>, uid: &str) -> Option<CachedPage> {
        state.pages.read().await.get(&PageKey::Post(uid.into())).cloned()
    }

    fn state(dir: &TempDir, client: MemoryClient) -> Arc<ServerState> {
        state_with(dir, client, SECRET)
    }

    async fn get(state: &Arc<ServerState>, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        router(state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn preview_cookie(reference: &str) -> String {
        let signer = PreviewSigner::new(SECRET).unwrap();
        let value = signer
            .sign(&PreviewData {
                reference: reference.to_string(),
            })
            .unwrap();
        format!("__preview_data={}", value)
    }

    #[tokio::test]
    async fn test_home_lists_first_page() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(3)));

        let response = get(&state, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert!(html.contains("Title of post-3"));
        assert!(!html.contains("Title of post-2"));
        assert!(html.contains(r#"href="/page/2/""#));
    }

    #[tokio::test]
    async fn test_home_accumulates_pages() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(3)));

        let html = body(get(&state, "/?page=2", None).await).await;
        assert!(html.contains("Title of post-3"));
        assert!(html.contains("Title of post-2"));
        assert!(html.contains(r#"href="/page/3/""#));

        let last = body(get(&state, "/page/3/", None).await).await;
        assert!(last.contains("Title of post-1"));
        assert!(!last.contains("Carregar mais posts"));

        let beyond = get(&state, "/page/9", None).await;
        assert_eq!(beyond.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_page() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(3)));

        let response = get(&state, "/post/post-2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert!(html.contains("<h1>Title of post-2</h1>"));
        assert!(html.contains("1 min"));
        assert!(html.contains(r#"href="/post/post-1""#));
        assert!(html.contains(r#"href="/post/post-3""#));
        assert!(!html.contains("/api/exit-preview"));
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(1)));

        let response = get(&state, "/post/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body(response).await.contains("Post não encontrado"));
    }

    #[tokio::test]
    async fn test_post_is_cached() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(2)));

        get(&state, "/post/post-1", None).await;
        let cached = state.pages.read().await.get(&PageKey::Post("post-1".into())).cloned();
        let cached = cached.unwrap();

        get(&state, "/post/post-1", None).await;
        let again = state.pages.read().await.get(&PageKey::Post("post-1".into())).cloned();
        assert_eq!(again.unwrap().rendered_at, cached.rendered_at);
    }

    #[tokio::test]
    async fn test_missing_pages_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(2)));

        for i in 0..50 {
            let post = get(&state, &format!("/post/nope-{}", i), None).await;
            assert_eq!(post.status(), StatusCode::NOT_FOUND);
            let page = get(&state, &format!("/page/{}", 100 + i), None).await;
            assert_eq!(page.status(), StatusCode::NOT_FOUND);
        }
        assert!(state.pages.read().await.is_empty());

        get(&state, "/post/post-1", None).await;
        assert_eq!(state.pages.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_page_is_served_while_revalidating() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(MemoryClient::new(corpus(3)));
        let mut config = SiteConfig::default();
        config.revalidate_secs = 0;
        let state = state_from(&dir, client.clone(), config);
        let key = PageKey::Post("post-2".into());

        get(&state, "/post/post-2", None).await;
        let first = cached(&state, "post-2").await.unwrap();
        let renders = client.queries().len();

        // A refresh is already running: the stale page is served as is
        state.refreshing.lock().await.insert(key.clone());
        let response = get(&state, "/post/post-2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("<h1>Title of post-2</h1>"));
        tokio::task::yield_now().await;
        assert_eq!(client.queries().len(), renders);
        assert_eq!(cached(&state, "post-2").await.unwrap().rendered_at, first.rendered_at);
        state.refreshing.lock().await.remove(&key);

        let response = get(&state, "/post/post-2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("<h1>Title of post-2</h1>"));

        let mut refreshed = None;
        for _ in 0..200 {
            let page = cached(&state, "post-2").await.unwrap();
            if page.rendered_at != first.rendered_at && state.refreshing.lock().await.is_empty() {
                refreshed = Some(page);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let refreshed = refreshed.expect("background refresh did not complete");
        assert!(refreshed.rendered_at > first.rendered_at);
        assert_eq!(refreshed.status, StatusCode::OK);
        assert_eq!(client.queries().len(), renders * 2);
    }

    #[tokio::test]
    async fn test_preview_sets_cookie_and_redirects() {
        let dir = TempDir::new().unwrap();
        let draft = post_doc("draft-id", "draft-post", "2021-04-01T10:00:00+0000");
        let client = MemoryClient::new(corpus(2)).with_preview("preview-token", vec![draft]);
        let state = state(&dir, client);

        let response = get(
            &state,
            "/api/preview?token=preview-token&documentId=draft-id",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/post/draft-post");

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("__preview_data="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Path=/"));
    }

    #[tokio::test]
    async fn test_preview_rejects_invalid_token() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(2)));

        for uri in [
            "/api/preview?token=bogus&documentId=id-1",
            "/api/preview?documentId=id-1",
        ] {
            let response = get(&state, uri, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
            assert_eq!(body(response).await, r#"{"message":"Invalid token"}"#);
        }
    }

    #[tokio::test]
    async fn test_preview_disabled_without_secret() {
        let dir = TempDir::new().unwrap();
        let client = MemoryClient::new(corpus(2)).with_preview("preview-token", Vec::new());
        let state = state_with(&dir, client, "");

        let response = get(&state, "/api/preview?token=preview-token", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_preview_cookie_shows_drafts() {
        let dir = TempDir::new().unwrap();
        let draft = post_doc("draft-id", "draft-post", "2021-04-01T10:00:00+0000");
        let client = MemoryClient::new(corpus(2)).with_preview("preview-token", vec![draft]);
        let state = state(&dir, client);

        let published = get(&state, "/post/draft-post", None).await;
        assert_eq!(published.status(), StatusCode::NOT_FOUND);

        let cookie = preview_cookie("preview-token");
        let response = get(&state, "/post/draft-post", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert!(html.contains("Title of draft-post"));
        assert!(html.contains("/api/exit-preview"));

        // Preview renders never land in the shared cache
        assert!(cached(&state, "draft-post").await.is_none());
    }

    #[tokio::test]
    async fn test_forged_cookie_is_ignored() {
        let dir = TempDir::new().unwrap();
        let draft = post_doc("draft-id", "draft-post", "2021-04-01T10:00:00+0000");
        let client = MemoryClient::new(corpus(2)).with_preview("preview-token", vec![draft]);
        let state = state(&dir, client);

        let response = get(
            &state,
            "/post/draft-post",
            Some("__preview_data=eyJyZWYiOiJwcmV2aWV3LXRva2VuIn0.forged"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exit_preview() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(1)));

        let cookie = preview_cookie("preview-token");
        let response = get(&state, "/api/exit-preview", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("__preview_data=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_posts_api() {
        let dir = TempDir::new().unwrap();
        let client = MemoryClient::new(corpus(3));
        let state = state(&dir, client);

        // Seeds the cursor for page 2
        get(&state, "/", None).await;

        let response = get(&state, "/api/posts?cursor=memory://posts?page=2", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body(response).await).unwrap();
        assert_eq!(json["results"][0]["uid"], "post-2");
        assert_eq!(json["next_page"], "memory://posts?page=3");
    }

    #[tokio::test]
    async fn test_posts_api_rejects_unknown_cursor() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(corpus(1)));

        let response = get(&state, "/api/posts?cursor=http://evil.example/", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_serves_assets() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(Vec::new()));

        let response = get(&state, "/style.css", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/css; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_serves_public_files() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, MemoryClient::new(Vec::new()));
        std::fs::create_dir_all(&state.blog.public_dir).unwrap();
        std::fs::write(state.blog.public_dir.join("robots.txt"), "User-agent: *").unwrap();

        let response = get(&state, "/robots.txt", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "User-agent: *");
    }
}
