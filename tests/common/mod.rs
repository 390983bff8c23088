//! Shared utilities for integration tests: a stub origin and a running
//! proxy pointed at it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use origin_proxy::config::ProxyConfig;
use origin_proxy::{HttpServer, Shutdown};

pub const LANDING_PAGE: &str = r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Academic Affairs</title>
    <link rel="stylesheet" href="css/site.css">
    <script src="/app/js/main.js"></script>
</head>
<body class="page">
    <form id="loginForm" action="xk/LoginToXk" method="post">
        <input name="userAccount" placeholder="Student number">
        <input type="password" name="userPassword">
    </form>
    <a href="news/list.do">News</a>
    <a href="#top">Top</a>
    <a href="javascript:void(0)">Menu</a>
    <table class="grid"></table>
    <script>var api = "/app/kbcx/query.action";</script>
</body>
</html>"##;

pub const BROWSE_PAGE: &str = r#"<html><body>
<a href="/app/news/list.do">News</a>
<a href="//cdn.example/lib.js">CDN</a>
<form action="/app/search.do"></form>
<img src="/app/img/logo.png">
<p>Type href="/x" to link</p>
</body></html>"#;

pub const PORTAL_PAGE: &str = r#"<html><body>
<a href="index.do">Home</a>
<a href="notice/1.do">Course selection opens Monday</a>
<a href="/app/notice/2.do">Exam timetable published</a>
<a href="notice/3.do">Library hours extended</a>
<a href="notice/4.do">Graduation photos schedule</a>
<a href="notice/5.do">Scholarship applications due</a>
<a href="notice/6.do">Network maintenance tonight</a>
<a href="notice/7.do">Sports day postponed</a>
</body></html>"#;

pub const BULLETIN_PAGE: &str = r#"<html><body>
<a href="index.do">Home</a>
<div class="box news">Campus closed Friday</div>
<div class="notice">Grades released</div>
</body></html>"#;

/// GBK page: title "教务系统", a form labelled "密码" and one link.
pub const GBK_PAGE: &[u8] = b"<html><head><title>\xbd\xcc\xce\xf1\xcf\xb5\xcd\xb3</title></head><body>\
<form action=\"check.do\"><label>\xc3\xdc\xc2\xeb</label><input name=\"p\"></form>\
<a href=\"/app/gbk/next.do\">\xc3\xdc</a></body></html>";

/// A stub origin on an ephemeral port counting every request it serves.
pub struct StubOrigin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl StubOrigin {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/app/", get(landing))
            .route("/app/page.html", get(|| async { html(BROWSE_PAGE) }))
            .route("/app/portal/", get(|| async { html(PORTAL_PAGE) }))
            .route("/app/bulletin/", get(|| async { html(BULLETIN_PAGE) }))
            .route("/app/gbk/", get(gbk_page))
            .route("/app/echo", any(echo))
            .route("/app/data.json", get(|| async { Json(json!({"items": [1, 2, 3]})) }))
            .route("/app/plain", get(|| async { "plain words" }))
            .route("/app/img/logo.png", get(logo))
            .route("/app/cached.css", get(cached_css))
            .route("/app/broken", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
            .fallback(missing)
            .layer(middleware::from_fn_with_state(hits.clone(), count_hits));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/app/", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubOrigin {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

fn html(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

async fn landing() -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::SET_COOKIE, "JSESSIONID=abc; Path=/app"),
        ],
        LANDING_PAGE,
    )
        .into_response()
}

async fn gbk_page() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=gbk")],
        Bytes::from_static(GBK_PAGE),
    )
        .into_response()
}

async fn logo() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], Bytes::from_static(b"\x89PNG\r\n\x1a\nfake")).into_response()
}

async fn cached_css() -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/css"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        "body{}",
    )
        .into_response()
}

async fn missing(uri: Uri) -> Response {
    (StatusCode::NOT_FOUND, format!("no such page: {}", uri.path())).into_response()
}

/// Reflects what the origin received.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut seen = Map::new();
    for (name, value) in &headers {
        seen.insert(
            name.as_str().to_string(),
            Value::String(value.to_str().unwrap_or("<binary>").to_string()),
        );
    }
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": seen,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// A running proxy with its own cache directory.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    handle: Option<JoinHandle<()>>,
    _cache_dir: TempDir,
}

impl TestProxy {
    pub async fn start(upstream_base: &str) -> Self {
        Self::start_with(upstream_base, |_| {}).await
    }

    pub async fn start_with(upstream_base: &str, adjust: impl FnOnce(&mut ProxyConfig)) -> Self {
        let cache_dir = tempfile::tempdir().unwrap();

        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.upstream.base_url = upstream_base.to_string();
        config.upstream.timeout_secs = 5;
        config.cache.dir = cache_dir.path().to_string_lossy().into_owned();
        adjust(&mut config);

        let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(config).unwrap();

        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();
        let handle = tokio::spawn(async move {
            server.run(listener, shutdown_rx).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            addr,
            client,
            shutdown,
            handle: Some(handle),
            _cache_dir: cache_dir,
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client.get(self.url(path_and_query)).send().await.unwrap()
    }

    pub async fn get_json(&self, path_and_query: &str) -> (StatusCode, Value) {
        let response = self.get(path_and_query).await;
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(std::time::Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// An address with nothing listening on it.
pub fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
