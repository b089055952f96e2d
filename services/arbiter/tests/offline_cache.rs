//! Integration tests for the offline cache arbiter
//!
//! The network and the host are stubs: the network answers from a fixed table
//! and counts its calls, the host records every event it receives.

use arbiter::{
    arbiter::{Arbiter, FetchOutcome},
    config::ArbiterConfig,
    error::{ArbiterError, NetworkError},
    host::{Notification, WorkerHost},
    network::{HttpNetwork, Network},
    push::DEFAULT_TITLE,
    request::{FetchRequest, FetchResponse},
    server::{AppState, create_router},
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    response::IntoResponse,
};
use common::{
    cache::{CacheStorage, MemoryCacheStorage, StoredResponse, request_key},
    error::CacheResult,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tower::ServiceExt;
use url::Url;

const ORIGIN: &str = "https://app.example.com";

fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

fn config() -> ArbiterConfig {
    ArbiterConfig::versioned(Url::parse(ORIGIN).unwrap(), 4)
}

fn response(content_type: &'static str, body: &str) -> FetchResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    FetchResponse::new(StatusCode::OK, headers, body.to_string())
}

#[derive(Default)]
struct StubNetwork {
    responses: Mutex<HashMap<String, FetchResponse>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl StubNetwork {
    fn serve(&self, path: &str, response: FetchResponse) {
        self.responses.lock().unwrap().insert(url(path), response);
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unavailable("connection refused".to_string()));
        }
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| FetchResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), "")))
    }
}

#[derive(Default)]
struct RecordingHost {
    events: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl WorkerHost for RecordingHost {
    async fn skip_waiting(&self) {
        self.record("skip_waiting".to_string());
    }

    async fn claim_clients(&self) {
        self.record("claim_clients".to_string());
    }

    async fn show_notification(&self, notification: Notification) {
        self.record(format!("show:{}", notification.title));
    }

    async fn close_notification(&self, notification: &Notification) {
        self.record(format!("close:{}", notification.title));
    }

    async fn focus_or_open(&self, path: &str) {
        self.record(format!("open:{}", path));
    }
}

/// Memory storage counting every operation
#[derive(Default)]
struct SpyStorage {
    inner: MemoryCacheStorage,
    operations: AtomicUsize,
}

impl SpyStorage {
    fn touch(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for SpyStorage {
    async fn keys(&self) -> CacheResult<Vec<String>> {
        self.touch();
        self.inner.keys().await
    }

    async fn open(&self, name: &str) -> CacheResult<()> {
        self.touch();
        self.inner.open(name).await
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        self.touch();
        self.inner.delete(name).await
    }

    async fn match_in(&self, name: &str, key: &str) -> CacheResult<Option<StoredResponse>> {
        self.touch();
        self.inner.match_in(name, key).await
    }

    async fn put(&self, name: &str, key: &str, response: StoredResponse) -> CacheResult<()> {
        self.touch();
        self.inner.put(name, key, response).await
    }
}

struct Harness {
    arbiter: Arc<Arbiter>,
    network: Arc<StubNetwork>,
    host: Arc<RecordingHost>,
}

fn harness(storage: Arc<dyn CacheStorage>) -> Harness {
    let network = Arc::new(StubNetwork::default());
    let host = Arc::new(RecordingHost::default());
    let arbiter = Arbiter::new(config(), storage, network.clone(), host.clone());
    Harness {
        arbiter: Arc::new(arbiter),
        network,
        host,
    }
}

fn respond(outcome: FetchOutcome) -> FetchResponse {
    match outcome {
        FetchOutcome::Respond(response) => response,
        other => panic!("expected a response, got {:?}", other),
    }
}

async fn stored_copy(storage: &MemoryCacheStorage, generation: &str, path: &str) -> Option<StoredResponse> {
    storage
        .match_in(generation, &request_key(&url(path)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cache_first_serves_second_request_from_cache() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    h.network
        .serve("/_next/static/chunks/main.js", response("text/javascript", "boot()"));

    let request = FetchRequest::get(&url("/_next/static/chunks/main.js")).unwrap();
    let first = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(first.body, "boot()");
    assert_eq!(h.network.calls(), 1);

    h.arbiter.settle().await;
    assert!(
        stored_copy(&storage, "static-v4", "/_next/static/chunks/main.js")
            .await
            .is_some()
    );

    let second = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(second, first);
    assert_eq!(h.network.calls(), 1);
}

#[tokio::test]
async fn test_cache_first_does_not_store_failures() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));

    let request = FetchRequest::get(&url("/icons/missing.png")).unwrap();
    let response = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    h.arbiter.settle().await;
    assert_eq!(storage.len("static-v4").await, 0);
}

#[tokio::test]
async fn test_cache_first_offline_miss_fails() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));
    h.network.go_offline();

    let request = FetchRequest::get(&url("/icons/logo.svg")).unwrap();
    assert_eq!(h.arbiter.handle_fetch(&request).await, FetchOutcome::Failed);
}

#[tokio::test]
async fn test_failed_cache_write_does_not_fail_the_response() {
    let h = harness(Arc::new(MemoryCacheStorage::with_quota(0)));
    h.network.serve("/styles/app.css", response("text/css", "body{}"));

    let request = FetchRequest::get(&url("/styles/app.css")).unwrap();
    let response = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "body{}");

    // The rejected write is logged and dropped
    h.arbiter.settle().await;
    h.network.go_offline();
    assert_eq!(h.arbiter.handle_fetch(&request).await, FetchOutcome::Failed);
}

#[tokio::test]
async fn test_network_only_offline_never_touches_cache() {
    let storage = Arc::new(SpyStorage::default());
    storage
        .inner
        .put(
            "dynamic-v4",
            &request_key(&url("/api/projects")),
            StoredResponse::new(200, vec![], b"[]".to_vec()),
        )
        .await
        .unwrap();

    let h = harness(storage.clone());
    h.network.go_offline();

    let request = FetchRequest::get(&url("/api/projects")).unwrap();
    let response = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({"error": "Network request failed", "offline": true}));

    h.arbiter.settle().await;
    assert_eq!(storage.operations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_network_only_online_is_not_stored() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    h.network
        .serve("/auth/callback", response("text/html", "<p>signed in</p>"));

    let request = FetchRequest::navigate(&url("/auth/callback")).unwrap();
    let response = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(response.body, "<p>signed in</p>");

    h.arbiter.settle().await;
    assert_eq!(storage.keys().await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_document_falls_back_to_cached_copy() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    let page = response("text/html", "<h1>Projects</h1>");
    h.network.serve("/projects", page.clone());
    h.network
        .serve("/dashboard", response("text/html", "<h1>Dashboard</h1>"));

    let request = FetchRequest::navigate(&url("/projects")).unwrap();
    assert_eq!(respond(h.arbiter.handle_fetch(&request).await), page);
    h.arbiter.settle().await;
    assert!(stored_copy(&storage, "dynamic-v4", "/projects").await.is_some());

    h.network.go_offline();
    assert_eq!(respond(h.arbiter.handle_fetch(&request).await), page);
}

#[tokio::test]
async fn test_replayed_document_carries_no_cookies() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    let mut page = response("text/html", "<h1>Payroll</h1>");
    page.headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("sb-proj-auth-token=base64-OLDROTATED; Path=/"),
    );
    h.network.serve("/payroll", page.clone());

    let request = FetchRequest::navigate(&url("/payroll")).unwrap();
    let online = respond(h.arbiter.handle_fetch(&request).await);
    assert!(online.headers.contains_key(header::SET_COOKIE));
    h.arbiter.settle().await;

    h.network.go_offline();
    let replayed = respond(h.arbiter.handle_fetch(&request).await);
    assert_eq!(replayed.body, "<h1>Payroll</h1>");
    assert!(!replayed.headers.contains_key(header::SET_COOKIE));
}

/// Origin sending every protected page to the login page
async fn spawn_redirecting_origin() -> Url {
    async fn to_login() -> impl IntoResponse {
        (
            StatusCode::TEMPORARY_REDIRECT,
            [
                (header::LOCATION, "/login?redirectedFrom=%2Fprojects"),
                (header::SET_COOKIE, "sb-proj-auth-token=; Max-Age=0; Path=/"),
            ],
        )
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/login", axum::routing::get(|| async { "<h1>Login</h1>" }))
        .fallback(to_login);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

#[tokio::test]
async fn test_origin_redirects_are_passed_through_and_not_stored() {
    let origin = spawn_redirecting_origin().await;
    let storage = MemoryCacheStorage::new();
    let arbiter = Arbiter::new(
        ArbiterConfig::versioned(origin.clone(), 4),
        Arc::new(storage.clone()),
        Arc::new(HttpNetwork::new().unwrap()),
        Arc::new(RecordingHost::default()),
    );

    let request = FetchRequest::navigate(origin.join("/projects").unwrap().as_str()).unwrap();
    let response = respond(arbiter.handle_fetch(&request).await);
    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers[header::LOCATION],
        "/login?redirectedFrom=%2Fprojects"
    );
    assert_eq!(
        response.headers[header::SET_COOKIE],
        "sb-proj-auth-token=; Max-Age=0; Path=/"
    );
    assert!(!response.body.starts_with(b"<h1>Login"));

    arbiter.settle().await;
    assert_eq!(storage.keys().await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_document_without_copy_gets_offline_page() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    let dashboard = response("text/html", "<h1>Dashboard</h1>");
    h.network.serve("/dashboard", dashboard.clone());

    h.arbiter
        .handle_fetch(&FetchRequest::navigate(&url("/dashboard")).unwrap())
        .await;
    h.arbiter.settle().await;

    h.network.go_offline();
    let request = FetchRequest::navigate(&url("/snags/12")).unwrap();
    assert_eq!(respond(h.arbiter.handle_fetch(&request).await), dashboard);
}

#[tokio::test]
async fn test_document_with_empty_cache_gets_synthesized_page() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));
    h.network.go_offline();

    let request = FetchRequest::navigate(&url("/snags/12")).unwrap();
    assert_eq!(
        respond(h.arbiter.handle_fetch(&request).await),
        FetchResponse::offline_page()
    );
}

#[tokio::test]
async fn test_network_first_plain_falls_back_to_cache() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    for asset in ["/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"] {
        h.network.serve(asset, response("application/octet-stream", asset));
    }
    h.arbiter.install().await.unwrap();
    h.network.go_offline();

    let manifest = FetchRequest::get(&url("/manifest.json")).unwrap();
    let cached = respond(h.arbiter.handle_fetch(&manifest).await);
    assert_eq!(cached.body, "/manifest.json");

    let unknown = FetchRequest::get(&url("/reports/weekly")).unwrap();
    assert_eq!(h.arbiter.handle_fetch(&unknown).await, FetchOutcome::Failed);
}

#[tokio::test]
async fn test_non_get_and_non_http_are_bypassed() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));

    let post = FetchRequest::new(Method::POST, Url::parse(&url("/api/snags")).unwrap());
    assert_eq!(h.arbiter.handle_fetch(&post).await, FetchOutcome::Bypass);

    let extension = FetchRequest::get("chrome-extension://abcdef/inject.js").unwrap();
    assert_eq!(h.arbiter.handle_fetch(&extension).await, FetchOutcome::Bypass);

    assert_eq!(h.network.calls(), 0);
}

#[tokio::test]
async fn test_restart_keeps_serving_cached_assets() {
    let storage = MemoryCacheStorage::new();
    let request = FetchRequest::get(&url("/icons/icon-512x512.png")).unwrap();

    let first = {
        let h = harness(Arc::new(storage.clone()));
        h.network
            .serve("/icons/icon-512x512.png", response("image/png", "png-bytes"));
        let response = respond(h.arbiter.handle_fetch(&request).await);
        h.arbiter.settle().await;
        response
    };

    let restarted = harness(Arc::new(storage.clone()));
    restarted.network.go_offline();
    assert_eq!(respond(restarted.arbiter.handle_fetch(&request).await), first);
    assert_eq!(restarted.network.calls(), 0);
}

#[tokio::test]
async fn test_install_stores_shell_assets_then_skips_waiting() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    for asset in ["/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"] {
        h.network.serve(asset, response("application/octet-stream", asset));
    }

    h.arbiter.install().await.unwrap();
    assert_eq!(storage.len("static-v4").await, 3);
    assert_eq!(h.host.events(), vec!["skip_waiting"]);
}

#[tokio::test]
async fn test_install_is_all_or_nothing() {
    let storage = MemoryCacheStorage::new();
    let h = harness(Arc::new(storage.clone()));
    h.network
        .serve("/manifest.json", response("application/json", "{}"));

    let err = h.arbiter.install().await.unwrap_err();
    assert!(matches!(err, ArbiterError::InstallStatus { status: 404, .. }));
    assert!(storage.keys().await.unwrap().is_empty());
    assert!(h.host.events().is_empty());

    h.network.go_offline();
    let err = h.arbiter.install().await.unwrap_err();
    assert!(matches!(err, ArbiterError::InstallFetch { .. }));
}

#[tokio::test]
async fn test_activate_deletes_exactly_stale_generations() {
    let storage = MemoryCacheStorage::new();
    for name in [
        "static-v3",
        "dynamic-v3",
        "other-app-cache",
        "static-v4",
        "umbrella-v4",
    ] {
        storage.open(name).await.unwrap();
    }
    let h = harness(Arc::new(storage.clone()));

    let mut deleted = h.arbiter.activate().await.unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["dynamic-v3", "other-app-cache", "static-v3"]);
    assert_eq!(storage.keys().await.unwrap(), vec!["static-v4", "umbrella-v4"]);
    assert_eq!(h.host.events(), vec!["claim_clients"]);
}

#[tokio::test]
async fn test_push_shows_notification() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));

    let payload = json!({"title": "Payroll approved", "body": "Week 42", "data": {"run": 42}});
    let notification = h.arbiter.handle_push(payload.to_string().as_bytes()).await;
    assert_eq!(notification.data, json!({"run": 42}));

    h.arbiter.handle_push(b"not json").await;
    assert_eq!(
        h.host.events(),
        vec![
            "show:Payroll approved".to_string(),
            format!("show:{}", DEFAULT_TITLE),
        ]
    );
}

#[tokio::test]
async fn test_notification_click_closes_then_opens_dashboard() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));
    let notification = h.arbiter.handle_push(br#"{"title": "Snag closed"}"#).await;

    h.arbiter.handle_notification_click(&notification).await;
    assert_eq!(
        h.host.events(),
        vec!["show:Snag closed", "close:Snag closed", "open:/dashboard"]
    );
}

async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_proxy_routes() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));
    h.network.go_offline();
    let app = create_router(AppState {
        arbiter: h.arbiter.clone(),
    });

    let api = Request::builder()
        .uri("/api/projects")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(api).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_to_json(response.into_body()).await["offline"], true);

    let plain = Request::builder()
        .uri("/reports/weekly")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(plain).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let navigation = Request::builder()
        .uri("/projects/7")
        .header("sec-fetch-mode", "navigate")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(navigation).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );

    let bypassed = Request::builder()
        .method(Method::POST)
        .uri("/api/snags")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(bypassed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_worker_event_endpoints() {
    let h = harness(Arc::new(MemoryCacheStorage::new()));
    let app = create_router(AppState {
        arbiter: h.arbiter.clone(),
    });

    let push = Request::builder()
        .method(Method::POST)
        .uri("/__worker/push")
        .body(Body::from("{ broken"))
        .unwrap();
    let response = app.clone().oneshot(push).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let notification = body_to_json(response.into_body()).await;
    assert_eq!(notification["title"], DEFAULT_TITLE);

    let click = Request::builder()
        .method(Method::POST)
        .uri("/__worker/notification-click")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(notification.to_string()))
        .unwrap();
    let response = app.oneshot(click).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        h.host.events(),
        vec![
            format!("show:{}", DEFAULT_TITLE),
            format!("close:{}", DEFAULT_TITLE),
            "open:/dashboard".to_string(),
        ]
    );
}
