//! Integration tests for the request layer.
//!
//! These tests run the real reqwest transport against a stub forum backend
//! served by axum on an ephemeral port.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rapforum_core::network::{ReqwestTransport, RequestBody, RequestSpec};
use rapforum_core::{
    ApiClient, ClientConfig, LogNavigator, MemorySession, Notifier, ProgressCallback,
    RequestError, RequestOptions, RetryPolicy, SessionStore, UploadFile,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Request counters of the stub backend.
#[derive(Default)]
struct Backend {
    album_hits: AtomicUsize,
    slow_hits: AtomicUsize,
}

type Shared = Arc<Backend>;

fn ok(data: Value) -> Json<Value> {
    Json(json!({"code": 200, "message": "ok", "data": data}))
}

async fn album(State(backend): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    backend.album_hits.fetch_add(1, Ordering::SeqCst);
    ok(json!({"id": id}))
}

async fn rate(Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    ok(json!({"id": id, "rating": body}))
}

async fn me(headers: HeaderMap) -> Json<Value> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ok(json!({"authorization": authorization}))
}

async fn expired() -> Json<Value> {
    Json(json!({"code": 401, "message": "token expired", "data": null}))
}

async fn missing() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"code": 404, "message": "no such route", "data": null})),
    )
}

async fn slow(State(backend): State<Shared>) -> Json<Value> {
    backend.slow_hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    ok(json!("done"))
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    ok(json!(params))
}

async fn upload(mut multipart: Multipart) -> Json<Value> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap_or_default();
        return ok(json!({"name": name, "contentType": content_type, "size": bytes.len()}));
    }
    Json(json!({"code": 400, "message": "missing file", "data": null}))
}

/// Start the stub backend. Returns its API base URL.
async fn spawn_backend() -> (String, Shared) {
    let backend = Shared::default();
    let app = Router::new()
        .route("/api/albums/:id", get(album))
        .route("/api/albums/:id/rate", post(rate))
        .route("/api/users/me", get(me))
        .route("/api/session/expired", get(expired))
        .route("/api/missing", get(missing))
        .route("/api/slow", get(slow))
        .route("/api/search", get(search))
        .route("/api/upload", post(upload))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api", addr), backend)
}

#[derive(Default)]
struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl Notifier for CollectingNotifier {
    fn error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

impl CollectingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

struct Harness {
    client: ApiClient,
    backend: Shared,
    session: Arc<MemorySession>,
    navigator: Arc<LogNavigator>,
    notifier: Arc<CollectingNotifier>,
}

async fn harness(configure: impl FnOnce(ClientConfig) -> ClientConfig) -> Harness {
    let (base_url, backend) = spawn_backend().await;
    let session = Arc::new(MemorySession::with_token("test-token"));
    let navigator = Arc::new(LogNavigator::new());
    let notifier = Arc::new(CollectingNotifier::default());

    let client = ApiClient::builder()
        .config(configure(ClientConfig::new().with_base_url(base_url)))
        .session(session.clone())
        .navigator(navigator.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    Harness {
        client,
        backend,
        session,
        navigator,
        notifier,
    }
}

#[tokio::test]
async fn test_get_resolves_payload_and_caches() {
    let h = harness(|c| c).await;

    let album: Value = h.client.get("/albums/42", None).await.unwrap();
    assert_eq!(album, json!({"id": "42"}));

    let fingerprint = RequestSpec::new(reqwest::Method::GET, "/albums/42").fingerprint();
    assert_eq!(h.client.cache().get(&fingerprint), Some(json!({"id": "42"})));

    let again: Value = h.client.get("/albums/42", None).await.unwrap();
    assert_eq!(again, album);
    assert_eq!(h.backend.album_hits.load(Ordering::SeqCst), 1);

    h.client.clear_cache();
    let _: Value = h.client.get("/albums/42", None).await.unwrap();
    assert_eq!(h.backend.album_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_query_params_sent() {
    let h = harness(|c| c).await;

    let echoed: Value = h
        .client
        .get("/search", Some(json!({"keyword": "mf doom", "page": 2})))
        .await
        .unwrap();

    assert_eq!(echoed, json!({"keyword": "mf doom", "page": "2"}));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let h = harness(|c| c).await;

    let rated: Value = h
        .client
        .post("/albums/42/rate", Some(json!({"score": 9})))
        .await
        .unwrap();

    assert_eq!(rated, json!({"id": "42", "rating": {"score": 9}}));
    let spec = RequestSpec::new(reqwest::Method::POST, "/albums/42/rate")
        .with_body(RequestBody::Json(json!({"score": 9})));
    assert_eq!(h.client.cache().get(&spec.fingerprint()), None);
}

#[tokio::test]
async fn test_auth_header_sent() {
    let h = harness(|c| c).await;

    let me: Value = h.client.get("/users/me", None).await.unwrap();
    assert_eq!(me["authorization"], json!("Bearer test-token"));
}

#[tokio::test]
async fn test_unauthorized_envelope_forces_logout() {
    let h = harness(|c| c).await;

    let err = h
        .client
        .get::<Value>("/session/expired", None)
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::Api { code: 401, .. }));
    assert_eq!(h.session.token(), None);
    assert_eq!(h.navigator.last_redirect().as_deref(), Some("/login"));
    assert_eq!(h.notifier.messages(), vec!["token expired".to_string()]);
}

#[tokio::test]
async fn test_not_found_status() {
    let h = harness(|c| c).await;

    let err = h.client.get::<Value>("/missing", None).await.unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert_eq!(
        h.notifier.messages(),
        vec!["The requested resource does not exist".to_string()]
    );
    assert!(h.session.is_logged_in());

    let metrics = h.client.request_metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].status, 404);
    assert_eq!(h.client.request_success_rate(), 0);
}

#[tokio::test]
async fn test_rapid_duplicates_hit_server_once() {
    let h = harness(|c| c).await;

    let (first, second) = tokio::join!(
        h.client.get::<Value>("/slow", None),
        h.client.get::<Value>("/slow", None),
    );

    assert!(first.unwrap_err().is_cancelled());
    assert_eq!(second.unwrap(), json!("done"));
    assert_eq!(h.backend.slow_hits.load(Ordering::SeqCst), 1);
    assert!(h.notifier.messages().is_empty());
    assert_eq!(h.client.request_metrics().len(), 1);
}

#[tokio::test]
async fn test_timeout_reported() {
    let h = harness(|c| {
        c.with_timeout(Duration::from_millis(50))
            .with_retry(RetryPolicy::none())
    })
    .await;

    let err = h.client.get::<Value>("/slow", None).await.unwrap_err();

    assert!(matches!(err, RequestError::Timeout { attempts: 1 }));
    assert_eq!(
        h.notifier.messages(),
        vec!["Request timed out, please check your network connection".to_string()]
    );
}

#[tokio::test]
async fn test_per_request_timeout_longer_than_default() {
    let h = harness(|c| {
        c.with_timeout(Duration::from_millis(100))
            .with_retry(RetryPolicy::none())
    })
    .await;

    let options = RequestOptions::new().with_timeout(Duration::from_secs(2));
    let done: Value = h.client.get_with("/slow", None, options).await.unwrap();

    assert_eq!(done, json!("done"));
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_abandoned_request_deregisters() {
    let h = harness(|c| c).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        h.client.get::<Value>("/slow", None),
    )
    .await;

    assert!(abandoned.is_err());
    assert!(h.client.in_flight().is_empty());

    // A later identical request is neither cancelled nor served stale.
    let done: Value = h.client.get("/slow", None).await.unwrap();
    assert_eq!(done, json!("done"));
}

#[tokio::test]
async fn test_custom_reqwest_client() {
    let (base_url, backend) = spawn_backend().await;
    let client = ApiClient::builder()
        .config(ClientConfig::new().with_base_url(base_url))
        .transport(Arc::new(ReqwestTransport::with_client(reqwest::Client::new())))
        .build()
        .unwrap();

    let album: Value = client.get("/albums/1", None).await.unwrap();

    assert_eq!(album, json!({"id": "1"}));
    assert_eq!(backend.album_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_backend_retried() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let notifier = Arc::new(CollectingNotifier::default());
    let client = ApiClient::builder()
        .config(
            ClientConfig::new()
                .with_base_url(format!("http://{}/api", addr))
                .with_retry(RetryPolicy::default().with_delay(Duration::from_millis(10))),
        )
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let err = client.get::<Value>("/albums", None).await.unwrap_err();

    assert!(matches!(err, RequestError::Network { attempts: 3, .. }));
    assert_eq!(client.request_metrics().len(), 3);
    assert!(client.request_metrics().iter().all(|m| m.status == 0));
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_upload_reports_progress() {
    let h = harness(|c| c).await;

    let mut fixture = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .unwrap();
    fixture.write_all(&vec![7u8; 200 * 1024]).unwrap();
    fixture.flush().unwrap();

    let file = UploadFile::from_path(fixture.path()).await.unwrap();
    assert_eq!(file.content_type, "image/png");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let on_progress: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));

    let uploaded: Value = h
        .client
        .upload("/upload", file, Some(on_progress))
        .await
        .unwrap();

    assert_eq!(uploaded["size"], json!(200 * 1024));
    assert_eq!(uploaded["contentType"], json!("image/png"));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_metrics_summary() {
    let h = harness(|c| c).await;

    let _: Value = h.client.get("/albums/1", None).await.unwrap();
    let _: Value = h.client.get("/albums/2", None).await.unwrap();
    let _ = h.client.get::<Value>("/missing", None).await;
    // Cache hit, not recorded.
    let _: Value = h.client.get("/albums/1", None).await.unwrap();

    let metrics = h.client.request_metrics();
    assert_eq!(metrics.len(), 3);
    assert_eq!(metrics[0].url, "/albums/1");
    assert_eq!(metrics[0].method, "GET");
    assert_eq!(h.client.request_success_rate(), 67);
}
