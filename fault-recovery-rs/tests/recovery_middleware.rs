//! Integration tests for the recovery middleware.
//!
//! Each test builds a small router whose handlers fault on purpose and drives
//! it with `oneshot`, then inspects both the response and what reached the
//! sink.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Router};
use tower::ServiceExt;

use fault_recovery::{recover, MemorySink, Recovery, RecoveryConfig};

const FALLBACK_BODY: &str = r#"{"error":"Internal Server Error","message":"An unexpected error occurred"}"#;

static EXPLODE_LINE: AtomicU32 = AtomicU32::new(0);

#[inline(never)]
fn explode() -> String {
    EXPLODE_LINE.store(line!() + 1, Ordering::SeqCst);
    panic!("This is a test!");
}

async fn explode_handler() -> String {
    explode()
}

async fn health_handler() -> &'static str {
    panic!("health check exploded");
}

async fn error_payload_handler() -> &'static str {
    std::panic::panic_any(anyhow::anyhow!("connection reset").context("loading profile"));
}

async fn swallow_handler() -> &'static str {
    match std::panic::catch_unwind(|| panic!("handled inside the handler")) {
        Ok(()) => "untouched",
        Err(_) => "handled",
    }
}

async fn resume_handler() -> &'static str {
    std::panic::resume_unwind(Box::new("resumed from worker"));
}

async fn early_return_handler() -> Result<String, StatusCode> {
    Err(StatusCode::BAD_REQUEST)
}

fn app(config: RecoveryConfig) -> Router {
    let recovery = Recovery::new(config).unwrap();
    Router::new()
        .route("/ok", get(|| async { "fine" }))
        .route("/health", get(health_handler))
        .route("/test-panic", get(explode_handler))
        .route("/error-payload", get(error_payload_handler))
        .route("/early", get(early_return_handler))
        .route("/swallow", get(swallow_handler))
        .route("/resume", get(resume_handler))
        .layer(middleware::from_fn_with_state(recovery, recover))
}

fn get_request(uri: &str) -> Request<Body> {
    let mut req = Request::builder()
        .uri(uri)
        .header("user-agent", "recovery-tests/1.0")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40123))));
    req
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn pass_through_is_transparent() {
    let sink = MemorySink::new();
    let app = app(RecoveryConfig::default().sink(sink.clone()));

    let response = app.clone().oneshot(get_request("/ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "fine");

    let response = app.clone().oneshot(get_request("/early")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get_request("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(sink.is_empty());
}

#[tokio::test]
async fn recovered_fault_gets_fallback_and_record() {
    let sink = MemorySink::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = app(
        RecoveryConfig::default()
            .sink(sink.clone())
            .time_key(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                "2025-10-07T10:30:00Z".to_string()
            }),
    );

    let response = app.oneshot(get_request("/test-panic?verbose=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, FALLBACK_BODY);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.severity, "error");
    assert_eq!(record.method, "GET");
    assert_eq!(record.path, "/test-panic");
    assert_eq!(record.url, "/test-panic?verbose=1");
    assert_eq!(record.remote_addr, "127.0.0.1");
    assert_eq!(record.user_agent, "recovery-tests/1.0");
    assert_eq!(record.panic_value.to_string(), "This is a test!");
    assert_eq!(record.time_key.as_deref(), Some("2025-10-07T10:30:00Z"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let line = EXPLODE_LINE.load(Ordering::SeqCst);
    assert!(record.panic_file.ends_with("recovery_middleware.rs"), "{}", record.panic_file);
    assert_eq!(record.panic_line, line);
    assert!(record.panic_function.ends_with("explode"), "{}", record.panic_function);
    assert!(record
        .panic_site
        .as_deref()
        .unwrap()
        .contains(&format!("recovery_middleware.rs:{}", line)));

    let stack = record.stack_trace.as_ref().unwrap();
    assert!(!stack.is_empty());
    assert!(stack
        .iter()
        .all(|f| !f.file.contains("/rustc/") && !f.file.contains("/library/std/")));

    assert!(sink.summaries()[0].starts_with("fault recovered: "));
}

#[tokio::test]
async fn bypassed_route_propagates_fault() {
    let sink = MemorySink::new();
    let app = app(
        RecoveryConfig::default()
            .sink(sink.clone())
            .next(|req| req.uri().path() == "/health"),
    );

    let joined = tokio::spawn(app.oneshot(get_request("/health"))).await;
    assert!(joined.unwrap_err().is_panic());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn stack_trace_can_be_disabled() {
    let sink = MemorySink::new();
    let app = app(RecoveryConfig::default().sink(sink.clone()).enable_stack_trace(false));

    let response = app.oneshot(get_request("/test-panic")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let record = sink.records().remove(0);
    assert!(record.stack_trace.is_none());
    let json = serde_json::to_value(&record).unwrap();
    assert!(json.get("stack_trace").is_none());
    assert!(json.get("time_key").is_none());
    assert!(record.panic_function.ends_with("explode"));
}

#[tokio::test]
async fn include_runtime_widens_stack_only() {
    let filtered_sink = MemorySink::new();
    let full_sink = MemorySink::new();
    let filtered = app(RecoveryConfig::default().sink(filtered_sink.clone()));
    let full = app(RecoveryConfig::default().sink(full_sink.clone()).include_runtime(true));

    filtered.oneshot(get_request("/test-panic")).await.unwrap();
    full.oneshot(get_request("/test-panic")).await.unwrap();

    let filtered = filtered_sink.records().remove(0);
    let full = full_sink.records().remove(0);
    assert_eq!(filtered.panic_function, full.panic_function);
    assert_eq!(filtered.panic_line, full.panic_line);
    assert!(full.stack_trace.unwrap().len() > filtered.stack_trace.unwrap().len());
}

#[tokio::test]
async fn custom_response_and_on_panic() {
    let sink = MemorySink::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_hook = Arc::clone(&seen);
    let app = app(
        RecoveryConfig::default()
            .sink(sink.clone())
            .on_panic(move |meta, diagnosis, value| {
                seen_by_hook.lock().unwrap().push(format!(
                    "{} {} {} {}",
                    meta.method,
                    meta.path,
                    diagnosis.function,
                    value
                ));
            })
            .custom_response(|meta, _, _| {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("degraded: {}", meta.path),
                )
                    .into_response()
            }),
    );

    let response = app.oneshot(get_request("/test-panic")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(response).await, "degraded: /test-panic");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("GET /test-panic "));
    assert!(seen[0].ends_with("explode This is a test!"));
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn faulting_hook_is_not_caught() {
    let sink = MemorySink::new();
    let app = app(
        RecoveryConfig::default()
            .sink(sink.clone())
            .on_panic(|_, _, _| panic!("alerting backend unreachable")),
    );

    let joined = tokio::spawn(app.oneshot(get_request("/test-panic"))).await;
    assert!(joined.unwrap_err().is_panic());
    // The record is emitted before the hook runs.
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn error_payload_is_rendered() {
    let sink = MemorySink::new();
    let app = app(RecoveryConfig::default().sink(sink.clone()));

    let response = app.oneshot(get_request("/error-payload")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let record = sink.records().remove(0);
    assert_eq!(record.panic_value.to_string(), "loading profile: connection reset");
    assert!(record.panic_function.contains("error_payload_handler"));
}

#[tokio::test]
async fn resumed_fault_does_not_inherit_earlier_capture() {
    let sink = MemorySink::new();
    let app = app(RecoveryConfig::default().sink(sink.clone()));

    let response = app.clone().oneshot(get_request("/swallow")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "handled");
    assert!(sink.is_empty());

    // resume_unwind skips the panic hook, so nothing describes this fault.
    let response = app.oneshot(get_request("/resume")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let record = sink.records().remove(0);
    assert_eq!(record.panic_value.to_string(), "resumed from worker");
    assert_eq!(record.panic_file, "");
    assert_eq!(record.panic_line, 0);
    assert_eq!(record.panic_function, "");
    assert!(record.panic_site.is_none());
    assert!(record.stack_trace.unwrap().is_empty());
}

#[tokio::test]
async fn nested_boundary_recovers_first() {
    let inner_sink = MemorySink::new();
    let outer_sink = MemorySink::new();
    let inner = app(RecoveryConfig::default().sink(inner_sink.clone()));
    let outer_recovery = Recovery::new(RecoveryConfig::default().sink(outer_sink.clone())).unwrap();
    let app = Router::new()
        .nest("/api", inner)
        .layer(middleware::from_fn_with_state(outer_recovery, recover));

    let response = app.oneshot(get_request("/api/test-panic")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, FALLBACK_BODY);

    assert!(outer_sink.is_empty());
    let record = inner_sink.records().remove(0);
    assert_eq!(record.url, "/api/test-panic");
    assert_eq!(record.path, "/test-panic");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_faults_are_isolated() {
    let sink = MemorySink::new();
    let app = app(RecoveryConfig::default().sink(sink.clone()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let app = app.clone();
        let uri = if i % 2 == 0 { "/test-panic" } else { "/ok" };
        handles.push(tokio::spawn(async move {
            app.oneshot(get_request(uri)).await.unwrap().status()
        }));
    }

    let mut failures = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::INTERNAL_SERVER_ERROR => failures += 1,
            status => assert_eq!(status, StatusCode::OK),
        }
    }

    assert_eq!(failures, 8);
    let records = sink.records();
    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r.panic_function.ends_with("explode")));
}
