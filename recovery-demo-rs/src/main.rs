// recovery-demo-rs/src/main.rs
// Demo HTTP service with panic recovery in front of every route
// Port 3000 by default, override with RECOVERY_DEMO_ADDR
//
// Routes:
// - GET /health            bypasses recovery
// - GET /test-panic        panics with a message
// - GET /test-error-panic  panics with an anyhow::Error payload
// - GET /test-unwrap       unwraps a None

use std::env;
use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use fault_recovery::{
    init_logging, recover, rfc3339_time_key, LoggingConfig, Recovery, RecoveryConfig,
    RecoverySettings, TracingSink,
};

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    init_logging(Some(LoggingConfig {
        service_name: "recovery-demo".to_string(),
        ..LoggingConfig::default()
    }))?;

    let settings_path = env::var("RECOVERY_SETTINGS_FILE").ok();
    let settings = RecoverySettings::load(settings_path.as_deref())?;

    let recovery = Recovery::new(
        RecoveryConfig::from_settings(&settings)
            .sink(TracingSink)
            .time_key(rfc3339_time_key)
            .next(|req| req.uri().path() == "/health")
            .on_panic(|meta, _, _| {
                tracing::warn!(path = %meta.path, "Request faulted, fallback response sent");
            }),
    )?;

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/test-panic", get(test_panic_handler))
        .route("/test-error-panic", get(test_error_panic_handler))
        .route("/test-unwrap", get(test_unwrap_handler))
        .layer(middleware::from_fn_with_state(recovery, recover));

    let addr: SocketAddr = env::var("RECOVERY_DEMO_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Recovery demo listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "recovery-demo",
        "endpoints": [
            "GET /health",
            "GET /test-panic",
            "GET /test-error-panic",
            "GET /test-unwrap"
        ]
    }))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "healthy": true })))
}

async fn test_panic_handler() -> &'static str {
    panic!("This is a test!");
}

async fn test_error_panic_handler() -> &'static str {
    let err = anyhow::anyhow!("upstream returned 502").context("refreshing exchange rates");
    std::panic::panic_any(err);
}

async fn test_unwrap_handler() -> String {
    let missing: Option<String> = None;
    missing.unwrap()
}
