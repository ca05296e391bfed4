//! # Recovery Interceptor
//!
//! axum middleware that contains a panic raised while the rest of the
//! pipeline handles one request. The request ends with a fallback response
//! and a diagnostic record; the worker thread and the process carry on.
//!
//! ```no_run
//! use axum::{middleware, routing::get, Router};
//! use fault_recovery::{recover, Recovery, RecoveryConfig, TracingSink};
//!
//! let recovery = Recovery::new(RecoveryConfig::default().sink(TracingSink)).unwrap();
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "ok" }))
//!     .layer(middleware::from_fn_with_state(recovery, recover));
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::poll_fn;
use futures::FutureExt;
use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::error::{RecoveryError, Result};
use crate::hook;
use crate::inspector;
use crate::record::DiagnosticRecord;
use crate::sink::FaultSink;
use crate::types::{FaultValue, RequestMetadata};

pub const FALLBACK_ERROR: &str = "Internal Server Error";
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Serialize)]
struct FallbackBody {
    error: &'static str,
    message: &'static str,
}

/// The fixed answer to a recovered fault when no custom response is set
pub fn fallback_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(FallbackBody {
            error: FALLBACK_ERROR,
            message: FALLBACK_MESSAGE,
        }),
    )
        .into_response()
}

/// Validated, immutable recovery state shared by every request
#[derive(Clone)]
pub struct Recovery {
    config: Arc<RecoveryConfig>,
    sink: Arc<dyn FaultSink>,
}

impl std::fmt::Debug for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovery").field("config", &self.config).finish()
    }
}

impl Recovery {
    /// Validates the configuration and installs the panic capture hook.
    ///
    /// Fails with [`RecoveryError::MissingSink`] when no sink is configured.
    pub fn new(config: RecoveryConfig) -> Result<Self> {
        let sink = config.sink.clone().ok_or(RecoveryError::MissingSink)?;
        hook::install();

        tracing::info!(
            skip_frames = config.skip_frames,
            include_runtime = config.include_runtime,
            enable_stack_trace = config.enable_stack_trace,
            bypass = config.next.is_some(),
            "Panic recovery enabled"
        );

        Ok(Self {
            config: Arc::new(config),
            sink,
        })
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Runs the rest of the pipeline for one request inside a recovery boundary
    pub async fn handle(&self, req: Request, next: Next) -> Response {
        if let Some(bypass) = &self.config.next {
            if bypass(&req) {
                return next.run(req).await;
            }
        }

        let meta = RequestMetadata::from_request(&req);
        let skip = self.config.skip_frames;
        let mut downstream = Box::pin(next.run(req));
        let guarded = poll_fn(move |cx| {
            let _armed = hook::arm(skip);
            downstream.as_mut().poll(cx)
        });

        match AssertUnwindSafe(guarded).catch_unwind().await {
            Ok(response) => {
                hook::discard_captured();
                response
            }
            Err(payload) => self.recover_from(meta, payload),
        }
    }

    fn recover_from(&self, meta: RequestMetadata, payload: Box<dyn Any + Send>) -> Response {
        let value = FaultValue::from_panic(payload);
        let captured = hook::take_captured().unwrap_or_default();
        let mut diagnosis =
            inspector::diagnose(captured.frames, self.config.include_runtime, &self.config.patterns);
        diagnosis.panic_site = captured.site;

        let record = DiagnosticRecord::build(&diagnosis, &meta, &value, &self.config);
        self.sink.emit(&record, &record.summary());

        if let Some(on_panic) = &self.config.on_panic {
            on_panic(&meta, &diagnosis, &value);
        }

        match &self.config.custom_response {
            Some(respond) => respond(&meta, &diagnosis, &value),
            None => fallback_response(),
        }
    }
}

/// Middleware function for `axum::middleware::from_fn_with_state`
pub async fn recover(State(recovery): State<Recovery>, req: Request, next: Next) -> Response {
    recovery.handle(req, next).await
}
