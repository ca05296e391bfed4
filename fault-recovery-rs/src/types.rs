//! # Fault Data Model
//!
//! Frame descriptors, the per-fault diagnosis, the opaque panic payload and
//! the request snapshot shared by the inspector, the record builder and the
//! interceptor.

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, Request};
use serde::{Deserialize, Serialize, Serializer};

/// Returned by [`panic_location`] when there is no origin to report.
pub const UNKNOWN_LOCATION: &str = "unknown location";

/// One call-stack entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// Source file path, empty when the frame carries no debug info
    pub file: String,
    /// Line number, 0 when unknown
    pub line: u32,
    /// Demangled symbol name without the trailing hash
    pub function: String,
}

impl FrameDescriptor {
    pub fn new<F, N>(file: F, line: u32, function: N) -> Self
    where
        F: Into<String>,
        N: Into<String>,
    {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }
}

/// Reconstructed context of one fault occurrence.
///
/// `stack` is ordered inner to outer, matching unwind order. The origin
/// fields are empty when no frame could be attributed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultDiagnosis {
    pub file: String,
    pub line: u32,
    pub function: String,
    pub stack: Vec<FrameDescriptor>,
    /// `file:line:column` reported by the runtime for the panic itself.
    /// Available even when frames could not be symbolized.
    pub panic_site: Option<String>,
}

impl FaultDiagnosis {
    /// Returns true when an origin frame was attributed
    pub fn has_origin(&self) -> bool {
        !self.file.is_empty() || !self.function.is_empty()
    }

    /// `file:line` of the origin frame
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Formats the origin of a diagnosis as `file:line (function)`.
///
/// Absent diagnoses and diagnoses without an origin frame render as
/// [`UNKNOWN_LOCATION`].
pub fn panic_location(diagnosis: Option<&FaultDiagnosis>) -> String {
    match diagnosis {
        Some(d) if d.has_origin() => format!("{}:{} ({})", d.file, d.line, d.function),
        _ => UNKNOWN_LOCATION.to_string(),
    }
}

/// The value a panic was raised with.
///
/// Payloads are only ever rendered, never re-raised.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultValue {
    /// `panic!` with a message (`&str` or `String` payload)
    Message(String),
    /// An error value passed to `panic_any`, rendered with its cause chain
    Error(String),
    /// A structured JSON payload passed to `panic_any`
    Value(serde_json::Value),
    /// Any other payload type
    Opaque,
}

impl FaultValue {
    /// Classifies the payload handed back by `catch_unwind`
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<&'static str>() {
            Ok(message) => return FaultValue::Message((*message).to_string()),
            Err(other) => other,
        };
        let payload = match payload.downcast::<String>() {
            Ok(message) => return FaultValue::Message(*message),
            Err(other) => other,
        };
        let payload = match payload.downcast::<anyhow::Error>() {
            Ok(err) => return FaultValue::Error(format!("{:#}", err)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Box<dyn std::error::Error + Send + Sync>>() {
            Ok(err) => return FaultValue::Error(error_chain(&**err)),
            Err(other) => other,
        };
        match payload.downcast::<serde_json::Value>() {
            Ok(value) => FaultValue::Value(*value),
            Err(_) => FaultValue::Opaque,
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

impl fmt::Display for FaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultValue::Message(message) => write!(f, "{}", message),
            FaultValue::Error(err) => write!(f, "{}", err),
            FaultValue::Value(value) => write!(f, "{}", value),
            FaultValue::Opaque => write!(f, "Box<dyn Any>"),
        }
    }
}

impl Serialize for FaultValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FaultValue::Value(value) => value.serialize(serializer),
            other => serializer.collect_str(other),
        }
    }
}

/// Request fields captured before the downstream pipeline consumes the request
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub method: String,
    pub path: String,
    /// Raw URL as received, before any router nesting stripped a prefix
    pub url: String,
    /// Client IP, empty when the server was started without connect info
    pub remote_addr: String,
    pub user_agent: String,
    pub headers: HeaderMap,
}

impl RequestMetadata {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let url = req
            .extensions()
            .get::<OriginalUri>()
            .map(|original| original.0.to_string())
            .unwrap_or_else(|| req.uri().to_string());

        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_default();

        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            url,
            remote_addr,
            user_agent,
            headers: req.headers().clone(),
        }
    }

    /// Header lookup by name; non-UTF-8 values read as absent
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
