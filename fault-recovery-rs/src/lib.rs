//! # Fault Recovery
//!
//! Panic recovery middleware for axum services. A panic raised while one
//! request is being handled is contained to that request: the faulting
//! frame is located in a filtered stack walk, a structured diagnostic record
//! goes to a [`FaultSink`], optional hooks run and the client receives a
//! fallback response instead of a dropped connection.
//!
//! ## Features
//!
//! - Stack inspection that separates application frames from the standard
//!   library, the async runtime and the web framework
//! - Structured diagnostic records with request metadata and an optional
//!   caller-supplied time key
//! - Per-route bypass, custom responses and panic callbacks
//! - Settings layered from defaults, config files and `RECOVERY_*` variables
//!

pub mod config;
pub mod error;
mod hook;
pub mod inspector;
pub mod logging;
pub mod middleware;
pub mod record;
pub mod sink;
pub mod types;

// Re-export commonly used types
pub use crate::config::{rfc3339_time_key, RecoveryConfig, RecoverySettings};
pub use error::{RecoveryError, Result};
pub use inspector::{capture_frames, FramePatterns, MAX_FRAMES};
pub use logging::{init_logging, LoggingConfig};
pub use middleware::{fallback_response, recover, Recovery};
pub use record::DiagnosticRecord;
pub use sink::{FaultSink, MemorySink, TracingSink};
pub use types::{panic_location, FaultDiagnosis, FaultValue, FrameDescriptor, RequestMetadata};
