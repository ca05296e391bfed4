//! # Structured Logging
//!
//! Subscriber setup for services that report recovered faults through
//! [`crate::TracingSink`].

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::error::{RecoveryError, Result};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name for identification
    pub service_name: String,
    /// Whether to use JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "unknown-service".to_string(),
            json_format: true,
        }
    }
}

/// Initializes the structured logging system.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this
/// again after a successful initialization is a no-op.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", config.level)));

    let subscriber = Registry::default().with(filter);

    // JSON and text layers have distinct types, so each branch installs its own.
    let installed = if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true);
        tracing::subscriber::set_global_default(subscriber.with(json_layer))
    } else {
        let text_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true);
        tracing::subscriber::set_global_default(subscriber.with(text_layer))
    };
    installed.map_err(|e| RecoveryError::Logging(format!("Failed to set global subscriber: {}", e)))?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig {
            service_name: "recovery-tests".to_string(),
            json_format: false,
            ..LoggingConfig::default()
        };
        init_logging(Some(config.clone())).unwrap();
        init_logging(Some(config)).unwrap();
        assert!(LOGGING_INITIALIZED.load(Ordering::SeqCst));
    }
}
