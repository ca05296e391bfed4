//! Errors surfaced while setting up recovery. Faults caught at request time
//! never become errors; they are reported through the sink.

/// A type alias for Result with the error type defaulting to [`RecoveryError`]
pub type Result<T, E = RecoveryError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// Recovery without a reporting destination is refused at construction
    #[error("recovery requires a fault sink, none was configured")]
    MissingSink,

    #[error("Failed to load recovery settings: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
