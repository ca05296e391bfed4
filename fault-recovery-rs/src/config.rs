//! # Recovery Configuration
//!
//! [`RecoverySettings`] holds the plain values that can come from files and
//! the environment. [`RecoveryConfig`] adds the injected strategies (bypass
//! predicate, sink, time-key provider, response override, panic callback)
//! and is consumed once when the interceptor is built.

use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::inspector::{FramePatterns, DEFAULT_SKIP_FRAMES};
use crate::sink::FaultSink;
use crate::types::{FaultDiagnosis, FaultValue, RequestMetadata};

/// Returns true to let a request bypass recovery entirely
pub type NextFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;
/// Produces the opaque `time_key` label, called once per fault
pub type TimeKeyFn = Arc<dyn Fn() -> String + Send + Sync>;
/// Writes the response for a recovered fault in place of the fallback
pub type CustomResponseFn =
    Arc<dyn Fn(&RequestMetadata, &FaultDiagnosis, &FaultValue) -> Response + Send + Sync>;
/// Side-effect callback run after the record is emitted
pub type OnPanicFn = Arc<dyn Fn(&RequestMetadata, &FaultDiagnosis, &FaultValue) + Send + Sync>;

/// Environment variable prefix read by [`RecoverySettings::load`]
pub const ENV_PREFIX: &str = "RECOVERY";

/// File- and environment-sourced settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Innermost frames dropped before the walk starts collecting
    pub skip_frames: usize,
    /// Keep runtime and framework frames in the reported stack
    pub include_runtime: bool,
    /// Attach the filtered stack to every record
    pub enable_stack_trace: bool,
    /// Replaces the default runtime patterns when set
    pub runtime_patterns: Option<Vec<String>>,
    /// Replaces the default framework patterns when set
    pub framework_patterns: Option<Vec<String>>,
}

impl RecoverySettings {
    pub const DEFAULT: RecoverySettings = RecoverySettings {
        skip_frames: DEFAULT_SKIP_FRAMES,
        include_runtime: false,
        enable_stack_trace: true,
        runtime_patterns: None,
        framework_patterns: None,
    };

    /// Loads settings from defaults, an optional file and `RECOVERY_*` variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize::<RecoverySettings>()?;

        tracing::debug!(
            skip_frames = settings.skip_frames,
            include_runtime = settings.include_runtime,
            enable_stack_trace = settings.enable_stack_trace,
            "Recovery settings loaded"
        );
        Ok(settings)
    }

    /// Frame patterns with the overrides applied
    pub fn patterns(&self) -> FramePatterns {
        FramePatterns {
            runtime: self
                .runtime_patterns
                .clone()
                .unwrap_or_else(FramePatterns::default_runtime),
            framework: self
                .framework_patterns
                .clone()
                .unwrap_or_else(FramePatterns::default_framework),
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Construction-time configuration for [`crate::Recovery`]
#[derive(Clone)]
pub struct RecoveryConfig {
    pub(crate) next: Option<NextFn>,
    pub(crate) sink: Option<Arc<dyn FaultSink>>,
    pub(crate) time_key: Option<TimeKeyFn>,
    pub(crate) skip_frames: usize,
    pub(crate) include_runtime: bool,
    pub(crate) enable_stack_trace: bool,
    pub(crate) patterns: FramePatterns,
    pub(crate) custom_response: Option<CustomResponseFn>,
    pub(crate) on_panic: Option<OnPanicFn>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::from_settings(&RecoverySettings::DEFAULT)
    }
}

impl RecoveryConfig {
    /// Starts from the given settings with no strategies set
    pub fn from_settings(settings: &RecoverySettings) -> Self {
        Self {
            next: None,
            sink: None,
            time_key: None,
            skip_frames: settings.skip_frames,
            include_runtime: settings.include_runtime,
            enable_stack_trace: settings.enable_stack_trace,
            patterns: settings.patterns(),
            custom_response: None,
            on_panic: None,
        }
    }

    /// Overwrites the plain values, keeping any strategies already set
    pub fn with_settings(mut self, settings: &RecoverySettings) -> Self {
        self.skip_frames = settings.skip_frames;
        self.include_runtime = settings.include_runtime;
        self.enable_stack_trace = settings.enable_stack_trace;
        self.patterns = settings.patterns();
        self
    }

    /// Sets the bypass predicate
    pub fn next<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.next = Some(Arc::new(predicate));
        self
    }

    /// Sets the sink recovered faults are reported to
    pub fn sink<S: FaultSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets a sink that is shared with other owners
    pub fn shared_sink(mut self, sink: Arc<dyn FaultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn time_key<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.time_key = Some(Arc::new(provider));
        self
    }

    pub fn skip_frames(mut self, skip: usize) -> Self {
        self.skip_frames = skip;
        self
    }

    pub fn include_runtime(mut self, include: bool) -> Self {
        self.include_runtime = include;
        self
    }

    pub fn enable_stack_trace(mut self, enable: bool) -> Self {
        self.enable_stack_trace = enable;
        self
    }

    pub fn frame_patterns(mut self, patterns: FramePatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Replaces the fixed 500 response. Panics inside are not caught.
    pub fn custom_response<F>(mut self, respond: F) -> Self
    where
        F: Fn(&RequestMetadata, &FaultDiagnosis, &FaultValue) -> Response + Send + Sync + 'static,
    {
        self.custom_response = Some(Arc::new(respond));
        self
    }

    /// Runs after the record is emitted. Panics inside are not caught.
    pub fn on_panic<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestMetadata, &FaultDiagnosis, &FaultValue) + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for RecoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryConfig")
            .field("next", &self.next.is_some())
            .field("sink", &self.sink.is_some())
            .field("time_key", &self.time_key.is_some())
            .field("skip_frames", &self.skip_frames)
            .field("include_runtime", &self.include_runtime)
            .field("enable_stack_trace", &self.enable_stack_trace)
            .field("patterns", &self.patterns)
            .field("custom_response", &self.custom_response.is_some())
            .field("on_panic", &self.on_panic.is_some())
            .finish()
    }
}

/// Time-key provider stamping the fault with the current UTC time
pub fn rfc3339_time_key() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
