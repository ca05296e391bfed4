//! # Diagnostic Records
//!
//! The structured event emitted for every recovered fault.

use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::types::{FaultDiagnosis, FaultValue, FrameDescriptor, RequestMetadata};

pub const RECORD_TAG: &str = "panic";
pub const RECORD_SEVERITY: &str = "error";
/// Status reported in the record. Custom responses may send another one.
pub const RECORD_STATUS: u16 = 500;

/// One recovered fault, ready for a [`crate::FaultSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    pub tag: &'static str,
    pub severity: &'static str,
    pub method: String,
    pub url: String,
    pub path: String,
    pub status: u16,
    pub remote_addr: String,
    pub user_agent: String,
    pub panic_value: FaultValue,
    pub panic_file: String,
    pub panic_line: u32,
    pub panic_function: String,
    /// `file:line` of the origin frame
    pub panic_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panic_site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_key: Option<String>,
    /// Absent, not empty, when stack traces are disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<FrameDescriptor>>,
}

impl DiagnosticRecord {
    /// Composes a record. The time-key provider, when configured, is the
    /// only thing invoked and is called exactly once.
    pub fn build(
        diagnosis: &FaultDiagnosis,
        meta: &RequestMetadata,
        value: &FaultValue,
        config: &RecoveryConfig,
    ) -> Self {
        Self {
            tag: RECORD_TAG,
            severity: RECORD_SEVERITY,
            method: meta.method.clone(),
            url: meta.url.clone(),
            path: meta.path.clone(),
            status: RECORD_STATUS,
            remote_addr: meta.remote_addr.clone(),
            user_agent: meta.user_agent.clone(),
            panic_value: value.clone(),
            panic_file: diagnosis.file.clone(),
            panic_line: diagnosis.line,
            panic_function: diagnosis.function.clone(),
            panic_location: diagnosis.location(),
            panic_site: diagnosis.panic_site.clone(),
            time_key: config.time_key.as_ref().map(|provider| provider()),
            stack_trace: config
                .enable_stack_trace
                .then(|| diagnosis.stack.clone()),
        }
    }

    /// Human-readable line logged alongside the structured fields
    pub fn summary(&self) -> String {
        format!(
            "fault recovered: {} in {} — {}",
            self.panic_location, self.panic_function, self.panic_value
        )
    }
}
