//! Destinations for diagnostic records.

use std::sync::{Arc, Mutex, PoisonError};

use crate::record::DiagnosticRecord;

/// Append-only receiver of recovered faults.
///
/// Called synchronously on the faulting request's task, possibly from many
/// requests at once.
pub trait FaultSink: Send + Sync {
    fn emit(&self, record: &DiagnosticRecord, summary: &str);
}

/// Emits each record as one `tracing` error event on target `fault_recovery`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FaultSink for TracingSink {
    fn emit(&self, record: &DiagnosticRecord, summary: &str) {
        let stack_trace = record
            .stack_trace
            .as_ref()
            .and_then(|stack| serde_json::to_string(stack).ok());

        tracing::error!(
            target: "fault_recovery",
            tag = record.tag,
            severity = record.severity,
            method = %record.method,
            url = %record.url,
            path = %record.path,
            status = record.status,
            remote_addr = %record.remote_addr,
            user_agent = %record.user_agent,
            panic_value = %record.panic_value,
            panic_file = %record.panic_file,
            panic_line = record.panic_line,
            panic_function = %record.panic_function,
            panic_location = %record.panic_location,
            panic_site = record.panic_site.as_deref(),
            time_key = record.time_key.as_deref(),
            stack_trace = stack_trace.as_deref(),
            "{}",
            summary
        );
    }
}

/// Keeps records in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(DiagnosticRecord, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.lock().iter().map(|(record, _)| record.clone()).collect()
    }

    pub fn summaries(&self) -> Vec<String> {
        self.lock().iter().map(|(_, summary)| summary.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(DiagnosticRecord, String)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FaultSink for MemorySink {
    fn emit(&self, record: &DiagnosticRecord, summary: &str) {
        self.lock().push((record.clone(), summary.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryConfig;
    use crate::types::{FaultDiagnosis, FaultValue, RequestMetadata};

    fn record() -> DiagnosticRecord {
        DiagnosticRecord::build(
            &FaultDiagnosis::default(),
            &RequestMetadata::default(),
            &FaultValue::Message("boom".to_string()),
            &RecoveryConfig::default(),
        )
    }

    #[test]
    fn test_memory_sink_shares_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        assert!(handle.is_empty());

        sink.emit(&record(), "fault recovered: :0 in  — boom");

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.records()[0].panic_value, FaultValue::Message("boom".to_string()));
        assert_eq!(handle.summaries()[0], "fault recovered: :0 in  — boom");
    }

    #[test]
    fn test_tracing_sink_without_subscriber() {
        TracingSink.emit(&record(), "fault recovered");
    }
}
