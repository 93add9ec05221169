//! Log record signal: item type, writer trait, and the per-signal processor
//! entry point.

use crate::batch::{ScopeGroupedBatch, TelemetryItem};
use crate::exporter::Exporter;
use crate::ids::{SpanId, TraceFlags, TraceId};
use crate::processor::{
    BatchExportOptions, BatchExportProcessor, BuildError, FlushError, ShutdownError,
};
use crate::resource::{Attributes, Resource};
use crate::scope::InstrumentationScope;
use crate::writer::BatchWriter;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Log severity, carrying the wire protocol's severity-number values
/// (4 levels of granularity per named severity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[repr(i32)]
pub enum Severity {
    #[default]
    Unspecified = 0,
    Trace = 1,
    Trace2 = 2,
    Trace3 = 3,
    Trace4 = 4,
    Debug = 5,
    Debug2 = 6,
    Debug3 = 7,
    Debug4 = 8,
    Info = 9,
    Info2 = 10,
    Info3 = 11,
    Info4 = 12,
    Warn = 13,
    Warn2 = 14,
    Warn3 = 15,
    Warn4 = 16,
    Error = 17,
    Error2 = 18,
    Error3 = 19,
    Error4 = 20,
    Fatal = 21,
    Fatal2 = 22,
    Fatal3 = 23,
    Fatal4 = 24,
}

/// An immutable snapshot of a completed log observation.
///
/// Created once by producer-side capture code, exclusively owned by the
/// queue/batch after [`process_emitted_log_record`] accepts it, and freed when
/// the owning batch resets.
///
/// [`process_emitted_log_record`]: LogRecordBatchExportProcessor::process_emitted_log_record
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub scope: Arc<InstrumentationScope>,
    pub timestamp: SystemTime,
    pub severity: Severity,
    pub severity_text: Option<String>,
    pub body: Option<String>,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_flags: TraceFlags,
    pub attributes: Attributes,
}

impl LogRecord {
    /// A record stamped now, with everything else unset.
    pub fn new(scope: Arc<InstrumentationScope>) -> Self {
        Self {
            scope,
            timestamp: SystemTime::now(),
            severity: Severity::Unspecified,
            severity_text: None,
            body: None,
            trace_id: TraceId::INVALID,
            span_id: SpanId::INVALID,
            trace_flags: TraceFlags::NONE,
            attributes: Vec::new(),
        }
    }
}

impl TelemetryItem for LogRecord {
    fn scope(&self) -> &Arc<InstrumentationScope> {
        &self.scope
    }
}

/// [`BatchWriter`] extended with the log-record callback. Default no-op, so a
/// writer that only cares about batch/scope boundaries needs nothing extra.
pub trait LogRecordBatchWriter: BatchWriter {
    fn write_log_record(&mut self, _record: &LogRecord) {}
}

/// Batch export processor accepting emitted log records.
pub struct LogRecordBatchExportProcessor {
    inner: BatchExportProcessor<LogRecord>,
}

impl LogRecordBatchExportProcessor {
    pub fn new<E>(
        resource: Arc<Resource>,
        exporter: E,
        options: BatchExportOptions,
    ) -> Result<Self, BuildError>
    where
        E: Exporter<LogRecord> + 'static,
    {
        Ok(Self {
            inner: BatchExportProcessor::new(resource, exporter, options)?,
        })
    }

    /// Fire-and-forget: never blocks, may drop under overload.
    pub fn process_emitted_log_record(&self, record: LogRecord) {
        self.inner.process_item(record);
    }

    pub fn flush(&self, timeout: Duration) -> Result<(), FlushError> {
        self.inner.flush(timeout)
    }

    pub fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        self.inner.shutdown(timeout)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped_count()
    }
}

/// Convenience for exporters: drives a [`ScopeGroupedBatch`] of log records
/// through a [`LogRecordBatchWriter`].
pub fn write_log_batch<W: LogRecordBatchWriter>(
    batch: &ScopeGroupedBatch<LogRecord>,
    writer: &mut W,
    cancel: &crate::cancel::CancelToken,
) -> bool {
    batch.write_to(writer, |writer, record| writer.write_log_record(record), cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults() {
        let scope = Arc::new(InstrumentationScope::new("test"));
        let record = LogRecord::new(scope);
        assert_eq!(record.severity, Severity::Unspecified);
        assert!(record.body.is_none());
        assert!(!record.trace_id.is_valid());
    }

    #[test]
    fn severity_values_match_wire_numbers() {
        assert_eq!(Severity::Unspecified as i32, 0);
        assert_eq!(Severity::Trace as i32, 1);
        assert_eq!(Severity::Info as i32, 9);
        assert_eq!(Severity::Fatal4 as i32, 24);
    }
}
