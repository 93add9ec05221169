//! Span signal: item type, writer trait, and the per-signal processor entry
//! point.

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

/// Relationship of a span to its parent and remote peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Span completion status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error {
        description: Option<String>,
    },
}

/// A timestamped event attached to a span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: SystemTime,
    pub attributes: Attributes,
}

impl SpanEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes: Vec::new(),
        }
    }
}

/// A causal link from a span to a span in another trace.
#[derive(Debug, Clone, Serialize)]
pub struct SpanLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_state: Option<String>,
    pub trace_flags: TraceFlags,
    pub attributes: Attributes,
}

impl SpanLink {
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            trace_state: None,
            trace_flags: TraceFlags::NONE,
            attributes: Vec::new(),
        }
    }
}

/// An immutable snapshot of a completed (ended) span.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub scope: Arc<InstrumentationScope>,
    pub name: String,
    pub kind: Option<SpanKind>,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// [`SpanId::INVALID`] for root spans.
    pub parent_span_id: SpanId,
    pub trace_state: Option<String>,
    pub trace_flags: TraceFlags,
    pub start_timestamp: SystemTime,
    pub end_timestamp: SystemTime,
    pub status: SpanStatus,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
}

impl Span {
    /// A zero-duration span stamped now; callers fill in timing and payload.
    pub fn new(
        scope: Arc<InstrumentationScope>,
        name: impl Into<String>,
        trace_id: TraceId,
        span_id: SpanId,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            scope,
            name: name.into(),
            kind: None,
            trace_id,
            span_id,
            parent_span_id: SpanId::INVALID,
            trace_state: None,
            trace_flags: TraceFlags::NONE,
            start_timestamp: now,
            end_timestamp: now,
            status: SpanStatus::Unset,
            attributes: Vec::new(),
            events: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl TelemetryItem for Span {
    fn scope(&self) -> &Arc<InstrumentationScope> {
        &self.scope
    }
}

/// [`BatchWriter`] extended with the span callback.
pub trait SpanBatchWriter: BatchWriter {
    fn write_span(&mut self, _span: &Span) {}
}

/// Batch export processor accepting ended spans.
pub struct SpanBatchExportProcessor {
    inner: BatchExportProcessor<Span>,
}

impl SpanBatchExportProcessor {
    pub fn new<E>(
        resource: Arc<Resource>,
        exporter: E,
        options: BatchExportOptions,
    ) -> Result<Self, BuildError>
    where
        E: Exporter<Span> + 'static,
    {
        Ok(Self {
            inner: BatchExportProcessor::new(resource, exporter, options)?,
        })
    }

    /// Fire-and-forget: never blocks, may drop under overload.
    pub fn process_ended_span(&self, span: Span) {
        self.inner.process_item(span);
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

/// Drives a [`ScopeGroupedBatch`] of spans through a [`SpanBatchWriter`].
pub fn write_span_batch<W: SpanBatchWriter>(
    batch: &ScopeGroupedBatch<Span>,
    writer: &mut W,
    cancel: &crate::cancel::CancelToken,
) -> bool {
    batch.write_to(writer, |writer, span| writer.write_span(span), cancel)
}
