use crate::resource::Resource;
use crate::scope::InstrumentationScope;

/// Visitor interface a wire encoder implements to receive batch traversal
/// callbacks: one `begin_batch`/`end_batch` pair per export cycle, one
/// `begin_instrumentation_scope`/`end_instrumentation_scope` pair per
/// non-empty scope bucket, with the signal-specific `write_*` calls (see
/// [`logs::LogRecordBatchWriter`](crate::logs::LogRecordBatchWriter),
/// [`trace::SpanBatchWriter`](crate::trace::SpanBatchWriter) and
/// [`metrics::MetricWriter`](crate::metrics::MetricWriter)) in between.
///
/// Every method defaults to a no-op so a writer only overrides what it needs.
pub trait BatchWriter {
    fn begin_batch(&mut self, _resource: &Resource) {}

    fn end_batch(&mut self) {}

    fn begin_instrumentation_scope(&mut self, _scope: &InstrumentationScope) {}

    fn end_instrumentation_scope(&mut self) {}
}

/// Writer that ignores every callback. Useful as the traversal driver when an
/// exporter consumes items directly from the per-item callback.
#[derive(Debug, Default)]
pub struct NoopBatchWriter;

impl BatchWriter for NoopBatchWriter {}
