//! Telemetry Batch Export Engine
//!
//! The buffering and export core of a telemetry pipeline: completed telemetry
//! items (log records, spans, metric snapshots) produced on arbitrary threads
//! are accepted into a bounded in-memory queue, grouped into per-scope batches,
//! and periodically handed to a pluggable exporter that encodes them onto a
//! wire protocol (OTLP over protobuf over HTTP out of the box).
//!
//! Everything is best-effort and in-memory: the queue drops items when full,
//! failed exports are logged and discarded (no retry), and nothing ever blocks
//! or panics a producer thread.
//!
//! # Architecture
//!
//! - [`BatchExportProcessor`] owns a [`ringqueue::RingQueue`] and a dedicated
//!   background thread that drains it into a [`ScopeGroupedBatch`] and invokes
//!   an [`Exporter`] on a timer, a size threshold, an explicit flush, or
//!   shutdown. One thread per processor, deliberately.
//! - [`PeriodicMetricReader`] reuses the same scheduling skeleton but *pulls*
//!   current state from registered [`MetricProducer`]s on each tick instead of
//!   draining a queue.
//! - Wire encoders implement the [`BatchWriter`] visitor traits, so batch
//!   traversal order is owned by the engine and encoding by the exporter.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use otel_batch::logs::{LogRecord, LogRecordBatchExportProcessor, Severity};
//! use otel_batch::otlp::{OtlpExporterOptions, OtlpLogRecordExporter};
//! use otel_batch::{BatchExportOptions, InstrumentationScope, Resource};
//!
//! let resource = Arc::new(Resource::new([
//!     ("service.name".to_string(), "checkout".into()),
//! ]));
//! let exporter = OtlpLogRecordExporter::new(OtlpExporterOptions::new(
//!     "http://localhost:4318/v1/logs",
//! ));
//! let processor = LogRecordBatchExportProcessor::new(
//!     resource,
//!     exporter,
//!     BatchExportOptions::default(),
//! )
//! .unwrap();
//!
//! let scope = Arc::new(InstrumentationScope::new("checkout.payments"));
//! let mut record = LogRecord::new(Arc::clone(&scope));
//! record.severity = Severity::Info;
//! record.body = Some("payment accepted".to_string());
//! processor.process_emitted_log_record(record);
//!
//! processor.shutdown(Duration::from_secs(5)).unwrap();
//! ```

pub mod batch;
pub mod cancel;
pub mod exporter;
pub mod ids;
pub mod logs;
pub mod metrics;
pub mod otlp;
pub mod processor;
pub mod resource;
pub mod scope;
pub mod trace;
pub mod writer;

// Re-export main types
pub use batch::{ScopeGroupedBatch, TelemetryItem};
pub use cancel::CancelToken;
pub use exporter::{Exporter, InMemoryExporter, JsonLinesExporter, NoopExporter};
pub use ids::{SpanId, TraceFlags, TraceId};
pub use metrics::{MetricExporter, MetricProducer, PeriodicMetricReader};
pub use processor::{
    BatchExportOptions, BatchExportProcessor, BuildError, FlushError, OptionsError, ShutdownError,
};
pub use resource::{AttributeValue, Resource};
pub use scope::InstrumentationScope;
pub use writer::BatchWriter;
