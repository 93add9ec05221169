//! OTLP wire encoding and transport: one conforming [`BatchWriter`] per
//! signal building protobuf export requests, transmitted over HTTP POST.
//!
//! Batches are grouped resource -> instrumentation scope -> records, matching
//! the standard collector export model. A non-2xx response or transport error
//! is an export failure; the batch is discarded, never retried.
//!
//! [`BatchWriter`]: crate::writer::BatchWriter

mod common;
mod http;
mod logs;
mod metrics;
mod trace;

pub use http::OtlpExporterOptions;
pub use logs::{OtlpLogRecordExporter, OtlpLogRecordWriter};
pub use metrics::{OtlpMetricExporter, OtlpMetricWriter};
pub use trace::{OtlpSpanExporter, OtlpSpanWriter};
