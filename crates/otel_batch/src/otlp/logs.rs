use super::common::{to_any_value, to_key_values, to_proto_resource, to_proto_scope, to_unix_nanos};
use super::http::OtlpHttpClient;
use super::OtlpExporterOptions;
use crate::batch::ScopeGroupedBatch;
use crate::cancel::CancelToken;
use crate::exporter::Exporter;
use crate::logs::{write_log_batch, LogRecord, LogRecordBatchWriter};
use crate::resource::{AttributeValue, Resource};
use crate::scope::InstrumentationScope;
use crate::writer::BatchWriter;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::logs::v1::{LogRecord as ProtoLogRecord, ResourceLogs, ScopeLogs};
use prost::Message;

/// Builds an `ExportLogsServiceRequest` from batch traversal callbacks.
///
/// Reusable across export cycles: [`reset`](OtlpLogRecordWriter::reset) clears
/// the request after each attempt. Scope blocks are deduplicated by name
/// within the current resource group.
#[derive(Default)]
pub struct OtlpLogRecordWriter {
    request: ExportLogsServiceRequest,
    resource_logs: Option<ResourceLogs>,
    scope_logs: Option<ScopeLogs>,
}

impl OtlpLogRecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request built by the last traversal.
    pub fn request(&self) -> &ExportLogsServiceRequest {
        &self.request
    }

    pub fn reset(&mut self) {
        self.request = ExportLogsServiceRequest::default();
        self.resource_logs = None;
        self.scope_logs = None;
    }
}

impl BatchWriter for OtlpLogRecordWriter {
    fn begin_batch(&mut self, resource: &Resource) {
        debug_assert!(self.resource_logs.is_none());

        self.resource_logs = Some(ResourceLogs {
            resource: Some(to_proto_resource(resource)),
            ..Default::default()
        });
    }

    fn end_batch(&mut self) {
        debug_assert!(self.resource_logs.is_some());

        if let Some(resource_logs) = self.resource_logs.take() {
            self.request.resource_logs.push(resource_logs);
        }
    }

    fn begin_instrumentation_scope(&mut self, scope: &InstrumentationScope) {
        debug_assert!(self.resource_logs.is_some() && self.scope_logs.is_none());

        let Some(resource_logs) = self.resource_logs.as_mut() else {
            return;
        };

        let existing = resource_logs
            .scope_logs
            .iter()
            .position(|s| s.scope.as_ref().is_some_and(|sc| sc.name == scope.name()));

        self.scope_logs = Some(match existing {
            Some(index) => resource_logs.scope_logs.remove(index),
            None => ScopeLogs {
                scope: Some(to_proto_scope(scope)),
                ..Default::default()
            },
        });
    }

    fn end_instrumentation_scope(&mut self) {
        debug_assert!(self.scope_logs.is_some());

        if let (Some(resource_logs), Some(scope_logs)) =
            (self.resource_logs.as_mut(), self.scope_logs.take())
        {
            resource_logs.scope_logs.push(scope_logs);
        }
    }
}

impl LogRecordBatchWriter for OtlpLogRecordWriter {
    fn write_log_record(&mut self, record: &LogRecord) {
        let Some(scope_logs) = self.scope_logs.as_mut() else {
            return;
        };

        let mut proto = ProtoLogRecord {
            time_unix_nano: to_unix_nanos(record.timestamp),
            severity_number: record.severity as i32,
            attributes: to_key_values(&record.attributes),
            ..Default::default()
        };

        if let Some(body) = &record.body {
            proto.body = Some(to_any_value(&AttributeValue::Str(body.clone())));
        }

        if let Some(severity_text) = &record.severity_text {
            proto.severity_text = severity_text.clone();
        }

        // Correlation is only meaningful when both ids are present.
        if record.trace_id.is_valid() && record.span_id.is_valid() {
            proto.trace_id = record.trace_id.to_vec();
            proto.span_id = record.span_id.to_vec();
            proto.flags = u32::from(record.trace_flags.0);
        }

        scope_logs.log_records.push(proto);
    }
}

/// Exports log batches as OTLP over HTTP.
pub struct OtlpLogRecordExporter {
    http: OtlpHttpClient,
    writer: OtlpLogRecordWriter,
}

impl OtlpLogRecordExporter {
    pub fn new(options: OtlpExporterOptions) -> Self {
        Self {
            http: OtlpHttpClient::new(options),
            writer: OtlpLogRecordWriter::new(),
        }
    }
}

impl Exporter<LogRecord> for OtlpLogRecordExporter {
    fn export(&mut self, batch: &ScopeGroupedBatch<LogRecord>, cancel: &CancelToken) -> bool {
        let complete = write_log_batch(batch, &mut self.writer, cancel);
        if !complete {
            self.writer.reset();
            return false;
        }

        let body = self.writer.request().encode_to_vec();
        self.writer.reset();

        self.http.send(body, cancel)
    }

    fn name(&self) -> &'static str {
        "otlp_http_logs"
    }
}
