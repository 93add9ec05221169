use super::common::{to_key_values, to_proto_resource, to_proto_scope, to_unix_nanos};
use super::http::OtlpHttpClient;
use super::OtlpExporterOptions;
use crate::batch::ScopeGroupedBatch;
use crate::cancel::CancelToken;
use crate::exporter::Exporter;
use crate::resource::Resource;
use crate::scope::InstrumentationScope;
use crate::trace::{write_span_batch, Span, SpanBatchWriter, SpanKind, SpanStatus};
use crate::writer::BatchWriter;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::span::{Event as ProtoEvent, Link as ProtoLink};
use opentelemetry_proto::tonic::trace::v1::{
    span as proto_span, status, ResourceSpans, ScopeSpans, Span as ProtoSpan, Status,
};
use prost::Message;

/// Builds an `ExportTraceServiceRequest` from batch traversal callbacks.
/// Reusable across export cycles via [`reset`](OtlpSpanWriter::reset).
#[derive(Default)]
pub struct OtlpSpanWriter {
    request: ExportTraceServiceRequest,
    resource_spans: Option<ResourceSpans>,
    scope_spans: Option<ScopeSpans>,
}

impl OtlpSpanWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request built by the last traversal.
    pub fn request(&self) -> &ExportTraceServiceRequest {
        &self.request
    }

    pub fn reset(&mut self) {
        self.request = ExportTraceServiceRequest::default();
        self.resource_spans = None;
        self.scope_spans = None;
    }
}

impl BatchWriter for OtlpSpanWriter {
    fn begin_batch(&mut self, resource: &Resource) {
        debug_assert!(self.resource_spans.is_none());

        self.resource_spans = Some(ResourceSpans {
            resource: Some(to_proto_resource(resource)),
            ..Default::default()
        });
    }

    fn end_batch(&mut self) {
        debug_assert!(self.resource_spans.is_some());

        if let Some(resource_spans) = self.resource_spans.take() {
            self.request.resource_spans.push(resource_spans);
        }
    }

    fn begin_instrumentation_scope(&mut self, scope: &InstrumentationScope) {
        debug_assert!(self.resource_spans.is_some() && self.scope_spans.is_none());

        let Some(resource_spans) = self.resource_spans.as_mut() else {
            return;
        };

        let existing = resource_spans
            .scope_spans
            .iter()
            .position(|s| s.scope.as_ref().is_some_and(|sc| sc.name == scope.name()));

        self.scope_spans = Some(match existing {
            Some(index) => resource_spans.scope_spans.remove(index),
            None => ScopeSpans {
                scope: Some(to_proto_scope(scope)),
                ..Default::default()
            },
        });
    }

    fn end_instrumentation_scope(&mut self) {
        debug_assert!(self.scope_spans.is_some());

        if let (Some(resource_spans), Some(scope_spans)) =
            (self.resource_spans.as_mut(), self.scope_spans.take())
        {
            resource_spans.scope_spans.push(scope_spans);
        }
    }
}

impl SpanBatchWriter for OtlpSpanWriter {
    fn write_span(&mut self, span: &Span) {
        let Some(scope_spans) = self.scope_spans.as_mut() else {
            return;
        };

        let mut proto = ProtoSpan {
            name: span.name.clone(),
            trace_id: span.trace_id.to_vec(),
            span_id: span.span_id.to_vec(),
            trace_state: span.trace_state.clone().unwrap_or_default(),
            kind: to_proto_kind(span.kind) as i32,
            start_time_unix_nano: to_unix_nanos(span.start_timestamp),
            end_time_unix_nano: to_unix_nanos(span.end_timestamp),
            attributes: to_key_values(&span.attributes),
            flags: u32::from(span.trace_flags.0),
            ..Default::default()
        };

        if span.parent_span_id.is_valid() {
            proto.parent_span_id = span.parent_span_id.to_vec();
        }

        proto.status = match &span.status {
            SpanStatus::Unset => None,
            SpanStatus::Ok => Some(Status {
                code: status::StatusCode::Ok as i32,
                ..Default::default()
            }),
            SpanStatus::Error { description } => Some(Status {
                code: status::StatusCode::Error as i32,
                message: description.clone().unwrap_or_default(),
            }),
        };

        proto.events = span
            .events
            .iter()
            .map(|event| ProtoEvent {
                time_unix_nano: to_unix_nanos(event.timestamp),
                name: event.name.clone(),
                attributes: to_key_values(&event.attributes),
                ..Default::default()
            })
            .collect();

        proto.links = span
            .links
            .iter()
            .map(|link| ProtoLink {
                trace_id: link.trace_id.to_vec(),
                span_id: link.span_id.to_vec(),
                trace_state: link.trace_state.clone().unwrap_or_default(),
                attributes: to_key_values(&link.attributes),
                flags: u32::from(link.trace_flags.0),
                ..Default::default()
            })
            .collect();

        scope_spans.spans.push(proto);
    }
}

fn to_proto_kind(kind: Option<SpanKind>) -> proto_span::SpanKind {
    match kind {
        None => proto_span::SpanKind::Unspecified,
        Some(SpanKind::Internal) => proto_span::SpanKind::Internal,
        Some(SpanKind::Server) => proto_span::SpanKind::Server,
        Some(SpanKind::Client) => proto_span::SpanKind::Client,
        Some(SpanKind::Producer) => proto_span::SpanKind::Producer,
        Some(SpanKind::Consumer) => proto_span::SpanKind::Consumer,
    }
}

/// Exports span batches as OTLP over HTTP.
pub struct OtlpSpanExporter {
    http: OtlpHttpClient,
    writer: OtlpSpanWriter,
}

impl OtlpSpanExporter {
    pub fn new(options: OtlpExporterOptions) -> Self {
        Self {
            http: OtlpHttpClient::new(options),
            writer: OtlpSpanWriter::new(),
        }
    }
}

impl Exporter<Span> for OtlpSpanExporter {
    fn export(&mut self, batch: &ScopeGroupedBatch<Span>, cancel: &CancelToken) -> bool {
        let complete = write_span_batch(batch, &mut self.writer, cancel);
        if !complete {
            self.writer.reset();
            return false;
        }

        let body = self.writer.request().encode_to_vec();
        self.writer.reset();

        self.http.send(body, cancel)
    }

    fn name(&self) -> &'static str {
        "otlp_http_trace"
    }
}
