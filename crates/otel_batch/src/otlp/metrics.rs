use super::common::{to_key_values, to_proto_resource, to_proto_scope, to_unix_nanos};
use super::http::OtlpHttpClient;
use super::OtlpExporterOptions;
use crate::cancel::CancelToken;
use crate::metrics::{
    AggregationTemporality, HistogramBucket, HistogramMetricPoint, Metric, MetricBatch,
    MetricExporter, MetricType, MetricWriter, NumberMetricPoint, NumberValue, SummaryMetricPoint,
    SummaryQuantile,
};
use crate::resource::{Attributes, Resource};
use crate::scope::InstrumentationScope;
use crate::writer::BatchWriter;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::metrics::v1::summary_data_point::ValueAtQuantile;
use opentelemetry_proto::tonic::metrics::v1::{
    metric, number_data_point, AggregationTemporality as ProtoTemporality, Gauge,
    Histogram, HistogramDataPoint, Metric as ProtoMetric, NumberDataPoint, ResourceMetrics,
    ScopeMetrics, Sum, Summary, SummaryDataPoint,
};
use prost::Message;

/// Builds an `ExportMetricsServiceRequest` from metric writer callbacks.
/// Reusable across ticks via [`reset`](OtlpMetricWriter::reset).
#[derive(Default)]
pub struct OtlpMetricWriter {
    request: ExportMetricsServiceRequest,
    resource_metrics: Option<ResourceMetrics>,
    scope_metrics: Option<ScopeMetrics>,
    metric: Option<ProtoMetric>,
}

impl OtlpMetricWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request built by the last tick.
    pub fn request(&self) -> &ExportMetricsServiceRequest {
        &self.request
    }

    pub fn reset(&mut self) {
        self.request = ExportMetricsServiceRequest::default();
        self.resource_metrics = None;
        self.scope_metrics = None;
        self.metric = None;
    }
}

fn to_proto_temporality(temporality: AggregationTemporality) -> ProtoTemporality {
    match temporality {
        AggregationTemporality::Cumulative => ProtoTemporality::Cumulative,
        AggregationTemporality::Delta => ProtoTemporality::Delta,
    }
}

impl BatchWriter for OtlpMetricWriter {
    fn begin_batch(&mut self, resource: &Resource) {
        debug_assert!(self.resource_metrics.is_none());

        self.resource_metrics = Some(ResourceMetrics {
            resource: Some(to_proto_resource(resource)),
            ..Default::default()
        });
    }

    fn end_batch(&mut self) {
        debug_assert!(self.resource_metrics.is_some());

        if let Some(resource_metrics) = self.resource_metrics.take() {
            self.request.resource_metrics.push(resource_metrics);
        }
    }

    fn begin_instrumentation_scope(&mut self, scope: &InstrumentationScope) {
        debug_assert!(self.resource_metrics.is_some() && self.scope_metrics.is_none());

        let Some(resource_metrics) = self.resource_metrics.as_mut() else {
            return;
        };

        let existing = resource_metrics
            .scope_metrics
            .iter()
            .position(|s| s.scope.as_ref().is_some_and(|sc| sc.name == scope.name()));

        self.scope_metrics = Some(match existing {
            Some(index) => resource_metrics.scope_metrics.remove(index),
            None => ScopeMetrics {
                scope: Some(to_proto_scope(scope)),
                ..Default::default()
            },
        });
    }

    fn end_instrumentation_scope(&mut self) {
        debug_assert!(self.scope_metrics.is_some());

        if let (Some(resource_metrics), Some(scope_metrics)) =
            (self.resource_metrics.as_mut(), self.scope_metrics.take())
        {
            resource_metrics.scope_metrics.push(scope_metrics);
        }
    }
}

impl MetricWriter for OtlpMetricWriter {
    fn begin_metric(&mut self, metric: &Metric) {
        debug_assert!(self.scope_metrics.is_some() && self.metric.is_none());

        let temporality = to_proto_temporality(metric.temporality()) as i32;

        let data = match metric.metric_type() {
            MetricType::LongSum
            | MetricType::DoubleSum
            | MetricType::LongSumNonMonotonic
            | MetricType::DoubleSumNonMonotonic => metric::Data::Sum(Sum {
                aggregation_temporality: temporality,
                is_monotonic: metric.metric_type().is_monotonic_sum(),
                ..Default::default()
            }),
            MetricType::LongGauge | MetricType::DoubleGauge => {
                metric::Data::Gauge(Gauge::default())
            }
            MetricType::Histogram => metric::Data::Histogram(Histogram {
                aggregation_temporality: temporality,
                ..Default::default()
            }),
            MetricType::Summary => metric::Data::Summary(Summary::default()),
        };

        self.metric = Some(ProtoMetric {
            name: metric.name().to_string(),
            description: metric.description.clone().unwrap_or_default(),
            unit: metric.unit.clone().unwrap_or_default(),
            data: Some(data),
            ..Default::default()
        });
    }

    fn end_metric(&mut self) {
        debug_assert!(self.metric.is_some());

        if let (Some(scope_metrics), Some(metric)) =
            (self.scope_metrics.as_mut(), self.metric.take())
        {
            scope_metrics.metrics.push(metric);
        }
    }

    fn write_number_point(&mut self, point: &NumberMetricPoint, attributes: &Attributes) {
        let Some(data) = self.metric.as_mut().and_then(|m| m.data.as_mut()) else {
            return;
        };

        let proto = NumberDataPoint {
            start_time_unix_nano: to_unix_nanos(point.start_time),
            time_unix_nano: to_unix_nanos(point.end_time),
            attributes: to_key_values(attributes),
            value: Some(match point.value {
                NumberValue::I64(value) => number_data_point::Value::AsInt(value),
                NumberValue::F64(value) => number_data_point::Value::AsDouble(value),
            }),
            ..Default::default()
        };

        match data {
            metric::Data::Sum(sum) => sum.data_points.push(proto),
            metric::Data::Gauge(gauge) => gauge.data_points.push(proto),
            _ => debug_assert!(false, "number point written to a non-number metric"),
        }
    }

    fn write_histogram_point(
        &mut self,
        point: &HistogramMetricPoint,
        buckets: &[HistogramBucket],
        attributes: &Attributes,
    ) {
        let Some(metric::Data::Histogram(histogram)) =
            self.metric.as_mut().and_then(|m| m.data.as_mut())
        else {
            debug_assert!(false, "histogram point written to a non-histogram metric");
            return;
        };

        let mut proto = HistogramDataPoint {
            start_time_unix_nano: to_unix_nanos(point.start_time),
            time_unix_nano: to_unix_nanos(point.end_time),
            attributes: to_key_values(attributes),
            count: point.count,
            sum: Some(point.sum),
            ..Default::default()
        };

        if let Some((min, max)) = point.min_max {
            proto.min = Some(min);
            proto.max = Some(max);
        }

        for bucket in buckets {
            proto.bucket_counts.push(bucket.count);
            // The overflow bucket's bound is implicit on the wire.
            if bucket.upper_bound != f64::INFINITY {
                proto.explicit_bounds.push(bucket.upper_bound);
            }
        }

        histogram.data_points.push(proto);
    }

    fn write_summary_point(
        &mut self,
        point: &SummaryMetricPoint,
        quantiles: &[SummaryQuantile],
        attributes: &Attributes,
    ) {
        let Some(metric::Data::Summary(summary)) =
            self.metric.as_mut().and_then(|m| m.data.as_mut())
        else {
            debug_assert!(false, "summary point written to a non-summary metric");
            return;
        };

        let proto = SummaryDataPoint {
            start_time_unix_nano: to_unix_nanos(point.start_time),
            time_unix_nano: to_unix_nanos(point.end_time),
            attributes: to_key_values(attributes),
            count: point.count,
            sum: point.sum,
            quantile_values: quantiles
                .iter()
                .map(|q| ValueAtQuantile {
                    quantile: q.quantile,
                    value: q.value,
                })
                .collect(),
            ..Default::default()
        };

        summary.data_points.push(proto);
    }
}

/// Exports metric ticks as OTLP over HTTP.
pub struct OtlpMetricExporter {
    http: OtlpHttpClient,
    writer: OtlpMetricWriter,
}

impl OtlpMetricExporter {
    pub fn new(options: OtlpExporterOptions) -> Self {
        Self {
            http: OtlpHttpClient::new(options),
            writer: OtlpMetricWriter::new(),
        }
    }
}

impl MetricExporter for OtlpMetricExporter {
    fn export(&mut self, batch: &MetricBatch<'_>, cancel: &CancelToken) -> bool {
        let complete = batch.write_to(&mut self.writer, cancel);
        if !complete {
            self.writer.reset();
            return false;
        }

        let body = self.writer.request().encode_to_vec();
        self.writer.reset();

        self.http.send(body, cancel)
    }

    fn name(&self) -> &'static str {
        "otlp_http_metrics"
    }
}
