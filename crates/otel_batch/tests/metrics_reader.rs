//! Periodic metric reader behavior: flush ticks, producer isolation, and
//! shutdown.

use otel_batch::cancel::CancelToken;
use otel_batch::metrics::{
    AggregationTemporality, Metric, MetricBatch, MetricBatchWriter, MetricExporter,
    MetricProducer, MetricReaderOptions, MetricType, NumberMetricPoint, NumberValue,
    PeriodicMetricReader,
};
use otel_batch::otlp::OtlpMetricWriter;
use otel_batch::processor::FlushError;
use otel_batch::{BatchWriter, InstrumentationScope, Resource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Long-interval options so ticks only happen on flush/shutdown.
fn manual_options() -> MetricReaderOptions {
    MetricReaderOptions {
        export_interval: Duration::from_secs(60),
        export_timeout: Some(Duration::from_secs(5)),
    }
}

/// Writes one counter sample per tick and counts invocations.
struct CountingProducer {
    calls: Arc<AtomicUsize>,
}

impl MetricProducer for CountingProducer {
    fn produce(&self, writer: &mut dyn MetricBatchWriter, _cancel: &CancelToken) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scope = InstrumentationScope::new("counting");
        BatchWriter::begin_instrumentation_scope(writer, &scope);
        let metric = Metric::new(
            MetricType::LongSum,
            "ticks.total",
            AggregationTemporality::Cumulative,
        );
        writer.begin_metric(&metric);
        writer.write_number_point(
            &NumberMetricPoint {
                start_time: SystemTime::UNIX_EPOCH,
                end_time: SystemTime::now(),
                value: NumberValue::I64(self.calls.load(Ordering::SeqCst) as i64),
            },
            &Vec::new(),
        );
        writer.end_metric();
        BatchWriter::end_instrumentation_scope(writer);
        true
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Panics before touching the writer, so writer state stays consistent for
/// the producers that follow.
struct ExplodingProducer;

impl MetricProducer for ExplodingProducer {
    fn produce(&self, _writer: &mut dyn MetricBatchWriter, _cancel: &CancelToken) -> bool {
        panic!("producer blew up");
    }

    fn name(&self) -> &'static str {
        "exploding"
    }
}

/// Drives the OTLP writer and records how many metrics each tick carried.
struct RecordingExporter {
    writer: OtlpMetricWriter,
    metric_counts: Arc<std::sync::Mutex<Vec<usize>>>,
}

impl MetricExporter for RecordingExporter {
    fn export(&mut self, batch: &MetricBatch<'_>, cancel: &CancelToken) -> bool {
        let complete = batch.write_to(&mut self.writer, cancel);
        if complete {
            let metrics = self
                .writer
                .request()
                .resource_metrics
                .iter()
                .flat_map(|rm| &rm.scope_metrics)
                .flat_map(|sm| &sm.metrics)
                .count();
            if let Ok(mut counts) = self.metric_counts.lock() {
                counts.push(metrics);
            }
        }
        self.writer.reset();
        complete
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[test]
fn flush_runs_a_collection_tick() {
    let calls = Arc::new(AtomicUsize::new(0));
    let metric_counts = Arc::new(std::sync::Mutex::new(Vec::new()));

    let reader = PeriodicMetricReader::new(
        Arc::new(Resource::empty()),
        RecordingExporter {
            writer: OtlpMetricWriter::new(),
            metric_counts: Arc::clone(&metric_counts),
        },
        vec![Box::new(CountingProducer {
            calls: Arc::clone(&calls),
        })],
        manual_options(),
    )
    .unwrap();

    reader.flush(Duration::from_secs(5)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(metric_counts.lock().unwrap().as_slice(), &[1]);

    reader.flush(Duration::from_secs(5)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    reader.shutdown(Duration::from_secs(5)).unwrap();
}

#[test]
fn one_panicking_producer_does_not_block_the_others() {
    let calls = Arc::new(AtomicUsize::new(0));
    let metric_counts = Arc::new(std::sync::Mutex::new(Vec::new()));

    let reader = PeriodicMetricReader::new(
        Arc::new(Resource::empty()),
        RecordingExporter {
            writer: OtlpMetricWriter::new(),
            metric_counts: Arc::clone(&metric_counts),
        },
        vec![
            Box::new(ExplodingProducer),
            Box::new(CountingProducer {
                calls: Arc::clone(&calls),
            }),
        ],
        manual_options(),
    )
    .unwrap();

    reader.flush(Duration::from_secs(5)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    reader.shutdown(Duration::from_secs(5)).unwrap();
}

#[test]
fn shutdown_runs_a_final_tick_and_is_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let metric_counts = Arc::new(std::sync::Mutex::new(Vec::new()));

    let reader = PeriodicMetricReader::new(
        Arc::new(Resource::empty()),
        RecordingExporter {
            writer: OtlpMetricWriter::new(),
            metric_counts: Arc::clone(&metric_counts),
        },
        vec![Box::new(CountingProducer {
            calls: Arc::clone(&calls),
        })],
        manual_options(),
    )
    .unwrap();

    reader.shutdown(Duration::from_secs(5)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Repeated shutdown stays Ok; a post-shutdown flush reports the stopped
    // worker.
    reader.shutdown(Duration::from_secs(1)).unwrap();
    assert_eq!(
        reader.flush(Duration::from_secs(1)),
        Err(FlushError::Stopped)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
