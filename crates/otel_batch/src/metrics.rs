//! Metric signal: data model, writer traits, producer contract, and the
//! periodic pull-model reader.
//!
//! Metrics are sampled, not buffered as discrete events, so the reader shares
//! the processor's scheduling skeleton but pulls current state from registered
//! [`MetricProducer`]s on each tick instead of draining a queue. There is no
//! drop counter and no backlog: shutdown performs the tick it woke up for and
//! stops.

use crate::cancel::CancelToken;
use crate::processor::{BuildError, FlushError, OptionsError, ShutdownError};
use crate::resource::{Attributes, Resource};
use crate::scope::InstrumentationScope;
use crate::writer::BatchWriter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound on a single flush/shutdown condvar wait, mirroring the
/// processor's waiter poll.
const WAITER_POLL: Duration = Duration::from_millis(250);

/// Aggregation temporality of a metric stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AggregationTemporality {
    Cumulative = 1,
    Delta = 2,
}

/// Shape of a metric stream: value width plus point kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    LongGauge,
    DoubleGauge,
    LongSum,
    DoubleSum,
    LongSumNonMonotonic,
    DoubleSumNonMonotonic,
    Histogram,
    Summary,
}

impl MetricType {
    pub fn is_sum(self) -> bool {
        matches!(
            self,
            Self::LongSum | Self::DoubleSum | Self::LongSumNonMonotonic | Self::DoubleSumNonMonotonic
        )
    }

    pub fn is_monotonic_sum(self) -> bool {
        matches!(self, Self::LongSum | Self::DoubleSum)
    }
}

/// Descriptor for one metric stream.
#[derive(Debug, Clone)]
pub struct Metric {
    metric_type: MetricType,
    name: String,
    temporality: AggregationTemporality,
    pub description: Option<String>,
    pub unit: Option<String>,
}

impl Metric {
    /// Creates a descriptor. Non-monotonic sums only support cumulative
    /// aggregation and are coerced accordingly.
    pub fn new(
        metric_type: MetricType,
        name: impl Into<String>,
        temporality: AggregationTemporality,
    ) -> Self {
        let temporality = if metric_type.is_sum()
            && !metric_type.is_monotonic_sum()
            && temporality == AggregationTemporality::Delta
        {
            AggregationTemporality::Cumulative
        } else {
            temporality
        };

        Self {
            metric_type,
            name: name.into(),
            temporality,
            description: None,
            unit: None,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temporality(&self) -> AggregationTemporality {
        self.temporality
    }
}

/// A gauge or sum sample.
#[derive(Debug, Clone, Copy)]
pub struct NumberMetricPoint {
    pub start_time: std::time::SystemTime,
    pub end_time: std::time::SystemTime,
    pub value: NumberValue,
}

/// Integer-or-float value of a number point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    I64(i64),
    F64(f64),
}

/// A histogram sample. `min_max` is `None` when the aggregation did not track
/// extremes; buckets travel alongside in the writer call.
#[derive(Debug, Clone, Copy)]
pub struct HistogramMetricPoint {
    pub start_time: std::time::SystemTime,
    pub end_time: std::time::SystemTime,
    pub count: u64,
    pub sum: f64,
    pub min_max: Option<(f64, f64)>,
}

/// One histogram bucket: items counted at or below `upper_bound` (positive
/// infinity for the overflow bucket).
#[derive(Debug, Clone, Copy)]
pub struct HistogramBucket {
    pub upper_bound: f64,
    pub count: u64,
}

/// A pre-aggregated summary sample; quantiles travel alongside in the writer
/// call.
#[derive(Debug, Clone, Copy)]
pub struct SummaryMetricPoint {
    pub start_time: std::time::SystemTime,
    pub end_time: std::time::SystemTime,
    pub count: u64,
    pub sum: f64,
}

/// A quantile of a summary point.
#[derive(Debug, Clone, Copy)]
pub struct SummaryQuantile {
    pub quantile: f64,
    pub value: f64,
}

/// Visitor callbacks a metric encoder implements; all default to no-ops.
pub trait MetricWriter {
    fn begin_instrumentation_scope(&mut self, _scope: &InstrumentationScope) {}

    fn end_instrumentation_scope(&mut self) {}

    fn begin_metric(&mut self, _metric: &Metric) {}

    fn end_metric(&mut self) {}

    fn write_number_point(&mut self, _point: &NumberMetricPoint, _attributes: &Attributes) {}

    fn write_histogram_point(
        &mut self,
        _point: &HistogramMetricPoint,
        _buckets: &[HistogramBucket],
        _attributes: &Attributes,
    ) {
    }

    fn write_summary_point(
        &mut self,
        _point: &SummaryMetricPoint,
        _quantiles: &[SummaryQuantile],
        _attributes: &Attributes,
    ) {
    }
}

/// Full writer surface a metric exporter drives: batch brackets plus metric
/// callbacks. Blanket-implemented for any type providing both.
pub trait MetricBatchWriter: BatchWriter + MetricWriter {}

impl<W: BatchWriter + MetricWriter> MetricBatchWriter for W {}

/// Source of current metric state, sampled on every reader tick.
///
/// A producer writes its instruments directly into the writer (scope, metric,
/// points) and returns whether the collection completed. Panics are confined
/// by the reader; one producer failing does not stop the others.
pub trait MetricProducer: Send {
    fn produce(&self, writer: &mut dyn MetricBatchWriter, cancel: &CancelToken) -> bool;

    /// Producer identity used in logs.
    fn name(&self) -> &'static str;
}

/// One reader tick's view over the registered producers. The exporter drives
/// [`write_to`](MetricBatch::write_to) with its wire writer.
pub struct MetricBatch<'a> {
    resource: &'a Resource,
    producers: &'a [Box<dyn MetricProducer>],
}

impl<'a> MetricBatch<'a> {
    pub fn new(resource: &'a Resource, producers: &'a [Box<dyn MetricProducer>]) -> Self {
        Self {
            resource,
            producers,
        }
    }

    /// Brackets the batch and invokes every producer, each isolated so a
    /// panicking producer cannot block the rest of the cycle. Returns `false`
    /// when cancellation was observed between producers.
    pub fn write_to(&self, writer: &mut dyn MetricBatchWriter, cancel: &CancelToken) -> bool {
        writer.begin_batch(self.resource);

        for producer in self.producers {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| producer.produce(&mut *writer, cancel)));
            match result {
                Ok(success) => debug!(
                    producer = producer.name(),
                    success, "metric collection completed"
                ),
                Err(_) => warn!(
                    producer = producer.name(),
                    "metric producer panicked; continuing with remaining producers"
                ),
            }

            if cancel.is_cancelled() {
                return false;
            }
        }

        writer.end_batch();

        true
    }
}

/// Transmits one tick's metric batch. Mirrors [`Exporter`](crate::Exporter)
/// but over the pull-model batch view.
pub trait MetricExporter: Send {
    fn export(&mut self, batch: &MetricBatch<'_>, cancel: &CancelToken) -> bool;

    /// Exporter identity used in logs.
    fn name(&self) -> &'static str;

    fn shutdown(&mut self) {}
}

/// Options for [`PeriodicMetricReader`].
#[derive(Debug, Clone)]
pub struct MetricReaderOptions {
    /// Delay between two consecutive collection ticks.
    pub export_interval: Duration,
    /// Per-export timeout; `None` disables cancellation.
    pub export_timeout: Option<Duration>,
}

impl Default for MetricReaderOptions {
    fn default() -> Self {
        Self {
            export_interval: Duration::from_secs(60),
            export_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl MetricReaderOptions {
    fn validate(&self) -> Result<(), OptionsError> {
        if self.export_interval < Duration::from_millis(1) {
            return Err(OptionsError::Interval);
        }
        Ok(())
    }
}

struct ReaderState {
    export_requested: bool,
    shutdown_requested: bool,
    disposed: bool,
    stopped: bool,
    /// Tick counter; flush waiters wait for it to advance.
    ticks: u64,
}

struct ReaderSignals {
    state: Mutex<ReaderState>,
    trigger: Condvar,
    exported: Condvar,
}

/// Periodically samples registered producers and exports the result on a
/// dedicated thread. Same trigger skeleton as the batch processor, minus the
/// queue.
pub struct PeriodicMetricReader {
    signals: Arc<ReaderSignals>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicMetricReader {
    pub fn new<E>(
        resource: Arc<Resource>,
        exporter: E,
        producers: Vec<Box<dyn MetricProducer>>,
        options: MetricReaderOptions,
    ) -> Result<Self, BuildError>
    where
        E: MetricExporter + 'static,
    {
        options.validate()?;

        let signals = Arc::new(ReaderSignals {
            state: Mutex::new(ReaderState {
                export_requested: false,
                shutdown_requested: false,
                disposed: false,
                stopped: false,
                ticks: 0,
            }),
            trigger: Condvar::new(),
            exported: Condvar::new(),
        });

        let worker = {
            let signals = Arc::clone(&signals);
            let interval = options.export_interval;
            let timeout = options.export_timeout;
            thread::Builder::new()
                .name(format!("otel-metrics-{}", exporter.name()))
                .spawn(move || {
                    reader_loop(&signals, &resource, exporter, &producers, interval, timeout)
                })?
        };

        Ok(Self {
            signals,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Triggers a collection tick and waits for it to complete, bounded by
    /// `timeout`.
    pub fn flush(&self, timeout: Duration) -> Result<(), FlushError> {
        let deadline = Instant::now() + timeout;

        let Ok(mut state) = self.signals.state.lock() else {
            return Err(FlushError::Stopped);
        };
        let target = state.ticks + 1;
        state.export_requested = true;
        self.signals.trigger.notify_one();

        loop {
            if state.ticks >= target {
                return Ok(());
            }
            if state.stopped {
                return Err(FlushError::Stopped);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FlushError::Timeout);
            }
            let wait = (deadline - now).min(WAITER_POLL);
            match self.signals.exported.wait_timeout(state, wait) {
                Ok((guard, _)) => state = guard,
                Err(_) => return Err(FlushError::Stopped),
            }
        }
    }

    /// Requests shutdown (the worker performs one last tick) and waits for
    /// termination, bounded by `timeout`. Idempotent.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        {
            let Ok(mut state) = self.signals.state.lock() else {
                return Ok(());
            };
            if !state.shutdown_requested {
                state.shutdown_requested = true;
                self.signals.trigger.notify_one();
            }
        }

        let deadline = Instant::now() + timeout;
        {
            let Ok(mut state) = self.signals.state.lock() else {
                return Ok(());
            };
            while !state.stopped {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ShutdownError::Timeout);
                }
                let wait = (deadline - now).min(WAITER_POLL);
                match self.signals.exported.wait_timeout(state, wait) {
                    Ok((guard, _)) => state = guard,
                    Err(_) => return Ok(()),
                }
            }
        }

        if let Ok(mut slot) = self.worker.lock() {
            if let Some(handle) = slot.take() {
                let _ = handle.join();
            }
        }

        Ok(())
    }
}

impl Drop for PeriodicMetricReader {
    fn drop(&mut self) {
        if let Ok(mut state) = self.signals.state.lock() {
            state.disposed = true;
            self.signals.trigger.notify_all();
            self.signals.exported.notify_all();
        }
    }
}

fn reader_loop<E>(
    signals: &ReaderSignals,
    resource: &Resource,
    mut exporter: E,
    producers: &[Box<dyn MetricProducer>],
    interval: Duration,
    timeout: Option<Duration>,
) where
    E: MetricExporter,
{
    loop {
        let shutting_down;
        {
            let Ok(mut state) = signals.state.lock() else {
                return;
            };
            if !(state.export_requested || state.shutdown_requested || state.disposed) {
                match signals.trigger.wait_timeout_while(state, interval, |s| {
                    !s.export_requested && !s.shutdown_requested && !s.disposed
                }) {
                    Ok((guard, _)) => state = guard,
                    Err(_) => return,
                }
            }
            state.export_requested = false;
            if state.disposed {
                state.stopped = true;
                signals.exported.notify_all();
                return;
            }
            shutting_down = state.shutdown_requested;
        }

        let cancel = match timeout {
            Some(timeout) => CancelToken::after(timeout),
            None => CancelToken::none(),
        };
        let batch = MetricBatch::new(resource, producers);
        match panic::catch_unwind(AssertUnwindSafe(|| exporter.export(&batch, &cancel))) {
            Ok(success) => debug!(
                exporter = exporter.name(),
                success, "metric export completed"
            ),
            Err(_) => warn!(
                exporter = exporter.name(),
                "metric export panicked; tick discarded"
            ),
        }

        {
            let Ok(mut state) = signals.state.lock() else {
                return;
            };
            state.ticks += 1;
            signals.exported.notify_all();

            if shutting_down {
                state.stopped = true;
                signals.exported.notify_all();
                drop(state);
                exporter.shutdown();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_monotonic_delta_sum_is_coerced_to_cumulative() {
        let metric = Metric::new(
            MetricType::DoubleSumNonMonotonic,
            "queue.depth",
            AggregationTemporality::Delta,
        );
        assert_eq!(metric.temporality(), AggregationTemporality::Cumulative);

        let metric = Metric::new(
            MetricType::DoubleSum,
            "requests.total",
            AggregationTemporality::Delta,
        );
        assert_eq!(metric.temporality(), AggregationTemporality::Delta);
    }

    #[test]
    fn reader_rejects_zero_interval() {
        let options = MetricReaderOptions {
            export_interval: Duration::ZERO,
            export_timeout: None,
        };
        assert_eq!(options.validate(), Err(OptionsError::Interval));
    }
}
