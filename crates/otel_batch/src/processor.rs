//! Background batch export scheduling.
//!
//! A [`BatchExportProcessor`] owns a bounded [`RingQueue`] and one dedicated
//! background thread. Producers call [`process_item`] from arbitrary threads;
//! the thread drains the queue into a [`ScopeGroupedBatch`] and invokes the
//! exporter when one of the triggers fires:
//!
//! - the export interval elapses,
//! - the queue depth reaches the max export batch size,
//! - a caller flushes, or
//! - shutdown is requested.
//!
//! The loop moves through `Running -> Draining -> Stopped`: a shutdown request
//! records the queue's `added` count as a drain target, and the loop keeps
//! exporting until `removed` reaches it, so everything accepted before the
//! shutdown call is handed to the exporter (items enqueued after are not
//! guaranteed). The three conceptual wait handles of the design (export
//! trigger, shutdown trigger, data-exported pulse) are folded into one mutex
//! plus two condvars: trigger wakes are re-checked against predicate flags,
//! and the exported pulse is edge-like: waiters always re-verify the queue
//! counters after a wake.
//!
//! [`process_item`]: BatchExportProcessor::process_item
//! [`RingQueue`]: ringqueue::RingQueue

use crate::batch::{ScopeGroupedBatch, TelemetryItem};
use crate::cancel::CancelToken;
use crate::exporter::Exporter;
use crate::resource::Resource;
use ringqueue::RingQueue;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Spin budget handed to the queue on every enqueue, matching the drop policy
/// of the reference pipeline: spin briefly under contention, then drop.
const ADD_SPIN_BUDGET: usize = 50_000;

/// Upper bound on a single condvar wait while a flush/shutdown caller polls
/// for progress, so a missed pulse can only delay a waiter, never strand it.
const WAITER_POLL: Duration = Duration::from_millis(250);

/// Options for [`BatchExportProcessor`].
#[derive(Debug, Clone)]
pub struct BatchExportOptions {
    /// Maximum queue size; the queue drops items once it is reached.
    pub max_queue_size: usize,
    /// Maximum number of items per export. Must not exceed `max_queue_size`.
    pub max_export_batch_size: usize,
    /// Delay between two consecutive exports when nothing else triggers one.
    pub export_interval: Duration,
    /// Per-export timeout; `None` disables cancellation.
    pub export_timeout: Option<Duration>,
}

impl Default for BatchExportOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            export_interval: Duration::from_secs(5),
            export_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl BatchExportOptions {
    pub(crate) fn validate(&self) -> Result<(), OptionsError> {
        if self.max_queue_size < 1 {
            return Err(OptionsError::QueueSize);
        }
        if self.max_export_batch_size < 1 {
            return Err(OptionsError::BatchSize);
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(OptionsError::BatchExceedsQueue);
        }
        if self.export_interval < Duration::from_millis(1) {
            return Err(OptionsError::Interval);
        }
        Ok(())
    }
}

/// Invalid processor/reader options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("max_queue_size must be at least 1")]
    QueueSize,
    #[error("max_export_batch_size must be at least 1")]
    BatchSize,
    #[error("max_export_batch_size must not exceed max_queue_size")]
    BatchExceedsQueue,
    #[error("export_interval must be at least 1ms")]
    Interval,
}

/// Failure to construct a processor or reader.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidOptions(#[from] OptionsError),
    #[error("failed to spawn export worker thread: {0}")]
    SpawnThread(#[from] io::Error),
}

/// Outcome of a bounded flush wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlushError {
    #[error("flush wait timed out before the drain target was reached")]
    Timeout,
    #[error("processor stopped before the drain target was reached")]
    Stopped,
}

/// Outcome of a bounded shutdown wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShutdownError {
    #[error("shutdown wait timed out before the worker stopped")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
    Stopped,
}

struct TriggerState {
    export_requested: bool,
    shutdown_requested: bool,
    disposed: bool,
    phase: Phase,
}

struct Signals<T> {
    queue: RingQueue<T>,
    state: Mutex<TriggerState>,
    /// Wakes the worker early (export or shutdown request, disposal).
    trigger: Condvar,
    /// Pulsed once per loop iteration; flush/shutdown waiters re-check on it.
    exported: Condvar,
    dropped: AtomicU64,
    /// `removed` position the worker must reach before stopping.
    /// `u64::MAX` until shutdown is requested.
    shutdown_target: AtomicU64,
}

/// Generic batch export scheduler, parameterized over the telemetry item type.
/// The per-signal entry points live in [`logs`](crate::logs) and
/// [`trace`](crate::trace); this type carries all the scheduling behavior.
pub struct BatchExportProcessor<T: TelemetryItem> {
    signals: Arc<Signals<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    max_export_batch_size: usize,
}

impl<T: TelemetryItem> BatchExportProcessor<T> {
    /// Validates `options`, then starts the background export thread.
    pub fn new<E>(
        resource: Arc<Resource>,
        exporter: E,
        options: BatchExportOptions,
    ) -> Result<Self, BuildError>
    where
        E: Exporter<T> + 'static,
    {
        options.validate()?;

        let signals = Arc::new(Signals {
            queue: RingQueue::new(options.max_queue_size),
            state: Mutex::new(TriggerState {
                export_requested: false,
                shutdown_requested: false,
                disposed: false,
                phase: Phase::Running,
            }),
            trigger: Condvar::new(),
            exported: Condvar::new(),
            dropped: AtomicU64::new(0),
            shutdown_target: AtomicU64::new(u64::MAX),
        });

        let batch = ScopeGroupedBatch::new(resource);
        let worker = {
            let signals = Arc::clone(&signals);
            let max_batch = options.max_export_batch_size;
            let interval = options.export_interval;
            let timeout = options.export_timeout;
            thread::Builder::new()
                .name(format!("otel-export-{}", exporter.name()))
                .spawn(move || worker_loop(&signals, exporter, batch, max_batch, interval, timeout))?
        };

        Ok(Self {
            signals,
            worker: Mutex::new(Some(worker)),
            max_export_batch_size: options.max_export_batch_size,
        })
    }

    /// Enqueues a completed item. Never blocks; on overflow or spin-budget
    /// exhaustion the item is dropped and counted, and nothing surfaces to
    /// the caller.
    pub fn process_item(&self, item: T) {
        if self.signals.queue.try_add(item, ADD_SPIN_BUDGET) {
            // A full batch is ready: wake the worker rather than waiting out
            // the rest of the interval.
            if self.signals.queue.len() >= self.max_export_batch_size {
                self.signal_export();
            }
        } else {
            self.signals.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Waits until everything enqueued strictly before this call has been
    /// handed to the exporter (regardless of whether transmission succeeded),
    /// bounded by `timeout`.
    pub fn flush(&self, timeout: Duration) -> Result<(), FlushError> {
        let target = self.signals.queue.added_count();
        if self.signals.queue.removed_count() >= target {
            return Ok(());
        }

        self.signal_export();

        let deadline = Instant::now() + timeout;
        let Ok(mut state) = self.signals.state.lock() else {
            return Err(FlushError::Stopped);
        };
        loop {
            if self.signals.queue.removed_count() >= target {
                return Ok(());
            }
            if state.phase == Phase::Stopped {
                return Err(FlushError::Stopped);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FlushError::Timeout);
            }
            // Re-arm the export trigger: a backlog larger than one batch needs
            // a cycle per batch, and the worker must not sit out its interval
            // between them while a flush is waiting.
            state.export_requested = true;
            self.signals.trigger.notify_one();
            let wait = (deadline - now).min(WAITER_POLL);
            match self.signals.exported.wait_timeout(state, wait) {
                Ok((guard, _)) => state = guard,
                Err(_) => return Err(FlushError::Stopped),
            }
        }
    }

    /// Requests shutdown (first call records the drain target) and waits for
    /// the worker to reach its terminal state, bounded by `timeout`.
    ///
    /// Idempotent: repeated or concurrent calls all wait on the same
    /// in-flight shutdown. Items enqueued after the first call are not
    /// guaranteed to be exported.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        {
            let Ok(mut state) = self.signals.state.lock() else {
                return Ok(());
            };
            if !state.shutdown_requested {
                state.shutdown_requested = true;
                self.signals
                    .shutdown_target
                    .store(self.signals.queue.added_count(), Ordering::Release);
                if state.phase == Phase::Running {
                    state.phase = Phase::Draining;
                }
                self.signals.trigger.notify_one();
            }
        }

        let deadline = Instant::now() + timeout;
        {
            let Ok(mut state) = self.signals.state.lock() else {
                return Ok(());
            };
            while state.phase != Phase::Stopped {
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

    /// Number of items dropped because the queue was full or the enqueue spin
    /// budget ran out.
    pub fn dropped_count(&self) -> u64 {
        self.signals.dropped.load(Ordering::Relaxed)
    }

    fn signal_export(&self) {
        if let Ok(mut state) = self.signals.state.lock() {
            state.export_requested = true;
            self.signals.trigger.notify_one();
        }
    }
}

impl<T: TelemetryItem> Drop for BatchExportProcessor<T> {
    fn drop(&mut self) {
        // Mark disposal and wake everything. The worker observes the flag at
        // its next wake and exits; a worker blocked inside a slow exporter is
        // left to finish on its own rather than risking a deadlock here.
        if let Ok(mut state) = self.signals.state.lock() {
            state.disposed = true;
            self.signals.trigger.notify_all();
            self.signals.exported.notify_all();
        }
    }
}

fn worker_loop<T, E>(
    signals: &Signals<T>,
    mut exporter: E,
    mut batch: ScopeGroupedBatch<T>,
    max_batch: usize,
    interval: Duration,
    timeout: Option<Duration>,
) where
    T: TelemetryItem,
    E: Exporter<T>,
{
    loop {
        // Only wait when the queue is below one batch; under sustained load
        // keep draining at full speed.
        if signals.queue.len() < max_batch {
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
            // The export trigger auto-resets; shutdown and disposal latch.
            state.export_requested = false;
            if state.disposed {
                state.phase = Phase::Stopped;
                signals.exported.notify_all();
                return;
            }
        }

        let take = signals.queue.len().min(max_batch);
        if take > 0 {
            let target = signals.queue.removed_count() + take as u64;
            while signals.queue.removed_count() < target {
                batch.add(signals.queue.read());
            }

            export_batch(&mut exporter, &batch, timeout);
            batch.reset();
        }

        // Pulse progress for flush/shutdown waiters. Taking the lock orders
        // the pulse after the counter updates above.
        match signals.state.lock() {
            Ok(_state) => signals.exported.notify_all(),
            Err(_) => return,
        }

        if signals.queue.removed_count() >= signals.shutdown_target.load(Ordering::Acquire) {
            let dropped = signals.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                warn!(
                    exporter = exporter.name(),
                    dropped, "batch export processor dropped items because the queue was full"
                );
            }
            exporter.shutdown();
            if let Ok(mut state) = signals.state.lock() {
                state.phase = Phase::Stopped;
                signals.exported.notify_all();
            }
            return;
        }
    }
}

/// One export attempt. Failures and panics are confined here: the batch is
/// discarded either way and the loop continues on the next cycle.
fn export_batch<T, E>(exporter: &mut E, batch: &ScopeGroupedBatch<T>, timeout: Option<Duration>)
where
    T: TelemetryItem,
    E: Exporter<T>,
{
    let cancel = match timeout {
        Some(timeout) => CancelToken::after(timeout),
        None => CancelToken::none(),
    };

    match panic::catch_unwind(AssertUnwindSafe(|| exporter.export(batch, &cancel))) {
        Ok(success) => debug!(
            exporter = exporter.name(),
            success,
            items = batch.len(),
            "telemetry export completed"
        ),
        Err(_) => warn!(
            exporter = exporter.name(),
            "telemetry export panicked; batch discarded"
        ),
    }
}
