//! End-to-end processor behavior: trigger conditions, flush/shutdown drain
//! guarantees, overflow accounting, and loop resilience.

use otel_batch::batch::ScopeGroupedBatch;
use otel_batch::cancel::CancelToken;
use otel_batch::exporter::{Exporter, InMemoryExporter};
use otel_batch::logs::{LogRecord, LogRecordBatchExportProcessor, Severity};
use otel_batch::processor::{BatchExportOptions, FlushError};
use otel_batch::writer::NoopBatchWriter;
use otel_batch::{InstrumentationScope, Resource};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Surfaces the engine's tracing output in failing tests.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn scope(name: &str) -> Arc<InstrumentationScope> {
    Arc::new(InstrumentationScope::new(name))
}

fn record(scope: &Arc<InstrumentationScope>, value: i64) -> LogRecord {
    let mut record = LogRecord::new(Arc::clone(scope));
    record.severity = Severity::Info;
    record.body = Some(format!("event-{value}"));
    record.attributes.push(("seq".to_string(), value.into()));
    record
}

fn seq_of(record: &LogRecord) -> i64 {
    match &record.attributes[0].1 {
        otel_batch::AttributeValue::I64(value) => *value,
        other => panic!("unexpected attribute {other:?}"),
    }
}

/// Options that keep the interval out of the way so tests drive exports
/// explicitly via threshold or flush.
fn manual_options(queue: usize, batch: usize) -> BatchExportOptions {
    BatchExportOptions {
        max_queue_size: queue,
        max_export_batch_size: batch,
        export_interval: Duration::from_secs(60),
        export_timeout: Some(Duration::from_secs(5)),
    }
}

#[test]
fn flush_exports_everything_in_per_scope_order() {
    init_tracing();
    let exporter = InMemoryExporter::new();
    let handle = exporter.handle();
    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        exporter,
        manual_options(64, 16),
    )
    .unwrap();

    let alpha = scope("alpha");
    let beta = scope("beta");
    for i in 0..5 {
        processor.process_emitted_log_record(record(&alpha, i));
        processor.process_emitted_log_record(record(&beta, 100 + i));
    }

    processor.flush(Duration::from_secs(5)).unwrap();

    let items = handle.items();
    assert_eq!(items.len(), 10);

    // FIFO within each scope.
    let alpha_seqs: Vec<i64> = items
        .iter()
        .filter(|r| r.scope.name() == "alpha")
        .map(seq_of)
        .collect();
    let beta_seqs: Vec<i64> = items
        .iter()
        .filter(|r| r.scope.name() == "beta")
        .map(seq_of)
        .collect();
    assert_eq!(alpha_seqs, vec![0, 1, 2, 3, 4]);
    assert_eq!(beta_seqs, vec![100, 101, 102, 103, 104]);

    assert_eq!(processor.dropped_count(), 0);
}

#[test]
fn empty_flush_completes_immediately() {
    let exporter = InMemoryExporter::<LogRecord>::new();
    let handle = exporter.handle();
    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        exporter,
        manual_options(8, 8),
    )
    .unwrap();

    processor.flush(Duration::from_millis(10)).unwrap();
    assert_eq!(handle.batch_count(), 0);
}

/// Exporter that records items and blocks each export until the test releases
/// it, making overflow timing deterministic.
struct GatedExporter {
    items: Arc<Mutex<Vec<LogRecord>>>,
    started: Sender<()>,
    release: Receiver<()>,
}

impl Exporter<LogRecord> for GatedExporter {
    fn export(&mut self, batch: &ScopeGroupedBatch<LogRecord>, cancel: &CancelToken) -> bool {
        let mut collected = Vec::new();
        batch.write_to(&mut NoopBatchWriter, |_, item| collected.push(item.clone()), cancel);
        self.started.send(()).unwrap();
        self.release
            .recv_timeout(Duration::from_secs(10))
            .expect("test never released the exporter");
        self.items.lock().unwrap().extend(collected);
        true
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

#[test]
fn overflow_drops_items_and_counts_them() {
    init_tracing();
    let items = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let exporter = GatedExporter {
        items: Arc::clone(&items),
        started: started_tx,
        release: release_rx,
    };

    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        exporter,
        manual_options(8, 8),
    )
    .unwrap();

    let source = scope("overflow");

    // Fill the queue; the 8th add trips the size threshold and wakes the
    // worker, which drains all 8 into a batch and blocks inside the exporter.
    for i in 0..8 {
        processor.process_emitted_log_record(record(&source, i));
    }
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("worker never started exporting");

    // Queue is empty again (drained into the in-flight batch): 8 more fit,
    // the remaining 16 are dropped on the floor.
    for i in 8..32 {
        processor.process_emitted_log_record(record(&source, i));
    }
    assert_eq!(processor.dropped_count(), 16);

    // Let both exports finish; shutdown waits for the second cycle to
    // complete, so the item store is settled afterwards.
    release_tx.send(()).unwrap();
    let releaser = {
        let release_tx = release_tx.clone();
        let started_rx = started_rx;
        thread::spawn(move || {
            // Release the second export as soon as it starts.
            if started_rx.recv_timeout(Duration::from_secs(5)).is_ok() {
                let _ = release_tx.send(());
            }
        })
    };
    processor.shutdown(Duration::from_secs(5)).unwrap();
    releaser.join().unwrap();

    let exported = items.lock().unwrap().len();
    assert_eq!(exported, 16);
    assert_eq!(exported as u64 + processor.dropped_count(), 32);
}

#[test]
fn size_threshold_triggers_before_interval() {
    let exporter = InMemoryExporter::new();
    let handle = exporter.handle();
    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        exporter,
        BatchExportOptions {
            max_queue_size: 16,
            max_export_batch_size: 2,
            export_interval: Duration::from_secs(5),
            export_timeout: Some(Duration::from_secs(5)),
        },
    )
    .unwrap();

    let source = scope("burst");
    for i in 0..3 {
        processor.process_emitted_log_record(record(&source, i));
    }

    // The first cycle must carry exactly 2 items well before the 5s interval.
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.batch_count() < 1 {
        assert!(Instant::now() < deadline, "threshold export never happened");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handle.batches()[0].len(), 2);

    // The leftover item goes out on the next trigger.
    processor.flush(Duration::from_secs(5)).unwrap();
    let batches = handle.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 1);
    assert_eq!(seq_of(&batches[1][0]), 2);
}

#[test]
fn flush_tracks_drain_not_transmission_success() {
    let exporter = InMemoryExporter::failing();
    let handle = exporter.handle();
    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        exporter,
        manual_options(16, 4),
    )
    .unwrap();

    let source = scope("failing");
    for i in 0..10 {
        processor.process_emitted_log_record(record(&source, i));
    }

    // Every export fails, but flush completes once the backlog is drained.
    processor.flush(Duration::from_secs(5)).unwrap();
    assert_eq!(handle.item_count(), 10);
}

#[test]
fn shutdown_drains_backlog_and_is_idempotent() {
    let exporter = InMemoryExporter::new();
    let handle = exporter.handle();
    let processor = Arc::new(
        LogRecordBatchExportProcessor::new(
            Arc::new(Resource::empty()),
            exporter,
            manual_options(64, 4),
        )
        .unwrap(),
    );

    let source = scope("drain");
    for i in 0..20 {
        processor.process_emitted_log_record(record(&source, i));
    }

    // Concurrent shutdowns all observe the same completion.
    let concurrent = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.shutdown(Duration::from_secs(5)))
    };
    processor.shutdown(Duration::from_secs(5)).unwrap();
    concurrent.join().unwrap().unwrap();

    // Everything accepted before shutdown was handed over, in <= 4-item cycles.
    assert_eq!(handle.item_count(), 20);
    assert!(handle.batches().iter().all(|batch| batch.len() <= 4));

    // Repeated shutdown after completion stays Ok.
    processor.shutdown(Duration::from_secs(1)).unwrap();

    // Items enqueued after shutdown are not exported; a flush for them reports
    // the stopped worker.
    processor.process_emitted_log_record(record(&source, 99));
    assert_eq!(
        processor.flush(Duration::from_secs(1)),
        Err(FlushError::Stopped)
    );
    assert_eq!(handle.item_count(), 20);
}

/// Exporter that panics on the first call and records afterwards.
struct PanicOnceExporter {
    inner: InMemoryExporter<LogRecord>,
    panicked: bool,
}

impl Exporter<LogRecord> for PanicOnceExporter {
    fn export(&mut self, batch: &ScopeGroupedBatch<LogRecord>, cancel: &CancelToken) -> bool {
        if !self.panicked {
            self.panicked = true;
            panic!("exporter blew up");
        }
        self.inner.export(batch, cancel)
    }

    fn name(&self) -> &'static str {
        "panic_once"
    }
}

#[test]
fn exporter_panic_is_confined_to_one_cycle() {
    init_tracing();
    let inner = InMemoryExporter::new();
    let handle = inner.handle();
    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        PanicOnceExporter {
            inner,
            panicked: false,
        },
        manual_options(16, 4),
    )
    .unwrap();

    let source = scope("resilient");

    // First cycle panics; its batch is discarded but the loop keeps running.
    processor.process_emitted_log_record(record(&source, 0));
    processor.flush(Duration::from_secs(5)).unwrap();
    assert_eq!(handle.item_count(), 0);

    // Second cycle exports normally.
    processor.process_emitted_log_record(record(&source, 1));
    processor.flush(Duration::from_secs(5)).unwrap();
    assert_eq!(handle.item_count(), 1);
    assert_eq!(seq_of(&handle.items()[0]), 1);
}

#[test]
fn backlog_larger_than_one_batch_flushes_without_interval_waits() {
    let exporter = InMemoryExporter::new();
    let handle = exporter.handle();
    let processor = LogRecordBatchExportProcessor::new(
        Arc::new(Resource::empty()),
        exporter,
        manual_options(64, 4),
    )
    .unwrap();

    let source = scope("backlog");
    for i in 0..17 {
        processor.process_emitted_log_record(record(&source, i));
    }

    // 17 items at 4 per cycle needs 5 cycles; with a 60s interval this only
    // completes promptly if flush keeps re-arming the export trigger.
    let started = Instant::now();
    processor.flush(Duration::from_secs(10)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(handle.item_count(), 17);
}
