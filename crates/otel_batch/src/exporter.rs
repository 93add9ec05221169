//! Exporter contract and ready-made exporters for development and tests.

use crate::batch::{ScopeGroupedBatch, TelemetryItem};
use crate::cancel::CancelToken;
use crate::writer::NoopBatchWriter;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Transmits a finished batch onto some backend.
///
/// `export` returns `true` only when the batch was transmitted successfully;
/// every failure mode (network error, non-success response, serialization
/// error, timeout) is `false`. Implementations must not panic across this
/// boundary: the processor logs the outcome and moves on, there is no retry.
///
/// An exporter is invoked by exactly one thread at a time (the processor's
/// background loop), so it needs no internal synchronization across concurrent
/// exports, only safety under repeated calls. `shutdown` releases any
/// transport-level resources and is called once, when the loop terminates.
pub trait Exporter<T: TelemetryItem>: Send {
    fn export(&mut self, batch: &ScopeGroupedBatch<T>, cancel: &CancelToken) -> bool;

    /// Exporter identity used in logs.
    fn name(&self) -> &'static str;

    fn shutdown(&mut self) {}
}

/// Discards every batch (successfully). Useful for benchmarks and wiring
/// tests.
#[derive(Debug, Default)]
pub struct NoopExporter;

impl NoopExporter {
    pub fn new() -> Self {
        Self
    }
}

impl<T: TelemetryItem> Exporter<T> for NoopExporter {
    fn export(&mut self, _batch: &ScopeGroupedBatch<T>, _cancel: &CancelToken) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Records exported batches in memory for inspection.
///
/// The exporter itself is moved into the processor; keep a [`handle`]
/// (`InMemoryExporter::handle`) around to read what was exported.
///
/// [`handle`]: InMemoryExporter::handle
pub struct InMemoryExporter<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
    outcome: bool,
}

impl<T: TelemetryItem + Clone> InMemoryExporter<T> {
    /// An exporter that records and reports success.
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            outcome: true,
        }
    }

    /// An exporter that records but reports every export as failed. Exercises
    /// the "failures are dropped, not retried" paths.
    pub fn failing() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            outcome: false,
        }
    }

    pub fn handle(&self) -> InMemoryExporterHandle<T> {
        InMemoryExporterHandle {
            batches: Arc::clone(&self.batches),
        }
    }
}

impl<T: TelemetryItem + Clone> Default for InMemoryExporter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TelemetryItem + Clone> Exporter<T> for InMemoryExporter<T> {
    fn export(&mut self, batch: &ScopeGroupedBatch<T>, cancel: &CancelToken) -> bool {
        let mut items = Vec::with_capacity(batch.len());
        let complete = batch.write_to(
            &mut NoopBatchWriter,
            |_, item| items.push(item.clone()),
            cancel,
        );
        if !complete {
            return false;
        }

        if let Ok(mut batches) = self.batches.lock() {
            batches.push(items);
        }
        self.outcome
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Read side of an [`InMemoryExporter`].
#[derive(Clone)]
pub struct InMemoryExporterHandle<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T: Clone> InMemoryExporterHandle<T> {
    /// Every exported batch, in export order, items in traversal order.
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// All exported items flattened across batches.
    pub fn items(&self) -> Vec<T> {
        self.batches
            .lock()
            .map(|b| b.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn item_count(&self) -> usize {
        self.batches
            .lock()
            .map(|b| b.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

/// Writes each exported item as one JSON line to a sink. Local-development
/// exporter: point it at a file (or stdout) and tail it.
pub struct JsonLinesExporter<T, W: Write + Send> {
    sink: W,
    _item: PhantomData<fn(T)>,
}

impl<T: Serialize> JsonLinesExporter<T, BufWriter<File>> {
    /// Appends JSON lines to the file at `path`, creating it if needed.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self::with_sink(BufWriter::new(file)))
    }
}

impl<T, W: Write + Send> JsonLinesExporter<T, W> {
    pub fn with_sink(sink: W) -> Self {
        Self {
            sink,
            _item: PhantomData,
        }
    }
}

impl<T, W> Exporter<T> for JsonLinesExporter<T, W>
where
    T: TelemetryItem + Serialize,
    W: Write + Send,
{
    fn export(&mut self, batch: &ScopeGroupedBatch<T>, cancel: &CancelToken) -> bool {
        let sink = &mut self.sink;
        let mut failed = false;
        let complete = batch.write_to(
            &mut NoopBatchWriter,
            |_, item| {
                if !failed {
                    failed = serde_json::to_writer(&mut *sink, item)
                        .map_err(io::Error::from)
                        .and_then(|()| sink.write_all(b"\n"))
                        .is_err();
                }
            },
            cancel,
        );
        complete && !failed && self.sink.flush().is_ok()
    }

    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn shutdown(&mut self) {
        let _ = self.sink.flush();
    }
}
