//! Per-scope batch accumulation for one export cycle.

use crate::cancel::CancelToken;
use crate::resource::Resource;
use crate::scope::InstrumentationScope;
use crate::writer::BatchWriter;
use std::collections::HashMap;
use std::sync::Arc;

/// A buffered telemetry item that can be grouped by instrumentation scope.
pub trait TelemetryItem: Send + 'static {
    fn scope(&self) -> &Arc<InstrumentationScope>;
}

struct Bucket<T> {
    scope: Arc<InstrumentationScope>,
    items: Vec<T>,
}

/// Accumulates dequeued items into per-scope buckets for one export cycle.
///
/// Buckets are traversed in first-seen order, stable across cycles; items
/// within a bucket keep FIFO insertion order (the only ordering consumers may
/// rely on). [`reset`](ScopeGroupedBatch::reset) empties every bucket but keeps
/// the buckets and the key mapping, so sustained throughput reuses the same
/// allocations cycle after cycle.
///
/// Exactly one `ScopeGroupedBatch` exists per processor, owned and mutated by
/// the background export thread only.
pub struct ScopeGroupedBatch<T> {
    resource: Arc<Resource>,
    /// Lowercased scope name -> index into `buckets`.
    index: HashMap<String, usize>,
    buckets: Vec<Bucket<T>>,
    len: usize,
}

impl<T: TelemetryItem> ScopeGroupedBatch<T> {
    pub fn new(resource: Arc<Resource>) -> Self {
        Self {
            resource,
            index: HashMap::new(),
            buckets: Vec::new(),
            len: 0,
        }
    }

    /// The resource shared by every batch this accumulator produces.
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Total number of buffered items across all scopes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `item` to the bucket keyed by its scope name
    /// (case-insensitive), creating the bucket on first use.
    pub fn add(&mut self, item: T) {
        let key = item.scope().name().to_ascii_lowercase();
        let next = self.buckets.len();
        let index = *self.index.entry(key).or_insert(next);
        if index == next {
            self.buckets.push(Bucket {
                scope: Arc::clone(item.scope()),
                items: Vec::new(),
            });
        }
        self.buckets[index].items.push(item);
        self.len += 1;
    }

    /// Drives `writer` over the batch: `begin_batch(resource)`, then for each
    /// non-empty bucket in first-seen order `begin_instrumentation_scope`,
    /// `write_item` per item in FIFO order, `end_instrumentation_scope`, and
    /// finally `end_batch`.
    ///
    /// Returns `false` without completing the batch if cancellation is
    /// observed between buckets; the partial output is the caller's to
    /// discard.
    pub fn write_to<W, F>(&self, writer: &mut W, mut write_item: F, cancel: &CancelToken) -> bool
    where
        W: BatchWriter + ?Sized,
        F: FnMut(&mut W, &T),
    {
        writer.begin_batch(&self.resource);

        for bucket in &self.buckets {
            if cancel.is_cancelled() {
                return false;
            }

            if bucket.items.is_empty() {
                continue;
            }

            writer.begin_instrumentation_scope(&bucket.scope);
            for item in &bucket.items {
                write_item(writer, item);
            }
            writer.end_instrumentation_scope();
        }

        writer.end_batch();

        true
    }

    /// Clears every bucket for the next cycle. Bucket storage and the scope
    /// key mapping are retained; safe to call when buckets were never
    /// populated this cycle.
    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            bucket.items.clear();
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::NoopBatchWriter;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        scope: Arc<InstrumentationScope>,
        value: u32,
    }

    impl TelemetryItem for Item {
        fn scope(&self) -> &Arc<InstrumentationScope> {
            &self.scope
        }
    }

    fn item(scope: &Arc<InstrumentationScope>, value: u32) -> Item {
        Item {
            scope: Arc::clone(scope),
            value,
        }
    }

    /// Records traversal callbacks as a flat event log.
    #[derive(Default)]
    struct RecordingWriter {
        events: Vec<String>,
    }

    impl BatchWriter for RecordingWriter {
        fn begin_batch(&mut self, _resource: &Resource) {
            self.events.push("begin_batch".to_string());
        }

        fn end_batch(&mut self) {
            self.events.push("end_batch".to_string());
        }

        fn begin_instrumentation_scope(&mut self, scope: &InstrumentationScope) {
            self.events.push(format!("begin_scope {}", scope.name()));
        }

        fn end_instrumentation_scope(&mut self) {
            self.events.push("end_scope".to_string());
        }
    }

    #[test]
    fn groups_by_scope_in_first_seen_order() {
        let alpha = Arc::new(InstrumentationScope::new("alpha"));
        let beta = Arc::new(InstrumentationScope::new("beta"));

        let mut batch = ScopeGroupedBatch::new(Arc::new(Resource::empty()));
        batch.add(item(&alpha, 1));
        batch.add(item(&beta, 2));
        batch.add(item(&alpha, 3));

        let mut writer = RecordingWriter::default();
        let complete = batch.write_to(
            &mut writer,
            |w, i| w.events.push(format!("item {}", i.value)),
            &CancelToken::none(),
        );

        assert!(complete);
        assert_eq!(
            writer.events,
            vec![
                "begin_batch",
                "begin_scope alpha",
                "item 1",
                "item 3",
                "end_scope",
                "begin_scope beta",
                "item 2",
                "end_scope",
                "end_batch",
            ]
        );
    }

    #[test]
    fn scope_names_merge_case_insensitively() {
        let lower = Arc::new(InstrumentationScope::new("my.lib"));
        let upper = Arc::new(InstrumentationScope::new("My.Lib"));

        let mut batch = ScopeGroupedBatch::new(Arc::new(Resource::empty()));
        batch.add(item(&lower, 1));
        batch.add(item(&upper, 2));

        let mut writer = RecordingWriter::default();
        batch.write_to(
            &mut writer,
            |w, i| w.events.push(format!("item {}", i.value)),
            &CancelToken::none(),
        );

        // One scope block, both items, FIFO.
        assert_eq!(
            writer.events,
            vec!["begin_batch", "begin_scope my.lib", "item 1", "item 2", "end_scope", "end_batch"]
        );
    }

    #[test]
    fn reset_empties_buckets_but_keeps_them() {
        let alpha = Arc::new(InstrumentationScope::new("alpha"));

        let mut batch = ScopeGroupedBatch::new(Arc::new(Resource::empty()));
        batch.add(item(&alpha, 1));
        assert_eq!(batch.len(), 1);

        batch.reset();
        assert!(batch.is_empty());

        // A write after reset emits zero items but still brackets the batch.
        let mut writer = RecordingWriter::default();
        let complete = batch.write_to(&mut writer, |_, _| {}, &CancelToken::none());
        assert!(complete);
        assert_eq!(writer.events, vec!["begin_batch", "end_batch"]);

        // Double reset is harmless.
        batch.reset();
        assert!(batch.is_empty());
    }

    #[test]
    fn cancellation_aborts_between_buckets() {
        let alpha = Arc::new(InstrumentationScope::new("alpha"));

        let mut batch = ScopeGroupedBatch::new(Arc::new(Resource::empty()));
        batch.add(item(&alpha, 1));

        let expired = CancelToken::after(Duration::ZERO);
        let complete = batch.write_to(&mut NoopBatchWriter, |_, _| {}, &expired);
        assert!(!complete);
    }
}
