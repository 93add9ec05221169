use crate::invariants::{debug_assert_bounded_count, debug_assert_monotonic};
use crate::Backoff;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This MPSC ring buffer uses per-slot sequence numbers (Vyukov-style bounded
// queue) with a single consumer:
//
// ## Sequence Numbers (ABA Prevention)
//
// `tail` (producer claim cursor) and `head` (consumer cursor) are unbounded
// u64 sequence numbers; the slot index is `sequence & mask`. Each slot carries
// its own sequence word describing which lap it is on:
//
// - `slot.seq == pos`           slot is free for the producer claiming `pos`
// - `slot.seq == pos + 1`       slot holds the item published at `pos`
// - `slot.seq == pos + slots`   slot was consumed and recycled for the next lap
//
// ## Producer protocol (many threads)
//
// 1. Load `tail` (Relaxed) and `head` (Acquire); if `tail - head` has reached
//    the logical capacity the queue is full and the add fails.
// 2. Check `slot.seq == tail` (Acquire), then CAS `tail -> tail + 1` to claim
//    the slot. Losing the CAS means another producer claimed it; retry within
//    the spin budget.
// 3. Write the value, then publish with `slot.seq = tail + 1` (Release).
//
// ## Consumer protocol (one thread)
//
// 1. Load `head` (Relaxed; single writer).
// 2. Wait for `slot.seq == head + 1` (Acquire, pairs with the producer's
//    publish). The caller only invokes `read` when `added > removed`, so this
//    wait only covers the window between a claim and its publish.
// 3. Move the value out, recycle with `slot.seq = head + slots` (Release),
//    then advance `head` (Release, pairs with the producer's full check).
//
// The logical capacity need not be a power of two: the slot array is rounded
// up to one so indexing can mask, while the full check uses the configured
// capacity.
//
// =============================================================================

struct Slot<T> {
    seq: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPSC ring queue with drop-on-full overflow.
///
/// Producers on arbitrary threads call [`try_add`](RingQueue::try_add); a
/// single consumer thread calls [`read`](RingQueue::read). The monotonic
/// [`added_count`](RingQueue::added_count) / [`removed_count`](RingQueue::removed_count)
/// counters never wrap in any realistic run and are readable from any thread
/// without blocking either side; `added - removed` is the current depth and is
/// the basis for "wait until position N has drained" bookkeeping.
pub struct RingQueue<T> {
    /// Producer claim cursor; equals the number of accepted items.
    tail: CachePadded<AtomicU64>,
    /// Consumer cursor; equals the number of consumed items.
    head: CachePadded<AtomicU64>,
    /// Slot storage; length is `capacity` rounded up to a power of two.
    buffer: Box<[Slot<T>]>,
    /// Logical capacity (the configured maximum queue size).
    capacity: usize,
    mask: u64,
}

// Safety: slots are handed between threads through the seq/claim protocol
// above; a slot's value is only touched by the producer that claimed it or by
// the consumer after publication.
unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T> RingQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1");

        let slots = capacity.next_power_of_two();
        let buffer = (0..slots)
            .map(|i| Slot {
                seq: AtomicU64::new(i as u64),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            buffer,
            capacity,
            mask: (slots - 1) as u64,
        }
    }

    /// Returns the logical capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of items ever accepted. Strictly monotonic, lock-free.
    #[inline]
    pub fn added_count(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Total number of items ever consumed. Strictly monotonic, lock-free.
    #[inline]
    pub fn removed_count(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    /// Current number of buffered items.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.saturating_sub(head) as usize
    }

    /// Returns true if no items are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempts to enqueue `item` without blocking.
    ///
    /// Returns `false` (consuming the item) when the queue is full or when
    /// `max_spin_attempts` claim retries were burned on producer contention.
    /// The caller must treat a `false` return as the item having been dropped;
    /// there is nothing to wait on and no error to recover from.
    pub fn try_add(&self, item: T, max_spin_attempts: usize) -> bool {
        let mut backoff = Backoff::new();
        let mut attempts = 0;

        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);

            if tail.wrapping_sub(head) >= self.capacity as u64 {
                // Full: overflow is resolved by dropping, never by waiting.
                return false;
            }

            let slot = &self.buffer[(tail & self.mask) as usize];
            if slot.seq.load(Ordering::Acquire) == tail
                && self
                    .tail
                    .compare_exchange_weak(tail, tail + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                debug_assert_monotonic!("tail", tail, tail + 1);
                debug_assert_bounded_count!((tail + 1).wrapping_sub(head) as usize, self.capacity);

                // SAFETY: the CAS above claimed position `tail` exclusively
                // for this thread; the consumer will not touch the slot until
                // the publish store below, and no other producer can claim the
                // same position.
                unsafe {
                    (*slot.value.get()).write(item);
                }
                slot.seq.store(tail + 1, Ordering::Release);
                return true;
            }

            // Lost the claim race (or saw a slot mid-recycle): retry within
            // the caller's budget.
            attempts += 1;
            if attempts >= max_spin_attempts {
                return false;
            }
            backoff.spin();
        }
    }

    /// Dequeues the next item. Single consumer only.
    ///
    /// The caller must have observed `added_count() > removed_count()` before
    /// calling; `read` then only ever waits out the short window between a
    /// producer's slot claim and its publish.
    pub fn read(&self) -> T {
        let head = self.head.load(Ordering::Relaxed);
        debug_assert!(
            self.tail.load(Ordering::Acquire) > head,
            "read called on an empty queue"
        );

        let slot = &self.buffer[(head & self.mask) as usize];
        let mut backoff = Backoff::new();
        while slot.seq.load(Ordering::Acquire) != head + 1 {
            // Producer claimed this slot but has not published yet.
            backoff.spin();
        }

        // SAFETY: seq == head + 1 means the producer's publish store happened
        // (Acquire pairs with its Release), the slot is initialized, and only
        // this consumer thread reads position `head`.
        let item = unsafe { (*slot.value.get()).assume_init_read() };

        // Recycle the slot for the next lap before exposing the new head.
        slot.seq
            .store(head + self.buffer.len() as u64, Ordering::Release);

        debug_assert_monotonic!("head", head, head + 1);
        self.head.store(head + 1, Ordering::Release);

        item
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        // Drop all published-but-unconsumed items. With exclusive access there
        // can be no claimed-but-unpublished slot.
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        for pos in head..tail {
            let slot = &mut self.buffer[(pos & self.mask) as usize];
            unsafe {
                ptr::drop_in_place((*slot.value.get()).as_mut_ptr());
            }
        }
    }
}
