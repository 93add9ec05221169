//! RingQueue - Bounded Multi-Producer Single-Consumer Telemetry Queue
//!
//! A fixed-capacity MPSC ring buffer built for telemetry buffering: producers
//! on arbitrary threads claim slots with a bounded CAS loop and *drop* the item
//! when the queue is full or the spin budget runs out, so an enqueue can never
//! block or allocate. A single consumer drains items one at a time, gated by
//! the queue's monotonic `added`/`removed` counters.
//!
//! # Key Features
//!
//! - Per-slot sequence numbers (unbounded u64, no ABA)
//! - Cache-padded hot fields (producer/consumer cursors on separate lines)
//! - Drop-on-full overflow with a caller-supplied spin budget
//! - Lock-free counter reads for depth/flush bookkeeping
//!
//! # Example
//!
//! ```
//! use ringqueue::RingQueue;
//!
//! let queue = RingQueue::new(8);
//!
//! assert!(queue.try_add("hello", 100));
//! assert!(queue.try_add("world", 100));
//!
//! // Consumer side: read exactly `added - removed` items.
//! while queue.removed_count() < queue.added_count() {
//!     let item = queue.read();
//!     println!("{item}");
//! }
//! ```

mod backoff;
mod invariants;
mod queue;

pub use backoff::Backoff;
pub use queue::RingQueue;
