//! Background baseline loading with a single worker.
//!
//! Goals:
//! - single-flight per request key (equal requests are never queued twice)
//! - strict FIFO execution, one request at a time, globally
//! - blocking loads confined to the blocking pool, results handed back
//!   synchronously through the backend
//! - drain callbacks for "run this once the queue is fully empty"
//!
//! The queue deliberately bounds background I/O concurrency to one: a single
//! writer keeps consistency reasoning trivial at the cost of refresh
//! throughput.

mod queue;

pub use queue::{LoadStatus, LoaderBackend, SingleThreadLoader};
