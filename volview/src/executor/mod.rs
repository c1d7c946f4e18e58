//! Background loading: the priority queue of pending tile loads and the worker
//! pool that drains it.
//!
//! Requests are served most urgent first (lowest [`Priority`] value), FIFO within a
//! priority, and are deduplicated per tile coordinate. Pending requests can be
//! cancelled individually or in bulk; loads already executing always finish.

mod daemon;
mod policy;
mod queue;

pub use daemon::{
    LoadOutcome, LoadScheduler, LoadTarget, RequestQueue, SchedulerConfig,
    DEFAULT_WORKER_THREADS,
};
pub use policy::Priority;
pub use queue::{LoadQueue, PushOutcome, QueuedLoad};
