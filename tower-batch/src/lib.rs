//! Batches many independent verification requests into fewer calls to an
//! inner `tower::Service`, so a block's inputs can be checked concurrently
//! instead of one at a time.
//!
//! This crate is a fork of `tower::buffer`: it keeps buffer's worker-task
//! architecture (a bounded mpsc channel feeding a single task that owns the
//! inner service) but drives the inner service with [`BatchControl`] instead
//! of the bare request, so the service itself decides what "flush" means --
//! for script verification that's draining an accumulated batch of
//! signature checks.

mod error;
mod future;
mod message;
mod semaphore;
mod service;
mod worker;

pub use error::{Closed, ServiceError};
pub use future::ResponseFuture;
pub use service::Batch;

use std::time::Duration;

/// The request type an inner `Service<BatchControl<Request>>` receives.
#[derive(Debug)]
pub enum BatchControl<Request> {
    /// One unit of work to add to the current batch.
    Item(Request),
    /// Flush the current batch now, regardless of how full it is.
    Flush,
}

/// Tuning knobs for when [`Batch`] flushes the items it has accumulated.
#[derive(Clone, Copy, Debug)]
pub struct BatchConfig {
    /// Flush once this many items have been queued since the last flush.
    pub max_items: usize,
    /// Flush at most this long after the first item in a new batch arrived,
    /// even if `max_items` hasn't been reached.
    pub max_latency: Duration,
    /// Maximum number of requests the worker's channel will buffer before
    /// callers start waiting for capacity.
    pub bound: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { max_items: 128, max_latency: Duration::from_millis(1), bound: 512 }
    }
}
