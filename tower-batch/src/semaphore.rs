//! A bounded admission gate: `Batch::poll_ready` reserves one permit per
//! clone of `Batch`, so the number of requests outstanding between
//! `poll_ready` and the worker picking them up is bounded independent of how
//! many `Batch` handles exist.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::PollSemaphore;

/// A permit proving its holder was admitted through the bound. Held inside
/// [`crate::message::Message`] and dropped once the worker picks the
/// message up, freeing a slot for the next caller.
#[derive(Debug)]
pub(crate) struct Permit(#[allow(dead_code)] pub(crate) OwnedSemaphorePermit);

pub(crate) fn new(bound: usize) -> PollSemaphore {
    PollSemaphore::new(Arc::new(Semaphore::new(bound)))
}
