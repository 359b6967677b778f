//! Errors produced by [`Batch`](crate::Batch) and its background worker.

use std::{fmt, sync::Arc};

/// An error produced by a `Batch` service, wrapping either the inner
/// service's error or the fact that the batch worker closed early.
///
/// Cloneable (behind an `Arc`) so the same failure can be reported to every
/// request the closed worker was still holding.
#[derive(Debug, Clone)]
pub struct ServiceError {
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl ServiceError {
    pub(crate) fn new(inner: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        ServiceError { inner: Arc::from(inner) }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch worker error: {}", self.inner)
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}

/// The worker task failed to accept a request because it is no longer running.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Closed(pub(crate) ());

impl fmt::Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch worker closed")
    }
}

impl std::error::Error for Closed {}
