//! The `Batch` handle callers actually hold and clone.

use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::PollSemaphore;
use tower::Service;

use crate::{
    error::{Closed, ServiceError},
    future::ResponseFuture,
    message::Message,
    semaphore::Permit,
    worker::Worker,
    BatchConfig, BatchControl,
};

/// A `Service` that sends requests to a batching worker task, which drives
/// an inner `Service<BatchControl<Request>>` and decides when to flush.
///
/// Cloning a `Batch` is cheap: every clone shares the same worker task and
/// admission semaphore, each with its own reservation slot.
pub struct Batch<Request, Fut> {
    tx: mpsc::Sender<Message<Request, Fut>>,
    semaphore: PollSemaphore,
    permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl<Request, Fut> Clone for Batch<Request, Fut> {
    fn clone(&self) -> Self {
        Batch { tx: self.tx.clone(), semaphore: self.semaphore.clone(), permit: None }
    }
}

impl<Request, Fut> Batch<Request, Fut> {
    /// Spawns a worker task wrapping `service` and returns a handle to it.
    ///
    /// Requires a `tokio` runtime to be active, since the worker is spawned
    /// with `tokio::spawn`.
    pub fn new<S>(service: S, config: BatchConfig) -> Self
    where
        S: Service<BatchControl<Request>, Future = Fut> + Send + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
        Request: Send + 'static,
        Fut: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.bound);
        let semaphore = crate::semaphore::new(config.bound);
        let worker = Worker::new(service, rx, config);
        tokio::spawn(worker.run());
        Batch { tx, semaphore, permit: None }
    }
}

impl<Request, Fut, T, E> Service<Request> for Batch<Request, Fut>
where
    Fut: std::future::Future<Output = Result<T, E>>,
    E: From<ServiceError>,
{
    type Response = T;
    type Error = E;
    type Future = ResponseFuture<Fut>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.permit.is_some() {
            return Poll::Ready(Ok(()));
        }
        match self.semaphore.poll_acquire(cx) {
            Poll::Ready(Some(permit)) => {
                self.permit = Some(permit);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(None) => Poll::Ready(Err(ServiceError::new(Box::new(Closed(()))).into())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let permit = self.permit.take().expect("poll_ready must be called and return Ready before call");
        let (tx, rx) = oneshot::channel();
        let span = tracing::Span::current();
        let message = Message { request, tx, span, _permit: Permit(permit) };

        match self.tx.try_send(message) {
            Ok(()) => ResponseFuture::new(rx),
            Err(_) => ResponseFuture::failed(ServiceError::new(Box::new(Closed(())))),
        }
    }
}
