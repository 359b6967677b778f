//! The task that owns the inner service and drains the batch queue.

use std::time::Duration;

use tokio::sync::mpsc;
use tower::Service;
use tracing::{instrument, trace};

use crate::{error::ServiceError, message::Message, BatchConfig, BatchControl};

/// Runs as a spawned task, owning the only handle to the inner service and
/// serializing every `Item`/`Flush` call through it.
pub(crate) struct Worker<S, Request>
where
    S: Service<BatchControl<Request>>,
{
    inner: S,
    rx: mpsc::Receiver<Message<Request, S::Future>>,
    config: BatchConfig,
    items_since_flush: usize,
    closed: bool,
}

impl<S, Request> Worker<S, Request>
where
    S: Service<BatchControl<Request>>,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    pub(crate) fn new(
        inner: S,
        rx: mpsc::Receiver<Message<Request, S::Future>>,
        config: BatchConfig,
    ) -> Self {
        Worker { inner, rx, config, items_since_flush: 0, closed: false }
    }

    #[instrument(skip(self), name = "batch_worker")]
    pub(crate) async fn run(mut self) {
        loop {
            if self.closed {
                return;
            }
            match tokio::time::timeout(self.next_deadline(), self.rx.recv()).await {
                Ok(Some(message)) => self.handle(message).await,
                Ok(None) => {
                    // The last `Batch` handle was dropped; flush whatever's
                    // outstanding and exit.
                    self.flush().await;
                    return;
                }
                Err(_elapsed) => self.flush().await,
            }
        }
    }

    fn next_deadline(&self) -> Duration {
        if self.items_since_flush == 0 {
            // Nothing queued: there's no latency budget running, so just
            // wait indefinitely for the next item (the outer `timeout` call
            // still needs a concrete value; use a generous ceiling).
            Duration::from_secs(3600)
        } else {
            self.config.max_latency
        }
    }

    async fn handle(&mut self, message: Message<Request, S::Future>) {
        let Message { request, tx, span, _permit } = message;
        let _entered = span.enter();

        if let Err(error) = self.ready().await {
            let _ = tx.send(Err(error));
            return;
        }

        let future = self.inner.call(BatchControl::Item(request));
        self.items_since_flush += 1;
        let _ = tx.send(Ok(future));

        if self.items_since_flush >= self.config.max_items {
            drop(_entered);
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.items_since_flush == 0 {
            return;
        }
        trace!(items = self.items_since_flush, "flushing batch");
        self.items_since_flush = 0;
        if let Err(error) = self.ready().await {
            // Nothing to report the error to: every waiting caller already
            // received its own dispatched future and will see the flush
            // failure when that future resolves via the inner service.
            trace!(%error, "batch flush failed to become ready");
            return;
        }
        let _ = self.inner.call(BatchControl::Flush).await;
    }

    async fn ready(&mut self) -> Result<(), ServiceError> {
        futures::future::poll_fn(|cx| self.inner.poll_ready(cx))
            .await
            .map_err(|e| {
                self.closed = true;
                ServiceError::new(e.into())
            })
    }
}
