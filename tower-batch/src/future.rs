//! The future returned by [`Batch::call`](crate::Batch::call).

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tokio::sync::oneshot;

use crate::{error::ServiceError, message::Rx};

/// A two-stage future: first it waits for the worker to hand back the inner
/// service's own future (proving the request was accepted and dispatched),
/// then it waits for that future to resolve into the actual response.
#[pin_project]
#[derive(Debug)]
pub struct ResponseFuture<Fut> {
    #[pin]
    state: State<Fut>,
}

#[pin_project(project = StateProj)]
#[derive(Debug)]
enum State<Fut> {
    Waiting(#[pin] Rx<Fut>),
    Dispatched(#[pin] Fut),
    Failed(Option<ServiceError>),
}

impl<Fut> ResponseFuture<Fut> {
    pub(crate) fn new(rx: Rx<Fut>) -> Self {
        ResponseFuture { state: State::Waiting(rx) }
    }

    pub(crate) fn failed(error: ServiceError) -> Self {
        ResponseFuture { state: State::Failed(Some(error)) }
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    ServiceError: Into<E>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.state.as_mut().project() {
                StateProj::Waiting(rx) => match rx.poll(cx) {
                    Poll::Ready(Ok(Ok(fut))) => this.state.set(State::Dispatched(fut)),
                    Poll::Ready(Ok(Err(error))) => return Poll::Ready(Err(error.into())),
                    Poll::Ready(Err(oneshot::error::RecvError { .. })) => {
                        return Poll::Ready(Err(ServiceError::new(Box::new(crate::Closed(()))).into()))
                    }
                    Poll::Pending => return Poll::Pending,
                },
                StateProj::Dispatched(fut) => return fut.poll(cx),
                StateProj::Failed(error) => {
                    return Poll::Ready(Err(error.take().expect("polled after completion").into()))
                }
            }
        }
    }
}
