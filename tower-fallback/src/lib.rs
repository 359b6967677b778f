//! A `tower::Service` middleware that retries a failed call against a
//! secondary service.
//!
//! Used to fall back from batch script verification to sequential
//! per-input verification when a batch fails: a batch failure only says
//! *one of* the items in it was invalid, not which one, so the fallback
//! service re-checks every item individually to find the culprit.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tower::Service;

/// Decides whether a primary-service error is worth retrying against the
/// fallback, or should just be returned as-is.
pub trait Predicate<E> {
    fn should_fallback(&self, error: &E) -> bool;
}

/// A predicate that falls back on every error.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysFallback;

impl<E> Predicate<E> for AlwaysFallback {
    fn should_fallback(&self, _error: &E) -> bool {
        true
    }
}

impl<E, F: Fn(&E) -> bool> Predicate<E> for F {
    fn should_fallback(&self, error: &E) -> bool {
        self(error)
    }
}

/// Wraps a `primary` and `secondary` service; calls go to `primary` first,
/// and are retried against `secondary` if `primary` fails and `predicate`
/// says the error is worth retrying.
#[derive(Clone, Debug)]
pub struct Fallback<P, S, Predicate> {
    primary: P,
    secondary: S,
    predicate: Predicate,
}

impl<P, S> Fallback<P, S, AlwaysFallback> {
    pub fn new(primary: P, secondary: S) -> Self {
        Fallback { primary, secondary, predicate: AlwaysFallback }
    }
}

impl<P, S, Pred> Fallback<P, S, Pred> {
    pub fn with_predicate(primary: P, secondary: S, predicate: Pred) -> Self {
        Fallback { primary, secondary, predicate }
    }
}

impl<P, S, Pred, Request> Service<Request> for Fallback<P, S, Pred>
where
    Request: Clone,
    P: Service<Request> + Clone,
    S: Service<Request, Response = P::Response> + Clone,
    S::Error: From<P::Error>,
    Pred: Predicate<P::Error> + Clone,
{
    type Response = P::Response;
    type Error = S::Error;
    type Future = ResponseFuture<P, S, Pred, Request>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The primary service gates readiness; if it's never ready we never
        // get the chance to discover whether we need the fallback, which
        // matches this middleware's only intended use (two equally-capable
        // verifiers, not a primary/backup pair with different availability).
        match self.primary.poll_ready(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
            // A primary not-ready-due-to-error still lets us try; the error
            // will surface again from `call` and trigger the fallback path.
            Poll::Ready(Err(_)) => Poll::Ready(Ok(())),
        }
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let cloned_request = request.clone();
        ResponseFuture {
            state: State::Primary(self.primary.call(request)),
            secondary: self.secondary.clone(),
            predicate: self.predicate.clone(),
            request: Some(cloned_request),
        }
    }
}

/// The future returned by [`Fallback::call`].
#[pin_project]
pub struct ResponseFuture<P, S, Pred, Request>
where
    P: Service<Request>,
    S: Service<Request>,
{
    #[pin]
    state: State<P::Future, S::Future>,
    secondary: S,
    predicate: Pred,
    request: Option<Request>,
}

#[pin_project(project = StateProj)]
enum State<PF, SF> {
    Primary(#[pin] PF),
    Secondary(#[pin] SF),
}

impl<P, S, Pred, Request> Future for ResponseFuture<P, S, Pred, Request>
where
    Request: Clone,
    P: Service<Request>,
    S: Service<Request, Response = P::Response>,
    S::Error: From<P::Error>,
    Pred: Predicate<P::Error>,
{
    type Output = Result<S::Response, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.state.as_mut().project() {
                StateProj::Primary(fut) => match fut.poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(response)) => return Poll::Ready(Ok(response)),
                    Poll::Ready(Err(error)) => {
                        if !this.predicate.should_fallback(&error) {
                            return Poll::Ready(Err(error.into()));
                        }
                        let request = this.request.take().expect("call sets request exactly once");
                        let future = this.secondary.call(request);
                        this.state.set(State::Secondary(future));
                    }
                },
                StateProj::Secondary(fut) => return fut.poll(cx),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::service_fn;

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        crw_test::init();
        let primary = service_fn(|req: u32| async move { Ok::<_, Infallible>(req + 1) });
        let secondary = service_fn(|_req: u32| async move { Ok::<_, Infallible>(999) });
        let mut fallback = Fallback::new(primary, secondary);

        let response = fallback.call(41).await.unwrap();
        assert_eq!(response, 42);
    }

    #[tokio::test]
    async fn primary_failure_retries_secondary() {
        crw_test::init();
        let primary = service_fn(|_req: u32| async move { Err::<u32, _>("primary failed") });
        let secondary = service_fn(|req: u32| async move { Ok::<_, &'static str>(req * 2) });
        let mut fallback = Fallback::new(primary, secondary);

        let response = fallback.call(21).await.unwrap();
        assert_eq!(response, 42);
    }
}
