//! Replays a scripted sequence of requests against a [`tower::Service`] and
//! checks each response against an expectation, for testing the `tower`
//! services this workspace builds (batch verification, fallback, peer
//! sessions) without standing up real I/O.

use std::fmt::Debug;

use tower::Service;

/// One step of a [`Transcript`]: send `request`, then check the response
/// against `expectation`.
pub struct TranscriptEntry<Request, Response> {
    pub request: Request,
    pub expectation: Expectation<Response>,
}

/// What a [`TranscriptEntry`] expects the service to return.
pub enum Expectation<Response> {
    /// The call must succeed, and the response must satisfy the predicate.
    Exact(Box<dyn Fn(&Response) -> bool>),
    /// The call must fail.
    Error,
}

impl<Response> Expectation<Response> {
    pub fn exact(predicate: impl Fn(&Response) -> bool + 'static) -> Self {
        Expectation::Exact(Box::new(predicate))
    }
}

/// A sequence of request/expectation pairs driven through a service in order.
pub struct Transcript<Request, Response> {
    entries: Vec<TranscriptEntry<Request, Response>>,
}

impl<Request, Response> Transcript<Request, Response> {
    pub fn new(entries: Vec<TranscriptEntry<Request, Response>>) -> Self {
        Transcript { entries }
    }

    /// Drives every entry through `service` in order, panicking with the
    /// request index on the first mismatch.
    pub async fn run<S>(self, mut service: S)
    where
        S: Service<Request, Response = Response>,
        S::Error: Debug,
        Request: Clone,
    {
        for (index, entry) in self.entries.into_iter().enumerate() {
            let result = futures::future::poll_fn(|cx| service.poll_ready(cx))
                .await
                .map_err(|e| format!("{:?}", e))
                .and_then(|()| Ok(()));
            result.unwrap_or_else(|e| panic!("entry {}: service not ready: {}", index, e));

            let response = service.call(entry.request).await;
            match entry.expectation {
                Expectation::Exact(predicate) => {
                    let response = response
                        .unwrap_or_else(|e| panic!("entry {}: expected Ok, got Err({:?})", index, e));
                    assert!(predicate(&response), "entry {}: response did not match expectation", index);
                }
                Expectation::Error => {
                    assert!(response.is_err(), "entry {}: expected Err, got Ok", index);
                }
            }
        }
    }
}
