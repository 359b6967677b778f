//! Concurrent script verification for a block's inputs.
//!
//! Built on `tower-batch` to dispatch a block's input checks without an
//! `await` per input blocking the next one, and `tower-fallback` to retry
//! synchronously, in the caller's own task, if the batch worker itself is
//! unavailable (never if a script was legitimately rejected -- that's not
//! an infrastructure failure and retrying it would just reject it again).

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tower::{Service, ServiceExt};
use tower_batch::{Batch, BatchConfig, BatchControl};
use tower_fallback::{Fallback, Predicate};

use crw_chain::{
    amount::{Amount, NonNegative},
    transaction::Transaction,
};
use crw_script::{Flags, ScriptError};

/// One input's script check, carrying everything [`crw_script::verify`] needs.
#[derive(Clone)]
pub struct ScriptVerifyRequest {
    pub spent_script: Arc<Vec<u8>>,
    pub amount: Amount<NonNegative>,
    pub tx: Arc<Transaction>,
    pub input_index: usize,
    pub flags: Flags,
}

/// Either the script was rejected, or the batch worker running it is gone.
#[derive(Clone, Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("script verification worker unavailable: {0}")]
    Batch(String),
}

impl From<tower_batch::ServiceError> for VerifyError {
    fn from(error: tower_batch::ServiceError) -> Self {
        VerifyError::Batch(error.to_string())
    }
}

fn run(request: &ScriptVerifyRequest) -> Result<(), ScriptError> {
    crw_script::verify(&request.spent_script, request.amount, &request.tx, request.input_index, request.flags)
}

/// Only fall back on a worker-availability error, never a genuine script
/// rejection.
#[derive(Clone, Copy, Debug, Default)]
struct BatchErrorsOnly;

impl Predicate<VerifyError> for BatchErrorsOnly {
    fn should_fallback(&self, error: &VerifyError) -> bool {
        matches!(error, VerifyError::Batch(_))
    }
}

type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), VerifyError>> + Send>>;

/// The `tower-batch` inner service: every `Item` is handed to the blocking
/// thread pool immediately, so the worker moves on to the next input in the
/// block without waiting for this one's secp256k1 check to finish. `Flush`
/// is a no-op: unlike curve-based batch signature schemes, ECDSA here has
/// no combined-verification step to trigger, so the concurrency comes
/// entirely from dispatch, not from accumulation.
#[derive(Clone, Default)]
struct Dispatcher;

impl Service<BatchControl<ScriptVerifyRequest>> for Dispatcher {
    type Response = ();
    type Error = VerifyError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: BatchControl<ScriptVerifyRequest>) -> Self::Future {
        match request {
            BatchControl::Item(request) => Box::pin(async move {
                tokio::task::spawn_blocking(move || run(&request).map_err(VerifyError::from))
                    .await
                    .expect("script verification task should not panic")
            }),
            BatchControl::Flush => Box::pin(async { Ok(()) }),
        }
    }
}

/// A `Service<ScriptVerifyRequest>` the chain engine calls once per
/// non-coinbase input; cheap to `Clone`, so every `add_block` call can hand
/// out its own handle without contending on a shared `&mut`.
#[derive(Clone)]
pub struct Verifier {
    inner: Fallback<Batch<ScriptVerifyRequest, DispatchFuture>, tower::util::BoxCloneService<ScriptVerifyRequest, (), VerifyError>, BatchErrorsOnly>,
}

impl Verifier {
    pub fn new(config: BatchConfig) -> Self {
        let batch = Batch::new(Dispatcher::default(), config);
        let sequential = tower::service_fn(|request: ScriptVerifyRequest| async move {
            run(&request).map_err(VerifyError::from)
        });
        let sequential = tower::util::BoxCloneService::new(sequential);
        Verifier { inner: Fallback::with_predicate(batch, sequential, BatchErrorsOnly) }
    }

    /// Verifies every non-coinbase input's script concurrently, returning
    /// the first failure encountered (if any); used by the chain engine's
    /// full validation step.
    pub async fn verify_all(&self, requests: Vec<ScriptVerifyRequest>) -> Result<(), VerifyError> {
        let mut checks = Vec::with_capacity(requests.len());
        for request in requests {
            let mut verifier = self.clone();
            checks.push(async move { verifier.inner.ready().await?.call(request).await });
        }
        futures::future::try_join_all(checks).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crw_chain::{block::Height, transaction::LockTime};

    fn empty_tx() -> Transaction {
        Transaction::new(1, Vec::new(), Vec::new(), LockTime::new_height(Height(0)))
    }

    #[tokio::test]
    async fn rejects_without_retrying_the_fallback() {
        crw_test::init();
        let verifier = Verifier::new(BatchConfig::default());
        let request = ScriptVerifyRequest {
            spent_script: Arc::new(vec![crw_script::opcode::OP_1]),
            amount: Amount::<NonNegative>::zero(),
            tx: Arc::new(empty_tx()),
            input_index: 0,
            flags: Flags::NONE,
        };

        let error = verifier.verify_all(vec![request]).await.unwrap_err();
        assert!(matches!(error, VerifyError::Script(_)));
    }
}
