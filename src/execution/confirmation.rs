use async_trait::async_trait;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::AppResult;

/// Chain-reported status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTxStatus {
    /// Chain-level execution error, if the transaction was rejected
    pub err: Option<String>,
    pub finalized: bool,
}

/// Anything that can look up a signature's status. Implementations are
/// expected to route the lookup through the resilient RPC layer.
#[async_trait]
pub trait SignatureStatusSource: Send + Sync {
    async fn signature_status(&self, signature: &Signature) -> AppResult<Option<ChainTxStatus>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Failed { reason: String },
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// Fixed-interval poller waiting for a transaction to reach finality
pub struct ConfirmationPoller<S: ?Sized> {
    source: Arc<S>,
    policy: ConfirmationPolicy,
}

impl<S: SignatureStatusSource + ?Sized> ConfirmationPoller<S> {
    pub fn new(source: Arc<S>, policy: ConfirmationPolicy) -> Self {
        Self { source, policy }
    }

    /// Poll until the transaction is finalized, rejected, or the attempt
    /// ceiling is reached. Cancellation is checked before every attempt.
    #[instrument(skip_all, fields(signature = %signature))]
    pub async fn confirm(
        &self,
        signature: &Signature,
        cancel: &watch::Receiver<bool>,
    ) -> ConfirmationOutcome {
        for attempt in 1..=self.policy.max_attempts {
            if *cancel.borrow() {
                info!(attempt, "Confirmation polling cancelled");
                return ConfirmationOutcome::Cancelled;
            }

            match self.source.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(reason) = status.err {
                        warn!(%reason, "Transaction failed on chain");
                        return ConfirmationOutcome::Failed { reason };
                    }
                    if status.finalized {
                        info!(attempt, "Transaction finalized");
                        return ConfirmationOutcome::Confirmed;
                    }
                    debug!(attempt, "Transaction not yet finalized");
                }
                Ok(None) => debug!(attempt, "Transaction status not yet available"),
                Err(e) => warn!(attempt, error = %e, "Failed to get signature status"),
            }

            tokio::time::sleep(self.policy.interval).await;
        }

        warn!(
            attempts = self.policy.max_attempts,
            "Transaction not confirmed before deadline"
        );
        ConfirmationOutcome::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, RpcError};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    struct ScriptedStatus {
        start: Instant,
        calls: Mutex<Vec<Duration>>,
        script: Mutex<Vec<AppResult<Option<ChainTxStatus>>>>,
    }

    impl ScriptedStatus {
        fn new(mut script: Vec<AppResult<Option<ChainTxStatus>>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                start: Instant::now(),
                calls: Mutex::new(Vec::new()),
                script: Mutex::new(script),
            })
        }
    }

    #[async_trait]
    impl SignatureStatusSource for ScriptedStatus {
        async fn signature_status(&self, _: &Signature) -> AppResult<Option<ChainTxStatus>> {
            self.calls.lock().push(self.start.elapsed());
            self.script.lock().pop().unwrap_or_else(|| {
                Ok(Some(ChainTxStatus {
                    err: None,
                    finalized: false,
                }))
            })
        }
    }

    fn pending() -> AppResult<Option<ChainTxStatus>> {
        Ok(Some(ChainTxStatus {
            err: None,
            finalized: false,
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_times_out_after_thirty_attempts() {
        let source = ScriptedStatus::new(vec![]);
        let poller = ConfirmationPoller::new(source.clone(), ConfirmationPolicy::default());
        let (_tx, cancel) = watch::channel(false);

        let outcome = poller.confirm(&Signature::default(), &cancel).await;

        assert_eq!(outcome, ConfirmationOutcome::TimedOut);
        let calls = source.calls.lock().clone();
        assert_eq!(calls.len(), 30);
        for (i, at) in calls.iter().enumerate() {
            assert_eq!(*at, Duration::from_secs(2 * i as u64));
        }
        assert_eq!(source.start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn finalized_status_confirms() {
        let source = ScriptedStatus::new(vec![
            Ok(None),
            pending(),
            Ok(Some(ChainTxStatus {
                err: None,
                finalized: true,
            })),
        ]);
        let poller = ConfirmationPoller::new(source.clone(), ConfirmationPolicy::default());
        let (_tx, cancel) = watch::channel(false);

        let outcome = poller.confirm(&Signature::default(), &cancel).await;

        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(source.calls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_error_is_terminal_failure() {
        let source = ScriptedStatus::new(vec![Ok(Some(ChainTxStatus {
            err: Some("InstructionError(0, Custom(6001))".to_string()),
            finalized: false,
        }))]);
        let poller = ConfirmationPoller::new(source, ConfirmationPolicy::default());
        let (_tx, cancel) = watch::channel(false);

        let outcome = poller.confirm(&Signature::default(), &cancel).await;

        assert_eq!(
            outcome,
            ConfirmationOutcome::Failed {
                reason: "InstructionError(0, Custom(6001))".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn query_errors_keep_polling() {
        let exhausted = || {
            Err(AppError::Rpc(RpcError::ExecutionExhausted {
                attempts: 3,
                last_error: "timeout".to_string(),
            }))
        };
        let source = ScriptedStatus::new(vec![
            exhausted(),
            exhausted(),
            Ok(Some(ChainTxStatus {
                err: None,
                finalized: true,
            })),
        ]);
        let poller = ConfirmationPoller::new(source.clone(), ConfirmationPolicy::default());
        let (_tx, cancel) = watch::channel(false);

        let outcome = poller.confirm(&Signature::default(), &cancel).await;

        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(source.calls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_honored_at_poll_boundary() {
        let source = ScriptedStatus::new(vec![]);
        let poller = ConfirmationPoller::new(source.clone(), ConfirmationPolicy::default());
        let (tx, cancel) = watch::channel(false);

        let handle =
            tokio::spawn(async move { poller.confirm(&Signature::default(), &cancel).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send_replace(true);

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Cancelled);
        // Attempts at 0s, 2s and 4s ran; the 6s boundary saw the signal
        assert_eq!(source.calls.lock().len(), 3);
    }
}
