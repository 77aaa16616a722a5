// src/blockchain/services/settlement.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use starknet::core::types::Felt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::models::{to_hex, TxStatus};
use crate::provisioning::error::ProvisioningError;

/// Anything that can report how far a transaction got.
#[async_trait]
pub trait TransactionStatusSource: Send + Sync {
    async fn transaction_status(&self, tx_hash: &Felt) -> Result<TxStatus>;
}

/// How to decide the funding transaction is visible before deploying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPolicy {
    /// Sleep unconditionally. Legacy behaviour, and `Duration::ZERO` in tests.
    FixedDelay(Duration),
    /// Ask the node until the transaction is accepted or attempts run out.
    Poll {
        interval: Duration,
        max_attempts: u32,
    },
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        SettlementPolicy::Poll {
            interval: Duration::from_secs(3),
            max_attempts: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ready,
}

/// Holds the pipeline between funding and deployment.
#[derive(Clone)]
pub struct DeploymentWaiter {
    status_source: Arc<dyn TransactionStatusSource>,
}

impl DeploymentWaiter {
    pub fn new(status_source: Arc<dyn TransactionStatusSource>) -> Self {
        Self { status_source }
    }

    pub async fn await_settlement(
        &self,
        tx_hash: &Felt,
        policy: &SettlementPolicy,
        cancel: &CancellationToken,
    ) -> Result<Settlement, ProvisioningError> {
        match *policy {
            SettlementPolicy::FixedDelay(delay) => {
                debug!("Waiting {:?} before deployment", delay);
                sleep_or_cancel(delay, cancel).await?;
                Ok(Settlement::Ready)
            }
            SettlementPolicy::Poll {
                interval,
                max_attempts,
            } => self.poll(tx_hash, interval, max_attempts, cancel).await,
        }
    }

    async fn poll(
        &self,
        tx_hash: &Felt,
        interval: Duration,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<Settlement, ProvisioningError> {
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(ProvisioningError::SettlementCancelled);
            }

            let status = tokio::select! {
                _ = cancel.cancelled() => return Err(ProvisioningError::SettlementCancelled),
                status = self.status_source.transaction_status(tx_hash) => status,
            };

            match status {
                Ok(TxStatus::Accepted) => {
                    info!("Funding tx {} settled after {} attempt(s)", to_hex(tx_hash), attempt);
                    return Ok(Settlement::Ready);
                }
                Ok(TxStatus::Rejected(reason)) => {
                    return Err(ProvisioningError::FundingReverted(reason));
                }
                Ok(TxStatus::Pending) => {
                    debug!("Funding tx {} pending (attempt {}/{})", to_hex(tx_hash), attempt, max_attempts);
                }
                // Node hiccups count as an attempt but do not end the wait.
                Err(e) => {
                    warn!("Status poll {}/{} for {} failed: {}", attempt, max_attempts, to_hex(tx_hash), e);
                }
            }

            if attempt < max_attempts {
                sleep_or_cancel(interval, cancel).await?;
            }
        }

        Err(ProvisioningError::TimedOut {
            attempts: max_attempts,
        })
    }
}

async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), ProvisioningError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProvisioningError::SettlementCancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a script of statuses, repeating the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<TxStatus, String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<Result<TxStatus, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TransactionStatusSource for Scripted {
        async fn transaction_status(&self, _tx_hash: &Felt) -> Result<TxStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            next.map_err(|e| anyhow!(e))
        }
    }

    fn poll(max_attempts: u32) -> SettlementPolicy {
        SettlementPolicy::Poll {
            interval: Duration::from_secs(2),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn zero_fixed_delay_is_ready_without_polling() {
        let source = Scripted::new(vec![Ok(TxStatus::Pending)]);
        let waiter = DeploymentWaiter::new(source.clone());
        let result = waiter
            .await_settlement(&Felt::ONE, &SettlementPolicy::FixedDelay(Duration::ZERO), &CancellationToken::new())
            .await;
        assert_eq!(result, Ok(Settlement::Ready));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_accepted() {
        let source = Scripted::new(vec![
            Ok(TxStatus::Pending),
            Err("connection reset".to_string()),
            Ok(TxStatus::Pending),
            Ok(TxStatus::Accepted),
        ]);
        let waiter = DeploymentWaiter::new(source.clone());
        let result = waiter
            .await_settlement(&Felt::ONE, &poll(10), &CancellationToken::new())
            .await;
        assert_eq!(result, Ok(Settlement::Ready));
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_times_out() {
        let source = Scripted::new(vec![Ok(TxStatus::Pending)]);
        let waiter = DeploymentWaiter::new(source.clone());
        let result = waiter
            .await_settlement(&Felt::ONE, &poll(3), &CancellationToken::new())
            .await;
        assert_eq!(result, Err(ProvisioningError::TimedOut { attempts: 3 }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_funding_stops_the_wait() {
        let source = Scripted::new(vec![
            Ok(TxStatus::Pending),
            Ok(TxStatus::Rejected("insufficient max fee".to_string())),
        ]);
        let waiter = DeploymentWaiter::new(source.clone());
        let result = waiter
            .await_settlement(&Felt::ONE, &poll(10), &CancellationToken::new())
            .await;
        assert_eq!(
            result,
            Err(ProvisioningError::FundingReverted("insufficient max fee".to_string()))
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_fixed_delay() {
        let waiter = DeploymentWaiter::new(Scripted::new(vec![Ok(TxStatus::Pending)]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let result = waiter
            .await_settlement(&Felt::ONE, &SettlementPolicy::FixedDelay(Duration::from_secs(20)), &cancel)
            .await;
        assert_eq!(result, Err(ProvisioningError::SettlementCancelled));
    }

    #[tokio::test]
    async fn already_cancelled_token_never_polls() {
        let source = Scripted::new(vec![Ok(TxStatus::Accepted)]);
        let waiter = DeploymentWaiter::new(source.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = waiter.await_settlement(&Felt::ONE, &poll(5), &cancel).await;
        assert_eq!(result, Err(ProvisioningError::SettlementCancelled));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
