//! Ledger Adapter - external value-transfer primitive
//!
//! The engine never moves funds itself; it asks a `LedgerAdapter` to transfer
//! an amount to a recipient. A transfer is atomic: it either fully succeeds or
//! fully fails, never partially. The engine treats a reported failure as
//! grounds to roll back the whole triggering operation.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;

/// Failure reported by the underlying value-transfer substrate
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct LedgerError(pub String);

/// External transfer seam invoked when a transition releases or refunds value
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Attempt an atomic transfer of `amount` to `recipient`
    async fn pay(&self, recipient: &str, amount: u64) -> Result<(), LedgerError>;
}

/// In-memory ledger that records successful payouts
///
/// Stands in for the real value-transfer substrate in tests and demos. It can
/// be armed to fail the next transfer, which is how payment-failure rollback
/// paths get exercised.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    payouts: Mutex<Vec<(String, u64)>>,
    fail_next: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `pay` call report failure
    pub fn fail_next_transfer(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Successful payouts so far, in order
    pub async fn payouts(&self) -> Vec<(String, u64)> {
        self.payouts.lock().await.clone()
    }

    /// Total amount paid to `recipient` so far
    pub async fn balance_of(&self, recipient: &str) -> u64 {
        self.payouts
            .lock()
            .await
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, amount)| amount)
            .sum()
    }
}

#[async_trait]
impl LedgerAdapter for InMemoryLedger {
    async fn pay(&self, recipient: &str, amount: u64) -> Result<(), LedgerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(LedgerError("transfer rejected".to_string()));
        }

        self.payouts
            .lock()
            .await
            .push((recipient.to_string(), amount));

        info!("Ledger transfer: {} -> {}", amount, recipient);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_payouts_in_order() {
        let ledger = InMemoryLedger::new();
        ledger.pay("alice", 30).await.unwrap();
        ledger.pay("bob", 20).await.unwrap();
        ledger.pay("alice", 10).await.unwrap();

        assert_eq!(
            ledger.payouts().await,
            vec![
                ("alice".to_string(), 30),
                ("bob".to_string(), 20),
                ("alice".to_string(), 10)
            ]
        );
        assert_eq!(ledger.balance_of("alice").await, 40);
    }

    #[tokio::test]
    async fn armed_failure_hits_exactly_once() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next_transfer();

        assert!(ledger.pay("alice", 5).await.is_err());
        assert!(ledger.pay("alice", 5).await.is_ok());
        assert_eq!(ledger.balance_of("alice").await, 5);
    }
}
