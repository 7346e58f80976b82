//! Balance ledger: the single point where money state changes.
//!
//! Every mutation flows through `apply_delta` with a caller-supplied
//! idempotency key. Replaying a key returns the previously recorded result
//! without reapplying the delta, which is what makes settlement safe to retry
//! after a crash between debit/credit and acknowledgment. Entries are
//! append-only and each carries the balance that resulted from it, so the
//! whole account reconciles by summation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Deposit,
    Bet,
    Payout,
    Refund,
}

/// Append-only ledger entry. Never edited after the fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Idempotency key; doubles as the entry id.
    pub entry_id: String,
    pub user_id: String,
    pub delta: Decimal,
    pub reason: LedgerReason,
    pub related_game_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resulting_balance: Decimal,
}

/// Boundary contract for balance mutation. Implementations must be
/// linearizable per user: in a multi-instance deployment that means key-level
/// locking in the backing store, not merely an in-process lock.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Apply a signed delta. Replaying `idempotency_key` returns the balance
    /// recorded by the first application. Negative-driving debits fail with
    /// `InsufficientFunds` and leave the account untouched.
    async fn apply_delta(
        &self,
        user_id: &str,
        delta: Decimal,
        idempotency_key: &str,
        reason: LedgerReason,
        related_game_id: Option<Uuid>,
    ) -> EngineResult<Decimal>;

    async fn balance(&self, user_id: &str) -> Decimal;

    /// Full entry history for one user, in application order.
    async fn entries(&self, user_id: &str) -> Vec<LedgerEntry>;

    /// Seed an account with a positive amount. Each call gets a fresh key,
    /// so deposits are never deduplicated against each other.
    async fn deposit(&self, user_id: &str, amount: Decimal) -> EngineResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "deposit amount {} must be positive",
                amount
            )));
        }
        self.apply_delta(
            user_id,
            amount,
            &format!("deposit:{}", Uuid::new_v4()),
            LedgerReason::Deposit,
            None,
        )
        .await
    }
}

#[derive(Default)]
struct Account {
    balance: Decimal,
    entries: Vec<LedgerEntry>,
    /// idempotency key -> resulting balance recorded at first application.
    applied: HashMap<String, Decimal>,
}

/// In-memory ledger, linearizable per user via a per-account async mutex.
#[derive(Default)]
pub struct MemoryLedger {
    accounts: DashMap<String, Arc<Mutex<Account>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self, user_id: &str) -> Arc<Mutex<Account>> {
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Account::default())))
            .clone()
    }
}

#[async_trait]
impl BalanceLedger for MemoryLedger {
    async fn apply_delta(
        &self,
        user_id: &str,
        delta: Decimal,
        idempotency_key: &str,
        reason: LedgerReason,
        related_game_id: Option<Uuid>,
    ) -> EngineResult<Decimal> {
        let account = self.account(user_id);
        let mut account = account.lock().await;

        // Replay: return the recorded result, do not reapply.
        if let Some(&recorded) = account.applied.get(idempotency_key) {
            tracing::debug!(user_id, idempotency_key, "ledger replay, delta skipped");
            return Ok(recorded);
        }

        let next = account.balance + delta;
        if next < Decimal::ZERO {
            return Err(EngineError::InsufficientFunds {
                balance: account.balance,
                required: -delta,
            });
        }

        account.balance = next;
        account
            .applied
            .insert(idempotency_key.to_string(), next);
        account.entries.push(LedgerEntry {
            entry_id: idempotency_key.to_string(),
            user_id: user_id.to_string(),
            delta,
            reason,
            related_game_id,
            created_at: Utc::now(),
            resulting_balance: next,
        });
        Ok(next)
    }

    async fn balance(&self, user_id: &str) -> Decimal {
        match self.accounts.get(user_id) {
            Some(account) => account.lock().await.balance,
            None => Decimal::ZERO,
        }
    }

    async fn entries(&self, user_id: &str) -> Vec<LedgerEntry> {
        match self.accounts.get(user_id) {
            Some(account) => account.lock().await.entries.clone(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn deltas_chain_resulting_balances() {
        let ledger = MemoryLedger::new();
        ledger.deposit("alice", dec("100.00")).await.unwrap();
        ledger
            .apply_delta("alice", dec("-10.00"), "g1:bet", LedgerReason::Bet, None)
            .await
            .unwrap();
        ledger
            .apply_delta("alice", dec("19.97"), "g1:settle", LedgerReason::Payout, None)
            .await
            .unwrap();

        let entries = ledger.entries("alice").await;
        assert_eq!(entries.len(), 3);
        let mut running = Decimal::ZERO;
        for entry in &entries {
            running += entry.delta;
            assert_eq!(entry.resulting_balance, running);
        }
        assert_eq!(ledger.balance("alice").await, dec("109.97"));
    }

    #[tokio::test]
    async fn replayed_key_applies_once() {
        let ledger = MemoryLedger::new();
        ledger.deposit("bob", dec("50.00")).await.unwrap();

        let first = ledger
            .apply_delta("bob", dec("-5.00"), "g2:bet", LedgerReason::Bet, None)
            .await
            .unwrap();
        let replay = ledger
            .apply_delta("bob", dec("-5.00"), "g2:bet", LedgerReason::Bet, None)
            .await
            .unwrap();

        assert_eq!(first, replay);
        assert_eq!(ledger.balance("bob").await, dec("45.00"));
        assert_eq!(ledger.entries("bob").await.len(), 2, "deposit + one bet");
    }

    #[tokio::test]
    async fn negative_driving_debit_rejected() {
        let ledger = MemoryLedger::new();
        ledger.deposit("carol", dec("5.00")).await.unwrap();

        let err = ledger
            .apply_delta("carol", dec("-10.00"), "g3:bet", LedgerReason::Bet, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance("carol").await, dec("5.00"));
        assert_eq!(ledger.entries("carol").await.len(), 1, "failed debit leaves no entry");
    }

    #[tokio::test]
    async fn zero_or_negative_deposit_rejected() {
        let ledger = MemoryLedger::new();
        assert!(ledger.deposit("dave", Decimal::ZERO).await.is_err());
        assert!(ledger.deposit("dave", dec("-1.00")).await.is_err());
    }

    #[tokio::test]
    async fn deposit_works_through_the_trait_object() {
        let ledger: Arc<dyn BalanceLedger> = Arc::new(MemoryLedger::new());
        assert_eq!(ledger.deposit("zoe", dec("5.00")).await.unwrap(), dec("5.00"));
        assert_eq!(ledger.deposit("zoe", dec("5.00")).await.unwrap(), dec("10.00"));
        assert!(ledger.deposit("zoe", Decimal::ZERO).await.is_err());
        assert_eq!(ledger.entries("zoe").await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.deposit("erin", dec("10.00")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..100 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .apply_delta(
                        "erin",
                        dec("-1.00"),
                        &format!("spend:{}", i),
                        LedgerReason::Bet,
                        None,
                    )
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 10);
        assert_eq!(ledger.balance("erin").await, Decimal::ZERO);
    }
}
