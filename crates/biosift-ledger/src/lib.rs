//! The metered-credit ledger.
//!
//! Every paid action costs a whole number of credits. Debits are
//! conditional on the balance covering the amount and on the account
//! being active; the balance can never go negative and is only ever
//! moved by relative debit/credit operations, never set outright.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use biosift_storage::{Store, StoreError, UserId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found")]
    AccountNotFound,
    /// The account exists but is not approved or has not completed
    /// payment, so it may not spend credits.
    #[error("account not active")]
    AccountNotActive,
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LedgerError::AccountNotFound,
            StoreError::InsufficientCredits => LedgerError::InsufficientCredits,
            other => LedgerError::Storage(other),
        }
    }
}

/// Debits and credits accounts through a [`Store`].
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Spend `amount` credits. The account must be approved and have
    /// completed payment; the balance check and subtraction happen as one
    /// atomic store operation, so concurrent debits cannot overspend.
    /// Returns the new balance.
    pub async fn debit(&self, user_id: &UserId, amount: u32) -> Result<u32, LedgerError> {
        let account = self.store.get_account(user_id).await?;
        if !account.approved || !account.payment_completed {
            return Err(LedgerError::AccountNotActive);
        }

        let balance = self.store.debit_account(user_id, amount).await?;
        tracing::debug!(user_id = %user_id, amount, balance, "debited credits");
        Ok(balance)
    }

    /// Grant `amount` credits (plan renewal, admin top-up). Also stamps
    /// the account's `last_credit_renewal`. Returns the new balance.
    pub async fn credit(&self, user_id: &UserId, amount: u32) -> Result<u32, LedgerError> {
        let balance = self.store.credit_account(user_id, amount).await?;
        tracing::debug!(user_id = %user_id, amount, balance, "granted credits");
        Ok(balance)
    }

    /// Current balance and last renewal, read-only. Callers must not use
    /// this to compute a write; changes go through `debit`/`credit`.
    pub async fn balance(
        &self,
        user_id: &UserId,
    ) -> Result<(u32, Option<DateTime<Utc>>), LedgerError> {
        let account = self.store.get_account(user_id).await?;
        Ok((account.current_credits, account.last_credit_renewal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosift_storage::{CreateAccountParams, Plan};
    use biosift_store_memory::MemoryStore;

    async fn account_with(
        store: &MemoryStore,
        credits: u32,
        approved: bool,
        payment_completed: bool,
    ) -> UserId {
        store
            .create_account(&CreateAccountParams {
                email: format!("user-{}@example.com", UserId::new()),
                initial_credits: credits,
                plan: Plan::Pro,
                approved,
                payment_completed,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn debit_reduces_balance() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 10, true, true).await;
        let ledger = CreditLedger::new(store);

        assert_eq!(ledger.debit(&user_id, 3).await.unwrap(), 7);
        assert_eq!(ledger.balance(&user_id).await.unwrap().0, 7);
    }

    #[tokio::test]
    async fn debit_beyond_balance_fails_and_leaves_balance_untouched() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 5, true, true).await;
        let ledger = CreditLedger::new(store);

        let err = ledger.debit(&user_id, 6).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCredits));
        assert_eq!(ledger.balance(&user_id).await.unwrap().0, 5);
    }

    #[tokio::test]
    async fn debit_to_exactly_zero_is_allowed() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 5, true, true).await;
        let ledger = CreditLedger::new(store);

        assert_eq!(ledger.debit(&user_id, 5).await.unwrap(), 0);

        let err = ledger.debit(&user_id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCredits));
    }

    #[tokio::test]
    async fn unapproved_account_cannot_spend() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 10, false, true).await;
        let ledger = CreditLedger::new(store);

        let err = ledger.debit(&user_id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotActive));
        assert_eq!(ledger.balance(&user_id).await.unwrap().0, 10);
    }

    #[tokio::test]
    async fn unpaid_account_cannot_spend_but_can_receive() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 0, true, false).await;
        let ledger = CreditLedger::new(store);

        let err = ledger.debit(&user_id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotActive));

        // Grants are not gated; a renewal may land before payment clears.
        assert_eq!(ledger.credit(&user_id, 25).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn credit_stamps_renewal_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 0, true, true).await;
        let ledger = CreditLedger::new(store.clone());

        let (_, renewal) = ledger.balance(&user_id).await.unwrap();
        assert!(renewal.is_none());

        ledger.credit(&user_id, 100).await.unwrap();

        let (credits, renewal) = ledger.balance(&user_id).await.unwrap();
        assert_eq!(credits, 100);
        assert!(renewal.is_some());
    }

    #[tokio::test]
    async fn unknown_account_maps_to_account_not_found() {
        let store = Arc::new(MemoryStore::new());
        let ledger = CreditLedger::new(store);
        let ghost = UserId::new();

        assert!(matches!(ledger.debit(&ghost, 1).await.unwrap_err(), LedgerError::AccountNotFound));
        assert!(matches!(ledger.credit(&ghost, 1).await.unwrap_err(), LedgerError::AccountNotFound));
        assert!(matches!(ledger.balance(&ghost).await.unwrap_err(), LedgerError::AccountNotFound));
    }

    #[tokio::test]
    async fn concurrent_debits_never_overspend() {
        let store = Arc::new(MemoryStore::new());
        let user_id = account_with(&store, 10, true, true).await;
        let ledger = CreditLedger::new(store);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.debit(&user_id, 1).await }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 10);
        assert_eq!(ledger.balance(&user_id).await.unwrap().0, 0);
    }
}
