//! Transfer Engine
//!
//! Turns a [`TransferRequest`] into one atomic unit of balance mutations:
//!
//! ```text
//! validate ─► begin ─► lock source ─► check funds ─► lock destination
//!                                                         │
//!   commit ◄─ finalize(completed) ◄─ credit ◄─ debit ◄─ insert(pending)
//! ```
//!
//! Locks are taken source-then-destination in argument order. Two transfers
//! moving money in opposite directions between the same pair of accounts can
//! deadlock; the store detects it and one side fails with
//! [`LedgerError::TransactionAborted`]. The engine does not retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::bulk::{self, BulkOutcome};
use super::error::{Entity, ErrorKind, LedgerError};
use super::types::{MAX_REFERENCE_LEN, Page, Transfer, TransferId, TransferRequest, TransferStatus};
use crate::account::{Account, AccountId};
use crate::money::{check_scale, fits_column};
use crate::store::{LedgerStore, StoreError};

/// Operations exposed to the request shell
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Open an account; `None` starts at zero
    async fn create_account(&self, initial_balance: Option<Decimal>)
    -> Result<Account, LedgerError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Best-effort historical balance (see [`crate::store::AccountStore::balance_at`])
    async fn balance_at(&self, id: AccountId, at: DateTime<Utc>) -> Result<Decimal, LedgerError>;

    async fn create_transfer(&self, req: TransferRequest) -> Result<Transfer, LedgerError>;

    /// Run each request as its own transfer. Only batch-level validation
    /// (size) fails the call as a whole.
    async fn process_bulk(&self, reqs: Vec<TransferRequest>) -> Result<BulkOutcome, LedgerError>;

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError>;

    async fn get_transfer_by_reference(&self, reference: &str) -> Result<Transfer, LedgerError>;

    async fn list_account_transfers(
        &self,
        account: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, LedgerError>;

    async fn ping(&self) -> Result<(), LedgerError>;
}

/// Reject a request before any storage access
pub fn validate(req: &TransferRequest) -> Result<(), LedgerError> {
    let amount = req.amount.inner();
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation("amount", "must be greater than zero"));
    }
    check_scale(amount).map_err(|reason| LedgerError::validation("amount", reason))?;

    if req.source_account_id == Some(req.destination_account_id) {
        return Err(LedgerError::validation(
            "destination_account_id",
            "source and destination accounts must differ",
        ));
    }

    if let Some(reference) = &req.reference
        && reference.chars().count() > MAX_REFERENCE_LEN
    {
        return Err(LedgerError::validation(
            "reference",
            format!("must be at most {} characters", MAX_REFERENCE_LEN),
        ));
    }

    Ok(())
}

/// Log and wrap a store failure that happened outside an atomic unit
fn internal(op: &'static str, e: StoreError) -> LedgerError {
    error!(operation = op, error = %e, "Store operation failed");
    LedgerError::Internal(e.to_string())
}

pub struct TransferEngine<S: LedgerStore> {
    store: Arc<S>,
    deadline: Option<Duration>,
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            deadline: None,
        }
    }

    /// Abort any single transfer whose unit is still open after `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn execute(&self, req: &TransferRequest) -> Result<Transfer, LedgerError> {
        let mut unit = self
            .store
            .begin()
            .await
            .map_err(|e| internal("begin", e))?;

        match self.apply(&mut unit, req).await {
            Ok(transfer) => {
                if let Err(e) = self.store.commit(unit).await {
                    warn!(transfer_id = %transfer.id, error = %e, "Commit failed, transfer discarded");
                    return Err(LedgerError::TransactionAborted(e.to_string()));
                }
                info!(
                    transfer_id = %transfer.id,
                    amount = %transfer.amount,
                    deposit = transfer.is_deposit(),
                    "Transfer completed"
                );
                Ok(transfer)
            }
            Err(err) => {
                if let Err(e) = self.store.rollback(unit).await {
                    warn!(error = %e, "Rollback failed");
                }
                match err.kind() {
                    ErrorKind::Internal => error!(error = ?err, "Transfer failed"),
                    ErrorKind::TransactionAborted => warn!(error = ?err, "Transfer aborted"),
                    _ => debug!(error = %err, "Transfer rejected"),
                }
                Err(err)
            }
        }
    }

    /// Steps 1-6 of the transfer protocol inside an open unit
    async fn apply(
        &self,
        unit: &mut S::Unit,
        req: &TransferRequest,
    ) -> Result<Transfer, LedgerError> {
        let amount = req.amount.inner();

        let debit = match req.source_account_id {
            Some(source) => {
                let balance = self
                    .store
                    .lock_account(unit, source)
                    .await?
                    .ok_or(LedgerError::NotFound(Entity::SourceAccount))?;
                if balance < amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                Some((source, balance - amount))
            }
            None => None,
        };

        let destination = req.destination_account_id;
        let dest_balance = self
            .store
            .lock_account(unit, destination)
            .await?
            .ok_or(LedgerError::NotFound(Entity::DestinationAccount))?;
        let credited = dest_balance
            .checked_add(amount)
            .filter(|b| fits_column(*b))
            .ok_or_else(|| {
                LedgerError::validation("amount", "destination balance would exceed the maximum")
            })?;

        let pending = self.store.insert_pending(unit, req).await?;
        debug!(transfer_id = %pending.id, "Transfer pending");

        if let Some((source, debited)) = debit {
            self.store.update_balance(unit, source, debited).await?;
        }
        self.store
            .update_balance(unit, destination, credited)
            .await?;

        Ok(self
            .store
            .finalize(unit, pending.id, TransferStatus::Completed)
            .await?)
    }
}

#[async_trait]
impl<S: LedgerStore + 'static> TransferService for TransferEngine<S> {
    async fn create_account(
        &self,
        initial_balance: Option<Decimal>,
    ) -> Result<Account, LedgerError> {
        let initial = initial_balance.unwrap_or(Decimal::ZERO);
        if initial < Decimal::ZERO {
            return Err(LedgerError::validation(
                "initial_balance",
                "must be non-negative",
            ));
        }
        check_scale(initial).map_err(|reason| LedgerError::validation("initial_balance", reason))?;

        let account = self
            .store
            .create_account(initial)
            .await
            .map_err(|e| internal("create_account", e))?;
        info!(account_id = %account.id, balance = %account.balance, "Account created");
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.store
            .find_account(id)
            .await
            .map_err(|e| internal("find_account", e))?
            .ok_or(LedgerError::NotFound(Entity::Account))
    }

    async fn balance_at(&self, id: AccountId, at: DateTime<Utc>) -> Result<Decimal, LedgerError> {
        self.store
            .balance_at(id, at)
            .await
            .map_err(|e| internal("balance_at", e))?
            .ok_or(LedgerError::NotFound(Entity::Account))
    }

    async fn create_transfer(&self, req: TransferRequest) -> Result<Transfer, LedgerError> {
        validate(&req)?;

        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.execute(&req))
                .await
                .map_err(|_| {
                    warn!(deadline_ms = deadline.as_millis() as u64, "Transfer deadline exceeded");
                    LedgerError::TransactionAborted("deadline exceeded".to_string())
                })?,
            None => self.execute(&req).await,
        }
    }

    async fn process_bulk(&self, reqs: Vec<TransferRequest>) -> Result<BulkOutcome, LedgerError> {
        bulk::check_batch_size(reqs.len())?;

        let mut outcome = BulkOutcome::default();
        for (index, req) in reqs.into_iter().enumerate() {
            match self.create_transfer(req).await {
                Ok(transfer) => outcome.succeeded.push(transfer),
                Err(err) => outcome.record_failure(index, &err),
            }
        }

        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            status = ?outcome.status(),
            "Bulk transfer processed"
        );
        Ok(outcome)
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        self.store
            .find_transfer(id)
            .await
            .map_err(|e| internal("find_transfer", e))?
            .ok_or(LedgerError::NotFound(Entity::Transfer))
    }

    async fn get_transfer_by_reference(&self, reference: &str) -> Result<Transfer, LedgerError> {
        self.store
            .find_by_reference(reference)
            .await
            .map_err(|e| internal("find_by_reference", e))?
            .ok_or(LedgerError::NotFound(Entity::Transfer))
    }

    async fn list_account_transfers(
        &self,
        account: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let exists = self
            .store
            .account_exists(account)
            .await
            .map_err(|e| internal("account_exists", e))?;
        if !exists {
            return Err(LedgerError::NotFound(Entity::Account));
        }

        self.store
            .list_for_account(account, page)
            .await
            .map_err(|e| internal("list_for_account", e))
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.store.ping().await.map_err(|e| internal("ping", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use rust_decimal_macros::dec;

    fn engine() -> TransferEngine<MemoryStore> {
        TransferEngine::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_validate_amount() {
        let (a, b) = (AccountId::new(), AccountId::new());
        for amount in [dec!(0), dec!(-1), dec!(0.000000001)] {
            let err = validate(&TransferRequest::new(a, b, amount)).unwrap_err();
            assert!(matches!(err, LedgerError::Validation { field: "amount", .. }));
        }
        assert!(validate(&TransferRequest::new(a, b, dec!(0.00000001))).is_ok());
    }

    #[test]
    fn test_validate_same_account() {
        let a = AccountId::new();
        let err = validate(&TransferRequest::new(a, a, dec!(1))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_validate_reference_length() {
        let a = AccountId::new();
        let ok = TransferRequest::deposit(a, dec!(1)).with_reference("é".repeat(255));
        assert!(validate(&ok).is_ok());
        let long = TransferRequest::deposit(a, dec!(1)).with_reference("x".repeat(256));
        assert!(matches!(
            validate(&long),
            Err(LedgerError::Validation { field: "reference", .. })
        ));
    }

    #[tokio::test]
    async fn test_create_account_defaults_to_zero() {
        let engine = engine();
        let account = engine.create_account(None).await.unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(engine.get_account(account.id).await.unwrap(), account);
    }

    #[tokio::test]
    async fn test_create_account_rejects_negative() {
        let err = engine().create_account(Some(dec!(-5))).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation { field: "initial_balance", .. }
        ));
    }

    #[tokio::test]
    async fn test_amounts_beyond_column_range() {
        let engine = engine();
        let err = engine
            .create_account(Some(dec!(10000000000000)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation { field: "initial_balance", .. }
        ));

        let a = engine.create_account(None).await.unwrap();
        let err = engine
            .create_transfer(TransferRequest::deposit(a.id, dec!(1000000000000)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "amount", .. }));
    }

    #[tokio::test]
    async fn test_credit_past_maximum_is_rejected() {
        let engine = engine();
        let rich = engine
            .create_account(Some(dec!(999999999999)))
            .await
            .unwrap();

        let err = engine
            .create_transfer(TransferRequest::deposit(rich.id, dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "amount", .. }));
        assert_eq!(
            engine.get_account(rich.id).await.unwrap().balance,
            dec!(999999999999)
        );
        assert_eq!(engine.store().transfer_count().unwrap(), 0);

        engine
            .create_transfer(TransferRequest::deposit(rich.id, dec!(0.99999999)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_source_and_destination() {
        let engine = engine();
        let a = engine.create_account(Some(dec!(10))).await.unwrap();

        let err = engine
            .create_transfer(TransferRequest::new(AccountId::new(), a.id, dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound(Entity::SourceAccount));

        let err = engine
            .create_transfer(TransferRequest::new(a.id, AccountId::new(), dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound(Entity::DestinationAccount));

        assert_eq!(engine.get_account(a.id).await.unwrap().balance, dec!(10));
        assert_eq!(engine.store().transfer_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exact_balance_drains_to_zero() {
        let engine = engine();
        let a = engine.create_account(Some(dec!(5.00))).await.unwrap();
        let b = engine.create_account(None).await.unwrap();

        engine
            .create_transfer(TransferRequest::new(a.id, b.id, dec!(5.00)))
            .await
            .unwrap();
        assert_eq!(engine.get_account(a.id).await.unwrap().balance, dec!(0));
        assert_eq!(engine.get_account(b.id).await.unwrap().balance, dec!(5));
    }

    #[tokio::test]
    async fn test_get_transfer_not_found() {
        let engine = engine();
        assert_eq!(
            engine.get_transfer(TransferId::new()).await.unwrap_err(),
            LedgerError::NotFound(Entity::Transfer)
        );
        assert_eq!(
            engine.get_transfer_by_reference("nope").await.unwrap_err(),
            LedgerError::NotFound(Entity::Transfer)
        );
    }

    #[tokio::test]
    async fn test_list_unknown_account() {
        let err = engine()
            .list_account_transfers(AccountId::new(), Page::default())
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound(Entity::Account));
    }

    #[tokio::test]
    async fn test_balance_at_before_creation_is_not_found() {
        let engine = engine();
        let a = engine.create_account(Some(dec!(1))).await.unwrap();
        let before = a.created_at - chrono::Duration::seconds(10);
        assert_eq!(
            engine.balance_at(a.id, before).await.unwrap_err(),
            LedgerError::NotFound(Entity::Account)
        );
        assert_eq!(engine.balance_at(a.id, Utc::now()).await.unwrap(), dec!(1));
    }
}
