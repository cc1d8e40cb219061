//! Storage seams
//!
//! The transfer engine talks to storage only through these traits. Two
//! backends implement them:
//!
//! - PostgreSQL ([`crate::db::PgStore`]), the production backend. An atomic
//!   unit is a database transaction and row locks are `SELECT ... FOR UPDATE`.
//! - In-memory ([`memory::MemoryStore`]), used by tests and the `--memory`
//!   mode of the binary. It keeps the same locking and constraint semantics.
//!
//! A unit that is dropped without `commit` is rolled back by both backends.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::{Account, AccountId};
use crate::idempotency::StoredResponse;
use crate::transfer::types::{Page, Transfer, TransferId, TransferRequest, TransferStatus};

/// Storage-level failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Lock conflict, deadlock or serialization failure
    #[error("conflict: {0}")]
    Conflict(String),

    /// A schema constraint rejected the write
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A row the unit relies on is gone
    #[error("missing row: {0}")]
    Missing(String),

    #[error("backend error: {0}")]
    Backend(String),
}

// PostgreSQL SQLSTATE codes that mean "the transaction lost a race"
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE) => {
                    StoreError::Conflict(db.message().to_string())
                }
                // Class 23: integrity constraint violation
                Some(code) if code.starts_with("23") => {
                    StoreError::Constraint(db.message().to_string())
                }
                _ => StoreError::Backend(e.to_string()),
            },
            sqlx::Error::RowNotFound => StoreError::Missing(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// Begin / commit / rollback of an atomic unit
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Open unit. Dropping it without `commit` discards every write.
    type Unit: Send;

    async fn begin(&self) -> Result<Self::Unit, StoreError>;

    async fn commit(&self, unit: Self::Unit) -> Result<(), StoreError>;

    async fn rollback(&self, unit: Self::Unit) -> Result<(), StoreError>;
}

/// Account persistence
#[async_trait]
pub trait AccountStore: UnitOfWork {
    /// Insert a new account. Negative balances are rejected with
    /// [`StoreError::Constraint`].
    async fn create_account(&self, initial_balance: Decimal) -> Result<Account, StoreError>;

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn account_exists(&self, id: AccountId) -> Result<bool, StoreError>;

    /// Balance as of `at`, or `None` when the account does not exist or was
    /// last modified after `at`
    async fn balance_at(
        &self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<Option<Decimal>, StoreError>;

    /// Acquire the exclusive row lock and return the current balance.
    /// `None` when the account does not exist. The lock is held until the
    /// unit ends.
    async fn lock_account(
        &self,
        unit: &mut Self::Unit,
        id: AccountId,
    ) -> Result<Option<Decimal>, StoreError>;

    /// Write a new balance for a locked account
    async fn update_balance(
        &self,
        unit: &mut Self::Unit,
        id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError>;

    /// Backend liveness probe
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Append-only transfer log
#[async_trait]
pub trait TransferLog: UnitOfWork {
    /// Append a `pending` record for `req`
    async fn insert_pending(
        &self,
        unit: &mut Self::Unit,
        req: &TransferRequest,
    ) -> Result<Transfer, StoreError>;

    /// Move a pending record to a terminal status and stamp `completed_at`
    async fn finalize(
        &self,
        unit: &mut Self::Unit,
        id: TransferId,
        status: TransferStatus,
    ) -> Result<Transfer, StoreError>;

    async fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    /// Most recent transfer carrying `reference`
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transfer>, StoreError>;

    /// Transfers where the account is source or destination, newest first
    async fn list_for_account(
        &self,
        account: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError>;
}

/// Everything the transfer engine needs, sharing one unit type
pub trait LedgerStore: AccountStore + TransferLog {}

impl<T: AccountStore + TransferLog> LedgerStore for T {}

/// Idempotency record persistence
///
/// Records expire after a TTL held by the store; an expired record behaves
/// as if it were absent.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claim `fingerprint`. Returns `false` when an unexpired record already
    /// exists.
    async fn begin_if_absent(
        &self,
        fingerprint: &str,
        request_body: &str,
    ) -> Result<bool, StoreError>;

    /// Stored response for an unexpired, completed record
    async fn get_completed(&self, fingerprint: &str)
    -> Result<Option<StoredResponse>, StoreError>;

    async fn complete_with(
        &self,
        fingerprint: &str,
        response: &StoredResponse,
    ) -> Result<(), StoreError>;

    /// Drop a claimed record that has no response yet, so the request can be
    /// executed again
    async fn release(&self, fingerprint: &str) -> Result<(), StoreError>;

    /// Delete expired records, returning how many were removed
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_missing() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Missing(_)
        ));
    }

    #[test]
    fn test_pool_timeout_is_backend() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Backend(_)
        ));
    }
}
