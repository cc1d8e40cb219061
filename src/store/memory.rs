//! In-memory storage backend
//!
//! Mirrors the PostgreSQL backend closely enough to exercise the engine
//! without a database:
//!
//! - every account has its own async row lock, held by a [`MemoryUnit`] until
//!   it commits or is dropped;
//! - writes inside a unit are staged and only become visible on commit;
//! - the schema CHECK constraints are re-checked on every write.
//!
//! A lock that cannot be acquired within `lock_timeout` fails the unit with
//! [`StoreError::Conflict`], which is how two units locking the same rows in
//! opposite order get broken apart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::{AccountStore, IdempotencyStore, StoreError, TransferLog, UnitOfWork};
use crate::account::{Account, AccountId};
use crate::idempotency::{DEFAULT_TTL, StoredResponse};
use crate::transfer::types::{
    MAX_REFERENCE_LEN, Page, Transfer, TransferId, TransferRequest, TransferStatus,
};

/// Default wait for a row lock before the unit is aborted
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

struct IdempotencyRecord {
    response: Option<StoredResponse>,
    expires_at: Instant,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    row_locks: HashMap<AccountId, Arc<RowLock<()>>>,
    transfers: Vec<Transfer>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

/// Open unit of work against [`MemoryStore`]
#[derive(Default)]
pub struct MemoryUnit {
    guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    balances: HashMap<AccountId, Decimal>,
    transfers: Vec<Transfer>,
}

impl MemoryUnit {
    fn staged_transfer(&mut self, id: TransferId) -> Option<&mut Transfer> {
        self.transfers.iter_mut().find(|t| t.id == id)
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
    idempotency_ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            idempotency_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_idempotency_ttl(ttl: Duration) -> Self {
        Self {
            idempotency_ttl: ttl,
            ..Self::new()
        }
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }

    /// Sum of all committed balances
    pub fn total_balance(&self) -> Result<Decimal, StoreError> {
        Ok(self.tables()?.accounts.values().map(|a| a.balance).sum())
    }

    /// Number of committed transfer rows
    pub fn transfer_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.transfers.len())
    }
}

fn check_request(tables: &Tables, req: &TransferRequest) -> Result<(), StoreError> {
    if *req.amount <= Decimal::ZERO {
        return Err(StoreError::Constraint("amount must be positive".to_string()));
    }
    if req.source_account_id == Some(req.destination_account_id) {
        return Err(StoreError::Constraint(
            "source and destination must differ".to_string(),
        ));
    }
    if req
        .reference
        .as_ref()
        .is_some_and(|r| r.chars().count() > MAX_REFERENCE_LEN)
    {
        return Err(StoreError::Constraint("reference too long".to_string()));
    }
    if !tables.accounts.contains_key(&req.destination_account_id) {
        return Err(StoreError::Constraint(
            "destination account foreign key".to_string(),
        ));
    }
    if req
        .source_account_id
        .is_some_and(|src| !tables.accounts.contains_key(&src))
    {
        return Err(StoreError::Constraint(
            "source account foreign key".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit, StoreError> {
        Ok(MemoryUnit::default())
    }

    async fn commit(&self, unit: MemoryUnit) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self.tables()?;

        for (id, balance) in &unit.balances {
            let account = tables
                .accounts
                .get_mut(id)
                .ok_or_else(|| StoreError::Missing(format!("account {}", id)))?;
            account.balance = *balance;
            account.updated_at = now;
        }

        for staged in unit.transfers {
            match tables.transfers.iter_mut().find(|t| t.id == staged.id) {
                Some(existing) => *existing = staged,
                None => tables.transfers.push(staged),
            }
        }

        // Row guards are released when `unit.guards` drops here
        Ok(())
    }

    async fn rollback(&self, unit: MemoryUnit) -> Result<(), StoreError> {
        drop(unit);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, initial_balance: Decimal) -> Result<Account, StoreError> {
        if initial_balance < Decimal::ZERO {
            return Err(StoreError::Constraint(
                "balance must be non-negative".to_string(),
            ));
        }
        let account = Account::open(initial_balance, Utc::now());
        let mut tables = self.tables()?;
        tables
            .row_locks
            .insert(account.id, Arc::new(RowLock::new(())));
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables()?.accounts.get(&id).cloned())
    }

    async fn account_exists(&self, id: AccountId) -> Result<bool, StoreError> {
        Ok(self.tables()?.accounts.contains_key(&id))
    }

    async fn balance_at(
        &self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<Option<Decimal>, StoreError> {
        Ok(self
            .tables()?
            .accounts
            .get(&id)
            .filter(|a| a.updated_at <= at)
            .map(|a| a.balance))
    }

    async fn lock_account(
        &self,
        unit: &mut MemoryUnit,
        id: AccountId,
    ) -> Result<Option<Decimal>, StoreError> {
        if !unit.guards.contains_key(&id) {
            let lock = match self.tables()?.row_locks.get(&id) {
                Some(lock) => Arc::clone(lock),
                None => return Ok(None),
            };
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::Conflict(format!("lock wait timeout on account {}", id))
                })?;
            unit.guards.insert(id, guard);
        }

        if let Some(staged) = unit.balances.get(&id) {
            return Ok(Some(*staged));
        }
        Ok(self.tables()?.accounts.get(&id).map(|a| a.balance))
    }

    async fn update_balance(
        &self,
        unit: &mut MemoryUnit,
        id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        if !unit.guards.contains_key(&id) {
            return Err(StoreError::Backend(format!(
                "account {} updated without holding its row lock",
                id
            )));
        }
        if balance < Decimal::ZERO {
            return Err(StoreError::Constraint(
                "balance must be non-negative".to_string(),
            ));
        }
        unit.balances.insert(id, balance);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.tables().map(|_| ())
    }
}

#[async_trait]
impl TransferLog for MemoryStore {
    async fn insert_pending(
        &self,
        unit: &mut MemoryUnit,
        req: &TransferRequest,
    ) -> Result<Transfer, StoreError> {
        check_request(&*self.tables()?, req)?;
        let transfer = Transfer::pending(req, Utc::now());
        unit.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn finalize(
        &self,
        unit: &mut MemoryUnit,
        id: TransferId,
        status: TransferStatus,
    ) -> Result<Transfer, StoreError> {
        if unit.staged_transfer(id).is_none() {
            let committed = self
                .tables()?
                .transfers
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| StoreError::Missing(format!("transaction {}", id)))?;
            unit.transfers.push(committed);
        }

        let transfer = unit
            .staged_transfer(id)
            .ok_or_else(|| StoreError::Missing(format!("transaction {}", id)))?;
        if !transfer.status.can_transition_to(status) {
            return Err(StoreError::Constraint(format!(
                "transactions are append-only: {} -> {}",
                transfer.status, status
            )));
        }
        transfer.status = status;
        transfer.completed_at = Some(Utc::now());
        Ok(transfer.clone())
    }

    async fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self
            .tables()?
            .transfers
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transfer>, StoreError> {
        Ok(self
            .tables()?
            .transfers
            .iter()
            .rev()
            .find(|t| t.reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_for_account(
        &self,
        account: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError> {
        Ok(self
            .tables()?
            .transfers
            .iter()
            .rev()
            .filter(|t| t.involves(account))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn begin_if_absent(
        &self,
        fingerprint: &str,
        _request_body: &str,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut tables = self.tables()?;
        if tables
            .idempotency
            .get(fingerprint)
            .is_some_and(|r| r.expires_at > now)
        {
            return Ok(false);
        }
        tables.idempotency.insert(
            fingerprint.to_string(),
            IdempotencyRecord {
                response: None,
                expires_at: now + self.idempotency_ttl,
            },
        );
        Ok(true)
    }

    async fn get_completed(
        &self,
        fingerprint: &str,
    ) -> Result<Option<StoredResponse>, StoreError> {
        let now = Instant::now();
        Ok(self
            .tables()?
            .idempotency
            .get(fingerprint)
            .filter(|r| r.expires_at > now)
            .and_then(|r| r.response.clone()))
    }

    async fn complete_with(
        &self,
        fingerprint: &str,
        response: &StoredResponse,
    ) -> Result<(), StoreError> {
        if let Some(record) = self.tables()?.idempotency.get_mut(fingerprint) {
            record.response = Some(response.clone());
        }
        Ok(())
    }

    async fn release(&self, fingerprint: &str) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables
            .idempotency
            .get(fingerprint)
            .is_some_and(|r| r.response.is_none())
        {
            tables.idempotency.remove(fingerprint);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut tables = self.tables()?;
        let before = tables.idempotency.len();
        tables.idempotency.retain(|_, r| r.expires_at > now);
        Ok((before - tables.idempotency.len()) as u64)
    }
}
