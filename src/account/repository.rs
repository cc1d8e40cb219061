//! Repository layer for account rows
//!
//! [`AccountStore`] on top of PostgreSQL. Balance reads inside a unit use
//! `SELECT ... FOR UPDATE`; the row lock is held until the unit commits or
//! rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::models::{Account, AccountId};
use crate::db::PgStore;
use crate::store::{AccountStore, StoreError};

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: AccountId::from(row.try_get::<Uuid, _>("id")?),
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, initial_balance: Decimal) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"INSERT INTO accounts (id, balance, created_at, updated_at)
               VALUES ($1, $2, NOW(), NOW())
               RETURNING id, balance, created_at, updated_at"#,
        )
        .bind(AccountId::new().as_uuid())
        .bind(initial_balance)
        .fetch_one(&self.pool)
        .await?;

        Ok(account_from_row(&row)?)
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, balance, created_at, updated_at
               FROM accounts WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn account_exists(&self, id: AccountId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn balance_at(
        &self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<Option<Decimal>, StoreError> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1 AND updated_at <= $2")
                .bind(id.as_uuid())
                .bind(at)
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance)
    }

    async fn lock_account(
        &self,
        unit: &mut Self::Unit,
        id: AccountId,
    ) -> Result<Option<Decimal>, StoreError> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut **unit)
                .await?;
        Ok(balance)
    }

    async fn update_balance(
        &self,
        unit: &mut Self::Unit,
        id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE accounts SET balance = $1, updated_at = NOW()
               WHERE id = $2"#,
        )
        .bind(balance)
        .bind(id.as_uuid())
        .execute(&mut **unit)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("account {}", id)));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
