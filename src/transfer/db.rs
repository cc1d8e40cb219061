//! Transfer Database Operations
//!
//! [`TransferLog`] on top of the `transactions` table.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::types::{Page, Transfer, TransferId, TransferRequest, TransferStatus};
use crate::account::AccountId;
use crate::db::PgStore;
use crate::store::{StoreError, TransferLog};

const TRANSFER_COLUMNS: &str = "id, source_account_id, destination_account_id, amount, \
                                reference, status, created_at, completed_at";

fn transfer_from_row(row: &PgRow) -> Result<Transfer, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Transfer {
        id: TransferId::from(row.try_get::<Uuid, _>("id")?),
        source_account_id: row
            .try_get::<Option<Uuid>, _>("source_account_id")?
            .map(AccountId::from),
        destination_account_id: AccountId::from(row.try_get::<Uuid, _>("destination_account_id")?),
        amount: row.try_get("amount")?,
        reference: row.try_get("reference")?,
        status: status.parse().map_err(StoreError::Backend)?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl TransferLog for PgStore {
    async fn insert_pending(
        &self,
        unit: &mut Self::Unit,
        req: &TransferRequest,
    ) -> Result<Transfer, StoreError> {
        let sql = format!(
            "INSERT INTO transactions \
             (id, source_account_id, destination_account_id, amount, reference, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', NOW()) \
             RETURNING {TRANSFER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(TransferId::new().as_uuid())
            .bind(req.source_account_id.map(|id| id.as_uuid()))
            .bind(req.destination_account_id.as_uuid())
            .bind(req.amount.inner())
            .bind(req.reference.as_deref())
            .fetch_one(&mut **unit)
            .await?;

        transfer_from_row(&row)
    }

    async fn finalize(
        &self,
        unit: &mut Self::Unit,
        id: TransferId,
        status: TransferStatus,
    ) -> Result<Transfer, StoreError> {
        let sql = format!(
            "UPDATE transactions SET status = $1, completed_at = NOW() \
             WHERE id = $2 RETURNING {TRANSFER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(id.as_uuid())
            .fetch_optional(&mut **unit)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("transaction {}", id)))?;

        transfer_from_row(&row)
    }

    async fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM transactions WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(transfer_from_row)
            .transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transfer>, StoreError> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transactions \
             WHERE reference = $1 ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(transfer_from_row)
            .transpose()
    }

    async fn list_for_account(
        &self,
        account: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transactions \
             WHERE source_account_id = $1 OR destination_account_id = $1 \
             ORDER BY created_at DESC, id \
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(account.as_uuid())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transfer_from_row).collect()
    }
}
