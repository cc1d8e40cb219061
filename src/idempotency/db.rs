//! Idempotency record persistence on PostgreSQL

use async_trait::async_trait;
use sqlx::Row;

use super::models::StoredResponse;
use crate::db::PgStore;
use crate::store::{IdempotencyStore, StoreError};

#[async_trait]
impl IdempotencyStore for PgStore {
    async fn begin_if_absent(
        &self,
        fingerprint: &str,
        request_body: &str,
    ) -> Result<bool, StoreError> {
        // An expired record is overwritten as if it were absent
        let result = sqlx::query(
            r#"INSERT INTO idempotency_keys (key_hash, request_body, created_at, expires_at)
               VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3))
               ON CONFLICT (key_hash) DO UPDATE
                   SET request_body = EXCLUDED.request_body,
                       response_body = NULL,
                       response_status = NULL,
                       created_at = EXCLUDED.created_at,
                       expires_at = EXCLUDED.expires_at
                   WHERE idempotency_keys.expires_at <= NOW()"#,
        )
        .bind(fingerprint)
        .bind(request_body)
        .bind(self.idempotency_ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_completed(
        &self,
        fingerprint: &str,
    ) -> Result<Option<StoredResponse>, StoreError> {
        let row = sqlx::query(
            r#"SELECT response_body, response_status
               FROM idempotency_keys
               WHERE key_hash = $1 AND expires_at > NOW()
                 AND response_body IS NOT NULL AND response_status IS NOT NULL"#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: i32 = row.try_get("response_status")?;
        let status = u16::try_from(status)
            .map_err(|_| StoreError::Backend(format!("invalid stored status {}", status)))?;
        Ok(Some(StoredResponse {
            status,
            body: row.try_get("response_body")?,
        }))
    }

    async fn complete_with(
        &self,
        fingerprint: &str,
        response: &StoredResponse,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE idempotency_keys
               SET response_body = $1, response_status = $2
               WHERE key_hash = $3"#,
        )
        .bind(&response.body)
        .bind(i32::from(response.status))
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, fingerprint: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key_hash = $1 AND response_body IS NULL")
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
