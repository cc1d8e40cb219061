//! Database connection management

pub mod schema;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::store::{StoreError, UnitOfWork};

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

/// Connection pool occupancy, reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create tables, indexes and triggers if missing
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        tracing::info!("Initializing PostgreSQL schema...");
        for &(name, sql) in schema::ALL {
            sqlx::raw_sql(sql).execute(&self.pool).await.map_err(|e| {
                tracing::error!(object = name, error = %e, "Schema initialization failed");
                e
            })?;
        }
        tracing::info!("PostgreSQL schema ready");
        Ok(())
    }
}

/// PostgreSQL implementation of the storage traits
///
/// Account, transfer and idempotency queries live next to their domain
/// modules (`account::repository`, `transfer::db`, `idempotency::db`).
#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: PgPool,
    pub(crate) idempotency_ttl: Duration,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, idempotency_ttl: Duration) -> Self {
        Self {
            pool,
            idempotency_ttl,
            lock_timeout: Duration::from_secs(2),
        }
    }

    /// Bound on how long a unit waits for a row lock before aborting
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }
}

#[async_trait]
impl UnitOfWork for PgStore {
    type Unit = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        let mut tx = self.pool.begin().await?;
        // SET does not take bind parameters
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&stmt).execute(&mut *tx).await?;
        Ok(tx)
    }

    async fn commit(&self, unit: Self::Unit) -> Result<(), StoreError> {
        unit.commit().await?;
        Ok(())
    }

    async fn rollback(&self, unit: Self::Unit) -> Result<(), StoreError> {
        unit.rollback().await?;
        Ok(())
    }
}
