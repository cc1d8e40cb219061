use std::sync::Arc;
use std::time::Duration;

use crate::db::{PgStore, PoolStats};
use crate::idempotency::IdempotencyGate;
use crate::store::memory::MemoryStore;
use crate::transfer::{TransferEngine, TransferService};

/// Storage backend behind the service, for health reporting
#[derive(Clone)]
pub enum Backend {
    Postgres(PgStore),
    Memory,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres(_) => "postgres",
            Backend::Memory => "memory",
        }
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        match self {
            Backend::Postgres(store) => Some(store.pool_stats()),
            Backend::Memory => None,
        }
    }
}

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    /// Transfer engine behind its object-safe facade
    pub ledger: Arc<dyn TransferService>,
    /// Replay gate for requests carrying an idempotency token
    pub idempotency: IdempotencyGate,
    pub backend: Backend,
    /// Whole-request timeout enforced by middleware
    pub request_timeout: Duration,
}

impl AppState {
    pub fn postgres(store: PgStore, transfer_deadline: Duration, request_timeout: Duration) -> Self {
        let engine =
            TransferEngine::new(Arc::new(store.clone())).with_deadline(transfer_deadline);
        Self {
            ledger: Arc::new(engine),
            idempotency: IdempotencyGate::new(Arc::new(store.clone())),
            backend: Backend::Postgres(store),
            request_timeout,
        }
    }

    pub fn memory(store: MemoryStore, transfer_deadline: Duration, request_timeout: Duration) -> Self {
        let engine =
            TransferEngine::new(Arc::new(store.clone())).with_deadline(transfer_deadline);
        Self {
            ledger: Arc::new(engine),
            idempotency: IdempotencyGate::new(Arc::new(store)),
            backend: Backend::Memory,
            request_timeout,
        }
    }
}
