//! Idempotent request replay
//!
//! A request carrying an idempotency token goes through [`IdempotencyGate`]
//! before it reaches the engine:
//!
//! 1. `admit` computes the fingerprint and replays a stored response if one
//!    exists; otherwise it claims the fingerprint.
//! 2. The caller executes the operation.
//! 3. `settle` stores the response, or releases the claim when the outcome
//!    was a retryable failure.
//!
//! A second request with the same fingerprint arriving while the first is
//! still executing gets [`Admission::InFlight`].

pub mod db;
pub mod models;

use std::sync::Arc;

use tracing::{debug, warn};

pub use models::{DEFAULT_TTL, IDEMPOTENCY_HEADER, StoredResponse, fingerprint};

use crate::store::{IdempotencyStore, StoreError};

/// Admission decision for an idempotent request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Already executed: return this response, do nothing else
    Replay(StoredResponse),
    /// First sight: execute, then `settle` with this fingerprint
    Execute(String),
    /// Another request with the same fingerprint has not finished yet
    InFlight,
}

#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }

    pub async fn admit(&self, token: &str, body: &[u8]) -> Result<Admission, StoreError> {
        let fp = fingerprint(token, body);

        if let Some(stored) = self.store.get_completed(&fp).await? {
            debug!(fingerprint = %fp, status = stored.status, "Idempotent replay");
            return Ok(Admission::Replay(stored));
        }

        let body_text = String::from_utf8_lossy(body);
        if self.store.begin_if_absent(&fp, &body_text).await? {
            return Ok(Admission::Execute(fp));
        }

        // Lost the claim race; the winner may have finished in between
        match self.store.get_completed(&fp).await? {
            Some(stored) => Ok(Admission::Replay(stored)),
            None => Ok(Admission::InFlight),
        }
    }

    /// Record the outcome of an admitted request
    ///
    /// `replayable = false` releases the claim instead, so the same request
    /// can be retried and executed again.
    pub async fn settle(
        &self,
        fingerprint: &str,
        response: &StoredResponse,
        replayable: bool,
    ) -> Result<(), StoreError> {
        if replayable {
            self.store.complete_with(fingerprint, response).await
        } else {
            self.store.release(fingerprint).await
        }
    }

    /// Release a claim after the request could not be executed at all
    pub async fn abandon(&self, fingerprint: &str) {
        if let Err(e) = self.store.release(fingerprint).await {
            warn!(fingerprint = %fingerprint, error = %e, "Failed to release idempotency claim");
        }
    }

    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.store.purge_expired().await
    }
}

/// Periodically delete expired records until `shutdown` resolves
pub async fn run_sweeper(
    gate: IdempotencyGate,
    interval: std::time::Duration,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Idempotency sweeper stopping");
                return;
            }
            _ = ticker.tick() => {
                match gate.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(purged = n, "Purged expired idempotency records"),
                    Err(e) => warn!(error = %e, "Idempotency sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::time::Duration;

    fn gate_with_ttl(ttl: Duration) -> IdempotencyGate {
        IdempotencyGate::new(Arc::new(MemoryStore::with_idempotency_ttl(ttl)))
    }

    #[tokio::test]
    async fn test_first_request_executes() {
        let gate = gate_with_ttl(DEFAULT_TTL);
        let admission = gate.admit("k", b"{}").await.unwrap();
        assert_eq!(admission, Admission::Execute(fingerprint("k", b"{}")));
    }

    #[tokio::test]
    async fn test_completed_request_replays() {
        let gate = gate_with_ttl(DEFAULT_TTL);
        let Admission::Execute(fp) = gate.admit("k", b"{}").await.unwrap() else {
            panic!("expected execute");
        };
        let response = StoredResponse::new(201, r#"{"id":1}"#);
        gate.settle(&fp, &response, true).await.unwrap();

        assert_eq!(
            gate.admit("k", b"{}").await.unwrap(),
            Admission::Replay(response)
        );
    }

    #[tokio::test]
    async fn test_unfinished_request_is_in_flight() {
        let gate = gate_with_ttl(DEFAULT_TTL);
        assert!(matches!(
            gate.admit("k", b"{}").await.unwrap(),
            Admission::Execute(_)
        ));
        assert_eq!(gate.admit("k", b"{}").await.unwrap(), Admission::InFlight);
    }

    #[tokio::test]
    async fn test_released_request_executes_again() {
        let gate = gate_with_ttl(DEFAULT_TTL);
        let Admission::Execute(fp) = gate.admit("k", b"{}").await.unwrap() else {
            panic!("expected execute");
        };
        gate.settle(&fp, &StoredResponse::new(409, "{}"), false)
            .await
            .unwrap();
        assert!(matches!(
            gate.admit("k", b"{}").await.unwrap(),
            Admission::Execute(_)
        ));
    }

    #[tokio::test]
    async fn test_different_token_is_independent() {
        let gate = gate_with_ttl(DEFAULT_TTL);
        let Admission::Execute(fp) = gate.admit("k1", b"{}").await.unwrap() else {
            panic!("expected execute");
        };
        gate.settle(&fp, &StoredResponse::new(201, "{}"), true)
            .await
            .unwrap();
        assert!(matches!(
            gate.admit("k2", b"{}").await.unwrap(),
            Admission::Execute(_)
        ));
    }

    #[tokio::test]
    async fn test_expired_record_is_not_replayed() {
        let gate = gate_with_ttl(Duration::from_millis(20));
        let Admission::Execute(fp) = gate.admit("k", b"{}").await.unwrap() else {
            panic!("expected execute");
        };
        gate.settle(&fp, &StoredResponse::new(201, "{}"), true)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            gate.admit("k", b"{}").await.unwrap(),
            Admission::Execute(_)
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let gate = gate_with_ttl(Duration::from_millis(10));
        gate.admit("a", b"1").await.unwrap();
        gate.admit("b", b"2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gate.purge_expired().await.unwrap(), 2);
        assert_eq!(gate.purge_expired().await.unwrap(), 0);
    }
}
