//! Bulk transfer results
//!
//! A batch is not atomic: every element runs as its own transfer and the
//! outcome is collected positionally.

use super::error::{ErrorKind, LedgerError};
use super::types::Transfer;

/// Largest accepted batch
pub const MAX_BATCH_SIZE: usize = 100;

/// Reject empty and oversize batches before any element executes
pub fn check_batch_size(len: usize) -> Result<(), LedgerError> {
    if len == 0 {
        return Err(LedgerError::validation(
            "transfers",
            "at least one transfer is required",
        ));
    }
    if len > MAX_BATCH_SIZE {
        return Err(LedgerError::validation(
            "transfers",
            format!("at most {} transfers per request", MAX_BATCH_SIZE),
        ));
    }
    Ok(())
}

/// One failed element of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub index: usize,
    pub message: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkStatus {
    FullSuccess,
    PartialSuccess,
    FullFailure,
}

impl BulkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStatus::FullSuccess => "success",
            BulkStatus::PartialSuccess => "partial_success",
            BulkStatus::FullFailure => "failure",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub succeeded: Vec<Transfer>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn record_failure(&mut self, index: usize, err: &LedgerError) {
        self.failed.push(BulkFailure {
            index,
            message: err.to_string(),
            kind: err.kind(),
        });
    }

    pub fn status(&self) -> BulkStatus {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (_, true) => BulkStatus::FullSuccess,
            (false, false) => BulkStatus::PartialSuccess,
            (true, false) => BulkStatus::FullFailure,
        }
    }

    /// Whether re-running the batch must be avoided: any committed element
    /// would be applied twice, and a batch with only final failures would
    /// fail the same way again.
    pub fn is_final(&self) -> bool {
        !self.succeeded.is_empty() || self.failed.iter().all(|f| !f.kind.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use crate::transfer::types::TransferRequest;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn transfer() -> Transfer {
        Transfer::pending(
            &TransferRequest::deposit(AccountId::new(), dec!(1)),
            Utc::now(),
        )
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(check_batch_size(0).is_err());
        assert!(check_batch_size(1).is_ok());
        assert!(check_batch_size(100).is_ok());
        assert!(matches!(
            check_batch_size(101),
            Err(LedgerError::Validation { field: "transfers", .. })
        ));
    }

    #[test]
    fn test_status_classification() {
        let mut outcome = BulkOutcome::default();
        outcome.succeeded.push(transfer());
        assert_eq!(outcome.status(), BulkStatus::FullSuccess);

        outcome.record_failure(1, &LedgerError::InsufficientFunds);
        assert_eq!(outcome.status(), BulkStatus::PartialSuccess);

        outcome.succeeded.clear();
        assert_eq!(outcome.status(), BulkStatus::FullFailure);
    }

    #[test]
    fn test_committed_elements_make_outcome_final() {
        let aborted = LedgerError::TransactionAborted("lock timeout".into());

        let mut outcome = BulkOutcome::default();
        outcome.succeeded.push(transfer());
        outcome.record_failure(1, &aborted);
        assert_eq!(outcome.status(), BulkStatus::PartialSuccess);
        assert!(outcome.is_final());

        outcome.succeeded.clear();
        assert!(!outcome.is_final());

        let mut rejected = BulkOutcome::default();
        rejected.record_failure(0, &LedgerError::InsufficientFunds);
        assert!(rejected.is_final());
    }
}
