//! Transfer Error Types
//!
//! Every failure the ledger can report is one [`LedgerError`] variant. The
//! HTTP layer maps [`ErrorKind`] to a status code with an exhaustive match, so
//! adding a variant here forces a decision there.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Which entity a not-found error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    SourceAccount,
    DestinationAccount,
    Account,
    Transfer,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::SourceAccount => "source account",
            Entity::DestinationAccount => "destination account",
            Entity::Account => "account",
            Entity::Transfer => "transaction",
        })
    }
}

/// Ledger error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("insufficient funds")]
    InsufficientFunds,

    /// Detail (lock conflict, constraint name, deadline) is logged by the
    /// engine; clients get a fixed message and may retry.
    #[error("transaction aborted, retry the request")]
    TransactionAborted(String),

    /// Detail is logged where the error is raised; clients only see the
    /// generic message.
    #[error("internal error")]
    Internal(String),
}

/// Coarse classification used by bulk results and the HTTP mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    TransactionAborted,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::TransactionAborted => "transaction_aborted",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Whether a client may retry the identical request and expect a
    /// different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransactionAborted | ErrorKind::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LedgerError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation { .. } => ErrorKind::Validation,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientFunds => ErrorKind::InsufficientFunds,
            LedgerError::TransactionAborted(_) => ErrorKind::TransactionAborted,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Store failures raised while an atomic unit is open
///
/// Lock conflicts and constraint violations inside a unit mean the unit was
/// aborted; anything else is an internal failure.
impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) | StoreError::Constraint(msg) => {
                LedgerError::TransactionAborted(msg)
            }
            StoreError::Missing(msg) | StoreError::Backend(msg) => LedgerError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            LedgerError::validation("amount", "must be positive").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LedgerError::NotFound(Entity::SourceAccount).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::InsufficientFunds.kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            LedgerError::TransactionAborted("x".into()).kind().as_str(),
            "transaction_aborted"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LedgerError::validation("amount", "must be positive").to_string(),
            "invalid amount: must be positive"
        );
        assert_eq!(
            LedgerError::NotFound(Entity::DestinationAccount).to_string(),
            "destination account not found"
        );
        assert_eq!(LedgerError::InsufficientFunds.to_string(), "insufficient funds");
    }

    #[test]
    fn test_aborted_hides_detail() {
        let err = LedgerError::from(StoreError::Constraint(
            "new row violates check constraint \"accounts_balance_check\"".into(),
        ));
        assert_eq!(err.to_string(), "transaction aborted, retry the request");
        assert!(matches!(err, LedgerError::TransactionAborted(ref d) if d.contains("accounts_balance_check")));
    }

    #[test]
    fn test_internal_hides_detail() {
        let err = LedgerError::Internal("connection refused to 10.0.0.5".into());
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn test_from_store_error() {
        assert_eq!(
            LedgerError::from(StoreError::Conflict("deadlock".into())).kind(),
            ErrorKind::TransactionAborted
        );
        assert_eq!(
            LedgerError::from(StoreError::Constraint("balance check".into())).kind(),
            ErrorKind::TransactionAborted
        );
        assert_eq!(
            LedgerError::from(StoreError::Backend("io".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::TransactionAborted.is_retryable());
        assert!(ErrorKind::Internal.is_retryable());
        assert!(!ErrorKind::InsufficientFunds.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
    }
}
