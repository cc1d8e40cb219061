//! Transfer Core Types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::money::DecimalInput;

/// Maximum length of the free-text transfer reference
pub const MAX_REFERENCE_LEN: usize = 255;

/// Transfer identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TransferId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Transfer status
///
/// ```text
/// PENDING ──► COMPLETED
///    │
///    └──────► FAILED
/// ```
///
/// Only forward transitions out of `Pending` exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    /// Storage representation (matches the `status` CHECK constraint)
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(format!("Invalid transfer status: {}", other)),
        }
    }
}

/// Transfer record as persisted in the transaction log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    pub id: TransferId,
    /// `None` for a deposit (no debit leg)
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// New `pending` record for a request
    pub fn pending(req: &TransferRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: TransferId::new(),
            source_account_id: req.source_account_id,
            destination_account_id: req.destination_account_id,
            amount: req.amount.inner(),
            reference: req.reference.clone(),
            status: TransferStatus::Pending,
            created_at: now,
            completed_at: None,
        }
    }

    /// Whether `account` participates on either leg
    pub fn involves(&self, account: AccountId) -> bool {
        self.destination_account_id == account || self.source_account_id == Some(account)
    }

    pub fn is_deposit(&self) -> bool {
        self.source_account_id.is_none()
    }
}

/// A single transfer request as decoded at the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: AccountId,
    pub amount: DecimalInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl TransferRequest {
    /// Transfer between two accounts
    pub fn new(source: AccountId, destination: AccountId, amount: Decimal) -> Self {
        Self {
            source_account_id: Some(source),
            destination_account_id: destination,
            amount: amount.into(),
            reference: None,
        }
    }

    /// Deposit into `destination` (no debit leg)
    pub fn deposit(destination: AccountId, amount: Decimal) -> Self {
        Self {
            source_account_id: None,
            destination_account_id: destination,
            amount: amount.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Bulk request body: `{ "transfers": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTransferRequest {
    pub transfers: Vec<TransferRequest>,
}

/// Explicit request variant for `POST /v1/transactions`
///
/// Decided once at the boundary by the presence of the `transfers` field;
/// nothing downstream re-inspects the JSON shape.
#[derive(Debug, Clone)]
pub enum TransferCommand {
    Single(TransferRequest),
    Bulk(Vec<TransferRequest>),
}

impl TransferCommand {
    /// Decode a raw JSON body into the matching variant
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let is_bulk = value
            .as_object()
            .is_some_and(|obj| obj.contains_key("transfers"));

        if is_bulk {
            let bulk: BulkTransferRequest = serde_json::from_value(value)?;
            Ok(TransferCommand::Bulk(bulk.transfers))
        } else {
            Ok(TransferCommand::Single(serde_json::from_value(value)?))
        }
    }
}

/// Pagination for account transfer listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Normalize caller-supplied values
    ///
    /// Missing or non-positive limit falls back to the default, larger than
    /// the maximum is clamped to it; negative offset becomes zero.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > Self::MAX_LIMIT => Self::MAX_LIMIT,
            Some(l) if l > 0 => l,
            _ => Self::DEFAULT_LIMIT,
        };
        Self {
            limit,
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_transitions() {
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Completed));
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Failed));
        assert!(!TransferStatus::Completed.can_transition_to(TransferStatus::Failed));
        assert!(!TransferStatus::Failed.can_transition_to(TransferStatus::Completed));
        assert!(!TransferStatus::Pending.can_transition_to(TransferStatus::Pending));
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_text() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Completed,
            TransferStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
        assert!("done".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_command_single() {
        let dest = AccountId::new();
        let body = format!(
            r#"{{"destination_account_id":"{}","amount":"100.00"}}"#,
            dest
        );
        match TransferCommand::from_json(body.as_bytes()).unwrap() {
            TransferCommand::Single(req) => {
                assert_eq!(req.destination_account_id, dest);
                assert!(req.source_account_id.is_none());
                assert_eq!(*req.amount, dec!(100.00));
            }
            TransferCommand::Bulk(_) => panic!("expected single"),
        }
    }

    #[test]
    fn test_command_bulk() {
        let a = AccountId::new();
        let b = AccountId::new();
        let body = format!(
            r#"{{"transfers":[
                {{"source_account_id":"{a}","destination_account_id":"{b}","amount":1}},
                {{"destination_account_id":"{a}","amount":"2.5","reference":"r"}}
            ]}}"#
        );
        match TransferCommand::from_json(body.as_bytes()).unwrap() {
            TransferCommand::Bulk(reqs) => {
                assert_eq!(reqs.len(), 2);
                assert_eq!(reqs[0].source_account_id, Some(a));
                assert_eq!(reqs[1].reference.as_deref(), Some("r"));
            }
            TransferCommand::Single(_) => panic!("expected bulk"),
        }
    }

    #[test]
    fn test_command_rejects_malformed() {
        assert!(TransferCommand::from_json(b"not json").is_err());
        assert!(TransferCommand::from_json(br#"{"amount":"1"}"#).is_err());
        assert!(TransferCommand::from_json(br#"{"transfers":"nope"}"#).is_err());
    }

    #[test]
    fn test_page_normalization() {
        assert_eq!(Page::new(None, None), Page { limit: 20, offset: 0 });
        assert_eq!(Page::new(Some(0), Some(-5)), Page { limit: 20, offset: 0 });
        assert_eq!(Page::new(Some(-1), None).limit, 20);
        assert_eq!(Page::new(Some(1), None).limit, 1);
        assert_eq!(Page::new(Some(100), None).limit, 100);
        assert_eq!(Page::new(Some(500), Some(40)), Page { limit: 100, offset: 40 });
    }

    #[test]
    fn test_transfer_involves() {
        let a = AccountId::new();
        let b = AccountId::new();
        let t = Transfer::pending(&TransferRequest::new(a, b, dec!(1)), Utc::now());
        assert!(t.involves(a));
        assert!(t.involves(b));
        assert!(!t.involves(AccountId::new()));
        assert!(!t.is_deposit());
        assert_eq!(t.status, TransferStatus::Pending);
        assert!(t.completed_at.is_none());
    }
}
