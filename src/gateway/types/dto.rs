//! Request and response DTOs
//!
//! Decimals leave the service as strings so no client ever parses money as
//! a binary float.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::account::Account;
use crate::money::DecimalInput;
use crate::transfer::{BulkFailure, BulkOutcome, Page, Transfer};

// ============================================================================
// Requests
// ============================================================================

/// POST /v1/accounts body (optional; empty body opens a zero-balance account)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    /// Non-negative starting balance
    #[schema(value_type = Option<String>, example = "1000.00")]
    #[serde(default)]
    pub initial_balance: Option<DecimalInput>,
}

/// Single transfer body (documentation schema)
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequestBody {
    /// Omit for a deposit
    pub source_account_id: Option<Uuid>,
    pub destination_account_id: Uuid,
    #[schema(example = "150.25")]
    pub amount: String,
    #[schema(max_length = 255)]
    pub reference: Option<String>,
}

/// Bulk transfer body (documentation schema)
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkTransferRequestBody {
    /// 1 to 100 transfers, each executed independently
    pub transfers: Vec<TransferRequestBody>,
}

/// `?at=` historical balance query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BalanceQuery {
    /// RFC 3339 timestamp
    pub at: Option<DateTime<Utc>>,
}

/// `?limit=&offset=` pagination query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Defaults to 20, at most 100
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountView {
    pub id: Uuid,
    #[schema(example = "1000.00")]
    pub balance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(a: Account) -> Self {
        Self {
            id: a.id.as_uuid(),
            balance: a.balance.to_string(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

/// Balance as of a point in time
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceAtView {
    pub id: Uuid,
    pub balance: String,
    pub balance_at: DateTime<Utc>,
}

/// GET /v1/accounts/{id} payload: current account, or balance when `at` is given
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum AccountLookup {
    Current(AccountView),
    AsOf(BalanceAtView),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferView {
    pub id: Uuid,
    pub source_account_id: Option<Uuid>,
    pub destination_account_id: Uuid,
    #[schema(example = "150.25")]
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[schema(example = "completed")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transfer> for TransferView {
    fn from(t: Transfer) -> Self {
        Self {
            id: t.id.as_uuid(),
            source_account_id: t.source_account_id.map(|id| id.as_uuid()),
            destination_account_id: t.destination_account_id.as_uuid(),
            amount: t.amount.to_string(),
            reference: t.reference,
            status: t.status.as_str().to_string(),
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkFailureView {
    /// Position in the request array
    pub index: usize,
    pub error: String,
    #[schema(example = "insufficient_funds")]
    pub error_kind: String,
}

impl From<BulkFailure> for BulkFailureView {
    fn from(f: BulkFailure) -> Self {
        Self {
            index: f.index,
            error: f.message,
            error_kind: f.kind.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResultView {
    #[schema(example = "partial_success")]
    pub status: String,
    pub total: usize,
    /// Succeeded transfers in request order
    pub transfers: Vec<TransferView>,
    pub failed: Vec<BulkFailureView>,
}

impl From<BulkOutcome> for BulkResultView {
    fn from(outcome: BulkOutcome) -> Self {
        let status = outcome.status().as_str().to_string();
        Self {
            status,
            total: outcome.succeeded.len() + outcome.failed.len(),
            transfers: outcome.succeeded.into_iter().map(Into::into).collect(),
            failed: outcome.failed.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginationView {
    pub limit: i64,
    pub offset: i64,
    /// Items in this page
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionListView {
    pub account_id: Uuid,
    pub transactions: Vec<TransferView>,
    pub pagination: PaginationView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PoolView {
    pub size: u32,
    pub idle: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseHealth {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "postgres")]
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0 (abc1234)")]
    pub version: String,
    pub database: DatabaseHealth,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use crate::transfer::{LedgerError, TransferRequest};
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_view_deposit_has_null_source() {
        let t = Transfer::pending(
            &TransferRequest::deposit(AccountId::new(), dec!(100.00)),
            Utc::now(),
        );
        let json = serde_json::to_value(TransferView::from(t)).unwrap();
        assert!(json["source_account_id"].is_null());
        assert_eq!(json["amount"], "100.00");
        assert_eq!(json["status"], "pending");
        assert!(json.get("completed_at").is_none());
    }

    #[test]
    fn test_bulk_view() {
        let mut outcome = BulkOutcome::default();
        outcome.succeeded.push(Transfer::pending(
            &TransferRequest::deposit(AccountId::new(), dec!(1)),
            Utc::now(),
        ));
        outcome.record_failure(1, &LedgerError::validation("amount", "must be greater than zero"));

        let json = serde_json::to_value(BulkResultView::from(outcome)).unwrap();
        assert_eq!(json["status"], "partial_success");
        assert_eq!(json["total"], 2);
        assert_eq!(json["failed"][0]["index"], 1);
        assert_eq!(json["failed"][0]["error_kind"], "validation_error");
        assert_eq!(
            json["failed"][0]["error"],
            "invalid amount: must be greater than zero"
        );
    }

    #[test]
    fn test_create_account_request_defaults() {
        let req: CreateAccountRequest = serde_json::from_str("{}").unwrap();
        assert!(req.initial_balance.is_none());
        let req: CreateAccountRequest =
            serde_json::from_str(r#"{"initial_balance":"500.50"}"#).unwrap();
        assert_eq!(*req.initial_balance.unwrap(), dec!(500.50));
    }
}
