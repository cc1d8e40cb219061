//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError` / `ApiResult<T>`: handler error path
//! - `error_codes`: Standard error code constants

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::transfer::{ErrorKind, LedgerError};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: payload; also present on bulk failures so per-item errors are visible
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Response carrying both an error code and a payload
    pub fn with_code(code: i32, msg: impl Into<String>, data: T) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Error path
// ============================================================================

/// Handler error rendered as `ApiResponse<()>` with an HTTP status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 with data
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// 201 with data
pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn conflict(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn body(&self) -> ApiResponse<()> {
        ApiResponse::<()>::error(self.code, self.msg.clone())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::TransactionAborted => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// API error code for each error kind
pub fn code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => error_codes::INVALID_PARAMETER,
        ErrorKind::NotFound => error_codes::NOT_FOUND,
        ErrorKind::InsufficientFunds => error_codes::INSUFFICIENT_FUNDS,
        ErrorKind::TransactionAborted => error_codes::TRANSACTION_ABORTED,
        ErrorKind::Internal => error_codes::INTERNAL_ERROR,
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let kind = err.kind();
        // Internal detail stays in the logs; Display is already generic
        Self::new(status_for(kind), code_for(kind), err.to_string())
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_FUNDS: i32 = 1002;
    pub const BULK_FAILED: i32 = 1003;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const TRANSACTION_ABORTED: i32 = 4009;
    pub const IDEMPOTENCY_IN_FLIGHT: i32 = 4010;
    pub const REQUEST_TIMEOUT: i32 = 4080;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::Entity;

    #[test]
    fn test_success_serialization() {
        let json = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json, serde_json::json!({"code": 0, "msg": "ok", "data": 42}));
    }

    #[test]
    fn test_error_omits_data() {
        let json = serde_json::to_value(ApiResponse::<()>::error(1001, "bad")).unwrap();
        assert_eq!(json, serde_json::json!({"code": 1001, "msg": "bad"}));
    }

    #[test]
    fn test_ledger_error_mapping() {
        let cases = [
            (
                LedgerError::validation("amount", "must be greater than zero"),
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_PARAMETER,
            ),
            (
                LedgerError::NotFound(Entity::Account),
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
            ),
            (
                LedgerError::InsufficientFunds,
                StatusCode::UNPROCESSABLE_ENTITY,
                error_codes::INSUFFICIENT_FUNDS,
            ),
            (
                LedgerError::TransactionAborted("deadlock".into()),
                StatusCode::CONFLICT,
                error_codes::TRANSACTION_ABORTED,
            ),
            (
                LedgerError::Internal("pool closed".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_internal_message_is_generic() {
        let api = ApiError::from(LedgerError::Internal("password=hunter2".into()));
        assert_eq!(api.msg, "internal error");
    }

    #[test]
    fn test_aborted_message_is_generic() {
        let api = ApiError::from(LedgerError::TransactionAborted(
            "lock wait timeout on account 6f1c".into(),
        ));
        assert_eq!(api.msg, "transaction aborted, retry the request");
    }
}
