//! Transfer handlers
//!
//! `POST /v1/transactions` accepts either a single transfer or a bulk batch.
//! With an `Idempotency-Key` header the request is admitted through the
//! idempotency gate first:
//!
//! ```text
//! admit ─┬─ Replay   ─► stored status + body, untouched
//!        ├─ InFlight ─► 409
//!        └─ Execute  ─► run command ─► settle (store or release) ─► respond
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::CONTENT_TYPE,
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use super::super::state::AppState;
use super::super::types::{
    ApiError, ApiResponse, ApiResult, BulkResultView, TransferRequestBody, TransferView,
    error_codes, ok,
};
use crate::idempotency::{Admission, IDEMPOTENCY_HEADER, StoredResponse};
use crate::transfer::{BulkStatus, LedgerError, TransferCommand, TransferId, TransferService};

/// Set on responses served from the idempotency store
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

const FALLBACK_BODY: &str = r#"{"code":5000,"msg":"internal error"}"#;

/// A fully rendered JSON response, kept as text so it can be stored verbatim
#[derive(Debug, Clone)]
struct Rendered {
    status: StatusCode,
    body: String,
    /// Whether an identical retry should get this response back
    replayable: bool,
}

impl Rendered {
    fn json<T: Serialize>(status: StatusCode, payload: &ApiResponse<T>, replayable: bool) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self {
                status,
                body,
                replayable,
            },
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: FALLBACK_BODY.to_string(),
                    replayable: false,
                }
            }
        }
    }

    fn error(err: ApiError, replayable: bool) -> Self {
        Self::json(err.status, &err.body(), replayable)
    }

    /// Engine failures are replayable unless retrying could succeed
    fn ledger_error(err: LedgerError) -> Self {
        let replayable = !err.kind().is_retryable();
        Self::error(err.into(), replayable)
    }
}

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        json_response(self.status, self.body)
    }
}

fn json_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

fn replay(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = json_response(status, stored.body);
    response.headers_mut().insert(
        HeaderName::from_static(REPLAYED_HEADER),
        HeaderValue::from_static("true"),
    );
    response
}

/// Extract the idempotency token, if any
fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(raw) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = raw
        .to_str()
        .map_err(|_| ApiError::bad_request("Idempotency-Key must be visible ASCII"))?
        .trim();
    if key.is_empty() {
        return Err(ApiError::bad_request("Idempotency-Key must not be empty"));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::bad_request(format!(
            "Idempotency-Key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    Ok(Some(key.to_string()))
}

/// Decode the body once and run the matching engine operation
async fn execute_command(ledger: &dyn TransferService, body: &[u8]) -> Rendered {
    let command = match TransferCommand::from_json(body) {
        Ok(command) => command,
        Err(e) => {
            return Rendered::error(
                ApiError::bad_request(format!("invalid request body: {}", e)),
                true,
            );
        }
    };

    match command {
        TransferCommand::Single(req) => match ledger.create_transfer(req).await {
            Ok(transfer) => Rendered::json(
                StatusCode::CREATED,
                &ApiResponse::success(TransferView::from(transfer)),
                true,
            ),
            Err(err) => Rendered::ledger_error(err),
        },
        TransferCommand::Bulk(reqs) => match ledger.process_bulk(reqs).await {
            Ok(outcome) => {
                let replayable = outcome.is_final();
                let status = outcome.status();
                let view = BulkResultView::from(outcome);
                let (http_status, payload) = match status {
                    BulkStatus::FullSuccess => (StatusCode::CREATED, ApiResponse::success(view)),
                    BulkStatus::PartialSuccess => (
                        StatusCode::MULTI_STATUS,
                        ApiResponse::with_code(error_codes::SUCCESS, status.as_str(), view),
                    ),
                    BulkStatus::FullFailure => (
                        StatusCode::BAD_REQUEST,
                        ApiResponse::with_code(
                            error_codes::BULK_FAILED,
                            "all transfers failed",
                            view,
                        ),
                    ),
                };
                Rendered::json(http_status, &payload, replayable)
            }
            Err(err) => Rendered::ledger_error(err),
        },
    }
}

/// Create a transfer, a deposit, or a bulk batch
///
/// POST /v1/transactions
///
/// Bulk bodies (`{"transfers": [...]}`) answer 201 when every element
/// succeeded, 207 on partial success and 400 when all failed.
#[utoipa::path(
    post,
    path = "/v1/transactions",
    request_body(
        content = TransferRequestBody,
        description = "Single transfer; send `{\"transfers\": [...]}` (1 to 100 entries) for a bulk batch",
        content_type = "application/json"
    ),
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first response for the same key and body")
    ),
    responses(
        (status = 201, description = "Transfer completed or every bulk element succeeded", body = TransferView),
        (status = 207, description = "Bulk partial success", body = BulkResultView),
        (status = 400, description = "Validation failure, or every bulk element failed"),
        (status = 404, description = "Unknown source or destination account"),
        (status = 409, description = "Transaction aborted, or same idempotency key still in flight"),
        (status = 422, description = "Insufficient funds")
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = match idempotency_key(&headers) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let Some(token) = token else {
        return execute_command(state.ledger.as_ref(), &body)
            .await
            .into_response();
    };

    let fingerprint = match state.idempotency.admit(&token, &body).await {
        Ok(Admission::Replay(stored)) => return replay(stored),
        Ok(Admission::InFlight) => {
            return ApiError::conflict(
                error_codes::IDEMPOTENCY_IN_FLIGHT,
                "a request with this Idempotency-Key is still in progress",
            )
            .into_response();
        }
        Ok(Admission::Execute(fingerprint)) => fingerprint,
        Err(e) => {
            error!(error = %e, "Idempotency store unavailable");
            return ApiError::service_unavailable("idempotency store unavailable").into_response();
        }
    };

    // Detached so a request cancelled by the timeout layer still settles its claim
    let task = tokio::spawn(async move {
        let rendered = execute_command(state.ledger.as_ref(), &body).await;
        let stored = StoredResponse::new(rendered.status.as_u16(), rendered.body.clone());
        if let Err(e) = state
            .idempotency
            .settle(&fingerprint, &stored, rendered.replayable)
            .await
        {
            warn!(fingerprint = %fingerprint, error = %e, "Failed to settle idempotency record");
        }
        rendered
    });

    match task.await {
        Ok(rendered) => rendered.into_response(),
        Err(e) => {
            error!(error = %e, "Transfer task failed");
            ApiError::internal("internal error").into_response()
        }
    }
}

/// Get a transfer by id
///
/// GET /v1/transactions/{id}
#[utoipa::path(
    get,
    path = "/v1/transactions/{id}",
    params(("id" = String, Path, description = "Transfer UUID")),
    responses(
        (status = 200, description = "Transfer", body = TransferView),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Unknown transfer")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TransferView> {
    let id: TransferId = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid transaction id: {}", id)))?;
    let transfer = state.ledger.get_transfer(id).await?;
    ok(transfer.into())
}

/// Most recent transfer carrying a client reference
///
/// GET /v1/transactions/reference/{reference}
#[utoipa::path(
    get,
    path = "/v1/transactions/reference/{reference}",
    params(("reference" = String, Path, description = "Client-supplied reference")),
    responses(
        (status = 200, description = "Transfer", body = TransferView),
        (status = 404, description = "No transfer with this reference")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction_by_reference(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> ApiResult<TransferView> {
    let transfer = state.ledger.get_transfer_by_reference(&reference).await?;
    ok(transfer.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers).unwrap(), None);

        let name = HeaderName::from_static("idempotency-key");
        headers.insert(name.clone(), HeaderValue::from_static(" key-1 "));
        assert_eq!(idempotency_key(&headers).unwrap().as_deref(), Some("key-1"));

        headers.insert(name.clone(), HeaderValue::from_static("  "));
        assert!(idempotency_key(&headers).is_err());

        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        headers.insert(name, HeaderValue::from_str(&long).unwrap());
        assert!(idempotency_key(&headers).is_err());
    }

    #[test]
    fn test_retryable_errors_are_not_replayable() {
        let aborted = Rendered::ledger_error(LedgerError::TransactionAborted("deadlock".into()));
        assert_eq!(aborted.status, StatusCode::CONFLICT);
        assert!(!aborted.replayable);

        let funds = Rendered::ledger_error(LedgerError::InsufficientFunds);
        assert_eq!(funds.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(funds.replayable);
    }

    #[test]
    fn test_replay_marks_response() {
        let response = replay(StoredResponse::new(201, r#"{"code":0}"#));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[REPLAYED_HEADER], "true");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
