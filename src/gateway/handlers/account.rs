//! Account handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
};

use super::super::state::AppState;
use super::super::types::{
    AccountLookup, AccountView, ApiError, ApiResult, BalanceAtView, BalanceQuery,
    CreateAccountRequest, PageQuery, PaginationView, TransactionListView, TransferView, created,
    ok,
};
use crate::account::AccountId;

/// Parse an `{id}` path segment
pub(super) fn parse_account_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid account id: {}", raw)))
}

/// Open an account
///
/// POST /v1/accounts
///
/// The body is optional; an empty body opens an account with a zero balance.
#[utoipa::path(
    post,
    path = "/v1/accounts",
    request_body(content = CreateAccountRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Account created", body = AccountView),
        (status = 400, description = "Negative or malformed initial balance")
    ),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<AccountView> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CreateAccountRequest::default()
    } else {
        serde_json::from_slice::<CreateAccountRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?
    };

    let account = state
        .ledger
        .create_account(req.initial_balance.map(|b| b.inner()))
        .await?;
    created(account.into())
}

/// Get an account, or its balance as of `at`
///
/// GET /v1/accounts/{id}?at=<rfc3339>
#[utoipa::path(
    get,
    path = "/v1/accounts/{id}",
    params(
        ("id" = String, Path, description = "Account UUID"),
        BalanceQuery
    ),
    responses(
        (status = 200, description = "Account or historical balance", body = AccountLookup),
        (status = 400, description = "Malformed id or timestamp"),
        (status = 404, description = "Unknown account")
    ),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> ApiResult<AccountLookup> {
    let id = parse_account_id(&id)?;
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;

    match query.at {
        Some(at) => {
            let balance = state.ledger.balance_at(id, at).await?;
            ok(AccountLookup::AsOf(BalanceAtView {
                id: id.as_uuid(),
                balance: balance.to_string(),
                balance_at: at,
            }))
        }
        None => {
            let account = state.ledger.get_account(id).await?;
            ok(AccountLookup::Current(account.into()))
        }
    }
}

/// Transfers touching an account, newest first
///
/// GET /v1/accounts/{id}/transactions?limit=&offset=
#[utoipa::path(
    get,
    path = "/v1/accounts/{id}/transactions",
    params(
        ("id" = String, Path, description = "Account UUID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "One page of transfers", body = TransactionListView),
        (status = 400, description = "Malformed id or paging parameters"),
        (status = 404, description = "Unknown account")
    ),
    tag = "Accounts"
)]
pub async fn list_account_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<TransactionListView> {
    let id = parse_account_id(&id)?;
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = query.page();

    let transfers = state.ledger.list_account_transfers(id, page).await?;
    let transactions: Vec<TransferView> = transfers.into_iter().map(Into::into).collect();

    ok(TransactionListView {
        account_id: id.as_uuid(),
        pagination: PaginationView {
            limit: page.limit,
            offset: page.offset,
            count: transactions.len(),
        },
        transactions,
    })
}
