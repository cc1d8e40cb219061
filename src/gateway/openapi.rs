//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::types::{
    AccountLookup, AccountView, BalanceAtView, BulkFailureView, BulkResultView,
    BulkTransferRequestBody, CreateAccountRequest, DatabaseHealth, HealthResponse,
    PaginationView, PoolView, TransactionListView, TransferRequestBody, TransferView,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Internal Transfers API",
        version = "1.0.0",
        description = "Accounts with non-negative balances, atomic transfers, deposits, bulk batches and idempotent retries.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_account,
        crate::gateway::handlers::get_account,
        crate::gateway::handlers::list_account_transactions,
        crate::gateway::handlers::create_transaction,
        crate::gateway::handlers::get_transaction,
        crate::gateway::handlers::get_transaction_by_reference,
    ),
    components(
        schemas(
            HealthResponse,
            DatabaseHealth,
            PoolView,
            CreateAccountRequest,
            AccountView,
            BalanceAtView,
            AccountLookup,
            TransferRequestBody,
            BulkTransferRequestBody,
            TransferView,
            BulkResultView,
            BulkFailureView,
            TransactionListView,
            PaginationView,
        )
    ),
    tags(
        (name = "Accounts", description = "Account creation, balances and transfer history"),
        (name = "Transactions", description = "Transfers, deposits and bulk batches"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Internal Transfers API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths;
        for path in [
            "/health",
            "/v1/accounts",
            "/v1/accounts/{id}",
            "/v1/accounts/{id}/transactions",
            "/v1/transactions",
            "/v1/transactions/{id}",
            "/v1/transactions/reference/{reference}",
        ] {
            assert!(paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_openapi_json_serializable() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("Internal Transfers API"));
    }
}
