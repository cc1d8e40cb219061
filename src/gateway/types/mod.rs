//! Gateway types module
//!
//! ## Submodules
//! - [`dto`]: request bodies, query parameters and response payloads
//! - [`response`]: `ApiResponse<T>`, `ApiError` and error codes

pub mod dto;
pub mod response;

// Re-export commonly used types at module root
pub use dto::{
    AccountLookup, AccountView, BalanceAtView, BalanceQuery, BulkFailureView, BulkResultView,
    BulkTransferRequestBody, CreateAccountRequest, DatabaseHealth, HealthResponse, PageQuery,
    PaginationView, PoolView, TransactionListView, TransferRequestBody, TransferView,
};
pub use response::{ApiError, ApiResponse, ApiResult, created, error_codes, ok};
