//! Transfer Engine
//!
//! Moves money between accounts with one atomic unit per transfer.
//!
//! # Flow
//!
//! ```text
//! TransferRequest ─► validate ─► lock(source) ─► lock(destination)
//!                                     │
//!                                     ▼
//!              insert PENDING ─► debit ─► credit ─► COMPLETED ─► commit
//! ```
//!
//! # Invariants
//!
//! 1. **Non-negative balances**: checked by the engine under the row lock and
//!    again by the store on every write
//! 2. **Conservation**: the debit and the credit of a transfer are the same
//!    amount and commit together or not at all
//! 3. **Append-only log**: transfer rows only ever move out of `pending`
//! 4. **No silent retry**: lock conflicts surface as
//!    [`LedgerError::TransactionAborted`]
//!
//! Bulk requests run each element as an independent transfer and report
//! per-index failures.

pub mod bulk;
pub mod db;
pub mod engine;
pub mod error;
pub mod types;


// Re-exports for convenience
pub use bulk::{BulkFailure, BulkOutcome, BulkStatus, MAX_BATCH_SIZE};
pub use engine::{TransferEngine, TransferService};
pub use error::{Entity, ErrorKind, LedgerError};
pub use types::{
    BulkTransferRequest, Page, Transfer, TransferCommand, TransferId, TransferRequest,
    TransferStatus,
};
