//! Internal Transfers - account ledger service
//!
//! Accounts hold a non-negative balance; money moves between them through
//! atomic transfers, deposits and bulk batches, with idempotent retries.
//!
//! # Modules
//!
//! - [`money`] - Decimal input parsing and precision bounds
//! - [`account`] - Account identity and rows
//! - [`transfer`] - Transfer engine, bulk processing and error taxonomy
//! - [`idempotency`] - Request fingerprinting and response replay
//! - [`store`] - Storage traits and the in-memory backend
//! - [`db`] - PostgreSQL pool, schema and store
//! - [`gateway`] - HTTP shell
//! - [`config`] / [`logging`] - Service configuration and tracing setup

// Value types
pub mod money;

// Core
pub mod account;
pub mod idempotency;
pub mod store;
pub mod transfer;

// Persistence
pub mod db;

// Service shell
pub mod config;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use account::{Account, AccountId};
pub use store::memory::MemoryStore;
pub use transfer::{
    BulkOutcome, LedgerError, Transfer, TransferEngine, TransferId, TransferRequest,
    TransferService, TransferStatus,
};
