//! Account management module
//!
//! PostgreSQL-backed account rows with a non-negative balance. The
//! [`crate::store::AccountStore`] implementation for PostgreSQL lives in
//! [`repository`].

pub mod models;
pub mod repository;

// Re-export commonly used types
pub use models::{Account, AccountId};
