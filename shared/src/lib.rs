//! Shared types and models for the Stock Ledger
//!
//! This crate holds the pure parts of the system: domain models, the FIFO
//! batch ledger, the reorder optimizer and input validation. It performs no
//! I/O so the backend and its tests can use it directly.

pub mod ledger;
pub mod models;
pub mod reorder;
pub mod types;
pub mod validation;

pub use ledger::*;
pub use models::*;
pub use reorder::*;
pub use types::*;
pub use validation::*;
