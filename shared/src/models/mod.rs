//! Domain models for the Stock Ledger

mod inventory;
mod notification;
mod order;
mod purchase_order;

pub use inventory::*;
pub use notification::*;
pub use order::*;
pub use purchase_order::*;

use thiserror::Error;

/// Returned when a stored status or type string does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
