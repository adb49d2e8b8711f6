//! Purchase order models

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::UnknownVariant;

/// Lifecycle of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    #[default]
    Pending,
    Ordered,
    Received,
    Canceled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Pending => "PENDING",
            PurchaseOrderStatus::Ordered => "ORDERED",
            PurchaseOrderStatus::Received => "RECEIVED",
            PurchaseOrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseOrderStatus::Received | PurchaseOrderStatus::Canceled)
    }

    /// Whether a purchase order may move from `self` to `next`.
    ///
    /// Goods can be received straight from PENDING when the order was
    /// placed outside the system.
    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Ordered) | (Pending, Received) | (Pending, Canceled)
                | (Ordered, Received) | (Ordered, Canceled)
        )
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseOrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PurchaseOrderStatus::Pending),
            "ORDERED" => Ok(PurchaseOrderStatus::Ordered),
            "RECEIVED" => Ok(PurchaseOrderStatus::Received),
            "CANCELED" => Ok(PurchaseOrderStatus::Canceled),
            other => Err(UnknownVariant::new("purchase order status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PurchaseOrderStatus::*;

    #[test]
    fn test_valid_transitions() {
        assert!(Pending.can_transition_to(Ordered));
        assert!(Pending.can_transition_to(Received));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Ordered.can_transition_to(Received));
        assert!(Ordered.can_transition_to(Canceled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Received, Canceled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Ordered, Received, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!Ordered.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }
}
