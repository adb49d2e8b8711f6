//! Inventory notification models

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::UnknownVariant;

/// Notes attached to every expiry notification
pub const EXPIRY_NOTES: &str = "Create plan to clear out stock.";

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Stock fell below the reorder point
    StockIssue,
    /// A batch is about to expire
    StockExpiry,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::StockIssue => "STOCK_ISSUE",
            NotificationKind::StockExpiry => "STOCK_EXPIRY",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOCK_ISSUE" => Ok(NotificationKind::StockIssue),
            "STOCK_EXPIRY" => Ok(NotificationKind::StockExpiry),
            other => Err(UnknownVariant::new("notification kind", other)),
        }
    }
}

/// Work status of a notification task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Open => "OPEN",
            NotificationStatus::InProgress => "IN_PROGRESS",
            NotificationStatus::Closed => "CLOSED",
        }
    }

    /// OPEN and IN_PROGRESS notifications still need someone to act on them
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, NotificationStatus::Closed)
    }

    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (*self, next),
            (Open, InProgress) | (Open, Closed)
                | (InProgress, Open) | (InProgress, Closed)
                | (Closed, Open)
        )
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(NotificationStatus::Open),
            "IN_PROGRESS" => Ok(NotificationStatus::InProgress),
            "CLOSED" => Ok(NotificationStatus::Closed),
            other => Err(UnknownVariant::new("notification status", other)),
        }
    }
}
