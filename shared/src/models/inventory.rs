//! Inventory movement models

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::UnknownVariant;

/// Kind of stock movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Add,
    Remove,
    Return,
    Adjust,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "ADD",
            ChangeType::Remove => "REMOVE",
            ChangeType::Return => "RETURN",
            ChangeType::Adjust => "ADJUST",
        }
    }

    /// ADD and RETURN put stock on the shelf; REMOVE and ADJUST take it off
    pub fn is_increase(&self) -> bool {
        matches!(self, ChangeType::Add | ChangeType::Return)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(ChangeType::Add),
            "REMOVE" => Ok(ChangeType::Remove),
            "RETURN" => Ok(ChangeType::Return),
            "ADJUST" => Ok(ChangeType::Adjust),
            other => Err(UnknownVariant::new("change type", other)),
        }
    }
}
