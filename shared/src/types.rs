//! Common types used across the platform

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a stock check message, `{"product_id": "<uuid>"}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockCheckRequest {
    pub product_id: Uuid,
}

impl StockCheckRequest {
    pub fn new(product_id: Uuid) -> Self {
        Self { product_id }
    }

    pub fn to_json(&self) -> String {
        // Serializing a struct holding a single Uuid cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"product_id":"{}"}}"#, self.product_id))
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Trailing sales window used by the reorder analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SalesWindow {
    pub days: u32,
}

impl SalesWindow {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// Start of the window ending at `now`
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for SalesWindow {
    fn default() -> Self {
        Self { days: 7 }
    }
}

/// Inclusive date range for queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The range covering `today` and the following `days` days
    pub fn ahead(today: NaiveDate, days: u32) -> Self {
        Self {
            start: today,
            end: today
                .checked_add_signed(Duration::days(i64::from(days)))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_check_request_json_shape() {
        let id = Uuid::new_v4();
        let body = StockCheckRequest::new(id).to_json();
        assert_eq!(body, format!(r#"{{"product_id":"{}"}}"#, id));
        assert_eq!(StockCheckRequest::from_json(&body).unwrap().product_id, id);
    }

    #[test]
    fn test_stock_check_request_rejects_garbage() {
        assert!(StockCheckRequest::from_json("{}").is_err());
        assert!(StockCheckRequest::from_json(r#"{"product_id": 42}"#).is_err());
    }

    #[test]
    fn test_date_range_ahead_is_inclusive() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let range = DateRange::ahead(today, 30);
        assert!(range.contains(today));
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));
    }

    #[test]
    fn test_windows_saturate_at_calendar_limits() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(DateRange::ahead(today, u32::MAX).end, NaiveDate::MAX);
        assert_eq!(DateRange::ahead(NaiveDate::MAX, 1).end, NaiveDate::MAX);

        assert_eq!(SalesWindow::new(u32::MAX).since(Utc::now()), DateTime::<Utc>::MIN_UTC);
        let now = Utc::now();
        assert_eq!(SalesWindow::new(7).since(now), now - Duration::days(7));
    }
}
