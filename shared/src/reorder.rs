//! Reorder recommendations from recent sales
//!
//! The optimizer turns a trailing sales window and the current stock level
//! into a reorder point and a recommended order quantity:
//!
//! - daily usage = units sold in the window / window length
//! - reorder point = usage over (lead time + safety stock days), at least
//!   the configured minimum
//! - target stock = usage over (lead time + safety stock + review period)
//! - recommended order = what it takes to get back to the target

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tuning knobs for the optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    /// Length of the trailing sales window
    pub sales_window_days: u32,
    /// Days between placing and receiving an order
    pub lead_time_days: u32,
    /// Extra days of demand kept as a buffer
    pub safety_stock_days: u32,
    /// Days of demand an order should cover after it arrives
    pub review_period_days: u32,
    /// Floor for the reorder point; 1 means an empty shelf is always flagged
    pub min_reorder_point: i64,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            sales_window_days: 7,
            lead_time_days: 7,
            safety_stock_days: 3,
            review_period_days: 14,
            min_reorder_point: 1,
        }
    }
}

/// Outcome of a reorder analysis for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: Uuid,
    pub current_stock: i64,
    pub units_sold: i64,
    pub sales_window_days: u32,
    /// Units per day, rounded to 2 decimal places
    pub daily_average_usage: Decimal,
    pub reorder_point: i64,
    pub target_stock: i64,
    pub recommended_order: i64,
    pub needs_reorder: bool,
}

impl Recommendation {
    /// Notes stored on the stock issue notification
    pub fn alert_notes(&self) -> String {
        format!(
            "Stock Alert: Current stock ({}) is below reorder point ({}). \
             Recommended order: {} units based on {}-day sales average of {} units/day",
            self.current_stock,
            self.reorder_point,
            self.recommended_order,
            self.sales_window_days,
            self.daily_average_usage.normalize(),
        )
    }
}

/// Reorder optimizer
#[derive(Debug, Clone, Default)]
pub struct InventoryOptimizer {
    policy: ReorderPolicy,
}

/// Whole units needed to cover `days` of `daily` usage, saturating at `i64::MAX`
fn units_for(daily: Decimal, days: Decimal) -> i64 {
    daily
        .checked_mul(days)
        .and_then(|units| units.ceil().to_i64())
        .unwrap_or(i64::MAX)
}

impl InventoryOptimizer {
    pub fn new(policy: ReorderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReorderPolicy {
        &self.policy
    }

    /// Average units sold per day over the sales window
    pub fn daily_average_usage(&self, delivered_quantities: &[i32]) -> Decimal {
        let units_sold: i64 = delivered_quantities.iter().map(|&q| i64::from(q.max(0))).sum();
        let window = Decimal::from(self.policy.sales_window_days.max(1));
        Decimal::from(units_sold) / window
    }

    /// Analyse one product.
    ///
    /// `delivered_quantities` are the item quantities of orders delivered
    /// inside the sales window.
    pub fn generate_recommendations(
        &self,
        product_id: Uuid,
        delivered_quantities: &[i32],
        current_stock: i64,
    ) -> Recommendation {
        let p = &self.policy;
        let units_sold: i64 = delivered_quantities.iter().map(|&q| i64::from(q.max(0))).sum();
        let daily = self.daily_average_usage(delivered_quantities);

        let cover_days = Decimal::from(p.lead_time_days) + Decimal::from(p.safety_stock_days);
        let reorder_point = units_for(daily, cover_days).max(p.min_reorder_point);

        let target_days = cover_days + Decimal::from(p.review_period_days);
        let target_stock = units_for(daily, target_days).max(reorder_point);

        let needs_reorder = current_stock < reorder_point;
        let recommended_order = if needs_reorder {
            target_stock.saturating_sub(current_stock).max(0)
        } else {
            0
        };

        Recommendation {
            product_id,
            current_stock,
            units_sold,
            sales_window_days: p.sales_window_days,
            daily_average_usage: daily.round_dp(2),
            reorder_point,
            target_stock,
            recommended_order,
            needs_reorder,
        }
    }
}
