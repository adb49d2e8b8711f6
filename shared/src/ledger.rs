//! Batch ledger: FIFO depletion across dated inventory batches
//!
//! Stock for a product lives in batches. Each batch remembers how much is
//! left and, optionally, when it expires. Outgoing stock is drawn from the
//! batch that expires first; batches without an expiry date are drawn last.
//!
//! The functions here only plan and apply draws on in-memory snapshots. The
//! backend loads the snapshot under a row lock, plans, and persists the
//! draws in the same transaction.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ChangeType;

/// Shelf life applied to received goods when nothing else is known
pub const DEFAULT_SHELF_LIFE_DAYS: u32 = 365;

/// Ledger errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("draw of {quantity} exceeds the {remaining} left in batch {batch_id}")]
    OverDraw {
        batch_id: Uuid,
        quantity: i32,
        remaining: i32,
    },

    #[error("batch {0} is not part of this ledger")]
    UnknownBatch(Uuid),
}

/// Snapshot of one batch as far as depletion is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStock {
    pub batch_id: Uuid,
    pub expiry_date: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
    pub quantity_remaining: i32,
}

impl BatchStock {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }

    fn usable(&self, policy: DepletionPolicy, today: NaiveDate) -> bool {
        self.quantity_remaining > 0
            && match policy {
                DepletionPolicy::Any => true,
                DepletionPolicy::Sellable => !self.is_expired(today),
            }
    }
}

/// Which batches a depletion may draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepletionPolicy {
    /// Skip batches already past their expiry date (customer orders)
    Sellable,
    /// Draw from every batch, expired ones first (write-offs, adjustments)
    Any,
}

/// Quantity taken from a single batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDraw {
    pub batch_id: Uuid,
    pub quantity: i32,
}

/// FIFO ordering: earliest expiry first, undated batches last, then oldest
/// receipt, then id.
pub fn fifo_cmp(a: &BatchStock, b: &BatchStock) -> Ordering {
    let by_expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_expiry
        .then_with(|| a.received_at.cmp(&b.received_at))
        .then_with(|| a.batch_id.cmp(&b.batch_id))
}

/// Batches in the order they would be consumed
pub fn fifo_order(batches: &[BatchStock]) -> Vec<&BatchStock> {
    let mut ordered: Vec<&BatchStock> = batches.iter().collect();
    ordered.sort_by(|a, b| fifo_cmp(a, b));
    ordered
}

/// Total quantity a depletion under `policy` could draw
pub fn available(batches: &[BatchStock], policy: DepletionPolicy, today: NaiveDate) -> i64 {
    batches
        .iter()
        .filter(|b| b.usable(policy, today))
        .map(|b| i64::from(b.quantity_remaining))
        .sum()
}

/// Plan which batches satisfy a request of `requested` units.
///
/// All-or-nothing: when the usable batches cannot cover the request no
/// draws are returned.
pub fn plan_depletion(
    batches: &[BatchStock],
    requested: i32,
    policy: DepletionPolicy,
    today: NaiveDate,
) -> Result<Vec<BatchDraw>, LedgerError> {
    if requested <= 0 {
        return Err(LedgerError::InvalidQuantity(i64::from(requested)));
    }

    let supply = available(batches, policy, today);
    if supply < i64::from(requested) {
        return Err(LedgerError::InsufficientStock {
            requested: i64::from(requested),
            available: supply,
        });
    }

    let mut remaining = requested;
    let mut draws = Vec::new();

    for batch in fifo_order(batches) {
        if remaining == 0 {
            break;
        }
        if !batch.usable(policy, today) {
            continue;
        }

        let take = remaining.min(batch.quantity_remaining);
        draws.push(BatchDraw {
            batch_id: batch.batch_id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(draws)
}

/// Apply planned draws to a snapshot. Validates every draw before touching
/// any batch.
pub fn apply_draws(batches: &mut [BatchStock], draws: &[BatchDraw]) -> Result<(), LedgerError> {
    for draw in draws {
        if draw.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(i64::from(draw.quantity)));
        }
        let batch = batches
            .iter()
            .find(|b| b.batch_id == draw.batch_id)
            .ok_or(LedgerError::UnknownBatch(draw.batch_id))?;
        // Draws against the same batch are summed
        let total: i32 = draws
            .iter()
            .filter(|d| d.batch_id == draw.batch_id)
            .map(|d| d.quantity)
            .sum();
        if total > batch.quantity_remaining {
            return Err(LedgerError::OverDraw {
                batch_id: batch.batch_id,
                quantity: total,
                remaining: batch.quantity_remaining,
            });
        }
    }

    for draw in draws {
        if let Some(batch) = batches.iter_mut().find(|b| b.batch_id == draw.batch_id) {
            batch.quantity_remaining -= draw.quantity;
        }
    }

    Ok(())
}

/// Signed effect of a movement on product stock
pub fn stock_delta(change_type: ChangeType, quantity: i32) -> i64 {
    let magnitude = i64::from(quantity).abs();
    if change_type.is_increase() {
        magnitude
    } else {
        -magnitude
    }
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// Batch code for goods received against a purchase order,
/// e.g. `PO-1A2B3C4D-20240315093000`
pub fn purchase_order_batch_code(purchase_order_id: Uuid, order_date: DateTime<Utc>) -> String {
    format!(
        "PO-{}-{}",
        short_id(purchase_order_id),
        order_date.format("%Y%m%d%H%M%S")
    )
}

/// Batch code for the stock a product is created with
pub fn opening_batch_code(product_id: Uuid, at: DateTime<Utc>) -> String {
    format!("INIT-{}-{}", short_id(product_id), at.format("%Y%m%d%H%M%S"))
}

/// Batch code for manually added or returned stock
pub fn manual_batch_code(change_type: ChangeType, at: DateTime<Utc>) -> String {
    format!("{}-{}", change_type.as_str(), at.format("%Y%m%d%H%M%S%3f"))
}

/// Expiry of goods received against a purchase order; saturates at the
/// last representable date
pub fn received_expiry(expected_delivery: Option<NaiveDate>, shelf_life_days: u32) -> Option<NaiveDate> {
    expected_delivery.map(|d| {
        d.checked_add_signed(Duration::days(i64::from(shelf_life_days)))
            .unwrap_or(NaiveDate::MAX)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch(qty: i32, expiry: Option<NaiveDate>, received_day: u32) -> BatchStock {
        BatchStock {
            batch_id: Uuid::new_v4(),
            expiry_date: expiry,
            received_at: Utc.with_ymd_and_hms(2024, 1, received_day, 8, 0, 0).unwrap(),
            quantity_remaining: qty,
        }
    }

    #[test]
    fn test_depletes_earliest_expiry_first() {
        let late = batch(10, Some(date(2024, 9, 1)), 1);
        let early = batch(10, Some(date(2024, 6, 1)), 2);
        let batches = vec![late.clone(), early.clone()];

        let draws = plan_depletion(&batches, 15, DepletionPolicy::Any, date(2024, 3, 1)).unwrap();

        assert_eq!(
            draws,
            vec![
                BatchDraw { batch_id: early.batch_id, quantity: 10 },
                BatchDraw { batch_id: late.batch_id, quantity: 5 },
            ]
        );
    }

    #[test]
    fn test_undated_batches_are_consumed_last() {
        let undated = batch(10, None, 1);
        let dated = batch(5, Some(date(2030, 1, 1)), 5);
        let batches = vec![undated.clone(), dated.clone()];

        let draws = plan_depletion(&batches, 7, DepletionPolicy::Any, date(2024, 3, 1)).unwrap();

        assert_eq!(draws[0].batch_id, dated.batch_id);
        assert_eq!(draws[0].quantity, 5);
        assert_eq!(draws[1].batch_id, undated.batch_id);
        assert_eq!(draws[1].quantity, 2);
    }

    #[test]
    fn test_same_expiry_breaks_tie_on_receipt() {
        let expiry = Some(date(2024, 6, 1));
        let newer = batch(5, expiry, 10);
        let older = batch(5, expiry, 3);
        let batches = vec![newer.clone(), older.clone()];

        let draws = plan_depletion(&batches, 5, DepletionPolicy::Any, date(2024, 3, 1)).unwrap();

        assert_eq!(draws, vec![BatchDraw { batch_id: older.batch_id, quantity: 5 }]);
    }

    #[test]
    fn test_insufficient_stock_returns_no_draws() {
        let batches = vec![batch(3, None, 1), batch(4, None, 2)];

        let err = plan_depletion(&batches, 8, DepletionPolicy::Any, date(2024, 3, 1)).unwrap_err();

        assert_eq!(err, LedgerError::InsufficientStock { requested: 8, available: 7 });
    }

    #[test]
    fn test_exact_supply_empties_every_batch() {
        let mut batches = vec![batch(3, None, 1), batch(4, Some(date(2024, 5, 1)), 2)];
        let draws = plan_depletion(&batches, 7, DepletionPolicy::Any, date(2024, 3, 1)).unwrap();

        apply_draws(&mut batches, &draws).unwrap();

        assert!(batches.iter().all(|b| b.quantity_remaining == 0));
    }

    #[test]
    fn test_non_positive_request_rejected() {
        let batches = vec![batch(3, None, 1)];
        assert_eq!(
            plan_depletion(&batches, 0, DepletionPolicy::Any, date(2024, 3, 1)),
            Err(LedgerError::InvalidQuantity(0))
        );
        assert!(plan_depletion(&batches, -2, DepletionPolicy::Any, date(2024, 3, 1)).is_err());
    }

    #[test]
    fn test_sellable_policy_skips_expired_batches() {
        let expired = batch(10, Some(date(2024, 2, 1)), 1);
        let fresh = batch(10, Some(date(2024, 8, 1)), 2);
        let batches = vec![expired.clone(), fresh.clone()];
        let today = date(2024, 3, 1);

        assert_eq!(available(&batches, DepletionPolicy::Sellable, today), 10);
        assert_eq!(available(&batches, DepletionPolicy::Any, today), 20);

        let draws = plan_depletion(&batches, 4, DepletionPolicy::Sellable, today).unwrap();
        assert_eq!(draws, vec![BatchDraw { batch_id: fresh.batch_id, quantity: 4 }]);

        let write_off = plan_depletion(&batches, 4, DepletionPolicy::Any, today).unwrap();
        assert_eq!(write_off[0].batch_id, expired.batch_id);
    }

    #[test]
    fn test_batch_expiring_today_is_still_sellable() {
        let today = date(2024, 3, 1);
        let batches = vec![batch(2, Some(today), 1)];
        assert_eq!(available(&batches, DepletionPolicy::Sellable, today), 2);
    }

    #[test]
    fn test_apply_rejects_over_draw_without_mutating() {
        let b = batch(5, None, 1);
        let mut batches = vec![b.clone()];
        let draws = vec![
            BatchDraw { batch_id: b.batch_id, quantity: 3 },
            BatchDraw { batch_id: b.batch_id, quantity: 3 },
        ];

        let err = apply_draws(&mut batches, &draws).unwrap_err();

        assert!(matches!(err, LedgerError::OverDraw { quantity: 6, remaining: 5, .. }));
        assert_eq!(batches[0].quantity_remaining, 5);
    }

    #[test]
    fn test_apply_rejects_unknown_batch() {
        let mut batches = vec![batch(5, None, 1)];
        let stray = Uuid::new_v4();
        let err = apply_draws(&mut batches, &[BatchDraw { batch_id: stray, quantity: 1 }]).unwrap_err();
        assert_eq!(err, LedgerError::UnknownBatch(stray));
    }

    #[test]
    fn test_stock_delta_signs() {
        assert_eq!(stock_delta(ChangeType::Add, 5), 5);
        assert_eq!(stock_delta(ChangeType::Return, 5), 5);
        assert_eq!(stock_delta(ChangeType::Remove, 5), -5);
        // ADJUST always decrements, whatever sign the caller used
        assert_eq!(stock_delta(ChangeType::Adjust, -5), -5);
        assert_eq!(stock_delta(ChangeType::Adjust, 5), -5);
    }

    #[test]
    fn test_purchase_order_batch_code_format() {
        let id = Uuid::parse_str("1a2b3c4d-0000-0000-0000-000000000000").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap();
        assert_eq!(purchase_order_batch_code(id, at), "PO-1A2B3C4D-20240315093000");
        assert_eq!(opening_batch_code(id, at), "INIT-1A2B3C4D-20240315093000");
    }

    #[test]
    fn test_received_expiry() {
        assert_eq!(
            received_expiry(Some(date(2024, 1, 1)), DEFAULT_SHELF_LIFE_DAYS),
            Some(date(2024, 12, 31))
        );
        assert_eq!(received_expiry(None, DEFAULT_SHELF_LIFE_DAYS), None);
    }

    #[test]
    fn test_received_expiry_saturates() {
        assert_eq!(
            received_expiry(Some(NaiveDate::MAX), 1),
            Some(NaiveDate::MAX)
        );
        assert_eq!(
            received_expiry(Some(date(2024, 1, 1)), u32::MAX),
            Some(NaiveDate::MAX)
        );
    }
}
