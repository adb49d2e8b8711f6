//! Reorder optimizer tests
//!
//! Properties:
//! - a product is flagged exactly when stock is below the reorder point
//! - following a recommendation brings stock back to the target level
//! - more sales never lower the reorder point

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{InventoryOptimizer, ReorderPolicy};
use uuid::Uuid;

fn arb_policy() -> impl Strategy<Value = ReorderPolicy> {
    (1..30u32, 0..21u32, 0..10u32, 0..30u32, 0..5i64).prop_map(
        |(window, lead, safety, review, min)| ReorderPolicy {
            sales_window_days: window,
            lead_time_days: lead,
            safety_stock_days: safety,
            review_period_days: review,
            min_reorder_point: min,
        },
    )
}

fn arb_sales() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(1..200i32, 0..20)
}

// ============================================================================
// Unit Tests
// ============================================================================

mod unit_tests {
    use super::*;

    #[test]
    fn fast_mover_below_reorder_point() {
        // 140 units over 7 days: 20/day, reorder point 200, target 480
        let rec = InventoryOptimizer::default().generate_recommendations(Uuid::new_v4(), &[60, 80], 150);

        assert_eq!(rec.units_sold, 140);
        assert_eq!(rec.daily_average_usage, Decimal::from(20));
        assert_eq!(rec.reorder_point, 200);
        assert_eq!(rec.target_stock, 480);
        assert_eq!(rec.recommended_order, 330);
        assert!(rec.alert_notes().contains("Recommended order: 330 units"));
    }

    #[test]
    fn custom_policy_is_respected() {
        let policy = ReorderPolicy {
            sales_window_days: 30,
            lead_time_days: 14,
            safety_stock_days: 7,
            review_period_days: 30,
            min_reorder_point: 10,
        };
        // 300 units over 30 days: 10/day
        let rec = InventoryOptimizer::new(policy).generate_recommendations(Uuid::new_v4(), &[300], 209);

        assert_eq!(rec.reorder_point, 210);
        assert!(rec.needs_reorder);
        assert_eq!(rec.target_stock, 510);
        assert_eq!(rec.recommended_order, 301);
        assert!(rec.alert_notes().contains("30-day sales average of 10 units/day"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn flagged_exactly_below_reorder_point(
            policy in arb_policy(),
            sales in arb_sales(),
            stock in 0..5_000i64,
        ) {
            let rec = InventoryOptimizer::new(policy).generate_recommendations(Uuid::new_v4(), &sales, stock);

            prop_assert_eq!(rec.needs_reorder, stock < rec.reorder_point);
            prop_assert!(rec.reorder_point >= policy.min_reorder_point);
            prop_assert!(rec.target_stock >= rec.reorder_point);
            if !rec.needs_reorder {
                prop_assert_eq!(rec.recommended_order, 0);
            }
        }

        #[test]
        fn recommendation_restores_target(
            policy in arb_policy(),
            sales in arb_sales(),
            stock in 0..5_000i64,
        ) {
            let rec = InventoryOptimizer::new(policy).generate_recommendations(Uuid::new_v4(), &sales, stock);

            if rec.needs_reorder {
                prop_assert!(rec.recommended_order > 0);
                prop_assert_eq!(stock + rec.recommended_order, rec.target_stock);
                prop_assert!(stock + rec.recommended_order >= rec.reorder_point);
            }
        }

        #[test]
        fn more_sales_never_lower_reorder_point(
            policy in arb_policy(),
            sales in arb_sales(),
            extra in 1..200i32,
        ) {
            let optimizer = InventoryOptimizer::new(policy);
            let base = optimizer.generate_recommendations(Uuid::new_v4(), &sales, 0);

            let mut more = sales.clone();
            more.push(extra);
            let busier = optimizer.generate_recommendations(Uuid::new_v4(), &more, 0);

            prop_assert!(busier.reorder_point >= base.reorder_point);
            prop_assert!(busier.daily_average_usage >= base.daily_average_usage);
        }
    }
}
