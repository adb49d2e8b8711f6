//! Ledger service tests against PostgreSQL
//!
//! Each test gets a fresh database with the migrations applied:
//! - stock movements, orders, cancellations and purchase order receipts
//!   keep cached stock, batch remainders and the movement history in step
//! - depletion takes the earliest expiry first and order lines may span
//!   batches
//! - notifications are created once per unresolved issue and per batch
//! - the PostgreSQL queue hands out receipts that go stale on redelivery
//!
//! Requires `DATABASE_URL` pointing at a server where test databases can
//! be created.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use shared::{ChangeType, NotificationStatus, OrderStatus, PurchaseOrderStatus, ReorderPolicy};
use stock_ledger::config::{
    AlertsConfig, Config, DatabaseConfig, InventoryConfig, QueueConfig, ServerConfig,
};
use stock_ledger::external::LogPublisher;
use stock_ledger::queue::{PgStockCheckQueue, StockCheckQueue};
use stock_ledger::services::category::CreateCategoryInput;
use stock_ledger::services::inventory::RecordMovementInput;
use stock_ledger::services::order::{CreateOrderInput, OrderItemInput};
use stock_ledger::services::product::CreateProductInput;
use stock_ledger::services::purchase_order::CreatePurchaseOrderInput;
use stock_ledger::services::supplier::CreateSupplierInput;
use stock_ledger::services::{
    CategoryService, InventoryService, NotificationService, OrderService, PgAlertStore,
    ProductService, PurchaseOrderService, StockMonitor, SupplierService,
};
use stock_ledger::AppError;

// ============================================================================
// Fixtures
// ============================================================================

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn seed_product(pool: &PgPool, stock: i32, expiry_date: Option<NaiveDate>) -> Uuid {
    let category = CategoryService::new(pool.clone())
        .create(
            CreateCategoryInput {
                name: format!("Dry goods {}", Uuid::new_v4()),
                description: None,
            },
            None,
        )
        .await
        .unwrap();

    ProductService::new(pool.clone())
        .create(
            CreateProductInput {
                name: "Arabica beans 1kg".to_string(),
                description: None,
                category_id: category.id,
                price: Decimal::new(1250, 2),
                stock_quantity: stock,
                expiry_date,
            },
            None,
        )
        .await
        .unwrap()
        .id
}

async fn seed_supplier(pool: &PgPool) -> Uuid {
    SupplierService::new(pool.clone())
        .create(
            CreateSupplierInput {
                name: "Acme Foods".to_string(),
                contact_email: Some("buyer@acme.test".to_string()),
                contact_phone: Some("+1 555 010 0199".to_string()),
                address: None,
            },
            None,
        )
        .await
        .unwrap()
        .id
}

fn movement(change_type: ChangeType, quantity: i32) -> RecordMovementInput {
    RecordMovementInput {
        change_type,
        quantity,
        batch_id: None,
        batch_code: None,
        expiry_date: None,
        notes: None,
    }
}

fn order_for(product_id: Uuid, quantity: i32) -> CreateOrderInput {
    CreateOrderInput {
        customer_name: "Jane Doe".to_string(),
        customer_email: Some("jane@example.test".to_string()),
        items: vec![OrderItemInput {
            product_id,
            quantity,
            unit_price: None,
        }],
    }
}

fn config(shelf_life_days: u32) -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
        },
        queue: QueueConfig {
            poll_interval_secs: 1,
            batch_size: 10,
            visibility_timeout_secs: 60,
            max_receive_count: 5,
        },
        alerts: AlertsConfig {
            expiry_window_days: 30,
            expiry_scan_interval_secs: 60,
            topic: "stock-alerts".to_string(),
            webhook_url: None,
        },
        reorder: ReorderPolicy::default(),
        inventory: InventoryConfig { shelf_life_days },
    }
}

async fn assert_consistent(inventory: &InventoryService, product_id: Uuid, stock: i64) {
    let r = inventory.reconcile(product_id).await.unwrap();
    assert!(r.is_consistent(), "stock views disagree: {:?}", r);
    assert_eq!(r.stock_quantity, stock);
}

async fn remaining(inventory: &InventoryService, product_id: Uuid, batch_id: Uuid) -> i32 {
    inventory
        .list_batches(product_id)
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.id == batch_id)
        .map(|b| b.quantity_remaining)
        .unwrap()
}

// ============================================================================
// Ledger flow
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
async fn test_ledger_stays_consistent_through_orders_and_receipts(pool: PgPool) {
    let inventory = InventoryService::new(pool.clone());
    let orders = OrderService::new(pool.clone());
    let purchase_orders = PurchaseOrderService::new(pool.clone()).with_shelf_life(30);

    // Opening batch A: 10 units expiring in 5 days
    let product_id = seed_product(&pool, 10, Some(today() + Duration::days(5))).await;
    assert_consistent(&inventory, product_id, 10).await;
    let batch_a = inventory.list_batches(product_id).await.unwrap()[0].id;

    // Batch B: 20 units expiring in 20 days
    let outcome = inventory
        .record_movement(
            product_id,
            RecordMovementInput {
                batch_code: Some("LOT-B".to_string()),
                expiry_date: Some(today() + Duration::days(20)),
                ..movement(ChangeType::Add, 20)
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.stock_quantity, 30);
    let batch_b = outcome.movements[0].batch_id.unwrap();
    assert_consistent(&inventory, product_id, 30).await;

    // REMOVE draws from the earliest expiry
    let outcome = inventory
        .record_movement(product_id, movement(ChangeType::Remove, 4), None)
        .await
        .unwrap();
    assert_eq!(outcome.movements.len(), 1);
    assert_eq!(outcome.movements[0].batch_id, Some(batch_a));
    assert_eq!(remaining(&inventory, product_id, batch_a).await, 6);
    assert_consistent(&inventory, product_id, 26).await;

    // An order for 10 empties A and takes 4 from B
    let order = orders.create_order(order_for(product_id, 10), None).await.unwrap();
    assert_eq!(order.allocations.len(), 2);
    let from_a: i32 = order.allocations.iter().filter(|a| a.batch_id == batch_a).map(|a| a.quantity).sum();
    let from_b: i32 = order.allocations.iter().filter(|a| a.batch_id == batch_b).map(|a| a.quantity).sum();
    assert_eq!((from_a, from_b), (6, 4));
    assert_eq!(remaining(&inventory, product_id, batch_a).await, 0);
    assert_eq!(remaining(&inventory, product_id, batch_b).await, 16);
    assert_consistent(&inventory, product_id, 16).await;

    // ADJUST skips the empty batch
    let outcome = inventory
        .record_movement(product_id, movement(ChangeType::Adjust, 2), None)
        .await
        .unwrap();
    assert_eq!(outcome.movements[0].batch_id, Some(batch_b));
    assert_eq!(remaining(&inventory, product_id, batch_b).await, 14);
    assert_consistent(&inventory, product_id, 14).await;

    // Canceling returns the units to the batches they came from
    let canceled = orders
        .update_status(order.order.id, OrderStatus::Canceled, None)
        .await
        .unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(remaining(&inventory, product_id, batch_a).await, 6);
    assert_eq!(remaining(&inventory, product_id, batch_b).await, 18);
    let returns: Vec<_> = inventory
        .list_movements(product_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.change_type == ChangeType::Return)
        .collect();
    assert_eq!(returns.len(), 2);
    assert_consistent(&inventory, product_id, 24).await;

    // A canceled order is final
    let err = orders
        .update_status(order.order.id, OrderStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    // Receiving a purchase order books exactly one batch and one movement
    let supplier_id = seed_supplier(&pool).await;
    let expected = today() + Duration::days(3);
    let po = purchase_orders
        .create(
            CreatePurchaseOrderInput {
                supplier_id,
                product_id,
                quantity: 50,
                expected_delivery_date: Some(expected),
                notes: None,
            },
            None,
        )
        .await
        .unwrap();
    purchase_orders
        .update_status(po.id, PurchaseOrderStatus::Ordered, None)
        .await
        .unwrap();
    let received = purchase_orders
        .update_status(po.id, PurchaseOrderStatus::Received, None)
        .await
        .unwrap();
    assert!(received.batch_code.as_deref().unwrap().starts_with("PO-"));
    assert_consistent(&inventory, product_id, 74).await;

    // Receiving again is a no-op, leaving it is rejected
    purchase_orders
        .update_status(po.id, PurchaseOrderStatus::Received, None)
        .await
        .unwrap();
    let err = purchase_orders
        .update_status(po.id, PurchaseOrderStatus::Canceled, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let po_batches: Vec<_> = inventory
        .list_batches(product_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|b| b.purchase_order_id == Some(po.id))
        .collect();
    assert_eq!(po_batches.len(), 1);
    assert_eq!(po_batches[0].quantity_remaining, 50);
    assert_eq!(po_batches[0].expiry_date, Some(expected + Duration::days(30)));

    let receipt_notes = format!("Stock received from Purchase Order {}", po.id);
    let receipts = inventory
        .list_movements(product_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.notes.as_deref() == Some(receipt_notes.as_str()))
        .count();
    assert_eq!(receipts, 1);
    assert_consistent(&inventory, product_id, 74).await;
}

#[sqlx::test(migrations = "./migrations")]
async fn test_orders_skip_expired_batches_and_fail_atomically(pool: PgPool) {
    let inventory = InventoryService::new(pool.clone());
    let orders = OrderService::new(pool.clone());

    // 5 undated units plus 8 already expired
    let product_id = seed_product(&pool, 5, None).await;
    inventory
        .record_movement(
            product_id,
            RecordMovementInput {
                expiry_date: Some(today() - Duration::days(1)),
                ..movement(ChangeType::Add, 8)
            },
            None,
        )
        .await
        .unwrap();
    assert_consistent(&inventory, product_id, 13).await;

    let err = orders.create_order(order_for(product_id, 6), None).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory(_)));
    assert!(orders.list(None).await.unwrap().is_empty());
    assert_consistent(&inventory, product_id, 13).await;

    let order = orders.create_order(order_for(product_id, 5), None).await.unwrap();
    assert_eq!(order.allocations.len(), 1);
    assert_consistent(&inventory, product_id, 8).await;

    // Manual removals may still draw expired stock
    inventory
        .record_movement(product_id, movement(ChangeType::Remove, 8), None)
        .await
        .unwrap();
    assert_consistent(&inventory, product_id, 0).await;

    let err = inventory
        .record_movement(product_id, movement(ChangeType::Remove, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory(_)));
    assert_consistent(&inventory, product_id, 0).await;
}

#[sqlx::test(migrations = "./migrations")]
async fn test_only_delivered_orders_count_as_sales(pool: PgPool) {
    let orders = OrderService::new(pool.clone());
    let product_id = seed_product(&pool, 20, None).await;
    let since = Utc::now() - Duration::days(7);

    let delivered = orders.create_order(order_for(product_id, 3), None).await.unwrap();
    for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
        orders.update_status(delivered.order.id, status, None).await.unwrap();
    }
    orders.create_order(order_for(product_id, 4), None).await.unwrap();

    assert_eq!(orders.delivered_quantities(product_id, since).await.unwrap(), vec![3]);

    let err = orders
        .update_status(delivered.order.id, OrderStatus::Canceled, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_purchase_orders_use_configured_shelf_life(pool: PgPool) {
    let inventory = InventoryService::new(pool.clone());
    let purchase_orders = PurchaseOrderService::from_config(pool.clone(), &config(90));
    assert_eq!(purchase_orders.shelf_life_days(), 90);

    let product_id = seed_product(&pool, 0, None).await;
    let supplier_id = seed_supplier(&pool).await;
    let expected = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let po = purchase_orders
        .create(
            CreatePurchaseOrderInput {
                supplier_id,
                product_id,
                quantity: 12,
                expected_delivery_date: Some(expected),
                notes: None,
            },
            None,
        )
        .await
        .unwrap();

    // Straight from PENDING
    purchase_orders
        .update_status(po.id, PurchaseOrderStatus::Received, None)
        .await
        .unwrap();

    let batches = inventory.list_batches(product_id).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].expiry_date, NaiveDate::from_ymd_opt(2024, 3, 31));
    assert_consistent(&inventory, product_id, 12).await;
}

// ============================================================================
// Notifications
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
async fn test_stock_issue_is_unique_while_unresolved(pool: PgPool) {
    let notifications = NotificationService::new(pool.clone());
    let product_id = seed_product(&pool, 0, None).await;

    let first = notifications
        .create_stock_issue(product_id, "below reorder point")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, NotificationStatus::Open);
    assert!(notifications
        .create_stock_issue(product_id, "below reorder point")
        .await
        .unwrap()
        .is_none());

    // Working on it still counts as unresolved
    notifications
        .update_status(first.id, NotificationStatus::InProgress, None)
        .await
        .unwrap();
    assert!(notifications
        .create_stock_issue(product_id, "below reorder point")
        .await
        .unwrap()
        .is_none());

    let closed = notifications
        .update_status(first.id, NotificationStatus::Closed, Some("restocked".to_string()))
        .await
        .unwrap();
    assert_eq!(closed.notes, "restocked");

    let second = notifications
        .create_stock_issue(product_id, "below reorder point")
        .await
        .unwrap();
    assert!(second.is_some());

    // Reopening the closed one would make two unresolved issues
    let err = notifications
        .update_status(first.id, NotificationStatus::Open, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateEntry(_)));
    assert_eq!(notifications.get(first.id).await.unwrap().status, NotificationStatus::Closed);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_stock_expiry_is_recorded_once_per_batch(pool: PgPool) {
    let inventory = InventoryService::new(pool.clone());
    let notifications = NotificationService::new(pool.clone());
    let product_id = seed_product(&pool, 5, Some(today() + Duration::days(2))).await;
    let batch_id = inventory.list_batches(product_id).await.unwrap()[0].id;

    let created = notifications
        .create_stock_expiry(product_id, batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.batch_id, Some(batch_id));

    notifications
        .update_status(created.id, NotificationStatus::Closed, None)
        .await
        .unwrap();
    assert!(notifications
        .create_stock_expiry(product_id, batch_id)
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Queue and alert jobs
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
async fn test_pg_queue_receipts_go_stale_on_redelivery(pool: PgPool) {
    let queue = PgStockCheckQueue::new(pool.clone(), StdDuration::ZERO);
    let product_id = Uuid::new_v4();
    queue.send(product_id).await.unwrap();

    let first = queue.receive(10).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].receive_count, 1);

    // Zero visibility timeout: visible again straight away
    let second = queue.receive(10).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].message_id, first[0].message_id);
    assert_eq!(second[0].receive_count, 2);

    assert!(!queue.ack(first[0].receipt).await.unwrap());
    assert!(queue.ack(second[0].receipt).await.unwrap());
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_stock_check_opens_issue_from_database(pool: PgPool) {
    let queue = Arc::new(PgStockCheckQueue::new(pool.clone(), StdDuration::from_secs(60)));
    let inventory = InventoryService::new(pool.clone()).with_queue(queue.clone());
    let product_id = seed_product(&pool, 1, None).await;

    // Emptying the shelf queues a stock check
    inventory
        .record_movement(product_id, movement(ChangeType::Remove, 1), None)
        .await
        .unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    let monitor = StockMonitor::new(
        Arc::new(PgAlertStore::new(pool.clone())),
        queue.clone(),
        Arc::new(LogPublisher),
    );
    let report = monitor.process_stock_checks(10).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.notifications_created, 1);
    assert_eq!(queue.depth().await.unwrap(), 0);

    // A second check finds the issue still open
    queue.send(product_id).await.unwrap();
    let report = monitor.process_stock_checks(10).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.notifications_created, 0);
}
