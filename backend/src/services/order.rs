//! Customer order service
//!
//! Placing an order draws each item from the product's sellable batches,
//! earliest expiry first, and remembers which batch supplied what so a
//! cancellation can put the units back where they came from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    stock_delta, validate_email, validate_name, validate_price, validate_quantity, ChangeType,
    DepletionPolicy, OrderStatus, MAX_NAME_LEN,
};
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::inventory::{apply_stock_delta, consume_fifo, credit_batch, insert_movement, NewMovement};
use crate::error::{AppError, AppResult};
use crate::queue::{queue_product_id, StockCheckQueue};

#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    queue: Option<Arc<dyn StockCheckQueue>>,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    customer_name: String,
    customer_email: Option<String>,
    status: String,
    order_date: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            status: row.status.parse()?,
            order_date: row.order_date,
            created_by: row.created_by,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Units of an order item taken from one batch
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderAllocation {
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub allocations: Vec<OrderAllocation>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Defaults to the product's current price
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub items: Vec<OrderItemInput>,
}

const ORDER_COLUMNS: &str =
    "id, customer_name, customer_email, status, order_date, created_by, updated_at";

fn validate_order(input: &CreateOrderInput) -> AppResult<()> {
    validate_name(input.customer_name.trim(), MAX_NAME_LEN)
        .map_err(|m| AppError::validation("customer_name", m))?;
    if let Some(email) = input.customer_email.as_deref() {
        validate_email(email).map_err(|m| AppError::validation("customer_email", m))?;
    }
    if input.items.is_empty() {
        return Err(AppError::validation("items", "An order needs at least one item"));
    }
    for item in &input.items {
        validate_quantity(item.quantity).map_err(|m| AppError::validation("quantity", m))?;
        if let Some(price) = item.unit_price {
            validate_price(price).map_err(|m| AppError::validation("unit_price", m))?;
        }
    }
    Ok(())
}

/// Products touched by a set of items, in lock order
fn lock_order(product_ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    product_ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

impl OrderService {
    pub fn new(db: PgPool) -> Self {
        Self { db, queue: None }
    }

    /// Queue a stock check for every product an order draws from
    pub fn with_queue(mut self, queue: Arc<dyn StockCheckQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Lock products in id order; returns their current prices
    async fn lock_products(
        tx: &mut sqlx::PgConnection,
        product_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Decimal>> {
        let rows = sqlx::query_as::<_, (Uuid, Decimal)>(
            "SELECT id, price FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(product_ids)
        .fetch_all(&mut *tx)
        .await?;

        let prices: HashMap<Uuid, Decimal> = rows.into_iter().collect();
        if let Some(missing) = product_ids.iter().find(|id| !prices.contains_key(id)) {
            return Err(AppError::NotFound(format!("Product {}", missing)));
        }
        Ok(prices)
    }

    /// Place an order. Any item that cannot be covered from sellable stock
    /// rejects the whole order.
    pub async fn create_order(&self, input: CreateOrderInput, actor: Option<Uuid>) -> AppResult<OrderWithItems> {
        validate_order(&input)?;
        let product_ids = lock_order(input.items.iter().map(|i| i.product_id));

        let mut tx = self.db.begin().await?;
        let prices = Self::lock_products(&mut tx, &product_ids).await?;

        let order: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (customer_name, customer_email, status, created_by) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(input.customer_name.trim())
        .bind(&input.customer_email)
        .bind(OrderStatus::Pending.as_str())
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let notes = format!("Order {}", order.id);
        let mut items = Vec::with_capacity(input.items.len());
        let mut allocations = Vec::new();

        for item in &input.items {
            let unit_price = match item.unit_price {
                Some(price) => price,
                None => prices
                    .get(&item.product_id)
                    .copied()
                    .ok_or_else(|| AppError::NotFound("Product".to_string()))?,
            };

            let order_item = sqlx::query_as::<_, OrderItem>(
                "INSERT INTO order_items (order_id, product_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, order_id, product_id, quantity, unit_price",
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(unit_price)
            .fetch_one(&mut *tx)
            .await?;

            let drawn = consume_fifo(
                &mut tx,
                item.product_id,
                item.quantity,
                DepletionPolicy::Sellable,
                ChangeType::Remove,
                Some(&notes),
                actor,
            )
            .await
            .map_err(|e| match e {
                AppError::InsufficientInventory(detail) => {
                    AppError::InsufficientInventory(format!("product {}: {}", item.product_id, detail))
                }
                other => other,
            })?;

            for (draw, _) in drawn {
                sqlx::query(
                    "INSERT INTO order_item_allocations (order_item_id, batch_id, quantity) \
                     VALUES ($1, $2, $3)",
                )
                .bind(order_item.id)
                .bind(draw.batch_id)
                .bind(draw.quantity)
                .execute(&mut *tx)
                .await?;

                allocations.push(OrderAllocation {
                    order_item_id: order_item.id,
                    product_id: item.product_id,
                    batch_id: draw.batch_id,
                    quantity: draw.quantity,
                });
            }

            apply_stock_delta(&mut tx, item.product_id, stock_delta(ChangeType::Remove, item.quantity))
                .await?;
            items.push(order_item);
        }

        tx.commit().await?;

        tracing::info!(order_id = %order.id, items = items.len(), "Created order");

        if let Some(queue) = &self.queue {
            for product_id in &product_ids {
                queue_product_id(queue.as_ref(), *product_id).await;
            }
        }

        Ok(OrderWithItems {
            order,
            items,
            allocations,
        })
    }

    pub async fn get(&self, id: Uuid) -> AppResult<OrderWithItems> {
        let order: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?
        .try_into()?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, quantity, unit_price FROM order_items \
             WHERE order_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        let allocations = sqlx::query_as::<_, OrderAllocation>(
            "SELECT a.order_item_id, i.product_id, a.batch_id, a.quantity \
             FROM order_item_allocations a \
             JOIN order_items i ON i.id = a.order_item_id \
             WHERE i.order_id = $1 ORDER BY a.order_item_id, a.id",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(OrderWithItems {
            order,
            items,
            allocations,
        })
    }

    pub async fn list(&self, status: Option<OrderStatus>) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY order_date DESC",
            ORDER_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Move an order through its lifecycle. Canceling returns every
    /// allocated unit to the batch it came from.
    pub async fn update_status(&self, id: Uuid, new_status: OrderStatus, actor: Option<Uuid>) -> AppResult<Order> {
        let mut tx = self.db.begin().await?;

        let current: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?
        .try_into()?;

        if current.status == new_status {
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is already {}",
                id, current.status
            )));
        }
        if !current.status.can_transition_to(new_status) {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} cannot move from {} to {}",
                id, current.status, new_status
            )));
        }

        if new_status == OrderStatus::Canceled {
            let allocations = sqlx::query_as::<_, OrderAllocation>(
                "SELECT a.order_item_id, i.product_id, a.batch_id, a.quantity \
                 FROM order_item_allocations a \
                 JOIN order_items i ON i.id = a.order_item_id \
                 WHERE i.order_id = $1",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            let product_ids = lock_order(allocations.iter().map(|a| a.product_id));
            Self::lock_products(&mut tx, &product_ids).await?;

            let notes = format!("Order {} canceled", id);
            for allocation in &allocations {
                credit_batch(&mut tx, allocation.product_id, allocation.batch_id, allocation.quantity).await?;
                insert_movement(
                    &mut tx,
                    NewMovement {
                        product_id: allocation.product_id,
                        batch_id: Some(allocation.batch_id),
                        change_type: ChangeType::Return,
                        quantity: allocation.quantity,
                        notes: Some(&notes),
                        actor,
                    },
                )
                .await?;
                apply_stock_delta(
                    &mut tx,
                    allocation.product_id,
                    stock_delta(ChangeType::Return, allocation.quantity),
                )
                .await?;
            }
            tracing::info!(order_id = %id, allocations = allocations.len(), "Restocked canceled order");
        }

        let updated: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(new_status.as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current.status, to = %new_status, "Order status changed");
        Ok(updated)
    }

    /// Item quantities of the product on orders delivered since `since`
    pub async fn delivered_quantities(&self, product_id: Uuid, since: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let quantities = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT oi.quantity
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE oi.product_id = $1
              AND o.status = ANY($2)
              AND o.order_date >= $3
            "#,
        )
        .bind(product_id)
        .bind(OrderStatus::sale_statuses())
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(quantities)
    }
}
