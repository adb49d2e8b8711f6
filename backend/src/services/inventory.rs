//! Inventory service: persistence for the batch ledger
//!
//! Every stock change goes through this module. A change locks the product
//! row, then its batches, plans FIFO draws with [`shared::plan_depletion`],
//! writes the batch updates and movements, and moves the cached
//! `products.stock_quantity` by the signed delta, all in one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    manual_batch_code, plan_depletion, stock_delta, validate_quantity, BatchDraw, BatchStock,
    ChangeType, DateRange, DepletionPolicy,
};
use sqlx::{FromRow, PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::queue::{queue_product_id, StockCheckQueue};

/// Inventory service for recording stock movements
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
    queue: Option<Arc<dyn StockCheckQueue>>,
}

/// A batch of stock received together
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InventoryBatch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_code: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity_received: i32,
    pub quantity_remaining: i32,
    pub purchase_order_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

impl InventoryBatch {
    pub fn stock(&self) -> BatchStock {
        BatchStock {
            batch_id: self.id,
            expiry_date: self.expiry_date,
            received_at: self.received_at,
            quantity_remaining: self.quantity_remaining,
        }
    }
}

/// Row for movement queries
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    batch_id: Option<Uuid>,
    change_type: String,
    quantity: i32,
    notes: Option<String>,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

/// One entry in a product's stock history
#[derive(Debug, Clone, Serialize)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub change_type: ChangeType,
    pub quantity: i32,
    pub notes: Option<String>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for InventoryMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            batch_id: row.batch_id,
            change_type: row.change_type.parse()?,
            quantity: row.quantity,
            notes: row.notes,
            updated_by: row.updated_by,
            created_at: row.created_at,
        })
    }
}

/// Input for recording a stock movement
#[derive(Debug, Deserialize)]
pub struct RecordMovementInput {
    pub change_type: ChangeType,
    pub quantity: i32,
    /// RETURN only: credit this batch instead of opening a new one
    pub batch_id: Option<Uuid>,
    /// ADD/RETURN: code for the new batch, generated when absent
    pub batch_code: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Result of a recorded movement
#[derive(Debug, Clone, Serialize)]
pub struct MovementOutcome {
    pub movements: Vec<InventoryMovement>,
    pub stock_quantity: i32,
}

/// Batch about to expire, with its product
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ExpiringBatch {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub expiry_date: NaiveDate,
    pub quantity_remaining: i32,
}

/// The three views of a product's stock, which must agree
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockReconciliation {
    pub product_id: Uuid,
    pub stock_quantity: i64,
    pub batch_total: i64,
    pub movement_total: i64,
}

impl StockReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.stock_quantity == self.batch_total && self.stock_quantity == self.movement_total
    }
}

/// New batch to insert
pub(crate) struct NewBatch<'a> {
    pub product_id: Uuid,
    pub batch_code: &'a str,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub purchase_order_id: Option<Uuid>,
}

/// New movement to insert
pub(crate) struct NewMovement<'a> {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub change_type: ChangeType,
    pub quantity: i32,
    pub notes: Option<&'a str>,
    pub actor: Option<Uuid>,
}

const BATCH_COLUMNS: &str = "id, product_id, batch_code, expiry_date, quantity_received, \
                             quantity_remaining, purchase_order_id, received_at";

const MOVEMENT_COLUMNS: &str =
    "id, product_id, batch_id, change_type, quantity, notes, updated_by, created_at";

// ============================================================================
// Ledger primitives, usable inside any transaction
// ============================================================================

/// Lock the product row; returns its cached stock
pub(crate) async fn lock_product(conn: &mut PgConnection, product_id: Uuid) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>("SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
}

/// Batches of a product still holding stock, locked, in FIFO order
async fn lock_open_batches(conn: &mut PgConnection, product_id: Uuid) -> AppResult<Vec<InventoryBatch>> {
    let batches = sqlx::query_as::<_, InventoryBatch>(&format!(
        "SELECT {} FROM inventory_batches \
         WHERE product_id = $1 AND quantity_remaining > 0 \
         ORDER BY expiry_date ASC NULLS LAST, received_at ASC, id ASC \
         FOR UPDATE",
        BATCH_COLUMNS
    ))
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(batches)
}

pub(crate) async fn insert_batch(conn: &mut PgConnection, batch: NewBatch<'_>) -> AppResult<InventoryBatch> {
    let inserted = sqlx::query_as::<_, InventoryBatch>(&format!(
        "INSERT INTO inventory_batches \
             (product_id, batch_code, expiry_date, quantity_received, quantity_remaining, purchase_order_id) \
         VALUES ($1, $2, $3, $4, $4, $5) \
         RETURNING {}",
        BATCH_COLUMNS
    ))
    .bind(batch.product_id)
    .bind(batch.batch_code)
    .bind(batch.expiry_date)
    .bind(batch.quantity)
    .bind(batch.purchase_order_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Put stock back into an existing batch of the product
pub(crate) async fn credit_batch(
    conn: &mut PgConnection,
    product_id: Uuid,
    batch_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE inventory_batches SET quantity_remaining = quantity_remaining + $3 \
         WHERE id = $1 AND product_id = $2",
    )
    .bind(batch_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Batch".to_string()));
    }
    Ok(())
}

pub(crate) async fn insert_movement(
    conn: &mut PgConnection,
    movement: NewMovement<'_>,
) -> AppResult<InventoryMovement> {
    let row = sqlx::query_as::<_, MovementRow>(&format!(
        "INSERT INTO inventory_movements \
             (product_id, batch_id, change_type, quantity, notes, updated_by) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {}",
        MOVEMENT_COLUMNS
    ))
    .bind(movement.product_id)
    .bind(movement.batch_id)
    .bind(movement.change_type.as_str())
    .bind(movement.quantity)
    .bind(movement.notes)
    .bind(movement.actor)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Move the cached product stock by `delta`; returns the new value
pub(crate) async fn apply_stock_delta(conn: &mut PgConnection, product_id: Uuid, delta: i64) -> AppResult<i32> {
    let delta = i32::try_from(delta)
        .map_err(|_| AppError::validation("quantity", "Quantity is out of range"))?;

    let stock = sqlx::query_scalar::<_, i32>(
        "UPDATE products SET stock_quantity = stock_quantity + $2, updated_at = NOW() \
         WHERE id = $1 RETURNING stock_quantity",
    )
    .bind(product_id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

    Ok(stock)
}

/// Draw `quantity` units from the product's batches, earliest expiry first.
///
/// Writes one movement of `change_type` per batch drawn. The product row must
/// already be locked by the caller; the cached product stock is not touched.
pub(crate) async fn consume_fifo(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
    policy: DepletionPolicy,
    change_type: ChangeType,
    notes: Option<&str>,
    actor: Option<Uuid>,
) -> AppResult<Vec<(BatchDraw, InventoryMovement)>> {
    let batches = lock_open_batches(conn, product_id).await?;
    let snapshot: Vec<BatchStock> = batches.iter().map(InventoryBatch::stock).collect();
    let draws = plan_depletion(&snapshot, quantity, policy, Utc::now().date_naive())?;

    let mut drawn = Vec::with_capacity(draws.len());
    for draw in draws {
        sqlx::query(
            "UPDATE inventory_batches SET quantity_remaining = quantity_remaining - $2 WHERE id = $1",
        )
        .bind(draw.batch_id)
        .bind(draw.quantity)
        .execute(&mut *conn)
        .await?;

        let movement = insert_movement(
            conn,
            NewMovement {
                product_id,
                batch_id: Some(draw.batch_id),
                change_type,
                quantity: draw.quantity,
                notes,
                actor,
            },
        )
        .await?;
        drawn.push((draw, movement));
    }

    tracing::debug!(%product_id, quantity, batches = drawn.len(), "Consumed stock FIFO");
    Ok(drawn)
}

// ============================================================================
// Service
// ============================================================================

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db, queue: None }
    }

    /// Queue a stock check after every stock decrease
    pub fn with_queue(mut self, queue: Arc<dyn StockCheckQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Record a stock movement for a product
    pub async fn record_movement(
        &self,
        product_id: Uuid,
        input: RecordMovementInput,
        actor: Option<Uuid>,
    ) -> AppResult<MovementOutcome> {
        validate_quantity(input.quantity).map_err(|m| AppError::validation("quantity", m))?;
        if input.batch_id.is_some() && input.change_type != ChangeType::Return {
            return Err(AppError::validation(
                "batch_id",
                "A batch can only be named for RETURN movements",
            ));
        }

        let mut tx = self.db.begin().await?;
        lock_product(&mut tx, product_id).await?;

        let notes = input.notes.as_deref();
        let movements = match (input.change_type, input.batch_id) {
            (ChangeType::Return, Some(batch_id)) => {
                credit_batch(&mut tx, product_id, batch_id, input.quantity).await?;
                let movement = insert_movement(
                    &mut tx,
                    NewMovement {
                        product_id,
                        batch_id: Some(batch_id),
                        change_type: ChangeType::Return,
                        quantity: input.quantity,
                        notes,
                        actor,
                    },
                )
                .await?;
                vec![movement]
            }
            (ChangeType::Add, _) | (ChangeType::Return, None) => {
                let batch_code = input
                    .batch_code
                    .clone()
                    .unwrap_or_else(|| manual_batch_code(input.change_type, Utc::now()));
                let batch = insert_batch(
                    &mut tx,
                    NewBatch {
                        product_id,
                        batch_code: &batch_code,
                        expiry_date: input.expiry_date,
                        quantity: input.quantity,
                        purchase_order_id: None,
                    },
                )
                .await?;
                let movement = insert_movement(
                    &mut tx,
                    NewMovement {
                        product_id,
                        batch_id: Some(batch.id),
                        change_type: input.change_type,
                        quantity: input.quantity,
                        notes,
                        actor,
                    },
                )
                .await?;
                vec![movement]
            }
            (ChangeType::Remove | ChangeType::Adjust, _) => consume_fifo(
                &mut tx,
                product_id,
                input.quantity,
                DepletionPolicy::Any,
                input.change_type,
                notes,
                actor,
            )
            .await?
            .into_iter()
            .map(|(_, movement)| movement)
            .collect(),
        };

        let delta = stock_delta(input.change_type, input.quantity);
        let stock_quantity = apply_stock_delta(&mut tx, product_id, delta).await?;
        tx.commit().await?;

        tracing::info!(
            %product_id,
            change_type = %input.change_type,
            quantity = input.quantity,
            stock_quantity,
            "Recorded stock movement"
        );

        if delta < 0 {
            self.request_stock_check(product_id).await;
        }

        Ok(MovementOutcome {
            movements,
            stock_quantity,
        })
    }

    /// Queue a reorder analysis for the product, if a queue is attached
    pub async fn request_stock_check(&self, product_id: Uuid) {
        if let Some(queue) = &self.queue {
            queue_product_id(queue.as_ref(), product_id).await;
        }
    }

    /// Sum of the product's batch remainders; `None` for an unknown product
    pub async fn current_stock(&self, product_id: Uuid) -> AppResult<Option<i64>> {
        let stock = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT (SELECT COALESCE(SUM(b.quantity_remaining), 0)::BIGINT
                    FROM inventory_batches b WHERE b.product_id = p.id)
            FROM products p
            WHERE p.id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(stock.flatten())
    }

    /// All batches of a product in FIFO order, empty ones included
    pub async fn list_batches(&self, product_id: Uuid) -> AppResult<Vec<InventoryBatch>> {
        let batches = sqlx::query_as::<_, InventoryBatch>(&format!(
            "SELECT {} FROM inventory_batches WHERE product_id = $1 \
             ORDER BY expiry_date ASC NULLS LAST, received_at ASC, id ASC",
            BATCH_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(batches)
    }

    /// Stock history of a product, newest first
    pub async fn list_movements(&self, product_id: Uuid) -> AppResult<Vec<InventoryMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM inventory_movements WHERE product_id = $1 \
             ORDER BY created_at DESC, id DESC",
            MOVEMENT_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(InventoryMovement::try_from).collect()
    }

    /// Batches with stock left whose expiry date falls inside `range`
    pub async fn expiring_batches(&self, range: DateRange) -> AppResult<Vec<ExpiringBatch>> {
        let batches = sqlx::query_as::<_, ExpiringBatch>(
            r#"
            SELECT b.id AS batch_id, b.batch_code, b.product_id, p.name AS product_name,
                   b.expiry_date, b.quantity_remaining
            FROM inventory_batches b
            JOIN products p ON p.id = b.product_id
            WHERE b.quantity_remaining > 0
              AND b.expiry_date BETWEEN $1 AND $2
            ORDER BY b.expiry_date ASC, b.id ASC
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(batches)
    }

    /// Compare cached stock, batch remainders and the movement history
    pub async fn reconcile(&self, product_id: Uuid) -> AppResult<StockReconciliation> {
        let reconciliation = sqlx::query_as::<_, StockReconciliation>(
            r#"
            SELECT p.id AS product_id,
                   p.stock_quantity::BIGINT AS stock_quantity,
                   (SELECT COALESCE(SUM(b.quantity_remaining), 0)::BIGINT
                    FROM inventory_batches b WHERE b.product_id = p.id) AS batch_total,
                   (SELECT COALESCE(SUM(CASE WHEN m.change_type IN ('ADD', 'RETURN')
                                             THEN m.quantity ELSE -m.quantity END), 0)::BIGINT
                    FROM inventory_movements m WHERE m.product_id = p.id) AS movement_total
            FROM products p
            WHERE p.id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        if !reconciliation.is_consistent() {
            tracing::warn!(
                %product_id,
                stock_quantity = reconciliation.stock_quantity,
                batch_total = reconciliation.batch_total,
                movement_total = reconciliation.movement_total,
                "Stock views disagree"
            );
        }

        Ok(reconciliation)
    }
}
