//! Purchase order service
//!
//! Receiving a purchase order books its goods into the ledger as a new
//! batch. The status change and the booking share one transaction, and the
//! transition table only allows RECEIVED once.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    purchase_order_batch_code, received_expiry, validate_quantity, ChangeType, PurchaseOrderStatus,
    DEFAULT_SHELF_LIFE_DAYS,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::inventory::{
    apply_stock_delta, insert_batch, insert_movement, lock_product, NewBatch, NewMovement,
};
use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PurchaseOrderService {
    db: PgPool,
    shelf_life_days: u32,
}

#[derive(Debug, FromRow)]
struct PurchaseOrderRow {
    id: Uuid,
    supplier_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    order_date: DateTime<Utc>,
    expected_delivery_date: Option<NaiveDate>,
    status: String,
    batch_code: Option<String>,
    notes: Option<String>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub order_date: DateTime<Utc>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub status: PurchaseOrderStatus,
    /// Set once the order is received
    pub batch_code: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseOrderRow> for PurchaseOrder {
    type Error = AppError;

    fn try_from(row: PurchaseOrderRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            supplier_id: row.supplier_id,
            product_id: row.product_id,
            quantity: row.quantity,
            order_date: row.order_date,
            expected_delivery_date: row.expected_delivery_date,
            status: row.status.parse()?,
            batch_code: row.batch_code,
            notes: row.notes,
            created_by: row.created_by,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub expected_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePurchaseOrderInput {
    pub expected_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

const COLUMNS: &str = "id, supplier_id, product_id, quantity, order_date, expected_delivery_date, \
                       status, batch_code, notes, created_by, updated_at";

impl PurchaseOrderService {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            shelf_life_days: DEFAULT_SHELF_LIFE_DAYS,
        }
    }

    /// Service using the configured shelf life for received goods
    pub fn from_config(db: PgPool, config: &Config) -> Self {
        Self::new(db).with_shelf_life(config.inventory.shelf_life_days)
    }

    pub fn shelf_life_days(&self) -> u32 {
        self.shelf_life_days
    }

    /// Override the shelf life applied to received goods
    pub fn with_shelf_life(mut self, days: u32) -> Self {
        self.shelf_life_days = days;
        self
    }

    pub async fn create(
        &self,
        input: CreatePurchaseOrderInput,
        actor: Option<Uuid>,
    ) -> AppResult<PurchaseOrder> {
        validate_quantity(input.quantity).map_err(|m| AppError::validation("quantity", m))?;

        let (supplier_exists, product_exists) = sqlx::query_as::<_, (bool, bool)>(
            "SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1), \
                    EXISTS(SELECT 1 FROM products WHERE id = $2)",
        )
        .bind(input.supplier_id)
        .bind(input.product_id)
        .fetch_one(&self.db)
        .await?;

        if !supplier_exists {
            return Err(AppError::NotFound("Supplier".to_string()));
        }
        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let row = sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "INSERT INTO purchase_orders \
                 (supplier_id, product_id, quantity, expected_delivery_date, status, notes, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            COLUMNS
        ))
        .bind(input.supplier_id)
        .bind(input.product_id)
        .bind(input.quantity)
        .bind(input.expected_delivery_date)
        .bind(PurchaseOrderStatus::Pending.as_str())
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(purchase_order_id = %row.id, product_id = %row.product_id, "Created purchase order");
        row.try_into()
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PurchaseOrder> {
        sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?
        .try_into()
    }

    pub async fn list(&self, status: Option<PurchaseOrderStatus>) -> AppResult<Vec<PurchaseOrder>> {
        let rows = sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "SELECT {} FROM purchase_orders \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY order_date DESC",
            COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(PurchaseOrder::try_from).collect()
    }

    pub async fn update(&self, id: Uuid, input: UpdatePurchaseOrderInput) -> AppResult<PurchaseOrder> {
        sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "UPDATE purchase_orders SET \
                 expected_delivery_date = COALESCE($2, expected_delivery_date), \
                 notes = COALESCE($3, notes), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(input.expected_delivery_date)
        .bind(&input.notes)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?
        .try_into()
    }

    /// Move a purchase order through its lifecycle.
    ///
    /// Moving to RECEIVED books the ordered quantity as a new batch expiring
    /// `shelf_life_days` after the expected delivery date.
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: PurchaseOrderStatus,
        actor: Option<Uuid>,
    ) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;

        let current: PurchaseOrder = sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?
        .try_into()?;

        if current.status == new_status {
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "purchase order {} is already {}",
                id, current.status
            )));
        }
        if !current.status.can_transition_to(new_status) {
            return Err(AppError::InvalidStateTransition(format!(
                "purchase order {} cannot move from {} to {}",
                id, current.status, new_status
            )));
        }

        let mut batch_code = current.batch_code.clone();
        if new_status == PurchaseOrderStatus::Received {
            let code = purchase_order_batch_code(current.id, current.order_date);
            lock_product(&mut tx, current.product_id).await?;

            let batch = insert_batch(
                &mut tx,
                NewBatch {
                    product_id: current.product_id,
                    batch_code: &code,
                    expiry_date: received_expiry(current.expected_delivery_date, self.shelf_life_days),
                    quantity: current.quantity,
                    purchase_order_id: Some(current.id),
                },
            )
            .await?;
            let notes = format!("Stock received from Purchase Order {}", current.id);
            insert_movement(
                &mut tx,
                NewMovement {
                    product_id: current.product_id,
                    batch_id: Some(batch.id),
                    change_type: ChangeType::Add,
                    quantity: current.quantity,
                    notes: Some(&notes),
                    actor,
                },
            )
            .await?;
            apply_stock_delta(&mut tx, current.product_id, i64::from(current.quantity)).await?;
            batch_code = Some(code);
        }

        let updated: PurchaseOrder = sqlx::query_as::<_, PurchaseOrderRow>(&format!(
            "UPDATE purchase_orders SET status = $2, batch_code = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(new_status.as_str())
        .bind(&batch_code)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;

        tracing::info!(
            purchase_order_id = %id,
            from = %current.status,
            to = %new_status,
            "Purchase order status changed"
        );
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Purchase order".to_string()));
        }
        Ok(())
    }
}
