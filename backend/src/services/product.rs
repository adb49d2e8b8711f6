//! Product service
//!
//! A product's stock is only ever changed through the ledger. Creating a
//! product with a starting quantity opens one batch and one ADD movement in
//! the same transaction, so the opening stock is counted exactly once.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    opening_batch_code, validate_name, validate_price, validate_stock_quantity, ChangeType,
    MAX_NAME_LEN,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::inventory::{apply_stock_delta, insert_batch, insert_movement, NewBatch, NewMovement};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub price: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    /// Expiry of the opening batch
    pub expiry_date: Option<NaiveDate>,
}

/// Descriptive fields only; stock moves through the ledger
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub price: Option<Decimal>,
}

const COLUMNS: &str =
    "id, name, description, category_id, price, stock_quantity, created_by, created_at, updated_at";

const OPENING_NOTES: &str = "Initial stock on product creation";

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn ensure_category(&self, category_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_categories WHERE id = $1)",
        )
        .bind(category_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Category".to_string()));
        }
        Ok(())
    }

    /// Create a product, opening its ledger with the starting quantity
    pub async fn create(&self, input: CreateProductInput, actor: Option<Uuid>) -> AppResult<Product> {
        let name = input.name.trim();
        validate_name(name, MAX_NAME_LEN).map_err(|m| AppError::validation("name", m))?;
        validate_price(input.price).map_err(|m| AppError::validation("price", m))?;
        validate_stock_quantity(input.stock_quantity)
            .map_err(|m| AppError::validation("stock_quantity", m))?;
        self.ensure_category(input.category_id).await?;

        let mut tx = self.db.begin().await?;

        let mut product = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (name, description, category_id, price, stock_quantity, created_by) \
             VALUES ($1, $2, $3, $4, 0, $5) RETURNING {}",
            COLUMNS
        ))
        .bind(name)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.price)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        if input.stock_quantity > 0 {
            let batch_code = opening_batch_code(product.id, product.created_at);
            let batch = insert_batch(
                &mut tx,
                NewBatch {
                    product_id: product.id,
                    batch_code: &batch_code,
                    expiry_date: input.expiry_date,
                    quantity: input.stock_quantity,
                    purchase_order_id: None,
                },
            )
            .await?;
            insert_movement(
                &mut tx,
                NewMovement {
                    product_id: product.id,
                    batch_id: Some(batch.id),
                    change_type: ChangeType::Add,
                    quantity: input.stock_quantity,
                    notes: Some(OPENING_NOTES),
                    actor,
                },
            )
            .await?;
            product.stock_quantity =
                apply_stock_delta(&mut tx, product.id, i64::from(input.stock_quantity)).await?;
        }

        tx.commit().await?;

        tracing::info!(
            product_id = %product.id,
            stock_quantity = product.stock_quantity,
            "Created product"
        );
        Ok(product)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Product> {
        sqlx::query_as::<_, Product>(&format!("SELECT {} FROM products WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    pub async fn list(&self, category_id: Option<Uuid>) -> AppResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE ($1::UUID IS NULL OR category_id = $1) ORDER BY name",
            COLUMNS
        ))
        .bind(category_id)
        .fetch_all(&self.db)
        .await?;

        Ok(products)
    }

    pub async fn update(&self, id: Uuid, input: UpdateProductInput) -> AppResult<Product> {
        let name = input.name.as_deref().map(str::trim);
        if let Some(name) = name {
            validate_name(name, MAX_NAME_LEN).map_err(|m| AppError::validation("name", m))?;
        }
        if let Some(price) = input.price {
            validate_price(price).map_err(|m| AppError::validation("price", m))?;
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 category_id = COALESCE($4, category_id), \
                 price = COALESCE($5, price), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.price)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Delete a product together with its batches, movements and notifications
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product".to_string()));
        }
        tracing::info!(product_id = %id, "Deleted product");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_input_defaults_to_empty_stock() {
        let input: CreateProductInput = serde_json::from_str(&format!(
            r#"{{"name":"Oat milk","category_id":"{}","price":"2.49"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();

        assert_eq!(input.stock_quantity, 0);
        assert_eq!(input.price, Decimal::new(249, 2));
        assert!(input.expiry_date.is_none());
    }
}
