//! Product category service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{validate_name, MAX_CATEGORY_NAME_LEN};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct CategoryService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

const COLUMNS: &str = "id, name, description, created_by, created_at, updated_at";

impl CategoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateCategoryInput, actor: Option<Uuid>) -> AppResult<ProductCategory> {
        let name = input.name.trim();
        validate_name(name, MAX_CATEGORY_NAME_LEN).map_err(|m| AppError::validation("name", m))?;

        let category = sqlx::query_as::<_, ProductCategory>(&format!(
            "INSERT INTO product_categories (name, description, created_by) \
             VALUES ($1, $2, $3) RETURNING {}",
            COLUMNS
        ))
        .bind(name)
        .bind(&input.description)
        .bind(actor)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "name"))?;

        tracing::info!(category_id = %category.id, name = %category.name, "Created product category");
        Ok(category)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ProductCategory> {
        sqlx::query_as::<_, ProductCategory>(&format!(
            "SELECT {} FROM product_categories WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    pub async fn list(&self) -> AppResult<Vec<ProductCategory>> {
        let categories = sqlx::query_as::<_, ProductCategory>(&format!(
            "SELECT {} FROM product_categories ORDER BY name",
            COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(categories)
    }

    pub async fn update(&self, id: Uuid, input: UpdateCategoryInput) -> AppResult<ProductCategory> {
        let name = input.name.as_deref().map(str::trim);
        if let Some(name) = name {
            validate_name(name, MAX_CATEGORY_NAME_LEN).map_err(|m| AppError::validation("name", m))?;
        }

        sqlx::query_as::<_, ProductCategory>(&format!(
            "UPDATE product_categories \
             SET name = COALESCE($2, name), description = COALESCE($3, description), updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(&input.description)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "name"))?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    /// Delete a category together with its products and their ledgers
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM product_categories WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Category".to_string()));
        }
        tracing::info!(category_id = %id, "Deleted product category");
        Ok(())
    }
}
