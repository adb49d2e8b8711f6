//! Supplier service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{validate_email, validate_name, validate_phone, MAX_NAME_LEN};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct SupplierService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSupplierInput {
    pub name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSupplierInput {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
}

const COLUMNS: &str =
    "id, name, contact_email, contact_phone, address, created_by, created_at, updated_at";

fn validate_contact(name: Option<&str>, email: Option<&str>, phone: Option<&str>) -> AppResult<()> {
    if let Some(name) = name {
        validate_name(name, MAX_NAME_LEN).map_err(|m| AppError::validation("name", m))?;
    }
    if let Some(email) = email {
        validate_email(email).map_err(|m| AppError::validation("contact_email", m))?;
    }
    if let Some(phone) = phone {
        validate_phone(phone).map_err(|m| AppError::validation("contact_phone", m))?;
    }
    Ok(())
}

impl SupplierService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateSupplierInput, actor: Option<Uuid>) -> AppResult<Supplier> {
        let name = input.name.trim();
        validate_contact(Some(name), input.contact_email.as_deref(), input.contact_phone.as_deref())?;

        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            "INSERT INTO suppliers (name, contact_email, contact_phone, address, created_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            COLUMNS
        ))
        .bind(name)
        .bind(&input.contact_email)
        .bind(&input.contact_phone)
        .bind(&input.address)
        .bind(actor)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(supplier_id = %supplier.id, "Created supplier");
        Ok(supplier)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Supplier> {
        sqlx::query_as::<_, Supplier>(&format!("SELECT {} FROM suppliers WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Supplier".to_string()))
    }

    pub async fn list(&self) -> AppResult<Vec<Supplier>> {
        let suppliers =
            sqlx::query_as::<_, Supplier>(&format!("SELECT {} FROM suppliers ORDER BY name", COLUMNS))
                .fetch_all(&self.db)
                .await?;

        Ok(suppliers)
    }

    pub async fn update(&self, id: Uuid, input: UpdateSupplierInput) -> AppResult<Supplier> {
        let name = input.name.as_deref().map(str::trim);
        validate_contact(name, input.contact_email.as_deref(), input.contact_phone.as_deref())?;

        sqlx::query_as::<_, Supplier>(&format!(
            "UPDATE suppliers SET \
                 name = COALESCE($2, name), \
                 contact_email = COALESCE($3, contact_email), \
                 contact_phone = COALESCE($4, contact_phone), \
                 address = COALESCE($5, address), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(&input.contact_email)
        .bind(&input.contact_phone)
        .bind(&input.address)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))
    }

    /// Delete a supplier and its purchase orders
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Supplier".to_string()));
        }
        Ok(())
    }
}
