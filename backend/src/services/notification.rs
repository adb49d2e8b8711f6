//! Notification service for stock issue and stock expiry tasks
//!
//! Notifications are work items for the warehouse team. Both kinds are
//! created idempotently:
//! - STOCK_ISSUE: at most one unresolved (OPEN or IN_PROGRESS) per product
//! - STOCK_EXPIRY: at most one per batch, ever
//!
//! Both rules are unique indexes, so concurrent workers cannot race past them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{NotificationKind, NotificationStatus, EXPIRY_NOTES};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Notification service for managing notifications
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    product_id: Uuid,
    batch_id: Option<Uuid>,
    kind: String,
    status: String,
    notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            batch_id: row.batch_id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Filter for listing notifications
#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    pub status: Option<NotificationStatus>,
    pub kind: Option<NotificationKind>,
    pub product_id: Option<Uuid>,
}

const COLUMNS: &str = "id, product_id, batch_id, kind, status, notes, created_at, updated_at";

impl NotificationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a stock issue for the product unless one is already unresolved.
    /// Returns the new notification, or `None` when one already existed.
    pub async fn create_stock_issue(&self, product_id: Uuid, notes: &str) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (product_id, kind, status, notes) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING \
             RETURNING {}",
            COLUMNS
        ))
        .bind(product_id)
        .bind(NotificationKind::StockIssue.as_str())
        .bind(NotificationStatus::Open.as_str())
        .bind(notes)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                tracing::info!(%product_id, notification_id = %row.id, "Opened stock issue");
                Ok(Some(row.try_into()?))
            }
            None => {
                tracing::debug!(%product_id, "Stock issue already unresolved");
                Ok(None)
            }
        }
    }

    /// Record that a batch is about to expire, once per batch
    pub async fn create_stock_expiry(&self, product_id: Uuid, batch_id: Uuid) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (product_id, batch_id, kind, status, notes) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT DO NOTHING \
             RETURNING {}",
            COLUMNS
        ))
        .bind(product_id)
        .bind(batch_id)
        .bind(NotificationKind::StockExpiry.as_str())
        .bind(NotificationStatus::Open.as_str())
        .bind(EXPIRY_NOTES)
        .fetch_optional(&self.db)
        .await?;

        row.map(Notification::try_from).transpose()
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Notification> {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification".to_string()))?
        .try_into()
    }

    pub async fn list(&self, filter: NotificationFilter) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notifications \
             WHERE ($1::TEXT IS NULL OR status = $1) \
               AND ($2::TEXT IS NULL OR kind = $2) \
               AND ($3::UUID IS NULL OR product_id = $3) \
             ORDER BY created_at DESC, id",
            COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    /// Change a notification's status, optionally replacing its notes.
    ///
    /// Reopening a stock issue while another one is unresolved for the same
    /// product fails with `DuplicateEntry`.
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: NotificationStatus,
        notes: Option<String>,
    ) -> AppResult<Notification> {
        let current = self.get(id).await?;
        if current.status != new_status && !current.status.can_transition_to(new_status) {
            return Err(AppError::InvalidStateTransition(format!(
                "notification {} cannot move from {} to {}",
                id, current.status, new_status
            )));
        }

        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications SET status = $3, notes = COALESCE($4, notes), updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .bind(current.status.as_str())
        .bind(new_status.as_str())
        .bind(&notes)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            if new_status.is_unresolved() {
                AppError::from_unique_violation(e, "status")
            } else {
                AppError::DatabaseError(e)
            }
        })?
        .ok_or_else(|| {
            AppError::InvalidStateTransition(format!("notification {} was changed concurrently", id))
        })?;

        tracing::info!(notification_id = %id, from = %current.status, to = %new_status, "Notification status changed");
        row.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, status: &str) -> NotificationRow {
        NotificationRow {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            batch_id: None,
            kind: kind.to_string(),
            status: status.to_string(),
            notes: "n".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let n = Notification::try_from(row("STOCK_EXPIRY", "IN_PROGRESS")).unwrap();
        assert_eq!(n.kind, NotificationKind::StockExpiry);
        assert_eq!(n.status, NotificationStatus::InProgress);
    }

    #[test]
    fn test_row_with_unknown_kind_is_corrupt() {
        let err = Notification::try_from(row("RESTOCK", "OPEN")).unwrap_err();
        assert_eq!(err.code(), "CORRUPT_RECORD");
    }

    #[test]
    fn test_filter_deserializes_wire_names() {
        let filter: NotificationFilter =
            serde_json::from_str(r#"{"status":"IN_PROGRESS","kind":"STOCK_ISSUE"}"#).unwrap();
        assert_eq!(filter.status, Some(NotificationStatus::InProgress));
        assert_eq!(filter.kind, Some(NotificationKind::StockIssue));
    }
}
