//! Stock check queue
//!
//! Product ids whose stock went down are queued for a reorder analysis.
//! Delivery is at least once: a received message stays invisible for the
//! visibility timeout and comes back unless it is acknowledged with the
//! receipt handed out by that particular receive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::StockCheckRequest;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// A received message
#[derive(Debug, Clone, FromRow)]
pub struct QueueMessage {
    pub message_id: Uuid,
    /// Handle for acknowledging this delivery
    pub receipt: Uuid,
    /// JSON body, `{"product_id": "<uuid>"}`
    pub body: String,
    /// Number of times the message has been delivered, this one included
    pub receive_count: i32,
}

#[async_trait]
pub trait StockCheckQueue: Send + Sync {
    /// Queue a message body; returns the message id
    async fn send_body(&self, body: String) -> AppResult<Uuid>;

    /// Receive up to `max` visible messages
    async fn receive(&self, max: u32) -> AppResult<Vec<QueueMessage>>;

    /// Delete the message delivered with `receipt`. Returns false when the
    /// receipt is stale (the message was redelivered or already deleted).
    async fn ack(&self, receipt: Uuid) -> AppResult<bool>;

    /// Queue a stock check for a product
    async fn send(&self, product_id: Uuid) -> AppResult<Uuid> {
        self.send_body(StockCheckRequest::new(product_id).to_json()).await
    }
}

/// Queue a stock check, logging instead of failing when the queue is down
pub async fn queue_product_id(queue: &dyn StockCheckQueue, product_id: Uuid) -> Option<Uuid> {
    match queue.send(product_id).await {
        Ok(message_id) => {
            tracing::debug!(%product_id, %message_id, "Queued stock check");
            Some(message_id)
        }
        Err(e) => {
            tracing::error!(%product_id, "Error queueing stock check: {}", e);
            None
        }
    }
}

// ============================================================================
// PostgreSQL queue
// ============================================================================

/// Queue backed by the `stock_check_queue` table
#[derive(Clone)]
pub struct PgStockCheckQueue {
    db: PgPool,
    visibility_timeout: Duration,
}

impl PgStockCheckQueue {
    pub fn new(db: PgPool, visibility_timeout: Duration) -> Self {
        Self {
            db,
            visibility_timeout,
        }
    }

    /// Number of messages in the queue, in flight or not
    pub async fn depth(&self) -> AppResult<i64> {
        let depth = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_check_queue")
            .fetch_one(&self.db)
            .await?;
        Ok(depth)
    }
}

#[async_trait]
impl StockCheckQueue for PgStockCheckQueue {
    async fn send_body(&self, body: String) -> AppResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO stock_check_queue (body) VALUES ($1) RETURNING id",
        )
        .bind(&body)
        .fetch_one(&self.db)
        .await?;

        Ok(id)
    }

    async fn receive(&self, max: u32) -> AppResult<Vec<QueueMessage>> {
        let messages = sqlx::query_as::<_, QueueMessage>(
            r#"
            UPDATE stock_check_queue q
            SET visible_at = NOW() + make_interval(secs => $2),
                receipt = gen_random_uuid(),
                receive_count = q.receive_count + 1
            WHERE q.id IN (
                SELECT id FROM stock_check_queue
                WHERE visible_at <= NOW()
                ORDER BY enqueued_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING q.id AS message_id, q.receipt, q.body, q.receive_count
            "#,
        )
        .bind(i64::from(max))
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_all(&self.db)
        .await?;

        Ok(messages)
    }

    async fn ack(&self, receipt: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM stock_check_queue WHERE receipt = $1")
            .bind(receipt)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// In-memory queue
// ============================================================================

#[derive(Debug)]
struct Entry {
    id: Uuid,
    body: String,
    visible_at: DateTime<Utc>,
    receipt: Option<Uuid>,
    receive_count: i32,
}

/// Process-local queue with the same delivery semantics, for tests and
/// single-process runs
pub struct InMemoryStockCheckQueue {
    entries: Mutex<Vec<Entry>>,
    visibility_timeout: Duration,
}

impl InMemoryStockCheckQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            visibility_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl StockCheckQueue for InMemoryStockCheckQueue {
    async fn send_body(&self, body: String) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.entries.lock().await.push(Entry {
            id,
            body,
            visible_at: Utc::now(),
            receipt: None,
            receive_count: 0,
        });
        Ok(id)
    }

    async fn receive(&self, max: u32) -> AppResult<Vec<QueueMessage>> {
        let timeout = chrono::Duration::from_std(self.visibility_timeout)
            .map_err(|e| AppError::Queue(format!("invalid visibility timeout: {}", e)))?;
        let now = Utc::now();
        let mut entries = self.entries.lock().await;

        let mut received = Vec::new();
        for entry in entries.iter_mut().filter(|e| e.visible_at <= now) {
            if received.len() >= max as usize {
                break;
            }
            let receipt = Uuid::new_v4();
            entry.receipt = Some(receipt);
            entry.receive_count += 1;
            entry.visible_at = now + timeout;
            received.push(QueueMessage {
                message_id: entry.id,
                receipt,
                body: entry.body.clone(),
                receive_count: entry.receive_count,
            });
        }

        Ok(received)
    }

    async fn ack(&self, receipt: Uuid) -> AppResult<bool> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.receipt != Some(receipt));
        Ok(entries.len() < before)
    }
}
