//! Stock alert jobs
//!
//! Two jobs watch the ledger and open notifications for the warehouse team:
//! - the stock check consumer drains the stock check queue, runs the reorder
//!   optimizer for each product and opens a STOCK_ISSUE when stock is below
//!   the reorder point
//! - the expiry scan opens a STOCK_EXPIRY for every batch expiring within
//!   the configured window
//!
//! Each pass that creates notifications publishes one summary alert.
//! Notification creation is idempotent, so redelivered messages and
//! repeated scans never duplicate work items.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use shared::{DateRange, InventoryOptimizer, Recommendation, SalesWindow, StockCheckRequest};
use std::sync::Arc;
use uuid::Uuid;

use super::inventory::{ExpiringBatch, InventoryService};
use super::notification::NotificationService;
use super::order::OrderService;
use crate::error::AppResult;
use crate::external::AlertPublisher;
use crate::queue::{QueueMessage, StockCheckQueue};

pub const STOCK_LEVEL_SUBJECT: &str = "Stock Level Alert";
pub const STOCK_EXPIRY_SUBJECT: &str = "Stock Expiry Alert";

/// Default days ahead the expiry scan looks
pub const DEFAULT_EXPIRY_WINDOW_DAYS: u32 = 30;

/// Default deliveries before a message is given up on
pub const DEFAULT_MAX_RECEIVE_COUNT: i32 = 5;

pub fn stock_level_message(count: usize) -> String {
    format!(
        "{} product(s) require restocking based on recent sales analysis.",
        count
    )
}

pub fn stock_expiry_message(count: usize, window_days: u32) -> String {
    format!(
        "{} item(s) in our warehouse are expiring in {} days.",
        count, window_days
    )
}

/// Reads and writes the alert jobs need
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Stock held in batches; `None` when the product no longer exists
    async fn current_stock(&self, product_id: Uuid) -> AppResult<Option<i64>>;

    /// Item quantities of orders delivered since `since`
    async fn delivered_quantities(&self, product_id: Uuid, since: DateTime<Utc>) -> AppResult<Vec<i32>>;

    /// Open a stock issue; false when one is already unresolved
    async fn record_stock_issue(&self, product_id: Uuid, notes: &str) -> AppResult<bool>;

    /// Batches with stock left expiring inside `range`
    async fn expiring_batches(&self, range: DateRange) -> AppResult<Vec<ExpiringBatch>>;

    /// Record a batch as expiring; false when it already was
    async fn record_stock_expiry(&self, batch: &ExpiringBatch) -> AppResult<bool>;
}

/// [`AlertStore`] over the PostgreSQL services
#[derive(Clone)]
pub struct PgAlertStore {
    inventory: InventoryService,
    orders: OrderService,
    notifications: NotificationService,
}

impl PgAlertStore {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self {
            inventory: InventoryService::new(db.clone()),
            orders: OrderService::new(db.clone()),
            notifications: NotificationService::new(db),
        }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn current_stock(&self, product_id: Uuid) -> AppResult<Option<i64>> {
        self.inventory.current_stock(product_id).await
    }

    async fn delivered_quantities(&self, product_id: Uuid, since: DateTime<Utc>) -> AppResult<Vec<i32>> {
        self.orders.delivered_quantities(product_id, since).await
    }

    async fn record_stock_issue(&self, product_id: Uuid, notes: &str) -> AppResult<bool> {
        Ok(self
            .notifications
            .create_stock_issue(product_id, notes)
            .await?
            .is_some())
    }

    async fn expiring_batches(&self, range: DateRange) -> AppResult<Vec<ExpiringBatch>> {
        self.inventory.expiring_batches(range).await
    }

    async fn record_stock_expiry(&self, batch: &ExpiringBatch) -> AppResult<bool> {
        Ok(self
            .notifications
            .create_stock_expiry(batch.product_id, batch.batch_id)
            .await?
            .is_some())
    }
}

/// Summary of one stock check pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StockCheckReport {
    /// Messages taken from the queue
    pub received: usize,
    /// Messages analysed and acknowledged
    pub processed: usize,
    /// New STOCK_ISSUE notifications
    pub notifications_created: usize,
    /// Malformed, exhausted or orphaned messages acknowledged without analysis
    pub dropped: usize,
    /// Messages left on the queue for redelivery
    pub failed: usize,
}

enum MessageOutcome {
    Analyzed { notification_created: bool },
    Dropped,
}

/// Runs the stock check and expiry jobs
pub struct StockMonitor {
    store: Arc<dyn AlertStore>,
    queue: Arc<dyn StockCheckQueue>,
    publisher: Arc<dyn AlertPublisher>,
    optimizer: InventoryOptimizer,
    expiry_window_days: u32,
    max_receive_count: i32,
}

impl StockMonitor {
    pub fn new(
        store: Arc<dyn AlertStore>,
        queue: Arc<dyn StockCheckQueue>,
        publisher: Arc<dyn AlertPublisher>,
    ) -> Self {
        Self {
            store,
            queue,
            publisher,
            optimizer: InventoryOptimizer::default(),
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }

    pub fn with_optimizer(mut self, optimizer: InventoryOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_expiry_window(mut self, days: u32) -> Self {
        self.expiry_window_days = days;
        self
    }

    pub fn with_max_receive_count(mut self, count: i32) -> Self {
        self.max_receive_count = count;
        self
    }

    /// Reorder analysis for one product; `None` when the product is gone
    pub async fn analyze(&self, product_id: Uuid, now: DateTime<Utc>) -> AppResult<Option<Recommendation>> {
        let Some(current_stock) = self.store.current_stock(product_id).await? else {
            return Ok(None);
        };

        let window = SalesWindow::new(self.optimizer.policy().sales_window_days);
        let delivered = self
            .store
            .delivered_quantities(product_id, window.since(now))
            .await?;

        Ok(Some(self.optimizer.generate_recommendations(
            product_id,
            &delivered,
            current_stock,
        )))
    }

    async fn handle_message(&self, message: &QueueMessage) -> AppResult<MessageOutcome> {
        if message.receive_count > self.max_receive_count {
            tracing::error!(
                message_id = %message.message_id,
                receive_count = message.receive_count,
                body = %message.body,
                "Dropping stock check after too many deliveries"
            );
            return Ok(MessageOutcome::Dropped);
        }

        let request = match StockCheckRequest::from_json(&message.body) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(message_id = %message.message_id, body = %message.body, "Malformed stock check: {}", e);
                return Ok(MessageOutcome::Dropped);
            }
        };

        let Some(recommendation) = self.analyze(request.product_id, Utc::now()).await? else {
            tracing::warn!(product_id = %request.product_id, "Stock check for unknown product");
            return Ok(MessageOutcome::Dropped);
        };

        tracing::debug!(
            product_id = %recommendation.product_id,
            current_stock = recommendation.current_stock,
            reorder_point = recommendation.reorder_point,
            needs_reorder = recommendation.needs_reorder,
            "Analysed product stock"
        );

        let notification_created = if recommendation.needs_reorder {
            self.store
                .record_stock_issue(recommendation.product_id, &recommendation.alert_notes())
                .await?
        } else {
            false
        };

        Ok(MessageOutcome::Analyzed {
            notification_created,
        })
    }

    /// Drain up to `max` stock check messages.
    ///
    /// A message that fails is left unacknowledged and comes back after the
    /// visibility timeout; the rest of the pass carries on.
    pub async fn process_stock_checks(&self, max: u32) -> AppResult<StockCheckReport> {
        let messages = self.queue.receive(max).await?;
        let mut report = StockCheckReport {
            received: messages.len(),
            ..StockCheckReport::default()
        };

        for message in &messages {
            match self.handle_message(message).await {
                Ok(outcome) => {
                    match outcome {
                        MessageOutcome::Analyzed {
                            notification_created,
                        } => {
                            report.processed += 1;
                            if notification_created {
                                report.notifications_created += 1;
                            }
                        }
                        MessageOutcome::Dropped => report.dropped += 1,
                    }
                    if let Err(e) = self.queue.ack(message.receipt).await {
                        tracing::error!(message_id = %message.message_id, "Error acknowledging stock check: {}", e);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(message_id = %message.message_id, "Error processing stock check: {}", e);
                }
            }
        }

        if report.notifications_created > 0 {
            self.publish(STOCK_LEVEL_SUBJECT, &stock_level_message(report.notifications_created))
                .await;
        }

        if report.received > 0 {
            tracing::info!(
                received = report.received,
                processed = report.processed,
                notifications_created = report.notifications_created,
                dropped = report.dropped,
                failed = report.failed,
                "Stock check pass finished"
            );
        }

        Ok(report)
    }

    /// Open an expiry notification for each batch expiring between `today`
    /// and the end of the window; returns how many were created.
    pub async fn scan_expiring_batches(&self, today: NaiveDate) -> AppResult<usize> {
        let range = DateRange::ahead(today, self.expiry_window_days);
        let batches = self.store.expiring_batches(range).await?;

        let mut created = 0;
        for batch in batches.iter().filter(|b| b.quantity_remaining > 0 && range.contains(b.expiry_date)) {
            match self.store.record_stock_expiry(batch).await {
                Ok(true) => {
                    created += 1;
                    tracing::info!(
                        batch_id = %batch.batch_id,
                        batch_code = %batch.batch_code,
                        expiry_date = %batch.expiry_date,
                        "Batch expiring soon"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(batch_id = %batch.batch_id, "Error recording batch expiry: {}", e);
                }
            }
        }

        if created > 0 {
            self.publish(
                STOCK_EXPIRY_SUBJECT,
                &stock_expiry_message(created, self.expiry_window_days),
            )
            .await;
        }

        tracing::info!(%today, batches = batches.len(), created, "Expiry scan finished");
        Ok(created)
    }

    async fn publish(&self, subject: &str, message: &str) {
        if let Err(e) = self.publisher.publish(subject, message).await {
            tracing::error!(subject, "Error publishing alert: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_messages() {
        assert_eq!(
            stock_level_message(2),
            "2 product(s) require restocking based on recent sales analysis."
        );
        assert_eq!(
            stock_expiry_message(3, 30),
            "3 item(s) in our warehouse are expiring in 30 days."
        );
    }
}
