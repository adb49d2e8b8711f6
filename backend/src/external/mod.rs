//! Outbound alert publishing

use async_trait::async_trait;

use crate::error::AppResult;

pub mod webhook;

pub use webhook::WebhookPublisher;

/// Broadcasts a short alert to subscribers
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> AppResult<()>;
}

/// Publisher used when no webhook is configured
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl AlertPublisher for LogPublisher {
    async fn publish(&self, subject: &str, message: &str) -> AppResult<()> {
        tracing::info!(subject, message, "Alert published");
        Ok(())
    }
}
