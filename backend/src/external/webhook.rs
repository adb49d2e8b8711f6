//! Webhook alert publisher
//!
//! Posts `{"topic", "subject", "message"}` as JSON to a configured URL,
//! typically a fan-out endpoint that forwards to email or chat.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::AlertPublisher;
use crate::error::{AppError, AppResult};

/// Alert publisher client
#[derive(Clone)]
pub struct WebhookPublisher {
    client: Client,
    url: String,
    topic: String,
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    topic: &'a str,
    subject: &'a str,
    message: &'a str,
}

impl WebhookPublisher {
    pub fn new(url: String, topic: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url, topic })
    }
}

#[async_trait]
impl AlertPublisher for WebhookPublisher {
    async fn publish(&self, subject: &str, message: &str) -> AppResult<()> {
        let payload = AlertPayload {
            topic: &self.topic,
            subject,
            message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Alert webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Alert webhook error: {} - {}",
                status, body
            )));
        }

        tracing::debug!(topic = %self.topic, subject, "Alert delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = AlertPayload {
            topic: "stock-alerts",
            subject: "Stock Level Alert",
            message: "1 product(s) require restocking based on recent sales analysis.",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["topic"], "stock-alerts");
        assert_eq!(json["subject"], "Stock Level Alert");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_external_error() {
        let publisher =
            WebhookPublisher::new("http://127.0.0.1:9/alerts".to_string(), "t".to_string()).unwrap();
        let err = publisher.publish("s", "m").await.unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");
    }
}
