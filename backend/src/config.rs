//! Configuration management for the Stock Ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with STOCK__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{ReorderPolicy, DEFAULT_SHELF_LIFE_DAYS};

/// Upper bound for every day-count setting
pub const MAX_CONFIG_DAYS: u32 = 3650;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Health endpoint configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Stock check queue consumer configuration
    pub queue: QueueConfig,

    /// Alert jobs and publisher configuration
    pub alerts: AlertsConfig,

    /// Reorder optimizer tuning
    pub reorder: ReorderPolicy,

    /// Ledger defaults
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// Seconds to wait before polling an empty queue again
    pub poll_interval_secs: u64,

    /// Messages taken per receive
    pub batch_size: u32,

    /// Seconds a received message stays invisible before redelivery
    pub visibility_timeout_secs: u64,

    /// Deliveries after which a message is dropped
    pub max_receive_count: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Batches expiring within this many days raise an expiry notification
    pub expiry_window_days: u32,

    /// Seconds between expiry scans
    pub expiry_scan_interval_secs: u64,

    /// Topic name sent with every published alert
    pub topic: String,

    /// Webhook receiving published alerts; alerts are only logged when unset
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Days added to the expected delivery date of received goods
    pub shelf_life_days: u32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("STOCK_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let reorder = ReorderPolicy::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 8080)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("queue.poll_interval_secs", 5)?
            .set_default("queue.batch_size", 10)?
            .set_default("queue.visibility_timeout_secs", 60)?
            .set_default("queue.max_receive_count", 5)?
            .set_default("alerts.expiry_window_days", 30)?
            .set_default("alerts.expiry_scan_interval_secs", 86_400)?
            .set_default("alerts.topic", "stock-alerts")?
            .set_default("reorder.sales_window_days", i64::from(reorder.sales_window_days))?
            .set_default("reorder.lead_time_days", i64::from(reorder.lead_time_days))?
            .set_default("reorder.safety_stock_days", i64::from(reorder.safety_stock_days))?
            .set_default("reorder.review_period_days", i64::from(reorder.review_period_days))?
            .set_default("reorder.min_reorder_point", reorder.min_reorder_point)?
            .set_default("inventory.shelf_life_days", i64::from(DEFAULT_SHELF_LIFE_DAYS))?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (STOCK__ prefix)
            .add_source(
                Environment::with_prefix("STOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings outside the ranges the jobs are built for
    pub fn validate(&self) -> Result<(), ConfigError> {
        let days = [
            ("reorder.sales_window_days", self.reorder.sales_window_days),
            ("reorder.lead_time_days", self.reorder.lead_time_days),
            ("reorder.safety_stock_days", self.reorder.safety_stock_days),
            ("reorder.review_period_days", self.reorder.review_period_days),
            ("alerts.expiry_window_days", self.alerts.expiry_window_days),
            ("inventory.shelf_life_days", self.inventory.shelf_life_days),
        ];
        for (key, value) in days {
            if value > MAX_CONFIG_DAYS {
                return Err(ConfigError::Message(format!(
                    "{} must be at most {} days, got {}",
                    key, MAX_CONFIG_DAYS, value
                )));
            }
        }

        if self.reorder.sales_window_days == 0 {
            return Err(ConfigError::Message("reorder.sales_window_days must be at least 1".into()));
        }
        if self.reorder.min_reorder_point < 0 {
            return Err(ConfigError::Message("reorder.min_reorder_point must not be negative".into()));
        }
        if self.queue.batch_size == 0 {
            return Err(ConfigError::Message("queue.batch_size must be at least 1".into()));
        }
        if self.queue.max_receive_count < 1 {
            return Err(ConfigError::Message("queue.max_receive_count must be at least 1".into()));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            environment: "test".to_string(),
            server: ServerConfig {
                port: 8080,
                host: "127.0.0.1".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/stock".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            queue: QueueConfig {
                poll_interval_secs: 5,
                batch_size: 10,
                visibility_timeout_secs: 60,
                max_receive_count: 5,
            },
            alerts: AlertsConfig {
                expiry_window_days: 30,
                expiry_scan_interval_secs: 86_400,
                topic: "stock-alerts".to_string(),
                webhook_url: None,
            },
            reorder: ReorderPolicy::default(),
            inventory: InventoryConfig {
                shelf_life_days: DEFAULT_SHELF_LIFE_DAYS,
            },
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_oversized_day_counts_are_rejected() {
        let mut c = config();
        c.reorder.lead_time_days = u32::MAX;
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("reorder.lead_time_days"));

        let mut c = config();
        c.inventory.shelf_life_days = MAX_CONFIG_DAYS + 1;
        assert!(c.validate().is_err());

        let mut c = config();
        c.alerts.expiry_window_days = MAX_CONFIG_DAYS;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_queue_settings_must_be_positive() {
        let mut c = config();
        c.queue.batch_size = 0;
        assert!(c.validate().is_err());

        let mut c = config();
        c.queue.max_receive_count = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_empty_sales_window_is_rejected() {
        let mut c = config();
        c.reorder.sales_window_days = 0;
        assert!(c.validate().is_err());
    }
}
