//! stockd: Stock Ledger worker
//!
//! Runs the stock check consumer and the daily expiry scan against the
//! ledger database, and serves `/health` for the orchestrator.

use chrono::Utc;
use shared::InventoryOptimizer;
use sqlx::postgres::PgPoolOptions;
use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stock_ledger::external::{AlertPublisher, LogPublisher, WebhookPublisher};
use stock_ledger::queue::PgStockCheckQueue;
use stock_ledger::services::{PgAlertStore, StockMonitor};
use stock_ledger::{create_app, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stockd=debug,stock_ledger=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Stock Ledger worker");
    tracing::info!("Environment: {}", config.environment);

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    if config.is_development() {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let publisher: Arc<dyn AlertPublisher> = match &config.alerts.webhook_url {
        Some(url) => {
            tracing::info!(topic = %config.alerts.topic, "Publishing alerts to webhook");
            Arc::new(WebhookPublisher::new(url.clone(), config.alerts.topic.clone())?)
        }
        None => {
            tracing::warn!("No alert webhook configured, alerts will only be logged");
            Arc::new(LogPublisher)
        }
    };

    let queue = Arc::new(PgStockCheckQueue::new(
        db_pool.clone(),
        Duration::from_secs(config.queue.visibility_timeout_secs),
    ));

    let monitor = Arc::new(
        StockMonitor::new(Arc::new(PgAlertStore::new(db_pool.clone())), queue, publisher)
            .with_optimizer(InventoryOptimizer::new(config.reorder))
            .with_expiry_window(config.alerts.expiry_window_days)
            .with_max_receive_count(config.queue.max_receive_count),
    );

    let consumer = tokio::spawn(run_stock_check_consumer(
        monitor.clone(),
        config.queue.batch_size,
        Duration::from_secs(config.queue.poll_interval_secs),
    ));
    let scanner = tokio::spawn(run_expiry_scanner(
        monitor,
        Duration::from_secs(config.alerts.expiry_scan_interval_secs),
    ));

    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
    };
    let app = create_app(state);

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Health endpoint listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        result = axum::serve(listener, app).into_future() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
    }

    consumer.abort();
    scanner.abort();
    tracing::info!("Stock Ledger worker stopped");

    Ok(())
}

/// Drain the stock check queue, sleeping only when it is empty
async fn run_stock_check_consumer(monitor: Arc<StockMonitor>, batch_size: u32, poll_interval: Duration) {
    loop {
        match monitor.process_stock_checks(batch_size).await {
            Ok(report) if report.received > 0 => continue,
            Ok(_) => {}
            Err(e) => tracing::error!("Stock check pass failed: {}", e),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Scan for expiring batches on every tick, starting immediately
async fn run_expiry_scanner(monitor: Arc<StockMonitor>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = monitor.scan_expiring_batches(Utc::now().date_naive()).await {
            tracing::error!("Expiry scan failed: {}", e);
        }
    }
}
