//! Health check handler

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: String,
    /// Stock checks waiting or in flight; absent when the database is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_stock_checks: Option<i64>,
}

/// Liveness plus a database round trip
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pending = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_check_queue")
        .fetch_one(&state.db)
        .await;

    let (status, database, pending_stock_checks) = match pending {
        Ok(count) => (StatusCode::OK, "connected", Some(count)),
        Err(e) => {
            tracing::warn!("Health check database query failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "disconnected", None)
        }
    };

    let label = if status.is_success() { "healthy" } else { "degraded" };
    let body = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        database: database.to_string(),
        pending_stock_checks,
    };

    (status, Json(body))
}
