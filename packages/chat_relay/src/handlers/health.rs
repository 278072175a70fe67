use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let conversations = state.store.list_conversations().await.len() as u64;
    let metrics = state.metrics.snapshot();

    Json(metrics::HealthStatus {
        status: "UP".to_string(),
        conversations,
        connections: metrics.connections.active,
        channels: state.registry.channel_count().await as u64,
        subscribers: state.registry.total_connections().await as u64,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
