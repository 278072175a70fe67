//! Chat Relay
//!
//! HTTP and WebSocket front end that relays chat turns to the assistant CLI,
//! keeps the conversation history in memory and pushes each reply to every
//! live viewer of the conversation.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod store;
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::bridge::TurnExecutor;
use crate::metrics::ServerMetrics;
use crate::orchestrator::TurnOrchestrator;
use crate::registry::SubscriberRegistry;
use crate::store::ConversationStore;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub store: Arc<ConversationStore>,
    /// Live WebSocket viewers keyed by conversation id
    pub registry: Arc<SubscriberRegistry>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    /// Wire an empty store and registry around `executor`.
    pub fn new(executor: Arc<dyn TurnExecutor>) -> Self {
        let store = Arc::new(ConversationStore::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let orchestrator = Arc::new(TurnOrchestrator::new(
            store.clone(),
            executor,
            registry.clone(),
            metrics.clone(),
        ));
        Self {
            orchestrator,
            store,
            registry,
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // Conversations
        .route(
            "/api/chats",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route(
            "/api/chats/{id}",
            get(handlers::get_conversation)
                .patch(handlers::rename_conversation)
                .delete(handlers::delete_conversation),
        )
        // Messages
        .route(
            "/api/chats/{id}/messages",
            post(handlers::submit_message).get(handlers::list_messages),
        )
        // Live updates
        .route("/ws/chats/{id}", get(handlers::websocket_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
