use std::sync::Arc;

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::metrics::ServerMetrics;
use crate::models::WsEvent;
use crate::orchestrator::TurnOrchestrator;
use crate::registry::{ConnectionHandle, SubscriberRegistry, WsConnection};

/// Frames queued per connection before broadcasts start treating it as dead
const OUTBOUND_BUFFER: usize = 100;

/// Live updates for one conversation.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.store.get_conversation(&id).await.is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }

    ws.on_upgrade(move |socket| {
        handle_chat_socket(
            socket,
            id,
            state.orchestrator,
            state.registry,
            state.metrics,
        )
    })
}

async fn handle_chat_socket(
    socket: WebSocket,
    conversation_id: String,
    orchestrator: Arc<TurnOrchestrator>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<ServerMetrics>,
) {
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let connection = Arc::new(WsConnection::new(tx));
    let connection_id = connection.id();
    registry.subscribe(&conversation_id, connection).await;
    info!(conn_id = %connection_id, conversation_id, "WebSocket subscribed");

    let sender_task = async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.message_received();
                    orchestrator
                        .publish(&conversation_id, &WsEvent::message(text.as_str()))
                        .await;
                }
                Ok(Message::Close(_)) => {
                    debug!("Client closed connection");
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!("Sender task ended"),
        _ = input_task => debug!("Input task ended"),
    }

    registry.unsubscribe(&conversation_id, connection_id).await;
    metrics.connection_closed();
    info!(conn_id = %connection_id, conversation_id, "WebSocket disconnected");
}
