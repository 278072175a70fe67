//! Subscriber Registry
//!
//! Tracks the live WebSocket connections watching each conversation and
//! fans events out to them. A connection whose send fails is dropped for
//! good; it is never retried.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Why a single delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("send buffer full")]
    Full,
}

/// A live connection that can receive serialized events.
///
/// `send` must not block: broadcasts run inline with turn handling.
pub trait ConnectionHandle: Send + Sync {
    fn id(&self) -> Uuid;
    fn send(&self, text: &str) -> Result<(), SendError>;
}

pub type SharedHandle = Arc<dyn ConnectionHandle>;

/// Handle for one WebSocket: queues frames for the socket's writer task.
#[derive(Debug, Clone)]
pub struct WsConnection {
    id: Uuid,
    tx: mpsc::Sender<String>,
}

impl WsConnection {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }
}

impl ConnectionHandle for WsConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn send(&self, text: &str) -> Result<(), SendError> {
        self.tx.try_send(text.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Handles that failed and were unsubscribed
    pub pruned: Vec<Uuid>,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    channels: RwLock<HashMap<String, HashMap<Uuid, SharedHandle>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, channel_id: &str, handle: SharedHandle) {
        let handle_id = handle.id();
        self.channels
            .write()
            .await
            .entry(channel_id.to_string())
            .or_default()
            .insert(handle_id, handle);
        debug!(channel_id, %handle_id, "Subscribed");
    }

    /// Remove a handle; the channel entry goes away with its last subscriber.
    pub async fn unsubscribe(&self, channel_id: &str, handle_id: Uuid) -> bool {
        let mut channels = self.channels.write().await;
        Self::remove_locked(&mut channels, channel_id, &[handle_id]) > 0
    }

    fn remove_locked(
        channels: &mut HashMap<String, HashMap<Uuid, SharedHandle>>,
        channel_id: &str,
        handle_ids: &[Uuid],
    ) -> usize {
        let Some(subscribers) = channels.get_mut(channel_id) else {
            return 0;
        };
        let removed = handle_ids
            .iter()
            .filter(|id| subscribers.remove(*id).is_some())
            .count();
        if subscribers.is_empty() {
            channels.remove(channel_id);
        }
        removed
    }

    /// Serialize `event` once and deliver it to every current subscriber.
    ///
    /// Failed handles are collected during delivery and unsubscribed
    /// afterwards. An empty channel is a no-op.
    pub async fn broadcast<T: Serialize>(
        &self,
        channel_id: &str,
        event: &T,
    ) -> Result<BroadcastReport, serde_json::Error> {
        let targets = self.snapshot(channel_id).await;
        if targets.is_empty() {
            return Ok(BroadcastReport::default());
        }

        let payload = serde_json::to_string(event)?;

        let mut report = BroadcastReport::default();
        for handle in &targets {
            match handle.send(&payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(channel_id, handle_id = %handle.id(), "Dropping subscriber: {}", e);
                    report.pruned.push(handle.id());
                }
            }
        }

        if !report.pruned.is_empty() {
            let mut channels = self.channels.write().await;
            Self::remove_locked(&mut channels, channel_id, &report.pruned);
        }

        Ok(report)
    }

    pub async fn connection_count(&self, channel_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map_or(0, HashMap::len)
    }

    /// Copy of the channel's current subscribers.
    pub async fn snapshot(&self, channel_id: &str) -> Vec<SharedHandle> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn total_connections(&self) -> usize {
        self.channels.read().await.values().map(HashMap::len).sum()
    }

    pub async fn clear_all(&self) {
        self.channels.write().await.clear();
    }
}
