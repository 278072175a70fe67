//! Turn Orchestrator
//!
//! Sequences one chat turn: persist the user message, ask the assistant,
//! persist the reply, then notify subscribers. Each step runs only if the
//! previous one succeeded. Notification failures never undo the turn.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bridge::TurnExecutor;
use crate::error::ChatError;
use crate::metrics::ServerMetrics;
use crate::models::{Conversation, Message, MessageRole, WsEvent, title_from_message};
use crate::registry::SubscriberRegistry;
use crate::store::ConversationStore;

pub struct TurnOrchestrator {
    store: Arc<ConversationStore>,
    executor: Arc<dyn TurnExecutor>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<ServerMetrics>,
    /// Turns on the same conversation queue behind its lock; turns on
    /// different conversations never contend.
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        executor: Arc<dyn TurnExecutor>,
        registry: Arc<SubscriberRegistry>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            store,
            executor,
            registry,
            metrics,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub async fn create_conversation(&self, external_key: &str) -> Result<Conversation, ChatError> {
        let conversation = self.store.create_conversation(external_key).await?;
        info!(id = %conversation.id, "Started conversation");
        Ok(conversation)
    }

    /// Delete a conversation, its messages and its assistant session.
    ///
    /// Waits for an in-flight turn on the conversation to finish first, so
    /// that turn cannot re-establish the session after it is forgotten.
    ///
    /// Idempotent: returns whether the conversation existed.
    pub async fn delete_conversation(&self, conversation_id: &str) -> bool {
        let lock = self.turn_lock(conversation_id).await;
        let _turn = lock.lock().await;

        let removed = self.store.delete_conversation(conversation_id).await;
        self.executor.forget_session(conversation_id).await;
        self.turn_locks.lock().await.remove(conversation_id);
        if removed {
            info!(conversation_id, "Deleted conversation");
        }
        removed
    }

    async fn turn_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.turn_locks
            .lock()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Submit a user message and return the persisted assistant reply.
    pub async fn submit_user_turn(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Message, ChatError> {
        let span = info_span!("turn", conversation_id);
        self.run_turn(conversation_id, text).instrument(span).await
    }

    async fn run_turn(&self, conversation_id: &str, text: &str) -> Result<Message, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::invalid_input("message content must not be blank"));
        }

        let lock = self.turn_lock(conversation_id).await;
        let _turn = lock.lock().await;

        let conversation = match self.store.get_conversation(conversation_id).await {
            Ok(c) => c,
            Err(e) => {
                self.turn_locks.lock().await.remove(conversation_id);
                return Err(e);
            }
        };

        self.metrics.turn_started();
        let result = self.execute_turn(&conversation, text).await;
        match &result {
            Ok(_) => self.metrics.turn_completed(),
            Err(e) => {
                if matches!(e, ChatError::Timeout(_)) {
                    self.metrics.process_timeout();
                }
                self.metrics.turn_failed();
                warn!("Turn failed: {}", e);
            }
        }
        result
    }

    async fn execute_turn(&self, conversation: &Conversation, text: &str) -> Result<Message, ChatError> {
        let id = conversation.id.as_str();

        self.store.append_message(id, MessageRole::User, text).await?;

        if conversation.has_default_title() {
            if let Some(title) = title_from_message(text) {
                if let Err(e) = self.store.rename_conversation(id, &title).await {
                    debug!("Could not retitle conversation: {}", e);
                }
            }
        }

        // The user message stays persisted if this fails; a later turn
        // picks the conversation back up.
        let reply = self.executor.converse(id, text).await?;

        let assistant = self
            .store
            .append_message(id, MessageRole::Assistant, &reply)
            .await?;

        self.publish(id, &WsEvent::message(assistant.content.clone()))
            .await;

        Ok(assistant)
    }

    /// Best-effort fan-out to the conversation's subscribers.
    pub async fn publish(&self, conversation_id: &str, event: &WsEvent) {
        match self.registry.broadcast(conversation_id, event).await {
            Ok(report) => {
                self.metrics
                    .record_broadcast(report.delivered, report.pruned.len());
                debug!(
                    conversation_id,
                    delivered = report.delivered,
                    pruned = report.pruned.len(),
                    "Broadcast event"
                );
            }
            Err(e) => warn!(conversation_id, "Failed to broadcast event: {}", e),
        }
    }
}
