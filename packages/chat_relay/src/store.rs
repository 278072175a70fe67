//! In-memory conversation store
//!
//! Conversations and messages live behind two independent locks so that
//! listing conversations never waits on message appends. The locks are
//! never held at the same time; operations touching both take them one
//! after the other, always `conversations` first, then `messages`.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ChatError;
use crate::models::{Conversation, Message, MessageRole};

#[derive(Debug, Default)]
pub struct ConversationStore {
    /// Insertion-ordered
    conversations: Mutex<Vec<Conversation>>,
    /// Keyed by conversation id; an entry exists exactly while the
    /// conversation does, so appends racing a delete cannot leave orphans.
    messages: Mutex<HashMap<String, Vec<Message>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list_conversations(&self) -> Vec<Conversation> {
        self.conversations.lock().await.clone()
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation, ChatError> {
        self.conversations
            .lock()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ChatError::not_found(id))
    }

    /// Start a new conversation keyed by the caller's session key.
    pub async fn create_conversation(&self, external_key: &str) -> Result<Conversation, ChatError> {
        if external_key.trim().is_empty() {
            return Err(ChatError::invalid_input("session key must not be blank"));
        }

        let conversation = Conversation::new(external_key.to_string());
        self.conversations.lock().await.push(conversation.clone());
        self.messages
            .lock()
            .await
            .insert(conversation.id.clone(), Vec::new());

        debug!(id = %conversation.id, key = external_key, "Created conversation");
        Ok(conversation)
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<Conversation, ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::invalid_input("title must not be blank"));
        }

        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ChatError::not_found(id))?;
        conversation.title = title.to_string();
        Ok(conversation.clone())
    }

    /// Remove a conversation and all of its messages.
    ///
    /// Idempotent: returns whether anything was removed.
    pub async fn delete_conversation(&self, id: &str) -> bool {
        let removed_conversation = {
            let mut conversations = self.conversations.lock().await;
            let before = conversations.len();
            conversations.retain(|c| c.id != id);
            conversations.len() != before
        };
        let removed_messages = self.messages.lock().await.remove(id).is_some();

        removed_conversation || removed_messages
    }

    /// Append a message to an existing conversation.
    ///
    /// Content is stored as given; blank-content checks belong to the caller.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, ChatError> {
        let message = Message::new(conversation_id.to_string(), role, content.to_string());

        {
            let mut conversations = self.conversations.lock().await;
            let conversation = conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .ok_or_else(|| ChatError::not_found(conversation_id))?;
            conversation.touch(message.timestamp);
        }

        let mut messages = self.messages.lock().await;
        let thread = messages
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::not_found(conversation_id))?;
        thread.push(message.clone());

        Ok(message)
    }

    /// Messages ordered by timestamp (ties keep insertion order), skipping
    /// `offset` then taking up to `limit`.
    pub async fn get_messages(&self, conversation_id: &str, limit: usize, offset: usize) -> Vec<Message> {
        let mut thread = match self.messages.lock().await.get(conversation_id) {
            Some(thread) => thread.clone(),
            None => return Vec::new(),
        };

        thread.sort_by_key(|m| m.timestamp);
        thread.into_iter().skip(offset).take(limit).collect()
    }

    #[cfg(test)]
    pub(crate) async fn message_count(&self, conversation_id: &str) -> usize {
        self.messages
            .lock()
            .await
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}
