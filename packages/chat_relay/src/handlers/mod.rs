pub mod conversations;
pub mod health;
pub mod messages;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use conversations::{
    create_conversation, delete_conversation, get_conversation, list_conversations,
    rename_conversation,
};
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use messages::{list_messages, submit_message};
pub use websocket::websocket_handler;
