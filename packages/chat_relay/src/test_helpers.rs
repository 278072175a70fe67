use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::AppState;
use crate::bridge::TurnExecutor;
use crate::error::ChatError;

enum Script {
    Reply(String),
    Fail(ChatError),
    Queue(StdMutex<VecDeque<Result<String, ChatError>>>),
    Echo(Duration),
}

/// `TurnExecutor` stand-in that answers from a script instead of spawning
/// the assistant CLI, and records what it was asked.
pub struct ScriptedExecutor {
    script: Script,
    calls: StdMutex<Vec<(String, String)>>,
    forgotten: StdMutex<Vec<String>>,
    /// Conversations with an established session, as a real bridge tracks them
    sessions: StdMutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    fn with_script(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: StdMutex::new(Vec::new()),
            forgotten: StdMutex::new(Vec::new()),
            sessions: StdMutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::with_script(Script::Reply(reply.to_string()))
    }

    pub fn failing(err: ChatError) -> Arc<Self> {
        Self::with_script(Script::Fail(err))
    }

    /// Answers in order; an exhausted script fails every later turn.
    pub fn scripted(replies: Vec<Result<String, ChatError>>) -> Arc<Self> {
        Self::with_script(Script::Queue(StdMutex::new(replies.into())))
    }

    /// Replies `echo: <text>` after sleeping for `delay`.
    pub fn echoing_with_delay(delay: Duration) -> Arc<Self> {
        Self::with_script(Script::Echo(delay))
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> HashSet<String> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TurnExecutor for ScriptedExecutor {
    async fn converse(&self, conversation_id: &str, text: &str) -> Result<String, ChatError> {
        self.calls
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match &self.script {
            Script::Reply(reply) => Ok(reply.clone()),
            Script::Fail(err) => Err(err.clone()),
            Script::Queue(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::process_failure("script exhausted"))),
            Script::Echo(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(format!("echo: {}", text))
            }
        };

        if result.is_ok() {
            self.sessions
                .lock()
                .unwrap()
                .insert(conversation_id.to_string());
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn forget_session(&self, conversation_id: &str) {
        self.sessions.lock().unwrap().remove(conversation_id);
        self.forgotten
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
    }
}

/// Build a fully-wired `AppState` whose assistant is a `ScriptedExecutor`.
pub fn test_app_state(executor: Arc<ScriptedExecutor>) -> AppState {
    AppState::new(executor)
}
