//! Session Bridge
//!
//! Runs one assistant CLI process per turn and remembers which
//! conversations already have a CLI session, so follow-up turns resume
//! the same context instead of starting fresh.

pub mod claude;
pub mod sanitize;
pub mod session_cache;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::BridgeConfig;
use crate::error::ChatError;

pub use claude::SessionMode;
pub use sanitize::{MAX_MESSAGE_CHARS, sanitize_input};
pub use session_cache::SessionCache;

/// Produces the assistant's reply for one turn of a conversation.
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    async fn converse(&self, conversation_id: &str, text: &str) -> Result<String, ChatError>;

    /// Drop any remembered session state; unknown ids are ignored.
    async fn forget_session(&self, conversation_id: &str);
}

/// [`TurnExecutor`] backed by the Claude Code CLI.
pub struct SessionBridge {
    config: BridgeConfig,
    sessions: Mutex<SessionCache>,
}

impl SessionBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let sessions = SessionCache::new(config.session_cache_capacity, config.session_ttl);
        Self {
            config,
            sessions: Mutex::new(sessions),
        }
    }

    /// Whether the next turn for `conversation_id` starts or resumes a session.
    pub async fn session_mode(&self, conversation_id: &str) -> SessionMode {
        if self.sessions.lock().await.contains(conversation_id) {
            SessionMode::Resume
        } else {
            SessionMode::New
        }
    }

    #[cfg(test)]
    pub(crate) async fn known_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl TurnExecutor for SessionBridge {
    async fn converse(&self, conversation_id: &str, text: &str) -> Result<String, ChatError> {
        let sanitized = sanitize_input(text, self.config.max_message_chars)?;
        let mode = self.session_mode(conversation_id).await;
        debug!(
            conversation_id,
            ?mode,
            chars = sanitized.chars().count(),
            "Sending turn to assistant CLI"
        );

        let args = claude::build_args(conversation_id, mode, &self.config.model, &sanitized);
        let output = claude::run_cli(&self.config, &args).await?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let combined = output.combined();
            error!(conversation_id, "Assistant CLI failed (exit={}): {}", code, combined);
            return Err(ChatError::process_failure(format!(
                "CLI exited with code {}: {}",
                code, combined
            )));
        }

        // A clean exit means the CLI has created (or continued) the session,
        // even if its output turns out to be unusable.
        self.sessions.lock().await.insert(conversation_id);

        let reply = claude::parse_reply(&output.stdout)?;
        info!(conversation_id, ?mode, reply_chars = reply.chars().count(), "Assistant replied");
        Ok(reply)
    }

    async fn forget_session(&self, conversation_id: &str) {
        if self.sessions.lock().await.remove(conversation_id) {
            debug!(conversation_id, "Forgot assistant session");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    // Writing an executable and spawning it while another test thread forks
    // can fail with ETXTBSY; keep script tests strictly sequential.
    static SCRIPT_LOCK: Mutex<()> = Mutex::const_new(());

    fn write_script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-claude");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn bridge_for(cli_path: String, dir: &Path) -> SessionBridge {
        SessionBridge::new(BridgeConfig {
            cli_path,
            model: "sonnet".to_string(),
            working_dir: Some(dir.to_path_buf()),
            timeout: Duration::from_secs(10),
            ..BridgeConfig::default()
        })
    }

    /// Echoes the session flag and the message text back as the reply.
    const ECHO_MODE: &str = r#"printf '{"result":"%s %s"}' "$4" "$8""#;

    #[tokio::test]
    async fn test_first_turn_new_then_resume() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let bridge = bridge_for(write_script(tmp.path(), ECHO_MODE), tmp.path());

        assert_eq!(bridge.session_mode("c1").await, SessionMode::New);
        assert_eq!(
            bridge.converse("c1", "hello").await.unwrap(),
            "--session-id hello"
        );
        assert_eq!(bridge.session_mode("c1").await, SessionMode::Resume);
        assert_eq!(
            bridge.converse("c1", "again").await.unwrap(),
            "--resume again"
        );

        // Other conversations are unaffected
        assert_eq!(bridge.session_mode("c2").await, SessionMode::New);
        assert_eq!(bridge.known_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_forget_session_starts_fresh() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let bridge = bridge_for(write_script(tmp.path(), ECHO_MODE), tmp.path());

        bridge.converse("c1", "hello").await.unwrap();
        bridge.forget_session("c1").await;
        bridge.forget_session("never-seen").await;

        assert_eq!(
            bridge.converse("c1", "hello").await.unwrap(),
            "--session-id hello"
        );
    }

    #[tokio::test]
    async fn test_text_is_sanitized_before_launch() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), r#"printf '{"result":"%s"}' "$8""#);
        let bridge = bridge_for(script, tmp.path());

        let reply = bridge.converse("c1", "hi; there | you").await.unwrap();
        assert_eq!(reply, "hi there  you");
    }

    #[tokio::test]
    async fn test_oversized_text_rejected_without_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let bridge = bridge_for("/nonexistent/claude".to_string(), tmp.path());

        let text = "a".repeat(MAX_MESSAGE_CHARS + 1);
        let err = bridge.converse("c1", &text).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert_eq!(bridge.session_mode("c1").await, SessionMode::New);
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_failure() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let bridge = bridge_for("/nonexistent/claude".to_string(), tmp.path());

        let err = bridge.converse("c1", "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::ProcessFailure(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "echo 'session exploded' >&2\nexit 3");
        let bridge = bridge_for(script, tmp.path());

        let err = bridge.converse("c1", "hello").await.unwrap_err();
        match err {
            ChatError::ProcessFailure(msg) => {
                assert!(msg.contains("code 3"), "{}", msg);
                assert!(msg.contains("session exploded"), "{}", msg);
            }
            other => panic!("expected ProcessFailure, got {:?}", other),
        }
        assert_eq!(bridge.session_mode("c1").await, SessionMode::New);
    }

    #[tokio::test]
    async fn test_unparseable_output() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let bridge = bridge_for(write_script(tmp.path(), "echo 'not json'"), tmp.path());

        let err = bridge.converse("c1", "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::ProcessFailure(_)));
        // The process exited cleanly, so the session exists on the CLI side
        assert_eq!(bridge.session_mode("c1").await, SessionMode::Resume);
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        // ~1MB on stderr plus the JSON reply on stdout
        let script = write_script(
            tmp.path(),
            r#"head -c 1048576 /dev/zero | tr '\0' 'x' >&2
printf '{"result":"done"}'"#,
        );
        let bridge = bridge_for(script, tmp.path());

        assert_eq!(bridge.converse("c1", "hello").await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let _guard = SCRIPT_LOCK.lock().await;
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "exec sleep 30");
        let bridge = SessionBridge::new(BridgeConfig {
            cli_path: script,
            working_dir: Some(tmp.path().to_path_buf()),
            timeout: Duration::from_millis(200),
            ..BridgeConfig::default()
        });

        let started = std::time::Instant::now();
        let err = bridge.converse("c1", "hello").await.unwrap_err();
        assert_eq!(err, ChatError::Timeout(Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(bridge.session_mode("c1").await, SessionMode::New);
    }
}
