//! Claude Code CLI invocation
//!
//! One process per turn: `claude -p --output-format json` with either
//! `--session-id <id>` (first turn) or `--resume <id>` (later turns).

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::config::BridgeConfig;
use crate::error::ChatError;

/// Environment variable the CLI sets for nested sessions; the child must
/// not inherit it or it refuses to start.
const NESTED_SESSION_ENV: &str = "CLAUDECODE";

/// Cap on process output quoted back in error messages.
const MAX_ERROR_OUTPUT_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// No CLI session yet; create one with this id
    New,
    /// Continue the CLI session with this id
    Resume,
}

impl SessionMode {
    pub fn flag(&self) -> &'static str {
        match self {
            SessionMode::New => "--session-id",
            SessionMode::Resume => "--resume",
        }
    }
}

/// Argument vector (without the program) for one turn.
pub fn build_args(session_id: &str, mode: SessionMode, model: &str, text: &str) -> Vec<String> {
    vec![
        "-p".to_string(),
        "--output-format".to_string(),
        "json".to_string(),
        mode.flag().to_string(),
        session_id.to_string(),
        "--model".to_string(),
        model.to_string(),
        text.to_string(),
    ]
}

/// Captured result of a finished CLI process.
#[derive(Debug)]
pub struct CliOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    /// stdout followed by stderr, trimmed and capped for logging.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.trim().to_string();
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr);
        }
        if combined.chars().count() > MAX_ERROR_OUTPUT_CHARS {
            combined = combined.chars().take(MAX_ERROR_OUTPUT_CHARS).collect();
            combined.push_str("…");
        }
        combined
    }
}

fn working_dir(config: &BridgeConfig) -> Option<PathBuf> {
    config.working_dir.clone().or_else(dirs::home_dir)
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Spawn the CLI and collect its output, killing it if it outlives
/// `config.timeout`.
///
/// Both pipes are drained concurrently before waiting on the exit status
/// so a chatty process cannot block on a full pipe buffer.
pub async fn run_cli(config: &BridgeConfig, args: &[String]) -> Result<CliOutput, ChatError> {
    let mut cmd = Command::new(&config.cli_path);
    cmd.args(args)
        .env_remove(NESTED_SESSION_ENV)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir(config) {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to launch {}: {}", config.cli_path, e);
        ChatError::process_failure(format!("failed to launch {}: {}", config.cli_path, e))
    })?;
    debug!(pid = ?child.id(), "Spawned {}", config.cli_path);

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let collect = async {
        let (stdout, stderr) = tokio::join!(read_pipe(stdout), read_pipe(stderr));
        let status = child.wait().await;
        (stdout, stderr, status)
    };

    let collected = tokio::time::timeout(config.timeout, collect).await;
    let (stdout, stderr, status) = match collected {
        Ok(collected) => collected,
        Err(_) => {
            warn!(
                "{} did not finish within {}s, killing it",
                config.cli_path,
                config.timeout.as_secs()
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed out process: {}", e);
            }
            return Err(ChatError::Timeout(config.timeout));
        }
    };

    let read_err = |e: std::io::Error| ChatError::process_failure(format!("failed to read output: {}", e));
    let output = CliOutput {
        status: status.map_err(|e| ChatError::process_failure(format!("failed to wait: {}", e)))?,
        stdout: stdout.map_err(read_err)?,
        stderr: stderr.map_err(read_err)?,
    };
    Ok(output)
}

#[derive(Debug, Deserialize)]
struct CliReply {
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
}

/// Extract the assistant's reply from the CLI's JSON output.
pub fn parse_reply(stdout: &str) -> Result<String, ChatError> {
    let trimmed = stdout.trim();
    let reply: CliReply = serde_json::from_str(trimmed)
        .or_else(|first_err| {
            // Stray log lines ahead of the JSON document
            trimmed
                .lines()
                .rev()
                .find(|line| line.trim_start().starts_with('{'))
                .map(serde_json::from_str)
                .unwrap_or(Err(first_err))
        })
        .map_err(|e| ChatError::process_failure(format!("unparseable CLI output: {}", e)))?;

    match reply {
        CliReply {
            is_error: true,
            result,
        } => Err(ChatError::process_failure(format!(
            "CLI reported an error: {}",
            result.unwrap_or_default()
        ))),
        CliReply {
            result: Some(result),
            ..
        } => Ok(result),
        CliReply { result: None, .. } => {
            Err(ChatError::process_failure("CLI output has no result field"))
        }
    }
}
