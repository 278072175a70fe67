use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::bridge::MAX_MESSAGE_CHARS;
use crate::bridge::session_cache::{DEFAULT_CAPACITY, DEFAULT_TTL};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Equivalent ways to configure:
//
//   config.toml:     [bridge]
//                    model = "opus"
//
//   env var:         CHAT_RELAY_BRIDGE__MODEL=opus   (double underscore = nesting)
//
//   (single underscore stays within field names: CHAT_RELAY_BRIDGE__TIMEOUT_SECS)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub bridge: BridgeFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerFileConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Assistant CLI tunables (lives under `[bridge]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeFileConfig {
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Directory the CLI runs in (defaults to the home directory)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_session_cache_capacity")]
    pub session_cache_capacity: usize,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for BridgeFileConfig {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            model: default_model(),
            working_dir: None,
            timeout_secs: default_timeout_secs(),
            max_message_chars: default_max_message_chars(),
            session_cache_capacity: default_session_cache_capacity(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// Shared-secret settings (lives under `[auth]` in config.toml).
///
/// The token is enforced by whatever sits in front of this server; the
/// relay itself only reports whether one is configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthFileConfig {
    #[serde(default)]
    pub token: Option<String>,
}

impl AuthFileConfig {
    pub fn token_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_cli_path() -> String {
    "claude".to_string()
}
fn default_model() -> String {
    "sonnet".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_message_chars() -> usize {
    MAX_MESSAGE_CHARS
}
fn default_session_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_session_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

/// Build a figment that layers: defaults → config.toml → CHAT_RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHAT_RELAY_SERVER__PORT=8080`  →  `server.port = 8080`
///   `CHAT_RELAY_BRIDGE__CLI_PATH=/opt/claude`  →  `bridge.cli_path = "/opt/claude"`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("CHAT_RELAY_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Session bridge configuration (runtime view).
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Executable launched for every turn
    pub cli_path: String,
    /// Model selector passed through `--model`
    pub model: String,
    pub working_dir: Option<PathBuf>,
    /// Hard bound on a single CLI run
    pub timeout: Duration,
    pub max_message_chars: usize,
    pub session_cache_capacity: usize,
    pub session_ttl: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_file(&BridgeFileConfig::default())
    }
}

impl BridgeConfig {
    pub fn from_file(fc: &BridgeFileConfig) -> Self {
        Self {
            cli_path: fc.cli_path.clone(),
            model: fc.model.clone(),
            working_dir: fc.working_dir.clone(),
            timeout: Duration::from_secs(fc.timeout_secs),
            max_message_chars: fc.max_message_chars,
            session_cache_capacity: fc.session_cache_capacity,
            session_ttl: Duration::from_secs(fc.session_ttl_secs),
        }
    }
}

// =============================================================================
// Directory layout config (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayDirs {
    pub data_dir: PathBuf,
}

impl RelayDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".chat-relay"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
