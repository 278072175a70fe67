use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;

use chat_relay::AppState;
use chat_relay::bridge::SessionBridge;
use chat_relay::config::{BridgeConfig, FileConfig, RelayDirs, load_config};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Chat relay server for the Claude CLI")]
struct Cli {
    /// Custom data directory (defaults to ~/.chat-relay)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Host to bind to (overrides server.host)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides server.port, 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "chat_relay=debug,tower_http=debug,info"
    } else {
        "chat_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Chat Relay");

    let dirs = RelayDirs::new(cli.data_dir)?;
    let mut fc: FileConfig = load_config(&dirs.data_dir)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", dirs.config_toml_path().display()))?;
    if let Some(host) = cli.host {
        fc.server.host = host;
    }
    if let Some(port) = cli.port {
        fc.server.port = port;
    }

    let bridge_config = BridgeConfig::from_file(&fc.bridge);
    info!(
        "Assistant CLI: {} (model {}, timeout {}s)",
        bridge_config.cli_path,
        bridge_config.model,
        bridge_config.timeout.as_secs()
    );

    if fc.auth.token_configured() {
        info!("API token configured");
    } else {
        info!("No API token configured (set CHAT_RELAY_AUTH__TOKEN to set one)");
    }

    let state = AppState::new(Arc::new(SessionBridge::new(bridge_config)));
    let app = chat_relay::router(state);

    let addr = fc.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Chat Relay listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/chats                - List conversations");
    info!("  POST   /api/chats                - Create conversation");
    info!("  POST   /api/chats/:id/messages   - Submit a message");
    info!("  GET    /ws/chats/:id             - Live conversation updates");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
