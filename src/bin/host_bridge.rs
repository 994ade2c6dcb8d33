//! Headless editor bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads inbound editor frames as newline-delimited JSON from
//! stdin, drives an `EditorBridge` against the configured REST API, and
//! writes outbound frames and diagnostic events to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.
//!
//! Usage: `editor-bridge-host [CONFIG_PATH]`

use editor_bridge::BridgeConfig;
use editor_bridge::host::http::HttpGateway;
use editor_bridge::host::stdio::run_stdio_bridge;
use std::path::PathBuf;
use std::sync::Arc;

fn load_config() -> anyhow::Result<BridgeConfig> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(BridgeConfig::default_config_path);

    let config = if path.exists() {
        tracing::info!(path = %path.display(), "loading config");
        BridgeConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?
    } else if explicit.is_some() {
        anyhow::bail!("config file {} does not exist", path.display());
    } else {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        BridgeConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("editor-bridge-host starting");

    let config = load_config()?;
    let mut gateway = HttpGateway::new(&config.api.base_url, config.api.request_timeout())?;
    if let Some(token) = &config.api.bearer_token {
        gateway = gateway.with_bearer_token(token.clone());
    }
    let gateway = Arc::new(gateway);

    run_stdio_bridge(&config, gateway.clone(), gateway)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "editor-bridge-host exited with error");
            anyhow::anyhow!("editor-bridge-host failed: {e}")
        })?;

    tracing::info!("editor-bridge-host shut down cleanly");
    Ok(())
}
