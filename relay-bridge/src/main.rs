//! Relay bridge entry point.
//!
//! ```text
//! relay-bridge                      Run in the foreground
//! relay-bridge --config <path>      Load a custom config TOML
//! relay-bridge --endpoint <addr>    Override the frame socket
//! relay-bridge --cpu                Use the software renderer
//! relay-bridge --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_bridge::bridge::RelayBridge;
use relay_bridge::config::BridgeConfig;
use relay_core::RenderBackend;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "relay-bridge", about = "Relay raw video frames from a local socket into a render target")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "relay-bridge.toml")]
    config: PathBuf,

    /// Frame socket, `host:port` or `unix:/path`. Overrides the config file.
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Render on the CPU instead of the GPU.
    #[arg(long)]
    cpu: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config and apply CLI overrides.
    let mut config = BridgeConfig::load(&cli.config);
    if let Some(endpoint) = cli.endpoint {
        config.transport.endpoint = endpoint;
    }
    if cli.cpu {
        config.render.backend = RenderBackend::Cpu;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("relay-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("frame endpoint: {}", config.transport.endpoint);
    info!("render backend: {}", config.render.backend);

    let bridge = RelayBridge::new(config);
    bridge
        .run(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
        })
        .await?;

    Ok(())
}
