//! Boidlink CLI - operator tool for the simulation bridge.
//!
//! Acts as a minimal console UI runtime wired through the real bridge:
//! `run` streams state updates to stdout, `spawn` sends one command.
//! See the `boidlink` library for the core functionality.

use std::time::Duration;

use anyhow::{Context, Result};
use boidlink::{ui_channels, Bridge, BridgeConfig, Connection, UiCommand};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

/// mimalloc outperforms the system allocator under the async runtime's
/// allocation patterns.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Real-time bridge to the boid simulation server.
#[derive(Parser)]
#[command(name = "boidlink", version, about)]
struct Cli {
    /// Target host (overrides BOIDLINK_HOST).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Target port (overrides BOIDLINK_PORT).
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stream state updates to stdout until Ctrl+C.
    Run,
    /// Send a single Spawn command for the given team.
    Spawn {
        /// Team identifier: parsed as JSON first (`7` is a number),
        /// falling back to a plain string (`Red`).
        #[arg(long)]
        team: String,
    },
    /// Print the resolved configuration as JSON.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::load().with_overrides(cli.host, cli.port);

    match cli.command {
        Commands::Run => run_bridge(&config).await,
        Commands::Spawn { team } => send_spawn(&config, &team).await,
        Commands::Config => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("serializing config")?
            );
            Ok(())
        }
    }
}

/// Open the connection, run the bridge, and print every state update
/// until Ctrl+C or connection loss.
async fn run_bridge(config: &BridgeConfig) -> Result<()> {
    let url = config.url();
    let mut connection = Connection::open(&url)
        .await
        .with_context(|| format!("opening {url}"))?;

    let (mut ui, channels) = ui_channels();
    let bridge = Bridge::new(&mut connection, channels)?;
    let bridge_task = tokio::spawn(bridge.run());

    eprintln!("Connected to {url}. Streaming state updates (Ctrl+C to exit).");

    loop {
        tokio::select! {
            payload = ui.update_rx.recv() => {
                match payload {
                    Some(payload) => println!("{payload}"),
                    // Bridge ended -- fall through to report why.
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Shutting down...");
                return Ok(());
            }
        }
    }

    bridge_task
        .await
        .context("bridge task panicked")?
        .context("bridge stopped")
}

/// Send one Spawn command through the bridge, then wait briefly for the
/// next state update as delivery evidence.
async fn send_spawn(config: &BridgeConfig, team: &str) -> Result<()> {
    let team = serde_json::from_str(team)
        .unwrap_or_else(|_| serde_json::Value::String(team.to_string()));

    let url = config.url();
    let mut connection = Connection::open(&url)
        .await
        .with_context(|| format!("opening {url}"))?;

    let (mut ui, channels) = ui_channels();
    let bridge = Bridge::new(&mut connection, channels)?;
    let _bridge_task = tokio::spawn(bridge.run());

    ui.command_tx
        .send(UiCommand::Spawn { team })
        .await
        .map_err(|_| anyhow::anyhow!("bridge stopped before the command was sent"))?;

    match tokio::time::timeout(Duration::from_secs(2), ui.update_rx.recv()).await {
        Ok(Some(payload)) => println!("{payload}"),
        Ok(None) => log::warn!("Connection ended before a state update arrived"),
        Err(_) => log::info!("Command sent; no state update within 2s"),
    }

    Ok(())
}
