//! Telemetry node
//!
//! Command-line entry point: key provisioning, an in-process demo of the
//! full link, and (with the `ble` feature) a companion for a real device.

mod demo;

#[cfg(feature = "ble")]
mod ble;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crypto_session::KeyPair;
use link_transport::{public_key_hex, KeyMaterial};
use tracing::info;

#[derive(Parser)]
#[command(name = "telemetry-node", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a long-term X25519 key pair
    Keygen,

    /// Run peripheral and companion over the in-memory link
    Demo {
        /// JSON file with `peripheral` and `companion` sections
        #[arg(long)]
        config: Option<PathBuf>,

        /// Readings to publish before disconnecting
        #[arg(long, default_value_t = 5)]
        ticks: u32,
    },

    /// Receive telemetry from a nearby device
    #[cfg(feature = "ble")]
    Companion {
        /// JSON companion configuration
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_node=info,link_transport=info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Keygen => keygen(),
        Command::Demo { config, ticks } => {
            let config = match config {
                Some(path) => Some(read_config(&path)?),
                None => None,
            };
            tokio::task::spawn_blocking(move || demo::run(config, ticks)).await?
        }
        #[cfg(feature = "ble")]
        Command::Companion { config } => {
            let config = link_transport::CompanionConfig::from_json(&read_config(&config)?)?;
            ble::run(config).await
        }
    }
}

fn keygen() -> anyhow::Result<()> {
    let pair = KeyPair::generate().context("random source unavailable")?;
    info!("Generated key pair");
    let secret = KeyMaterial::from_bytes(*pair.secret_bytes());
    println!("secret: {}", hex::encode(secret.as_bytes()));
    println!("public: {}", public_key_hex(&secret));
    Ok(())
}

fn read_config(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
