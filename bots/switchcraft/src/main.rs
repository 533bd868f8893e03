//! SwitchCraft chatbox
//!
//! Connects to the SwitchCraft chat service and serves `calc`, `track` and
//! `trackhealth`, with the dynmap tracker and kauth refunds running while
//! the connection is idle.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package switchcraft-chatbox -- --config chatbox.toml
//! cargo run --package switchcraft-chatbox -- --check
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chatbox::prelude::*;
use chatbox::runtime::RuntimeBuilder;
use chatbox_switchcraft::SwitchcraftPlugin;
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "SwitchCraft chatbox client")]
struct Cli {
    /// Configuration file. Without it, `chatbox.toml` or `config.toml` is
    /// searched for in the current directory.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long, value_name = "NAME")]
    profile: Option<String>,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn runtime_builder(&self) -> RuntimeBuilder {
        let mut builder = ChatboxRuntime::builder();
        builder = match &self.config {
            Some(path) => builder.config_file(path),
            None => builder.search_path("."),
        };
        if let Some(profile) = &self.profile {
            builder = builder.profile(profile);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut runtime = cli
        .runtime_builder()
        .build()
        .context("failed to load configuration")?;
    runtime
        .register_plugin::<SwitchcraftPlugin>()
        .context("failed to set up the switchcraft plugin")?;

    if cli.check {
        let connection = &runtime.config().connection;
        connection
            .resolve_token(runtime.base_dir())
            .context("no chat token available")?;
        println!("configuration ok");
        println!("endpoint: {}<token>", connection.endpoint);
        println!("base dir: {}", runtime.base_dir().display());
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting SwitchCraft chatbox");
    runtime.run().await?;
    Ok(())
}
