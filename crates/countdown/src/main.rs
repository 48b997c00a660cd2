mod config;
mod discord;
mod version;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use countdown_core::ChatStore;
use tracing::info;

use crate::{
    config::{open_config, write_default_config},
    version::short_version,
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(version = short_version(), "countdown version");

    let config = open_config(&args.config).context("Failed to load configuration")?;
    info!(
        store = ?config.store.path,
        hour = config.schedule.hour,
        minute = config.schedule.minute,
        interval = %humantime::format_duration(config.schedule.interval),
        default_tz_offset = %config.schedule.default_tz_offset,
        "Configuration loaded"
    );

    let store = ChatStore::load(&config.store.path);
    info!(chats = store.len(), "Chat store loaded");

    discord::run(config, store.into_shared()).await
}
