//! CLI entry point for Lockwise.
//!
//! Every invocation behaves like one app launch: the vault is restored from
//! disk, the subcommand runs, and the app then shuts down, writing the idle
//! deadline so the next invocation can decide whether to come back unlocked.

mod cli;
mod commands;
mod config;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use lockwise_kernel::LifecycleEvent;
use lockwise_store::{NewCredential, SyncUnlockInfo};
use lockwise_vault::{VaultContext, VaultRuntime};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Watchdog period used by `session` when the config leaves it off.
const SESSION_WATCHDOG_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = config::resolve(cli.data_dir.clone())?;
    if matches!(cli.command, Commands::Session) && config.watchdog_interval().is_none() {
        config = config.with_watchdog_interval_secs(SESSION_WATCHDOG_SECS);
    }
    info!(data_dir = %config.data_dir.display(), profile = %config.profile, "configuration loaded");

    let context = VaultContext::open_default(config)
        .await
        .context("failed to open vault storage")?;
    let runtime = context.start().await.context("failed to start vault")?;

    let result = dispatch(&runtime, cli.command).await;

    runtime.vault.on_lifecycle(LifecycleEvent::Shutdown).await;
    runtime.shutdown();
    result
}

async fn dispatch(runtime: &VaultRuntime, command: Commands) -> Result<()> {
    match command {
        Commands::Status { json } => commands::status(runtime, json),
        Commands::Link {
            kid,
            access_token,
            sync_key,
            token_server_url,
            new,
        } => {
            let sync_info = SyncUnlockInfo {
                kid,
                access_token,
                sync_key,
                token_server_url,
            };
            commands::link(runtime, sync_info, new).await
        }
        Commands::Unlock => commands::unlock(runtime).await,
        Commands::Lock => commands::lock(runtime).await,
        Commands::Reset => commands::reset(runtime).await,
        Commands::List => commands::list(runtime).await,
        Commands::Touch { id } => commands::touch(runtime, id).await,
        Commands::Add {
            hostname,
            username,
            password,
        } => {
            let credential = NewCredential {
                hostname,
                username,
                password,
            };
            commands::add(runtime, credential).await
        }
        Commands::Delete { id } => commands::delete(runtime, id).await,
        Commands::Autolock { setting } => commands::autolock(runtime, setting),
        Commands::Identities { clear } => commands::identities(runtime, clear).await,
        Commands::Session => session::run(runtime).await,
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
