//! CLI definition: top-level parser and subcommand enums.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Lockwise: a local password vault with idle auto-lock.
#[derive(Parser)]
#[command(
    name = "lockwise",
    version,
    about = "Lockwise password vault",
    long_about = "Stores synced logins encrypted at rest and locks them again after a \
                  configurable idle period. Each invocation behaves like one app launch."
)]
pub struct Cli {
    /// Directory holding the vault files. Overrides config and environment.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show vault state, auto-lock setting and deadline.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Link an account and hand its sync credentials to the vault.
    Link {
        #[arg(long)]
        kid: String,

        #[arg(long)]
        access_token: String,

        #[arg(long)]
        sync_key: String,

        #[arg(long)]
        token_server_url: String,

        /// The account was just created.
        #[arg(long)]
        new: bool,
    },

    /// Unlock the vault with the stored key.
    Unlock,

    /// Lock the vault.
    Lock,

    /// Wipe local data and forget the key.
    Reset,

    /// List stored logins (passwords are not printed).
    List,

    /// Record a use of a login.
    Touch { id: String },

    /// Store a new login.
    Add {
        #[arg(long)]
        hostname: String,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: String,
    },

    /// Delete a login.
    Delete { id: String },

    /// Show or change the auto-lock duration.
    Autolock {
        /// New setting, e.g. `5m`, `1h`, `never`, `exit`.
        setting: Option<String>,
    },

    /// Refresh the credential identity index.
    Identities {
        /// Empty the index instead.
        #[arg(long)]
        clear: bool,
    },

    /// Interactive session driving lifecycle and activity events.
    Session,
}
