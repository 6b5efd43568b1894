//! Command-line interface for machine-keys

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;
use crate::keys::KeyKind;

mod keygen;
mod keys;

pub use keygen::GenerateOptions;

/// Exit status for a declined confirmation
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Subcommand)]
pub enum Commands {
    /// Manage machine-setup keys on GitHub
    #[command(subcommand)]
    Keys(KeysCommands),
}

/// Key management subcommands
#[derive(Subcommand)]
pub enum KeysCommands {
    /// List all machine-setup-* keys on GitHub
    List,

    /// Delete machine-setup-* keys from GitHub
    Prune {
        /// Only delete keys at least this old (e.g. '30d')
        #[arg(long, value_name = "DURATION")]
        older_than: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Register an existing public key (e.g. after a failed upload)
    Register {
        /// Key kind
        #[arg(long, value_enum)]
        kind: KeyKind,

        /// Path to the public key file (.pub or ASCII-armored)
        file: std::path::PathBuf,

        /// Title on GitHub (required for GPG; SSH defaults to the key comment)
        #[arg(long)]
        title: Option<String>,
    },
}

/// How a command finished when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// The user declined a confirmation; nothing changed
    Cancelled,
}

impl CommandStatus {
    pub fn exit_code(self) -> ExitCode {
        match self {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
        }
    }
}

/// Execute a CLI command
pub fn execute(command: Commands, config: &Config) -> Result<CommandStatus> {
    match command {
        Commands::Keys(KeysCommands::List) => keys::list_keys(config),
        Commands::Keys(KeysCommands::Prune { older_than, yes }) => {
            keys::prune_keys(older_than.as_deref(), yes, config)
        }
        Commands::Keys(KeysCommands::Register { kind, file, title }) => {
            keys::register_key(kind, &file, title.as_deref(), config)
        }
    }
}

/// Generate the keys requested by the top-level flags
pub fn generate(options: &GenerateOptions, config: &Config) -> Result<CommandStatus> {
    keygen::run(options, config)
}
