//! machine-keys: lifecycle management for machine-setup SSH and GPG keys
//!
//! Keys are titled `machine-setup-{host}-{YYYYMMDD}` when generated, which
//! lets later runs find them on GitHub and prune them by age.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser};
use colored::Colorize;

mod cli;
mod config;
mod error;
mod generator;
mod gpg;
mod inventory;
mod keys;
mod naming;
mod prune;
mod registry;

use cli::{CommandStatus, Commands, GenerateOptions};
use config::Config;

#[derive(Parser)]
#[command(name = "machine-keys", version, about = "Manage machine-setup SSH/GPG keys on GitHub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Generate an SSH key and register it on GitHub
    #[arg(long)]
    generate_ssh_key: bool,

    /// Generate a GPG key for EMAIL and register it on GitHub
    #[arg(long, value_name = "EMAIL")]
    generate_gpg_key: Option<String>,

    /// Days until the generated GPG key expires
    #[arg(
        long,
        value_name = "N",
        requires = "generate_gpg_key",
        allow_negative_numbers = true
    )]
    gpg_expiry_days: Option<i64>,

    /// Host name used in generated key titles
    #[arg(long, global = true)]
    hostname: Option<String>,

    /// Path to configuration file
    #[arg(long, global = true, env = "MACHINE_KEYS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "machine_keys=info,warn",
        _ => "machine_keys=debug,info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<CommandStatus> {
    let config = Config::load(cli.config.as_deref())?;

    let generate = GenerateOptions {
        ssh: cli.generate_ssh_key,
        gpg_email: cli.generate_gpg_key,
        gpg_expiry_days: cli.gpg_expiry_days,
        hostname: cli.hostname,
    };

    match cli.command {
        Some(command) => {
            if !generate.is_empty() {
                cli::generate(&generate, &config)?;
            }
            cli::execute(command, &config)
        }
        None if !generate.is_empty() => cli::generate(&generate, &config),
        None => {
            Cli::command().print_help()?;
            Ok(CommandStatus::Success)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
