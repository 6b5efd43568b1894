//! Key management CLI commands

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::config::Config;
use crate::error::KeyError;
use crate::generator::{CredentialGenerator, KeyMaterial};
use crate::inventory::KeyInventory;
use crate::keys::{KeyKind, KeyRecord};
use crate::prune::{self, Confirm, PruneEngine, PruneOutcome, PrunePlan, PruneReport};
use crate::registry;

use super::CommandStatus;

/// List all managed keys on the remote account
pub fn list_keys(config: &Config) -> Result<CommandStatus> {
    let registry = registry::open(&config.registry)?;
    let keys = KeyInventory::new(registry.as_ref())
        .load_managed()
        .context("Failed to list keys")?;

    if keys.is_empty() {
        println!("No machine-setup keys found on GitHub.");
        return Ok(CommandStatus::Success);
    }

    let now = Utc::now();
    println!("{}", "Machine-setup keys on GitHub:".bold());
    println!();
    for key in &keys {
        print_key_line(key, key.age_days(now));
        if let Some(fingerprint) = &key.fingerprint {
            println!("        key id: {}", fingerprint.dimmed());
        }
        if let Some(expires) = key.expires_at {
            let label = format!("expires: {}", expires.format("%Y-%m-%d"));
            if expires <= now {
                println!("        {}", label.red());
            } else {
                println!("        {}", label.dimmed());
            }
        }
    }
    println!();
    println!("{} key(s)", keys.len());

    Ok(CommandStatus::Success)
}

/// Interactively delete managed keys
pub fn prune_keys(older_than: Option<&str>, yes: bool, config: &Config) -> Result<CommandStatus> {
    // Bad input must fail before anything touches the network
    let threshold = older_than.map(prune::parse_duration).transpose()?;

    let registry = registry::open(&config.registry)?;
    let engine = PruneEngine::new(registry.as_ref());
    let mut prompt = PlanPrompt { assume_yes: yes };

    let outcome = engine
        .run(threshold, &mut prompt, Utc::now())
        .context("Prune failed")?;

    match outcome {
        PruneOutcome::NothingToPrune => {
            match threshold {
                Some(days) => println!("No machine-setup keys older than {} days found.", days),
                None => println!("No machine-setup keys found to prune."),
            }
            Ok(CommandStatus::Success)
        }
        PruneOutcome::Cancelled(_) => {
            println!("{}", "Aborted.".yellow());
            Ok(CommandStatus::Cancelled)
        }
        PruneOutcome::Completed(report) => {
            print_report(&report);
            Ok(CommandStatus::Success)
        }
    }
}

/// Upload a public key that was generated earlier
pub fn register_key(
    kind: KeyKind,
    file: &Path,
    title: Option<&str>,
    config: &Config,
) -> Result<CommandStatus> {
    let material = match kind {
        KeyKind::Ssh => KeyMaterial::load_ssh(file, title)?,
        KeyKind::Gpg => {
            let title = title.ok_or_else(|| {
                KeyError::Validation("--title is required when registering a GPG key".to_string())
            })?;
            KeyMaterial::load_gpg(file, title)?
        }
    };

    let registry = registry::open(&config.registry)?;
    let generator = CredentialGenerator::new(registry.as_ref(), config);
    let id = generator.register(&material)?;

    let suffix = id.map(|id| format!(" ({})", id)).unwrap_or_default();
    println!(
        "{} Registered {} key {}{}",
        "✓".green(),
        kind,
        material.title().bold(),
        suffix
    );
    Ok(CommandStatus::Success)
}

/// Shows the plan, then asks unless `--yes` was given
struct PlanPrompt {
    assume_yes: bool,
}

impl Confirm for PlanPrompt {
    fn confirm(&mut self, plan: &PrunePlan) -> crate::error::Result<bool> {
        let heading = match plan.threshold_days {
            Some(days) => format!("Keys older than {} days to be deleted:", days),
            None => "Keys to be deleted:".to_string(),
        };
        println!("{}", heading.bold());
        for candidate in &plan.candidates {
            print_key_line(&candidate.record, candidate.age_days);
        }
        println!();

        if self.assume_yes {
            return Ok(true);
        }
        if !std::io::stdin().is_terminal() {
            return Err(KeyError::Validation(
                "No terminal to confirm on; pass --yes to delete without confirmation".to_string(),
            ));
        }

        dialoguer::Confirm::new()
            .with_prompt(format!("Delete {} key(s)?", plan.len()))
            .default(false)
            .interact()
            .map_err(|e| KeyError::Prompt(e.to_string()))
    }
}

fn print_key_line(key: &KeyRecord, age_days: Option<i64>) {
    let kind = match key.kind() {
        KeyKind::Ssh => format!("[{}]", key.kind()).cyan(),
        KeyKind::Gpg => format!("[{}]", key.kind()).magenta(),
    };
    println!(
        "  {} {} (created: {}, age: {})",
        kind,
        key.title.bold(),
        format_created(key.created_at),
        format_age(age_days)
    );
}

fn format_created(created_at: Option<DateTime<Utc>>) -> String {
    created_at
        .map(|c| c.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_age(age_days: Option<i64>) -> String {
    match age_days {
        Some(1) => "1 day".to_string(),
        Some(days) => format!("{} days", days),
        None => "unknown".to_string(),
    }
}

fn print_report(report: &PruneReport) {
    for key in &report.deleted {
        println!("{} Deleted {} key: {}", "✓".green(), key.kind(), key.title);
    }
    for key in &report.already_gone {
        println!(
            "{} {} key already removed: {}",
            "-".dimmed(),
            key.kind(),
            key.title
        );
    }
    for (key, error) in &report.failed {
        eprintln!(
            "{} Failed to delete {} key {}: {}",
            "✗".red(),
            key.kind(),
            key.title,
            error
        );
    }

    println!();
    let summary = format!(
        "Deleted {}/{} key(s) ({} already gone, {} failed).",
        report.deleted.len(),
        report.total(),
        report.already_gone.len(),
        report.failed.len()
    );
    if report.all_success() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.yellow().bold());
        println!("Run the prune again to retry the failed deletions.");
    }
}
