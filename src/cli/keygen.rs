//! Key generation command implementation

use anyhow::{bail, Result};
use colored::Colorize;

use crate::config::Config;
use crate::error::KeyError;
use crate::generator::{CredentialGenerator, GenerationOutcome, GenerationRequest, KeyMaterial};
use crate::naming;
use crate::registry;

use super::CommandStatus;

/// Which keys the top-level flags asked for
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub ssh: bool,
    pub gpg_email: Option<String>,
    pub gpg_expiry_days: Option<i64>,
    /// Overrides the local host name in titles
    pub hostname: Option<String>,
}

impl GenerateOptions {
    pub fn is_empty(&self) -> bool {
        !self.ssh && self.gpg_email.is_none()
    }

    /// Build and validate every request before any key is created
    fn requests(&self, config: &Config) -> Result<Vec<GenerationRequest>> {
        let mut requests = Vec::new();
        if self.ssh {
            requests.push(GenerationRequest::ssh());
        }
        if let Some(email) = &self.gpg_email {
            let days = self.gpg_expiry_days.or(Some(config.gpg.default_expiry_days));
            requests.push(GenerationRequest::gpg(email.clone(), days));
        }

        if let Some(host) = &self.hostname {
            let host = naming::sanitize_host(host);
            requests = requests
                .into_iter()
                .map(|r| r.with_hostname(host.clone()))
                .collect();
        }

        for request in &requests {
            request.validate()?;
        }
        Ok(requests)
    }
}

pub fn run(options: &GenerateOptions, config: &Config) -> Result<CommandStatus> {
    let requests = options.requests(config)?;

    let registry = registry::open(&config.registry)?;
    let generator = CredentialGenerator::new(registry.as_ref(), config);

    let mut unregistered = 0;
    for request in &requests {
        println!("{}", format!("Generating {} key...", request.kind()).cyan());
        let outcome = generator.generate(request)?;
        print_material(&outcome.material);
        report_registration(&outcome);
        if !outcome.is_registered() {
            unregistered += 1;
        }
        println!();
    }

    if unregistered > 0 {
        bail!("{} key(s) were generated but not registered on GitHub", unregistered);
    }
    Ok(CommandStatus::Success)
}

fn print_material(material: &KeyMaterial) {
    println!("{}", "✓ Key generated successfully!".green().bold());
    println!("  {}: {}", "Title".bold(), material.title());
    match material {
        KeyMaterial::Ssh(ssh) => {
            println!("  {}: {}", "Fingerprint".bold(), ssh.fingerprint);
            println!("  {}: {}", "Public key".bold(), ssh.public_key_path.display());
            if let Some(private) = &ssh.private_key_path {
                println!("  {}: {}", "Private key".bold(), private.display());
            }
        }
        KeyMaterial::Gpg(gpg) => {
            if let Some(fingerprint) = &gpg.fingerprint {
                println!("  {}: {}", "Fingerprint".bold(), fingerprint);
            }
            if let Some(email) = &gpg.email {
                println!("  {}: {}", "Email".bold(), email);
            }
            if let Some(expires) = gpg.expires_at {
                println!("  {}: {}", "Expires".bold(), expires.format("%Y-%m-%d"));
            }
        }
    }
}

fn report_registration(outcome: &GenerationOutcome) {
    match &outcome.registration {
        Ok(Some(id)) => {
            println!("{} Registered on GitHub ({})", "✓".green(), id);
        }
        Ok(None) => {
            println!("{} Registered on GitHub", "✓".green());
        }
        Err(error) => {
            eprintln!("{} {}", "✗".red(), error);
            if matches!(error, KeyError::Conflict { .. }) {
                eprintln!("  Run the generation again on another day, or delete the old key first.");
            }
            if let Some(hint) = retry_hint(&outcome.material) {
                eprintln!("  The key was kept locally. To retry the upload:");
                eprintln!("    {}", hint.bold());
            }
        }
    }
}

fn retry_hint(material: &KeyMaterial) -> Option<String> {
    match material {
        KeyMaterial::Ssh(ssh) => Some(format!(
            "machine-keys keys register --kind ssh {}",
            ssh.public_key_path.display()
        )),
        KeyMaterial::Gpg(gpg) => gpg.fingerprint.as_ref().map(|fpr| {
            format!(
                "gpg --armor --export {} > key.asc && machine-keys keys register --kind gpg key.asc --title {}",
                fpr, gpg.title
            )
        }),
    }
}
