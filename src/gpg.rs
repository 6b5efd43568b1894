//! Local GnuPG key generation
//!
//! Drives the `gpg` program in batch mode. Keys are created without a
//! passphrase so provisioning can run unattended.

use std::path::PathBuf;
use std::process::{Command, Output};

use crate::config::GpgConfig;
use crate::error::{KeyError, Result};

/// Handle on the local gpg executable
#[derive(Debug, Clone)]
pub struct GpgTool {
    program: PathBuf,
    homedir: Option<PathBuf>,
}

impl GpgTool {
    pub fn new(config: &GpgConfig) -> Self {
        Self {
            program: config.program.clone(),
            homedir: config.homedir.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(home) = &self.homedir {
            cmd.arg("--homedir").arg(home);
        }
        cmd.args(["--batch", "--no-tty"]);
        cmd
    }

    fn run(&self, args: &[&str], what: &str) -> Result<Output> {
        tracing::debug!("Running: {} {}", self.program.display(), args.join(" "));
        let output = self
            .command()
            .args(args)
            .output()
            .map_err(|e| KeyError::Generation(format!("could not run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(KeyError::Generation(format!(
                "{} failed: {}",
                what,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Create an Ed25519 signing key with a Curve25519 encryption subkey
    ///
    /// Returns the primary key fingerprint.
    pub fn generate(&self, user_id: &str, expiry_days: i64) -> Result<String> {
        let expire = format!("{}d", expiry_days);
        let output = self.run(
            &[
                "--pinentry-mode",
                "loopback",
                "--passphrase",
                "",
                "--status-fd",
                "1",
                "--quick-generate-key",
                user_id,
                "ed25519",
                "cert,sign",
                &expire,
            ],
            "gpg --quick-generate-key",
        )?;

        let fingerprint = parse_key_created(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| KeyError::Generation("gpg did not report the new key".to_string()))?;
        tracing::debug!("Created GPG primary key {}", fingerprint);

        self.run(
            &[
                "--pinentry-mode",
                "loopback",
                "--passphrase",
                "",
                "--quick-add-key",
                &fingerprint,
                "cv25519",
                "encr",
                &expire,
            ],
            "gpg --quick-add-key",
        )
        .map_err(|e| left_in_keyring(&fingerprint, e))?;

        Ok(fingerprint)
    }

    /// ASCII-armored public key block
    pub fn export_armored(&self, fingerprint: &str) -> Result<String> {
        let output = self.run(&["--armor", "--export", fingerprint], "gpg --export")?;
        let armored = String::from_utf8_lossy(&output.stdout).to_string();
        if !armored.contains("BEGIN PGP PUBLIC KEY BLOCK") {
            return Err(KeyError::Generation(format!(
                "gpg exported no public key for {}",
                fingerprint
            )));
        }
        Ok(armored)
    }
}

/// Name the primary key a failed follow-up step left behind in the keyring
pub fn left_in_keyring(fingerprint: &str, error: KeyError) -> KeyError {
    let detail = match error {
        KeyError::Generation(message) => message,
        other => other.to_string(),
    };
    KeyError::Generation(format!(
        "{}; GPG key {} was left in the keyring (remove it with `gpg --delete-secret-and-public-key {}`)",
        detail, fingerprint, fingerprint
    ))
}

/// Find the fingerprint in a `KEY_CREATED` status line
pub fn parse_key_created(status: &str) -> Option<String> {
    status.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("[GNUPG:]") || fields.next() != Some("KEY_CREATED") {
            return None;
        }
        let _key_type = fields.next()?;
        fields.next().map(String::from)
    })
}
