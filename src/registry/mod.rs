//! Remote key registry
//!
//! The lifecycle code only ever talks to the remote account through
//! [`RemoteKeyRegistry`]. Two transports implement it:
//!
//! - [`GitHubApi`] - the GitHub REST API over blocking HTTP
//! - [`GhCli`] - the authenticated `gh` command-line tool

use chrono::{DateTime, Utc};

use crate::config::{Backend, RegistryConfig};
use crate::error::Result;
use crate::keys::{KeyId, KeyKind, RemoteKey};

mod gh;
mod github;
#[cfg(test)]
pub mod memory;

pub use gh::GhCli;
pub use github::GitHubApi;

/// Public key material to upload
#[derive(Debug, Clone)]
pub struct NewKey {
    pub kind: KeyKind,
    pub title: String,
    /// OpenSSH public key line (SSH) or ASCII-armored public key block (GPG)
    pub public_key: String,
    /// Informational only; the remote reads GPG expiry from the key itself
    pub expires_at: Option<DateTime<Utc>>,
}

/// Capability interface over the remote account's key storage
pub trait RemoteKeyRegistry {
    /// All keys of one kind on the authenticated account, in remote order
    fn list(&self, kind: KeyKind) -> Result<Vec<RemoteKey>>;

    /// Upload a public key
    ///
    /// Fails with `KeyError::Conflict` when the remote rejects a duplicate.
    /// `Ok(None)` means the key was uploaded but its new id is unknown.
    fn register(&self, key: &NewKey) -> Result<Option<KeyId>>;

    /// Remove a key
    ///
    /// Fails with `KeyError::NotFound` when the key is already gone.
    fn delete(&self, id: &KeyId) -> Result<()>;
}

/// Open the registry transport selected in the configuration
pub fn open(config: &RegistryConfig) -> Result<Box<dyn RemoteKeyRegistry>> {
    match config.backend {
        Backend::Api => {
            tracing::debug!("Using GitHub REST API at {}", config.api_url);
            Ok(Box::new(GitHubApi::new(config)?))
        }
        Backend::Gh => {
            tracing::debug!("Using gh CLI at {}", config.gh_program.display());
            Ok(Box::new(GhCli::new(config)))
        }
    }
}

/// Whether a remote rejection message means the key is already on the account
pub(crate) fn is_duplicate(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already in use") || lower.contains("already exists")
}

/// Parse a remote timestamp, tolerating absent or malformed values
pub(crate) fn parse_timestamp(raw: Option<&str>, title: &str) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => {
            tracing::warn!("Could not parse date for key {}: {}", title, raw);
            None
        }
    }
}
