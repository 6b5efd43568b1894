//! Key types shared by the inventory, generator and prune engine

use chrono::{DateTime, Utc};

use crate::naming::{self, KeyName};

/// The two kinds of credential the remote account stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum KeyKind {
    Ssh,
    Gpg,
}

impl KeyKind {
    pub const ALL: [KeyKind; 2] = [KeyKind::Ssh, KeyKind::Gpg];
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::Ssh => write!(f, "SSH"),
            KeyKind::Gpg => write!(f, "GPG"),
        }
    }
}

/// Opaque handle the remote registry assigned to a key
///
/// Carries the kind because the remote keeps SSH and GPG keys in
/// separate collections with independent id spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId {
    kind: KeyKind,
    value: String,
}

impl KeyId {
    pub fn new(kind: KeyKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.to_string().to_lowercase(), self.value)
    }
}

/// A key as reported by one listing of the remote registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKey {
    /// Remote identifier (unique within its kind)
    pub id: String,

    /// Title (SSH) or name (GPG) stored remotely
    pub title: String,

    /// Remote-reported creation time
    pub created_at: Option<DateTime<Utc>>,

    /// GPG key id, when the remote reports one
    pub fingerprint: Option<String>,

    /// GPG expiry, when the remote reports one
    pub expires_at: Option<DateTime<Utc>>,
}

/// Uniform view of one remote credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub id: KeyId,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Host and date parsed from the title; `None` for keys this tool did not create
    pub name: Option<KeyName>,
    pub fingerprint: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Build a record from a registry listing entry
    pub fn from_remote(kind: KeyKind, remote: RemoteKey) -> Self {
        let name = naming::decode(&remote.title);
        Self {
            id: KeyId::new(kind, remote.id),
            title: remote.title,
            created_at: remote.created_at,
            name,
            fingerprint: remote.fingerprint,
            expires_at: remote.expires_at,
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.id.kind()
    }

    /// Whether the title follows the machine-setup naming convention
    pub fn is_managed(&self) -> bool {
        self.name.is_some()
    }

    /// Whole days elapsed since creation, if the creation time is known
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.created_at.map(|created| (now - created).num_days())
    }
}
