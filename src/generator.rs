//! Credential generation and registration
//!
//! Key material is always created locally before anything is uploaded, and
//! the two stages report separately: a failed upload leaves the generated
//! material in the outcome so registration can be retried without
//! generating a new key.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use ssh_key::{Algorithm, HashAlg, LineEnding, PrivateKey, PublicKey};

use crate::config::Config;
use crate::error::{KeyError, Result};
use crate::gpg::{self, GpgTool};
use crate::keys::{KeyId, KeyKind};
use crate::naming;
use crate::registry::{NewKey, RemoteKeyRegistry};

/// Expiry applied to GPG keys when none is requested
pub const DEFAULT_GPG_EXPIRY_DAYS: i64 = 90;

const MAX_GPG_EXPIRY_DAYS: i64 = 36_500;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// Kind-specific generation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// Ed25519 SSH key; never expires
    Ssh,
    /// GPG key bound to `email`, expiring after `expiry_days`
    Gpg { email: String, expiry_days: i64 },
}

/// Inputs for one generated key
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub spec: KeySpec,
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn ssh() -> Self {
        Self {
            spec: KeySpec::Ssh,
            hostname: naming::local_host(),
            timestamp: Utc::now(),
        }
    }

    pub fn gpg(email: impl Into<String>, expiry_days: Option<i64>) -> Self {
        Self {
            spec: KeySpec::Gpg {
                email: email.into(),
                expiry_days: expiry_days.unwrap_or(DEFAULT_GPG_EXPIRY_DAYS),
            },
            hostname: naming::local_host(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[cfg(test)]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> KeyKind {
        match self.spec {
            KeySpec::Ssh => KeyKind::Ssh,
            KeySpec::Gpg { .. } => KeyKind::Gpg,
        }
    }

    pub fn title(&self) -> String {
        naming::encode(&self.hostname, self.timestamp.date_naive())
    }

    /// When a GPG key expires; SSH keys have no expiry
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.spec {
            KeySpec::Ssh => None,
            KeySpec::Gpg { expiry_days, .. } => Some(self.timestamp + Duration::days(expiry_days)),
        }
    }

    /// Check every input before any side effect
    pub fn validate(&self) -> Result<()> {
        let host_ok = !self.hostname.is_empty()
            && self
                .hostname
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !host_ok {
            return Err(KeyError::Validation(format!(
                "Invalid host name '{}' for key title",
                self.hostname
            )));
        }

        if let KeySpec::Gpg { email, expiry_days } = &self.spec {
            if !EMAIL.is_match(email) {
                return Err(KeyError::Validation(format!(
                    "'{}' is not a valid email address",
                    email
                )));
            }
            if *expiry_days <= 0 || *expiry_days > MAX_GPG_EXPIRY_DAYS {
                return Err(KeyError::Validation(format!(
                    "GPG expiry must be between 1 and {} days, got {}",
                    MAX_GPG_EXPIRY_DAYS, expiry_days
                )));
            }
        }
        Ok(())
    }
}

/// Locally generated SSH key pair
#[derive(Debug, Clone)]
pub struct SshMaterial {
    pub title: String,
    /// `None` when registering a public key generated elsewhere
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: PathBuf,
    /// OpenSSH public key line
    pub public_key: String,
    pub fingerprint: String,
}

/// Locally generated GPG key
#[derive(Debug, Clone)]
pub struct GpgMaterial {
    pub title: String,
    pub email: Option<String>,
    pub fingerprint: Option<String>,
    pub armored_public_key: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Public half of a key, ready for upload
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Ssh(SshMaterial),
    Gpg(GpgMaterial),
}

impl KeyMaterial {
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyMaterial::Ssh(_) => KeyKind::Ssh,
            KeyMaterial::Gpg(_) => KeyKind::Gpg,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            KeyMaterial::Ssh(m) => &m.title,
            KeyMaterial::Gpg(m) => &m.title,
        }
    }

    fn to_new_key(&self) -> NewKey {
        match self {
            KeyMaterial::Ssh(m) => NewKey {
                kind: KeyKind::Ssh,
                title: m.title.clone(),
                public_key: m.public_key.clone(),
                expires_at: None,
            },
            KeyMaterial::Gpg(m) => NewKey {
                kind: KeyKind::Gpg,
                title: m.title.clone(),
                public_key: m.armored_public_key.clone(),
                expires_at: m.expires_at,
            },
        }
    }

    /// Read an existing OpenSSH public key file
    ///
    /// The title defaults to the key comment, then to the file stem.
    pub fn load_ssh(path: &Path, title: Option<&str>) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| KeyError::io(path, e))?;
        let public_key = PublicKey::from_openssh(content.trim()).map_err(|e| {
            KeyError::Validation(format!("{} is not an OpenSSH public key: {}", path.display(), e))
        })?;

        let title = title
            .map(String::from)
            .or_else(|| Some(public_key.comment().to_string()).filter(|c| !c.is_empty()))
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .ok_or_else(|| KeyError::Validation("A title is required for this key".to_string()))?;

        Ok(KeyMaterial::Ssh(SshMaterial {
            title,
            private_key_path: None,
            public_key_path: path.to_path_buf(),
            public_key: content.trim().to_string(),
            fingerprint: public_key.fingerprint(HashAlg::Sha256).to_string(),
        }))
    }

    /// Read an existing ASCII-armored GPG public key file
    pub fn load_gpg(path: &Path, title: &str) -> Result<Self> {
        let armored = fs::read_to_string(path).map_err(|e| KeyError::io(path, e))?;
        if !armored.contains("-----BEGIN PGP PUBLIC KEY BLOCK-----") {
            return Err(KeyError::Validation(format!(
                "{} is not an ASCII-armored GPG public key",
                path.display()
            )));
        }
        if title.trim().is_empty() {
            return Err(KeyError::Validation("A title is required for GPG keys".to_string()));
        }

        Ok(KeyMaterial::Gpg(GpgMaterial {
            title: title.to_string(),
            email: None,
            fingerprint: None,
            armored_public_key: armored,
            expires_at: None,
        }))
    }
}

/// Result of one generation: local material always, registration maybe
#[derive(Debug)]
pub struct GenerationOutcome {
    pub material: KeyMaterial,
    /// `Ok(None)` when uploaded but the remote id could not be read back
    pub registration: Result<Option<KeyId>>,
}

impl GenerationOutcome {
    pub fn is_registered(&self) -> bool {
        self.registration.is_ok()
    }
}

/// Creates key material and uploads it to the remote registry
pub struct CredentialGenerator<'a> {
    registry: &'a dyn RemoteKeyRegistry,
    ssh_dir: PathBuf,
    gpg: GpgTool,
}

impl<'a> CredentialGenerator<'a> {
    pub fn new(registry: &'a dyn RemoteKeyRegistry, config: &Config) -> Self {
        Self {
            registry,
            ssh_dir: config.ssh.key_dir.clone(),
            gpg: GpgTool::new(&config.gpg),
        }
    }

    /// Validate, generate locally, then register
    ///
    /// `Err` means nothing usable was generated; a GPG key left half-made
    /// in the keyring is named in the error. A registration failure is
    /// reported inside the outcome instead.
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        request.validate()?;

        let material = match &request.spec {
            KeySpec::Ssh => KeyMaterial::Ssh(self.generate_ssh(request)?),
            KeySpec::Gpg { email, expiry_days } => {
                KeyMaterial::Gpg(self.generate_gpg(request, email, *expiry_days)?)
            }
        };

        let registration = self.register(&material);
        if let Err(e) = &registration {
            tracing::warn!(
                "{} key '{}' was generated but not registered: {}",
                material.kind(),
                material.title(),
                e
            );
        }

        Ok(GenerationOutcome {
            material,
            registration,
        })
    }

    /// Upload existing material
    pub fn register(&self, material: &KeyMaterial) -> Result<Option<KeyId>> {
        let key = material.to_new_key();
        tracing::info!("Registering {} key '{}'", key.kind, key.title);
        let id = self.registry.register(&key)?;
        match &id {
            Some(id) => tracing::info!("{} key '{}' registered as {}", key.kind, key.title, id),
            None => tracing::info!("{} key '{}' registered", key.kind, key.title),
        }
        Ok(id)
    }

    fn generate_ssh(&self, request: &GenerationRequest) -> Result<SshMaterial> {
        let title = request.title();
        tracing::warn!("SSH key will be created WITHOUT a passphrase for automation");

        fs::create_dir_all(&self.ssh_dir).map_err(|e| KeyError::io(&self.ssh_dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.ssh_dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| KeyError::io(&self.ssh_dir, e))?;
        }

        let private_key_path = unused_key_path(&self.ssh_dir, &title);
        let public_key_path = public_key_path(&private_key_path);

        let mut private_key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .map_err(|e| KeyError::Generation(format!("Ed25519 key generation failed: {}", e)))?;
        private_key.set_comment(title.as_str());

        let private_pem = private_key
            .to_openssh(LineEnding::LF)
            .map_err(|e| KeyError::Generation(format!("Failed to encode private key: {}", e)))?;
        write_secret(&private_key_path, private_pem.as_bytes())?;

        let public_key = private_key
            .public_key()
            .to_openssh()
            .map_err(|e| KeyError::Generation(format!("Failed to encode public key: {}", e)))?;
        fs::write(&public_key_path, format!("{}\n", public_key))
            .map_err(|e| KeyError::io(&public_key_path, e))?;

        let fingerprint = private_key.fingerprint(HashAlg::Sha256).to_string();
        tracing::info!("SSH key generated at {}", private_key_path.display());

        Ok(SshMaterial {
            title,
            private_key_path: Some(private_key_path),
            public_key_path,
            public_key,
            fingerprint,
        })
    }

    fn generate_gpg(
        &self,
        request: &GenerationRequest,
        email: &str,
        expiry_days: i64,
    ) -> Result<GpgMaterial> {
        let title = request.title();
        tracing::warn!("GPG key will be created WITHOUT a passphrase for automation");

        let user_id = format!("{} <{}>", title, email);
        let fingerprint = self.gpg.generate(&user_id, expiry_days)?;
        let armored_public_key = self
            .gpg
            .export_armored(&fingerprint)
            .map_err(|e| gpg::left_in_keyring(&fingerprint, e))?;
        tracing::info!("GPG key {} generated for {}", fingerprint, email);

        Ok(GpgMaterial {
            title,
            email: Some(email.to_string()),
            fingerprint: Some(fingerprint),
            armored_public_key,
            expires_at: request.expires_at(),
        })
    }
}

/// First of `{title}`, `{title}-1`, `{title}-2`, ... with no existing key files
fn unused_key_path(dir: &Path, title: &str) -> PathBuf {
    let taken = |p: &Path| p.exists() || public_key_path(p).exists();

    let first = dir.join(title);
    if !taken(&first) {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{}-{}", title, n)))
        .find(|p| !taken(p))
        .unwrap_or(first)
}

/// `{path}.pub`, keeping any dots already in the file name
fn public_key_path(private_key_path: &Path) -> PathBuf {
    let mut name = private_key_path.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

/// Write private key material readable only by the owner
fn write_secret(path: &Path, content: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| KeyError::io(path, e))?;
        file.write_all(content).map_err(|e| KeyError::io(path, e))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, content).map_err(|e| KeyError::io(path, e))?;
    }

    Ok(())
}
