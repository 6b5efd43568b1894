//! Configuration management for machine-keys

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// SSH key generation
    #[serde(default)]
    pub ssh: SshConfig,

    /// GPG key generation
    #[serde(default)]
    pub gpg: GpgConfig,
}

/// Which transport talks to GitHub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GitHub REST API
    #[default]
    Api,
    /// The `gh` command-line tool
    Gh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: Backend,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variables searched, in order, for an API token
    #[serde(default = "default_token_env")]
    pub token_env: Vec<String>,

    /// HTTP request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Path to the gh executable
    #[serde(default = "default_gh")]
    pub gh_program: PathBuf,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> Vec<String> {
    vec!["GH_TOKEN".to_string(), "GITHUB_TOKEN".to_string()]
}

fn default_timeout() -> u64 {
    30
}

fn default_gh() -> PathBuf {
    PathBuf::from("gh")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            api_url: default_api_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout(),
            gh_program: default_gh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Directory receiving generated key pairs
    #[serde(default = "default_ssh_dir")]
    pub key_dir: PathBuf,
}

fn default_ssh_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".ssh"))
        .unwrap_or_else(|| PathBuf::from("~/.ssh"))
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            key_dir: default_ssh_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgConfig {
    /// Path to the gpg executable
    #[serde(default = "default_gpg")]
    pub program: PathBuf,

    /// Alternate GnuPG home (defaults to gpg's own choice)
    #[serde(default)]
    pub homedir: Option<PathBuf>,

    /// Expiry used when --gpg-expiry-days is not given
    #[serde(default = "default_expiry_days")]
    pub default_expiry_days: i64,
}

fn default_gpg() -> PathBuf {
    PathBuf::from("gpg")
}

fn default_expiry_days() -> i64 {
    90
}

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            program: default_gpg(),
            homedir: None,
            default_expiry_days: default_expiry_days(),
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            directories::ProjectDirs::from("", "", "machine-keys")
                .map(|d| d.config_dir().join("config.toml"))
                .filter(|p| p.exists())
        });

        match config_path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {}", path.display()))
            }
            None => Ok(Config::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.registry.backend, Backend::Api);
        assert_eq!(config.registry.api_url, "https://api.github.com");
        assert_eq!(config.registry.token_env, vec!["GH_TOKEN", "GITHUB_TOKEN"]);
        assert_eq!(config.gpg.default_expiry_days, 90);
        assert!(config.ssh.key_dir.ends_with(".ssh"));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[registry]
backend = "gh"

[gpg]
default_expiry_days = 365
homedir = "/tmp/gnupg"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.registry.backend, Backend::Gh);
        assert_eq!(config.registry.timeout_secs, 30);
        assert_eq!(config.gpg.default_expiry_days, 365);
        assert_eq!(config.gpg.homedir, Some(PathBuf::from("/tmp/gnupg")));
        assert_eq!(config.gpg.program, PathBuf::from("gpg"));
    }

    #[test]
    fn test_load_rejects_unknown_backend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[registry]\nbackend = \"gitlab\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
