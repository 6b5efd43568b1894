//! `gh` command-line transport

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde::Deserialize;

use crate::config::RegistryConfig;
use crate::error::{KeyError, Result};
use crate::keys::{KeyId, KeyKind, RemoteKey};

use super::{is_duplicate, parse_timestamp, NewKey, RemoteKeyRegistry};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhSshKey {
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhGpgKey {
    id: serde_json::Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    key_id: Option<String>,
}

/// Registry that drives an authenticated `gh` installation
pub struct GhCli {
    program: PathBuf,
}

impl GhCli {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            program: config.gh_program.clone(),
        }
    }

    fn subcommand(kind: KeyKind) -> &'static str {
        match kind {
            KeyKind::Ssh => "ssh-key",
            KeyKind::Gpg => "gpg-key",
        }
    }

    fn run(&self, args: &[&str], context: &str) -> Result<Output> {
        tracing::debug!("Running: {} {}", self.program.display(), args.join(" "));
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| KeyError::remote(context, format!("could not run gh: {}", e)))
    }
}

impl RemoteKeyRegistry for GhCli {
    fn list(&self, kind: KeyKind) -> Result<Vec<RemoteKey>> {
        let context = format!("Failed to list {} keys", kind);
        let fields = match kind {
            KeyKind::Ssh => "id,title,createdAt",
            KeyKind::Gpg => "id,name,createdAt,keyId",
        };
        let output = self.run(&[Self::subcommand(kind), "list", "--json", fields], &context)?;
        if !output.status.success() {
            return Err(KeyError::remote(context, failure_text(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_listing(kind, &stdout).map_err(|e| KeyError::remote(context, e))
    }

    fn register(&self, key: &NewKey) -> Result<Option<KeyId>> {
        let context = format!("Failed to add {} key '{}'", key.kind, key.title);

        // gh only reads keys from a file
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| KeyError::io(std::env::temp_dir(), e))?;
        file.write_all(key.public_key.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| KeyError::io(file.path(), e))?;
        let path = file.path().to_string_lossy().to_string();

        let output = self.run(
            &[Self::subcommand(key.kind), "add", &path, "--title", &key.title],
            &context,
        )?;
        if !output.status.success() {
            let text = failure_text(&output);
            if is_duplicate(&text) {
                return Err(KeyError::Conflict {
                    kind: key.kind,
                    title: key.title.clone(),
                });
            }
            return Err(KeyError::remote(context, text));
        }

        // gh does not print the new id; the newest key with this title is ours
        let listed = match self.list(key.kind) {
            Ok(listed) => listed,
            Err(e) => {
                tracing::warn!(
                    "Key '{}' was uploaded but its id could not be read back: {}",
                    key.title,
                    e
                );
                return Ok(None);
            }
        };
        let newest = listed
            .into_iter()
            .filter(|k| k.title == key.title)
            .max_by_key(|k| k.created_at);
        if newest.is_none() {
            tracing::warn!("Key '{}' was uploaded but is not listed yet", key.title);
        }
        Ok(newest.map(|found| KeyId::new(key.kind, found.id)))
    }

    fn delete(&self, id: &KeyId) -> Result<()> {
        let context = format!("Failed to delete {} key {}", id.kind(), id.value());
        let output = self.run(
            &[Self::subcommand(id.kind()), "delete", id.value(), "--yes"],
            &context,
        )?;
        if output.status.success() {
            return Ok(());
        }

        let text = failure_text(&output);
        if is_not_found(&text) {
            Err(KeyError::NotFound { id: id.clone() })
        } else {
            Err(KeyError::remote(context, text))
        }
    }
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            format!("gh exited with {}", output.status)
        } else {
            stdout
        }
    } else {
        stderr
    }
}

fn is_not_found(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("not found") || lower.contains("http 404")
}

/// gh prints ids as numbers; accept strings too
fn id_text(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_listing(kind: KeyKind, json: &str) -> std::result::Result<Vec<RemoteKey>, serde_json::Error> {
    let keys = match kind {
        KeyKind::Ssh => serde_json::from_str::<Vec<GhSshKey>>(json)?
            .into_iter()
            .map(|k| RemoteKey {
                id: id_text(&k.id),
                created_at: parse_timestamp(k.created_at.as_deref(), &k.title),
                title: k.title,
                fingerprint: None,
                expires_at: None,
            })
            .collect(),
        KeyKind::Gpg => serde_json::from_str::<Vec<GhGpgKey>>(json)?
            .into_iter()
            .map(|k| RemoteKey {
                id: id_text(&k.id),
                created_at: parse_timestamp(k.created_at.as_deref(), &k.name),
                title: k.name,
                fingerprint: k.key_id,
                expires_at: None,
            })
            .collect(),
    };
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ssh_listing() {
        let json = r#"[
            {"id": 101, "title": "machine-setup-devbox-20260127", "createdAt": "2026-01-27T10:30:00Z"},
            {"id": 102, "title": "personal-laptop", "createdAt": ""}
        ]"#;
        let keys = parse_listing(KeyKind::Ssh, json).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].id, "101");
        assert!(keys[0].created_at.is_some());
        assert_eq!(keys[1].title, "personal-laptop");
        assert!(keys[1].created_at.is_none());
    }

    #[test]
    fn test_parse_gpg_listing() {
        let json = r#"[{"id": "7", "name": "machine-setup-devbox-20260127",
            "createdAt": "2026-01-27T10:30:00Z", "keyId": "ABCDEF0123456789"}]"#;
        let keys = parse_listing(KeyKind::Gpg, json).unwrap();
        assert_eq!(keys[0].id, "7");
        assert_eq!(keys[0].fingerprint.as_deref(), Some("ABCDEF0123456789"));
    }

    #[test]
    fn test_parse_listing_rejects_garbage() {
        assert!(parse_listing(KeyKind::Ssh, "not json").is_err());
        assert!(parse_listing(KeyKind::Gpg, r#"[{"name": "no id"}]"#).is_err());
    }

    #[test]
    fn test_failure_classification() {
        assert!(is_not_found("HTTP 404: Not Found (https://api.github.com/user/keys/9)"));
        assert!(!is_not_found("HTTP 500: Internal Server Error"));
    }

    #[test]
    fn test_missing_gh_is_remote_error() {
        let gh = GhCli {
            program: PathBuf::from("/nonexistent/gh"),
        };
        let err = gh.list(KeyKind::Ssh).unwrap_err();
        assert!(matches!(err, KeyError::Remote { .. }));
        assert!(err.to_string().contains("Failed to list SSH keys"));
    }

    /// Write an executable stand-in for gh into `dir`
    #[cfg(unix)]
    fn fake_gh(dir: &std::path::Path, script: &str) -> GhCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("gh");
        std::fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        GhCli { program: path }
    }

    #[cfg(unix)]
    fn new_ssh_key() -> NewKey {
        NewKey {
            kind: KeyKind::Ssh,
            title: "machine-setup-devbox-20260127".to_string(),
            public_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample machine-setup-devbox-20260127"
                .to_string(),
            expires_at: None,
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_register_reads_back_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let gh = fake_gh(
            dir.path(),
            r#"case "$2" in
  add) exit 0 ;;
  list) echo '[{"id": 5, "title": "other", "createdAt": "2026-01-20T00:00:00Z"},
               {"id": 9, "title": "machine-setup-devbox-20260127", "createdAt": "2026-01-27T10:30:00Z"}]' ;;
esac
"#,
        );

        let id = gh.register(&new_ssh_key()).unwrap().unwrap();
        assert_eq!(id, KeyId::new(KeyKind::Ssh, "9"));
    }

    #[cfg(unix)]
    #[test]
    fn test_register_succeeds_when_read_back_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gh = fake_gh(
            dir.path(),
            r#"case "$2" in
  add) exit 0 ;;
  list) echo "HTTP 502: Bad Gateway" >&2; exit 1 ;;
esac
"#,
        );

        assert_eq!(gh.register(&new_ssh_key()).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_register_duplicate_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let gh = fake_gh(
            dir.path(),
            "echo 'HTTP 422: Validation Failed (https://api.github.com/user/keys)' >&2\necho 'key is already in use' >&2\nexit 1\n",
        );

        assert!(matches!(
            gh.register(&new_ssh_key()),
            Err(KeyError::Conflict { kind: KeyKind::Ssh, .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_register_invalid_key_is_remote_error() {
        let dir = tempfile::tempdir().unwrap();
        let gh = fake_gh(
            dir.path(),
            "echo 'HTTP 422: key is invalid. You must supply a key in OpenSSH public key format' >&2\nexit 1\n",
        );

        assert!(matches!(
            gh.register(&new_ssh_key()),
            Err(KeyError::Remote { .. })
        ));
    }
}
