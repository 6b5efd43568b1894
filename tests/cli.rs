//! Binary-level tests for the machine-keys command line

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A config that routes every remote call to a gh binary that does not exist
fn offline_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[registry]
backend = "gh"
gh_program = "{missing}"

[ssh]
key_dir = "{ssh}"

[gpg]
program = "{missing}"
"#,
            missing = dir.join("missing-tool").display(),
            ssh = dir.join("ssh").display(),
        ),
    )
    .unwrap();
    path
}

fn machine_keys(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("machine-keys").unwrap();
    cmd.env("MACHINE_KEYS_CONFIG", offline_config(dir.path()))
        .env("HOME", dir.path())
        .env_remove("GH_TOKEN")
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("keys"))
        .stdout(predicate::str::contains("--generate-ssh-key"))
        .stdout(predicate::str::contains("--generate-gpg-key"));
}

#[test]
fn test_prune_rejects_bad_duration() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["keys", "prune", "--older-than", "30w", "--yes"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid duration format '30w'"));
}

#[test]
fn test_gpg_zero_expiry_is_rejected() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["--generate-gpg-key", "me@example.org", "--gpg-expiry-days", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("GPG expiry must be between 1 and"));
}

#[test]
fn test_gpg_bad_email_is_rejected() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["--generate-gpg-key", "not-an-email"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a valid email address"));
}

#[test]
fn test_expiry_requires_gpg_flag() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["--gpg-expiry-days", "30"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--generate-gpg-key"));
}

#[test]
fn test_list_fails_when_remote_unreachable() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["keys", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to list SSH keys"));
}

#[test]
fn test_prune_fails_when_remote_unreachable() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["keys", "prune", "--older-than", "30d", "--yes"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to list SSH keys"));
}

#[test]
fn test_register_gpg_requires_title() {
    let dir = TempDir::new().unwrap();
    let key = dir.path().join("key.asc");
    std::fs::write(
        &key,
        "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmDMEZ\n-----END PGP PUBLIC KEY BLOCK-----\n",
    )
    .unwrap();

    machine_keys(&dir)
        .args(["keys", "register", "--kind", "gpg"])
        .arg(&key)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--title is required"));
}

#[test]
fn test_ssh_key_kept_when_registration_fails() {
    let dir = TempDir::new().unwrap();
    machine_keys(&dir)
        .args(["--generate-ssh-key", "--hostname", "testbox"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("machine-setup-testbox-"))
        .stderr(predicate::str::contains("keys register --kind ssh"));

    let generated: Vec<_> = std::fs::read_dir(dir.path().join("ssh"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(generated.len(), 2);
    assert!(generated.iter().any(|n| n.ends_with(".pub")));
}
