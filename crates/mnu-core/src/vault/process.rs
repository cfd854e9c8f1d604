//! Vault backed by the `bw` command-line client.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::{VaultItem, VaultManager};

/// Environment variable the master password is passed through on unlock.
pub const PASSWORD_ENV: &str = "MNU_BW_PASSWORD";

const SESSION_ENV: &str = "BW_SESSION";

#[derive(Debug, Deserialize)]
struct CliStatus {
    status: String,
}

/// Runs `bw` for every request. `BW_SESSION` is inherited by the child.
#[derive(Debug, Clone)]
pub struct CliVault {
    program: String,
}

impl CliVault {
    /// Vault driven by the executable `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str], password: Option<&str>) -> Result<Zeroizing<Vec<u8>>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = password {
            cmd.env(PASSWORD_ENV, password);
        }

        tracing::debug!(program = %self.program, command = args.first().copied().unwrap_or(""), "Running vault CLI");
        let output = cmd.output().await.map_err(|e| Error::ProcessSpawn {
            program: self.program.clone(),
            source: e,
        })?;
        let stdout = Zeroizing::new(output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Vault(format!(
                "{} {} failed ({}): {}",
                self.program,
                args.first().copied().unwrap_or(""),
                output.status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }

    async fn run_text(&self, args: &[&str], password: Option<&str>) -> Result<Zeroizing<String>> {
        let mut bytes = self.run(args, password).await?;
        let text = String::from_utf8(std::mem::take(&mut *bytes))
            .map_err(|_| Error::Vault(format!("{} returned non UTF-8 output", self.program)))?;
        let mut text = Zeroizing::new(text);
        let trimmed = text.trim_end_matches(['\r', '\n']).len();
        text.truncate(trimmed);
        Ok(text)
    }
}

impl Default for CliVault {
    fn default() -> Self {
        Self::new("bw")
    }
}

#[async_trait]
impl VaultManager for CliVault {
    async fn is_logged_in(&self) -> Result<bool> {
        if std::env::var_os(SESSION_ENV).is_some_and(|s| !s.is_empty()) {
            tracing::debug!("Using session from {}", SESSION_ENV);
            return Ok(true);
        }

        let output = self.run(&["status"], None).await?;
        let status: CliStatus = serde_json::from_slice(&output)
            .map_err(|e| Error::Vault(format!("malformed status output: {e}")))?;
        tracing::debug!(status = %status.status, "Vault status");
        Ok(status.status == "unlocked")
    }

    async fn get_items(&self) -> Result<Vec<VaultItem>> {
        let output = self.run(&["list", "items"], None).await?;
        if output.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&output)
            .map_err(|e| Error::Vault(format!("malformed item listing: {e}")))
    }

    async fn get_password(&self, id: &str) -> Result<Zeroizing<String>> {
        self.run_text(&["get", "password", id], None).await
    }

    async fn get_totp(&self, id: &str) -> Result<Zeroizing<String>> {
        self.run_text(&["get", "totp", id], None).await
    }

    async fn unlock(&self, password: &str) -> Result<Zeroizing<String>> {
        let session = self
            .run_text(&["unlock", "--raw", "--passwordenv", PASSWORD_ENV], Some(password))
            .await?;
        tracing::info!("Vault unlocked");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_BW: &str = r#"#!/bin/sh
case "$1 $2" in
  "status ") echo '{"status":"locked"}' ;;
  "list items") echo '[{"id":"a1","name":"GitHub","login":{"username":"octo","password":"x"}}]' ;;
  "get password") printf 'p@ss\n' ;;
  "get totp") printf '123456' ;;
  "unlock --raw") printf 'session-for-%s' "$MNU_BW_PASSWORD" ;;
  *) echo "Not found." >&2; exit 1 ;;
esac
"#;

    fn fake_bw(dir: &std::path::Path) -> CliVault {
        let path = dir.join("bw");
        std::fs::write(&path, FAKE_BW).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        CliVault::new(path.display().to_string())
    }

    #[tokio::test]
    async fn test_cli_items_and_secrets() {
        let temp = tempfile::tempdir().unwrap();
        let vault = fake_bw(temp.path());

        let items = vault.get_items().await.unwrap();
        assert_eq!(items[0].username(), Some("octo"));
        assert_eq!(vault.get_password("a1").await.unwrap().as_str(), "p@ss");
        assert_eq!(vault.get_totp("a1").await.unwrap().as_str(), "123456");
    }

    #[tokio::test]
    async fn test_cli_unlock_uses_environment() {
        let temp = tempfile::tempdir().unwrap();
        let vault = fake_bw(temp.path());

        let session = vault.unlock("hunter2").await.unwrap();
        assert_eq!(session.as_str(), "session-for-hunter2");
    }

    #[tokio::test]
    async fn test_cli_failure_reports_stderr() {
        let temp = tempfile::tempdir().unwrap();
        let vault = fake_bw(temp.path());

        let err = vault.run(&["get", "notes", "a1"], None).await.unwrap_err();
        assert!(err.to_string().contains("Not found."));
    }

    #[tokio::test]
    async fn test_cli_missing_program() {
        let vault = CliVault::new("/nonexistent/bw");
        assert!(matches!(
            vault.get_items().await,
            Err(Error::ProcessSpawn { .. })
        ));
    }
}
