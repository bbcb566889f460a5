//! Keyring backed by the rpm package database.
//!
//! Public keys live in the database as `gpg-pubkey` pseudo-packages whose
//! version is the lowercase short key id. Listing goes through `rpm -q`,
//! importing through `rpmkeys --import`.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::armor::{encode_armor, ArmorKind};
use crate::diagnostics::{DiagnosticGuard, DiagnosticLevel};
use crate::error::{ImportRejected, TrustError, TrustResult};

use super::{Keyring, KeyringEntry, RecordTag};

const QUERY_FORMAT: &str = "%{VERSION} %{SUMMARY}\\n";

/// Keyring stored in the rpm database under an install root.
#[derive(Debug, Clone)]
pub struct RpmDbKeyring {
    root: PathBuf,
    rpm: PathBuf,
    rpmkeys: PathBuf,
}

impl RpmDbKeyring {
    /// Database of the system rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rpm: PathBuf::from("rpm"),
            rpmkeys: PathBuf::from("rpmkeys"),
        }
    }

    /// Use other `rpm` and `rpmkeys` binaries.
    pub fn with_binaries(mut self, rpm: impl Into<PathBuf>, rpmkeys: impl Into<PathBuf>) -> Self {
        self.rpm = rpm.into();
        self.rpmkeys = rpmkeys.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, command: &mut Command) -> TrustResult<Output> {
        debug!(command = ?command, "running rpm");
        command.output().map_err(|e| TrustError::Keyring {
            message: format!("failed to run {:?}: {}", command.get_program(), e),
        })
    }
}

impl Keyring for RpmDbKeyring {
    fn entries<'a>(
        &'a self,
        tag: RecordTag,
        diag: &'a DiagnosticGuard,
    ) -> TrustResult<Box<dyn Iterator<Item = KeyringEntry> + 'a>> {
        let output = self.run(
            Command::new(&self.rpm)
                .arg("--root")
                .arg(&self.root)
                .args(["-q", tag.name(), "--qf", QUERY_FORMAT]),
        )?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            diag.emit(DiagnosticLevel::Warning, line);
        }

        if !output.status.success() && !is_not_installed(&stdout) {
            return Err(TrustError::Keyring {
                message: format!(
                    "querying {} in {} failed ({})",
                    tag.name(),
                    self.root.display(),
                    output.status
                ),
            });
        }

        Ok(Box::new(parse_query_output(tag, &stdout).into_iter()))
    }

    fn import(&mut self, packet: &[u8], diag: &DiagnosticGuard) -> Result<(), ImportRejected> {
        let armored = encode_armor(&ArmorKind::PublicKey, packet);

        let mut file = tempfile::Builder::new()
            .prefix("rpmkey")
            .suffix(".asc")
            .tempfile()
            .map_err(|e| ImportRejected::new(format!("failed to create key file: {}", e)))?;
        file.write_all(armored.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| ImportRejected::new(format!("failed to write key file: {}", e)))?;

        let output = self
            .run(
                Command::new(&self.rpmkeys)
                    .arg("--root")
                    .arg(&self.root)
                    .arg("--import")
                    .arg(file.path()),
            )
            .map_err(|e| ImportRejected::new(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            diag.emit(DiagnosticLevel::Error, line);
        }

        if !output.status.success() {
            let reason = stderr.trim();
            return Err(ImportRejected::new(if reason.is_empty() {
                format!("rpmkeys exited with {}", output.status)
            } else {
                reason.to_string()
            }));
        }

        Ok(())
    }
}

fn is_not_installed(stdout: &str) -> bool {
    stdout.lines().any(|l| l.trim_end().ends_with("is not installed"))
}

/// Parse `rpm -q --qf '%{VERSION} %{SUMMARY}\n'` output.
fn parse_query_output(tag: RecordTag, stdout: &str) -> Vec<KeyringEntry> {
    if is_not_installed(stdout) {
        return Vec::new();
    }

    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (version, summary) = match line.split_once(' ') {
                Some((version, summary)) => (version, summary.trim()),
                None => (line, ""),
            };
            if version.is_empty() {
                return None;
            }
            Some(KeyringEntry {
                tag,
                short_id: version.to_string(),
                summary: Some(summary.to_string()).filter(|s| !s.is_empty()),
            })
        })
        .collect()
}
