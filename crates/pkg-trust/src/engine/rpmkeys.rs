//! `rpmkeys --checksig` engine.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::diagnostics::{DiagnosticGuard, DiagnosticLevel};

use super::{EngineContext, EngineStatus, VerificationEngine};

/// Engine running `rpmkeys --checksig --verbose` against the context root.
///
/// Standard output lines are emitted at `Info`, standard error lines at
/// `Error`.
#[derive(Debug, Clone)]
pub struct RpmKeysEngine {
    binary: PathBuf,
}

impl Default for RpmKeysEngine {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("rpmkeys"),
        }
    }
}

impl RpmKeysEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another `rpmkeys` binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl VerificationEngine for RpmKeysEngine {
    fn verify(&self, ctx: &EngineContext, diag: &DiagnosticGuard, package: &Path) -> EngineStatus {
        let mut command = Command::new(&self.binary);
        command
            .arg("--root")
            .arg(ctx.root())
            .args(["--checksig", "--verbose"])
            .arg(package);
        debug!(command = ?command, "running signature check");

        let output = match command.output() {
            Ok(output) => output,
            Err(e) => {
                diag.emit(
                    DiagnosticLevel::Error,
                    format!("failed to run {}: {}", self.binary.display(), e),
                );
                return EngineStatus::Failed;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            diag.emit(DiagnosticLevel::Info, line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.is_empty()) {
            diag.emit(DiagnosticLevel::Error, line);
        }

        if output.status.success() {
            EngineStatus::Ok
        } else {
            EngineStatus::Failed
        }
    }
}
