//! Verification engine seam.
//!
//! The engine performs the actual digest and signature checks. It reports a
//! bare success/failure status; the details of a failure only appear as
//! messages on the diagnostic channel.

use std::path::{Path, PathBuf};

use crate::diagnostics::DiagnosticGuard;
use crate::error::{TrustError, TrustResult};

mod rpmkeys;

pub use rpmkeys::RpmKeysEngine;

/// Verification context rooted at an install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContext {
    root: PathBuf,
}

impl EngineContext {
    /// Create a context whose keyring and configuration live under `root`.
    pub fn new(root: &Path) -> TrustResult<Self> {
        if !root.is_dir() {
            return Err(TrustError::SignatureCheck {
                message: format!(
                    "Failed to set transaction root directory \"{}\".",
                    root.display()
                ),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Overall outcome reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Ok,
    Failed,
}

/// Engine checking package digests and signatures.
pub trait VerificationEngine {
    /// Create a verification context for `root`.
    fn create_context(&self, root: &Path) -> TrustResult<EngineContext> {
        EngineContext::new(root)
    }

    /// Verify `package`, reporting details on `diag`.
    fn verify(&self, ctx: &EngineContext, diag: &DiagnosticGuard, package: &Path) -> EngineStatus;
}

impl<E: VerificationEngine + ?Sized> VerificationEngine for &E {
    fn create_context(&self, root: &Path) -> TrustResult<EngineContext> {
        (**self).create_context(root)
    }

    fn verify(&self, ctx: &EngineContext, diag: &DiagnosticGuard, package: &Path) -> EngineStatus {
        (**self).verify(ctx, diag, package)
    }
}
