//! Package signature verification.
//!
//! [`SignatureVerifier`] decides whether a package must be checked, runs the
//! verification engine while capturing its diagnostics, and turns the
//! captured text into a [`Verdict`]. It also manages public keys in a
//! caller-supplied [`Keyring`].

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticGuard, DiagnosticLevel};
use crate::engine::{EngineStatus, RpmKeysEngine, VerificationEngine};
use crate::error::TrustResult;
use crate::key::KeyInfo;
use crate::keyring::{self, Keyring};
use crate::policy::PolicySource;
use crate::types::{Package, VerifierConfig};

mod classify;

pub use classify::classify;

/// Outcome of a signature check.
///
/// Every `Failed*` variant means the package must not be installed; the
/// variant only refines the message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Signature valid and trusted, or no check required.
    Ok,

    /// Digest or signature mismatch, or an unrecognized engine report.
    Failed,

    /// Signed by a key that is present but not trusted.
    FailedNotTrusted,

    /// Signing key is not in the keyring.
    FailedKeyMissing,

    /// Package carries no signature.
    FailedNotSigned,
}

impl Verdict {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::FailedNotTrusted => "failed_not_trusted",
            Self::FailedKeyMissing => "failed_key_missing",
            Self::FailedNotSigned => "failed_not_signed",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature checks and key management for one policy and engine.
#[derive(Debug, Clone)]
pub struct SignatureVerifier<P, E> {
    policy: P,
    engine: E,
}

impl SignatureVerifier<VerifierConfig, RpmKeysEngine> {
    /// Verifier using `config` as policy and the system `rpmkeys`.
    pub fn from_config(config: VerifierConfig) -> Self {
        Self::new(config, RpmKeysEngine::new())
    }
}

impl<P: PolicySource, E: VerificationEngine> SignatureVerifier<P, E> {
    pub fn new(policy: P, engine: E) -> Self {
        Self { policy, engine }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Check the signature of `package`.
    ///
    /// # Verification Steps
    ///
    /// 1. Return [`Verdict::Ok`] if the policy does not require a check
    /// 2. Acquire the diagnostic channel in capture mode
    /// 3. Create the engine context at the install root
    /// 4. Run the engine with the channel at `Info` or more verbose
    /// 5. Classify captured lines if the engine reported failure
    ///
    /// # Errors
    ///
    /// Only context creation fails with an error. A bad or missing
    /// signature is a `Failed*` verdict.
    pub fn check_signature(&self, package: &Package) -> TrustResult<Verdict> {
        let path = package.path();

        if !self.policy.check_required(&package.source) {
            debug!(package = %path.display(), "signature check disabled by policy");
            return Ok(Verdict::Ok);
        }

        let (status, lines) = {
            let diag = DiagnosticGuard::capturing();
            let ctx = self.engine.create_context(self.policy.install_root())?;

            let previous = diag.level();
            diag.set_level(previous.max(DiagnosticLevel::Info));
            let status = self.engine.verify(&ctx, &diag, path);
            diag.set_level(previous);

            (status, diag.take_lines())
        };

        if status == EngineStatus::Ok {
            debug!(package = %path.display(), "signature OK");
            return Ok(Verdict::Ok);
        }

        let package_path = path.to_string_lossy();
        let verdict = classify(&package_path, &lines);

        if verdict == Verdict::Failed && all_checks_passed(&package_path, &lines) {
            warn!(
                package = %package_path,
                lines = lines.len(),
                "engine reported failure but every check passed"
            );
        } else {
            info!(package = %package_path, %verdict, "signature check failed");
        }

        Ok(verdict)
    }

    /// Whether `key` is already in `keyring`.
    pub fn key_present<K: Keyring + ?Sized>(
        &self,
        keyring: &K,
        key: &KeyInfo,
    ) -> TrustResult<bool> {
        let diag = DiagnosticGuard::forwarding();
        keyring::lookup(keyring, &diag, key)
    }

    /// Import `key` into `keyring` unless it is already present.
    ///
    /// Returns `true` if the key was imported.
    pub fn import_key<K: Keyring + ?Sized>(
        &self,
        keyring: &mut K,
        key: &KeyInfo,
    ) -> TrustResult<bool> {
        let diag = DiagnosticGuard::forwarding();
        keyring::import(keyring, &diag, key)
    }

    /// Like [`Self::import_key`], but asks `confirm` before importing an
    /// absent key.
    ///
    /// `confirm` runs without holding the diagnostic channel. A refusal
    /// returns `false` and imports nothing.
    pub fn import_key_with_confirmation<K, F>(
        &self,
        keyring: &mut K,
        key: &KeyInfo,
        confirm: F,
    ) -> TrustResult<bool>
    where
        K: Keyring + ?Sized,
        F: FnOnce(&KeyInfo) -> bool,
    {
        if self.key_present(keyring, key)? {
            debug!(key_id = %key.key_id(), "key already imported");
            return Ok(false);
        }

        if !confirm(key) {
            info!(key_id = %key.key_id(), location = %key.location(), "key import declined");
            return Ok(false);
        }

        self.import_key(keyring, key)
    }
}

fn all_checks_passed<S: AsRef<str>>(package_path: &str, lines: &[S]) -> bool {
    lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| !line.starts_with(package_path))
        .all(|line| line.ends_with(": OK"))
}
