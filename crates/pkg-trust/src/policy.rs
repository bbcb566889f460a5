//! Signature check policy.
//!
//! The policy decides *whether* a package has to be checked; this crate only
//! enforces the flag it is given.

use std::path::Path;

use crate::types::{PackageSource, RepoSource, VerifierConfig};

/// Source of the policy flags consumed by the verifier.
pub trait PolicySource {
    /// Whether ad-hoc local packages must be checked.
    fn local_check_enabled(&self) -> bool;

    /// Whether packages of `repo` must be checked.
    fn source_check_enabled(&self, repo: &RepoSource) -> bool {
        repo.gpgcheck
    }

    /// Root the verification context is created at.
    fn install_root(&self) -> &Path;

    /// Whether a package from `source` must be checked.
    fn check_required(&self, source: &PackageSource) -> bool {
        match source {
            PackageSource::CommandLine => self.local_check_enabled(),
            PackageSource::Repository(repo) => self.source_check_enabled(repo),
        }
    }
}

impl PolicySource for VerifierConfig {
    fn local_check_enabled(&self) -> bool {
        self.localpkg_gpgcheck
    }

    fn install_root(&self) -> &Path {
        &self.install_root
    }
}
