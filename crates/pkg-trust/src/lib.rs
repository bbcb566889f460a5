//! Package signature verification and public key management.
//!
//! This crate provides:
//!
//! - Signature checks of package files with a structured [`Verdict`]
//! - Exclusive, scoped access to the engine's process-wide diagnostic channel
//! - Public key descriptors loaded from local files or URLs
//! - Key lookup and import against a caller-supplied [`Keyring`]
//!
//! # Quick Start
//!
//! ```no_run
//! use pkg_trust::{
//!     FileKeyring, KeyInfo, Package, RepoSource, SignatureVerifier, VerifierConfig,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = VerifierConfig::from_env();
//! let key = KeyInfo::from_config("https://example.org/RPM-GPG-KEY", &config)?;
//! let verifier = SignatureVerifier::from_config(config);
//!
//! // Import the repository key once
//! let mut keyring = FileKeyring::open("/var/lib/pkg-trust/keys")?;
//! verifier.import_key(&mut keyring, &key)?;
//!
//! let package = Package::from_repo("/var/cache/hello.rpm", RepoSource::new("updates", true));
//! let verdict = verifier.check_signature(&package)?;
//! if !verdict.is_ok() {
//!     println!("refusing to install: {verdict}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The verification engine reports failures on a single channel shared by the
//! whole process. [`SignatureVerifier::check_signature`],
//! [`SignatureVerifier::key_present`] and [`SignatureVerifier::import_key`]
//! each hold a [`DiagnosticGuard`] while they run, so calls from different
//! threads are serialized.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PKG_TRUST_INSTALLROOT` | Root of the verification context (default: `/`) |
//! | `PKG_TRUST_LOCALPKG_GPGCHECK` | Check packages outside any repository (default: `true`) |
//! | `PKG_TRUST_FETCH_TIMEOUT` | Key download timeout in seconds (default: 30) |
//! | `PKG_TRUST_FETCH_MAX_RETRIES` | Max retries for transient download failures (default: 3) |

pub mod armor;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod key;
pub mod keyring;
pub mod openpgp;
pub mod policy;
pub mod signature;
pub mod types;

#[cfg(test)]
mod testing;

pub use diagnostics::{DiagnosticGuard, DiagnosticLevel};
pub use engine::{EngineContext, EngineStatus, RpmKeysEngine, VerificationEngine};
pub use error::{ArmorError, FetchError, ImportRejected, TrustError, TrustResult};
pub use fetch::{Downloader, HttpDownloader};
pub use key::{KeyInfo, KeyLocation};
pub use keyring::{FileKeyring, Keyring, KeyringEntry, RecordTag, RpmDbKeyring};
pub use policy::PolicySource;
pub use signature::{classify, SignatureVerifier, Verdict};
pub use types::{FetchConfig, Package, PackageSource, RepoSource, VerifierConfig};
