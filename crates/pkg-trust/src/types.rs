//! Package and configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A package artifact to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Local path of the package file.
    pub path: PathBuf,

    /// Where the package came from.
    pub source: PackageSource,
}

impl Package {
    /// Package given directly by the user (command line, local file).
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: PackageSource::CommandLine,
        }
    }

    /// Package downloaded from a repository.
    pub fn from_repo(path: impl Into<PathBuf>, repo: RepoSource) -> Self {
        Self {
            path: path.into(),
            source: PackageSource::Repository(repo),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Origin of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Ad-hoc package outside any repository.
    CommandLine,

    /// Package from a configured repository.
    Repository(RepoSource),
}

/// Repository a package originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    /// Repository id.
    pub id: String,

    /// Whether packages of this repository must be signature checked.
    #[serde(default = "default_true")]
    pub gpgcheck: bool,
}

impl RepoSource {
    pub fn new(id: impl Into<String>, gpgcheck: bool) -> Self {
        Self {
            id: id.into(),
            gpgcheck,
        }
    }
}

/// Download settings for remote keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Root the verification context and keyring are rooted at.
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Whether ad-hoc local packages must be signature checked.
    #[serde(default = "default_true")]
    pub localpkg_gpgcheck: bool,

    /// Remote key download settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            localpkg_gpgcheck: true,
            fetch: FetchConfig::default(),
        }
    }
}

impl VerifierConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PKG_TRUST_INSTALLROOT` | Install root (default `/`) |
    /// | `PKG_TRUST_LOCALPKG_GPGCHECK` | Check local packages (default `true`) |
    /// | `PKG_TRUST_FETCH_TIMEOUT` | Key download timeout in seconds |
    /// | `PKG_TRUST_FETCH_MAX_RETRIES` | Key download retries |
    pub fn from_env() -> Self {
        Self {
            install_root: std::env::var_os("PKG_TRUST_INSTALLROOT")
                .map(PathBuf::from)
                .unwrap_or_else(default_install_root),
            localpkg_gpgcheck: std::env::var("PKG_TRUST_LOCALPKG_GPGCHECK")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            fetch: FetchConfig {
                timeout_secs: std::env::var("PKG_TRUST_FETCH_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_timeout),
                max_retries: std::env::var("PKG_TRUST_FETCH_MAX_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_max_retries),
            },
        }
    }

    /// Set the install root.
    pub fn with_install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.install_root = root.into();
        self
    }

    /// Enable or disable checking of local packages.
    pub fn with_localpkg_gpgcheck(mut self, check: bool) -> Self {
        self.localpkg_gpgcheck = check;
        self
    }

    /// Set key download settings.
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
