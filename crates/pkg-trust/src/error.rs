//! Error types for signature verification and key management.

use std::path::PathBuf;
use std::time::Duration;

/// Trust errors.
///
/// A failed signature is not an error: it is reported as one of the
/// `Failed*` variants of [`crate::Verdict`].
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// Remote key material could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Key material is not valid armor or contains malformed packets.
    #[error(transparent)]
    Armor(#[from] ArmorError),

    /// Key is not an armored public key, or the trust store rejected it.
    #[error("\"{location}\": {reason}")]
    KeyImport { location: String, reason: String },

    /// Verification context could not be created.
    #[error("signature check error: {message}")]
    SignatureCheck { message: String },

    /// Key file could not be read.
    #[error("failed to read \"{}\": {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// Trust store could not be enumerated.
    #[error("keyring error: {message}")]
    Keyring { message: String },
}

impl TrustError {
    pub(crate) fn key_import(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyImport {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by a [`crate::fetch::Downloader`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure (connect, TLS, timeout, body read).
    #[error("failed to download \"{url}\": {message}")]
    Network { url: String, message: String },

    /// Server answered with a non-success status.
    #[error("failed to download \"{url}\": HTTP {status}")]
    Status {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Downloaded content could not be written.
    #[error("failed to store \"{url}\" to \"{}\": {message}", .path.display())]
    Io {
        url: String,
        path: PathBuf,
        message: String,
    },
}

impl FetchError {
    /// Whether the download is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Io { .. } => false,
        }
    }
}

/// Errors raised while decoding armored key material.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArmorError {
    #[error("armor header line not found")]
    MissingHeader,

    #[error("armor tail line for \"{0}\" not found")]
    MissingTail(String),

    #[error("invalid base64 in armor body: {0}")]
    InvalidBase64(String),

    #[error("armor checksum mismatch: expected {expected:06x}, computed {computed:06x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("armor body is empty")]
    Empty,

    #[error("malformed packet at offset {offset}: {reason}")]
    MalformedPacket { offset: usize, reason: String },
}

/// A keyring refused to import a key.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ImportRejected {
    pub reason: String,
}

impl ImportRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustError>;
