//! Public key descriptors.
//!
//! A [`KeyInfo`] is built from a location reference:
//! - `/etc/pki/rpm-gpg/RPM-GPG-KEY` → local file
//! - `file:///etc/pki/rpm-gpg/RPM-GPG-KEY` → local file, scheme stripped
//! - `https://example.org/RPM-GPG-KEY` → downloaded into a scratch file
//!
//! Construction either yields a complete descriptor or fails.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::armor::{decode_armor, ArmorKind};
use crate::error::{ArmorError, TrustError, TrustResult};
use crate::fetch::{Downloader, HttpDownloader};
use crate::openpgp::parse_key_identities;
use crate::types::VerifierConfig;

/// Prefix of downloaded scratch files.
const SCRATCH_PREFIX: &str = "rpmkey";

const NOT_A_PUBLIC_KEY: &str = "key is not an armored public key.";

/// Where key material lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocation {
    /// Local file path.
    Local(PathBuf),

    /// Remote URL, fetched through a [`Downloader`].
    Remote(String),
}

impl KeyLocation {
    /// Classify a location reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use pkg_trust::KeyLocation;
    ///
    /// let local = KeyLocation::parse("file:///etc/pki/rpm-gpg/RPM-GPG-KEY");
    /// assert_eq!(local, KeyLocation::Local("/etc/pki/rpm-gpg/RPM-GPG-KEY".into()));
    ///
    /// let remote = KeyLocation::parse("https://example.org/key.asc");
    /// assert!(matches!(remote, KeyLocation::Remote(_)));
    ///
    /// let path = KeyLocation::parse("keys/RPM-GPG-KEY");
    /// assert!(matches!(path, KeyLocation::Local(_)));
    /// ```
    pub fn parse(reference: &str) -> Self {
        if let Some(path) = reference.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }

        if reference.contains("://") && url::Url::parse(reference).is_ok() {
            return Self::Remote(reference.to_string());
        }

        Self::Local(PathBuf::from(reference))
    }
}

/// A public key ready to be imported into a keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    location: String,
    path: PathBuf,
    key_id: String,
    user_id: String,
    fingerprint: String,
    timestamp: Option<DateTime<Utc>>,
    packet: Vec<u8>,
}

impl KeyInfo {
    /// Load a key, fetching remote locations over HTTP.
    pub fn from_config(location: &str, config: &VerifierConfig) -> TrustResult<Self> {
        match KeyLocation::parse(location) {
            KeyLocation::Local(path) => Self::from_file(location, path),
            KeyLocation::Remote(_) => Self::load(location, &HttpDownloader::new(&config.fetch)?),
        }
    }

    /// Load a key, fetching remote locations with `downloader`.
    ///
    /// A downloaded key is stored in a scratch file that is removed before
    /// this returns, whatever the outcome.
    pub fn load<D: Downloader + ?Sized>(location: &str, downloader: &D) -> TrustResult<Self> {
        match KeyLocation::parse(location) {
            KeyLocation::Local(path) => Self::from_file(location, path),
            KeyLocation::Remote(url) => {
                let scratch = tempfile::Builder::new()
                    .prefix(SCRATCH_PREFIX)
                    .tempfile()
                    .map_err(|e| TrustError::io(std::env::temp_dir(), &e))?;

                downloader.download(&url, scratch.path())?;
                Self::from_file(location, scratch.path().to_path_buf())
            }
        }
    }

    fn from_file(location: &str, path: PathBuf) -> TrustResult<Self> {
        let content = std::fs::read(&path).map_err(|e| TrustError::io(&path, &e))?;

        let block = match decode_armor(&content) {
            Ok(block) => block,
            Err(ArmorError::MissingHeader) => {
                return Err(TrustError::key_import(location, NOT_A_PUBLIC_KEY))
            }
            Err(e) => return Err(e.into()),
        };

        if block.kind != ArmorKind::PublicKey {
            debug!(location, kind = ?block.kind, "rejecting non public key armor");
            return Err(TrustError::key_import(location, NOT_A_PUBLIC_KEY));
        }

        let mut key = Self {
            location: location.to_string(),
            path,
            key_id: String::new(),
            user_id: String::new(),
            fingerprint: String::new(),
            timestamp: None,
            packet: Vec::new(),
        };

        // one block may carry several keys; the last one is kept
        for identity in parse_key_identities(&block.packets)? {
            key.key_id = identity.id;
            key.user_id = identity.user_id;
            key.fingerprint = identity.fingerprint;
            key.timestamp = identity.timestamp;
        }
        key.packet = block.packets;

        debug!(
            location,
            key_id = %key.key_id,
            fingerprint = %key.fingerprint,
            "loaded public key"
        );

        Ok(key)
    }

    /// Location reference the key was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Local path the key material was read from.
    ///
    /// For downloaded keys this is the scratch file, which no longer exists.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Last 8 characters of the key id, as used by the keyring.
    pub fn short_key_id(&self) -> &str {
        let start = self.key_id.len().saturating_sub(8);
        self.key_id.get(start..).unwrap_or(&self.key_id)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Creation time of the key.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Decoded OpenPGP packets.
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }

    pub fn packet_len(&self) -> usize {
        self.packet.len()
    }
}
