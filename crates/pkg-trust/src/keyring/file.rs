//! Directory-backed keyring.
//!
//! # Layout
//!
//! ```text
//! {dir}/
//!   gpg-pubkey-{short_id}.json   # one record per imported key
//! ```

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticGuard, DiagnosticLevel};
use crate::error::{ImportRejected, TrustError, TrustResult};
use crate::openpgp::parse_key_identities;

use super::{Keyring, KeyringEntry, RecordTag};

const RECORD_EXTENSION: &str = "json";

/// Stored key record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKey {
    short_id: String,
    key_id: String,
    fingerprint: String,
    #[serde(default)]
    user_id: String,
    imported_at: DateTime<Utc>,
    /// Base64 of the raw packets.
    packet: String,
}

/// Keyring storing one JSON record per key in a directory.
#[derive(Debug, Clone)]
pub struct FileKeyring {
    dir: PathBuf,
}

impl FileKeyring {
    /// Open the keyring at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> TrustResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| TrustError::Keyring {
            message: format!("failed to create keyring directory {}: {}", dir.display(), e),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, tag: RecordTag, short_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.{}",
            tag.name(),
            short_id.to_ascii_lowercase(),
            RECORD_EXTENSION
        ))
    }

    /// Packets of the key stored under `short_id`.
    pub fn packet(&self, short_id: &str) -> TrustResult<Option<Vec<u8>>> {
        let path = self.record_path(RecordTag::PublicKey, short_id);
        if !path.exists() {
            return Ok(None);
        }
        let stored = read_record(&path).map_err(|message| TrustError::Keyring { message })?;
        let packet = BASE64.decode(&stored.packet).map_err(|e| TrustError::Keyring {
            message: format!("invalid packet in {}: {}", path.display(), e),
        })?;
        Ok(Some(packet))
    }
}

fn read_record(path: &Path) -> Result<StoredKey, String> {
    let content =
        std::fs::read(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_slice(&content).map_err(|e| format!("invalid record {}: {}", path.display(), e))
}

fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)
}

impl Keyring for FileKeyring {
    fn entries<'a>(
        &'a self,
        tag: RecordTag,
        diag: &'a DiagnosticGuard,
    ) -> TrustResult<Box<dyn Iterator<Item = KeyringEntry> + 'a>> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|e| TrustError::Keyring {
            message: format!("failed to list {}: {}", self.dir.display(), e),
        })?;

        let prefix = format!("{}-", tag.name());
        let entries = read_dir.filter_map(move |dirent| {
            let path = dirent.ok()?.path();
            let name = path.file_name()?.to_str()?;
            if !name.starts_with(&prefix)
                || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION)
            {
                return None;
            }

            match read_record(&path) {
                Ok(stored) => Some(KeyringEntry {
                    tag,
                    short_id: stored.short_id,
                    summary: Some(stored.user_id).filter(|u| !u.is_empty()),
                }),
                Err(message) => {
                    diag.emit(DiagnosticLevel::Warning, format!("skipping {}", message));
                    None
                }
            }
        });

        Ok(Box::new(entries))
    }

    fn import(&mut self, packet: &[u8], diag: &DiagnosticGuard) -> Result<(), ImportRejected> {
        let identity = parse_key_identities(packet)
            .map_err(|e| ImportRejected::new(e.to_string()))?
            .pop()
            .ok_or_else(|| ImportRejected::new("no signing key in packet"))?;

        let start = identity.id.len().saturating_sub(8);
        let short_id = identity.id[start..].to_ascii_lowercase();

        let stored = StoredKey {
            short_id: short_id.clone(),
            key_id: identity.id,
            fingerprint: identity.fingerprint,
            user_id: identity.user_id,
            imported_at: Utc::now(),
            packet: BASE64.encode(packet),
        };

        let content = serde_json::to_vec_pretty(&stored)
            .map_err(|e| ImportRejected::new(format!("failed to encode record: {}", e)))?;

        let path = self.record_path(RecordTag::PublicKey, &short_id);
        write_atomic(&path, &content).map_err(|e| {
            ImportRejected::new(format!("failed to write {}: {}", path.display(), e))
        })?;

        diag.emit(
            DiagnosticLevel::Debug,
            format!("added key {} to {}", short_id, self.dir.display()),
        );
        Ok(())
    }
}
