//! Trust store adapter.
//!
//! The keyring itself is owned by the caller (a package database, a key
//! directory). This module only looks keys up by their short key id and
//! submits new ones.
//!
//! Short ids are compared ASCII case-insensitively: package databases store
//! them lowercase while key parsers report uppercase hex.

use tracing::{debug, info};

use crate::diagnostics::DiagnosticGuard;
use crate::error::{ImportRejected, TrustError, TrustResult};
use crate::key::KeyInfo;

mod file;
mod rpmdb;

pub use file::FileKeyring;
pub use rpmdb::RpmDbKeyring;

/// Kind of record stored in a keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTag {
    /// Imported public key.
    PublicKey,
}

impl RecordTag {
    /// Record name in the package database.
    pub fn name(self) -> &'static str {
        match self {
            Self::PublicKey => "gpg-pubkey",
        }
    }
}

/// One keyring record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringEntry {
    pub tag: RecordTag,

    /// Short key id the record is stored under.
    pub short_id: String,

    /// Free-form description (usually the key's user id).
    pub summary: Option<String>,
}

/// Persistent collection of public keys.
pub trait Keyring {
    /// Records with the given tag, in storage order.
    fn entries<'a>(
        &'a self,
        tag: RecordTag,
        diag: &'a DiagnosticGuard,
    ) -> TrustResult<Box<dyn Iterator<Item = KeyringEntry> + 'a>>;

    /// Import raw key packets.
    fn import(&mut self, packet: &[u8], diag: &DiagnosticGuard) -> Result<(), ImportRejected>;
}

/// Whether `key` is in the keyring. Stops at the first match.
pub fn lookup<K: Keyring + ?Sized>(
    keyring: &K,
    diag: &DiagnosticGuard,
    key: &KeyInfo,
) -> TrustResult<bool> {
    let short_id = key.short_key_id();
    let found = keyring
        .entries(RecordTag::PublicKey, diag)?
        .any(|entry| entry.short_id.eq_ignore_ascii_case(short_id));

    debug!(short_id, found, "keyring lookup");
    Ok(found)
}

/// Import `key` unless it is already present.
///
/// Returns `true` if the key was imported, `false` if it was already there.
pub fn import<K: Keyring + ?Sized>(
    keyring: &mut K,
    diag: &DiagnosticGuard,
    key: &KeyInfo,
) -> TrustResult<bool> {
    if lookup(keyring, diag, key)? {
        debug!(key_id = %key.key_id(), "key already imported");
        return Ok(false);
    }

    submit(keyring, diag, key)?;
    Ok(true)
}

pub(crate) fn submit<K: Keyring + ?Sized>(
    keyring: &mut K,
    diag: &DiagnosticGuard,
    key: &KeyInfo,
) -> TrustResult<()> {
    keyring.import(key.packet(), diag).map_err(|e| {
        TrustError::key_import(
            key.location(),
            format!("Failed to import public key to keyring: {}", e),
        )
    })?;

    info!(
        key_id = %key.key_id(),
        user_id = %key.user_id(),
        location = %key.location(),
        "imported public key"
    );
    Ok(())
}
