//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pkg_trust::armor::{encode_armor, ArmorKind};

fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xC0 | tag, u8::try_from(body.len()).unwrap()];
    out.extend_from_slice(body);
    out
}

/// One v4 RSA public key packet followed by a user ID packet.
pub fn key_packets(material: &[u8], user_id: &str) -> Vec<u8> {
    let mut body = vec![4];
    body.extend_from_slice(&1_600_000_000u32.to_be_bytes());
    body.push(1);
    body.extend_from_slice(material);

    let mut out = packet(6, &body);
    out.extend(packet(13, user_id.as_bytes()));
    out
}

pub fn armored_key(material: &[u8], user_id: &str) -> String {
    encode_armor(&ArmorKind::PublicKey, &key_packets(material, user_id))
}

/// Write an armored key into `dir` and return its path.
pub fn write_key(dir: &Path, name: &str, material: &[u8], user_id: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, armored_key(material, user_id)).unwrap();
    path
}

/// Write an executable `/bin/sh` script into `dir` and return its path.
///
/// The file is closed before it is made executable; running it while a
/// writer is still open fails with `ETXTBSY`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
