//! Key fixtures for unit tests.

use crate::armor::{encode_armor, ArmorKind};

/// V4 public key packet body with the given creation time and material.
pub(crate) fn v4_key_body(created: u32, material: &[u8]) -> Vec<u8> {
    let mut body = vec![4];
    body.extend_from_slice(&created.to_be_bytes());
    // RSA
    body.push(1);
    body.extend_from_slice(material);
    body
}

pub(crate) fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xC0 | tag, u8::try_from(body.len()).expect("fixture packet < 192 bytes")];
    out.extend_from_slice(body);
    out
}

/// Decoded key block: one public key packet and one user ID.
pub(crate) fn key_packets(material: &[u8], user_id: &str) -> Vec<u8> {
    let mut out = packet(6, &v4_key_body(1_600_000_000, material));
    out.extend(packet(13, user_id.as_bytes()));
    out
}

/// Armored public key block.
pub(crate) fn armored_key(material: &[u8], user_id: &str) -> String {
    encode_armor(&ArmorKind::PublicKey, &key_packets(material, user_id))
}

/// V4 self-signature of `sig_type` whose hashed area holds only key flags.
pub(crate) fn key_flags_signature(sig_type: u8, flags: u8) -> Vec<u8> {
    // EdDSA, SHA-256, three-octet key flags subpacket
    let mut body = vec![4, sig_type, 22, 8, 0, 3, 2, 27, flags];
    body.extend_from_slice(&[0, 0, 0x12, 0x34]);
    body
}
