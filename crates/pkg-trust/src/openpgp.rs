//! Minimal OpenPGP packet reader for key identities.
//!
//! Only what identifying a public key needs: packet framing, public key and
//! subkey packets (fingerprint, key id, creation time, algorithm), user IDs
//! and the key flags of self-signatures. Key material is not interpreted and
//! signatures are not verified.

use chrono::{DateTime, Utc};
use sha1::{Digest as _, Sha1};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ArmorError;

const TAG_SIGNATURE: u8 = 2;
const TAG_PUBLIC_KEY: u8 = 6;
const TAG_USER_ID: u8 = 13;
const TAG_PUBLIC_SUBKEY: u8 = 14;

const SUBPACKET_KEY_FLAGS: u8 = 27;
const KEY_FLAG_SIGN: u8 = 0x02;

const SIG_SUBKEY_BINDING: u8 = 0x18;
const SIG_DIRECT_KEY: u8 = 0x1F;

/// Identity of one key found in a key block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity {
    /// Key ID, uppercase hex (16 characters).
    pub id: String,

    /// First user ID of the key, empty if the key has none.
    pub user_id: String,

    /// Fingerprint, uppercase hex.
    pub fingerprint: String,

    /// Key creation time.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct Packet<'a> {
    tag: u8,
    offset: usize,
    body: &'a [u8],
}

#[derive(Debug, Clone)]
struct KeyPacket {
    id: String,
    fingerprint: String,
    created: u32,
    algorithm: u8,
    /// Key flags of the latest self-signature carrying them.
    flags: Option<u8>,
}

impl KeyPacket {
    /// Usage flags decide; without them, whether the algorithm can sign.
    fn can_sign(&self) -> bool {
        match self.flags {
            Some(flags) => flags & KEY_FLAG_SIGN != 0,
            // RSA, RSA sign-only, DSA, ECDSA, EdDSA (legacy), Ed25519, Ed448
            None => matches!(self.algorithm, 1 | 3 | 17 | 19 | 22 | 27 | 28),
        }
    }
}

struct PendingKey {
    primary: KeyPacket,
    user_id: Option<String>,
    /// `None` entries are subkeys of an unsupported version.
    subkeys: Vec<Option<KeyPacket>>,
}

impl PendingKey {
    /// Primary key if it can sign, otherwise the first signing subkey.
    fn finish(self) -> Option<KeyIdentity> {
        let key = std::iter::once(self.primary)
            .chain(self.subkeys.into_iter().flatten())
            .find(KeyPacket::can_sign)?;

        Some(KeyIdentity {
            id: key.id,
            user_id: self.user_id.unwrap_or_default(),
            fingerprint: key.fingerprint,
            timestamp: DateTime::from_timestamp(i64::from(key.created), 0),
        })
    }

    /// Record key flags from a signature following the key or a subkey.
    ///
    /// Certifications and direct-key signatures describe the primary key,
    /// binding signatures the subkey they follow.
    fn apply_signature(&mut self, sig_type: u8, flags: u8) {
        match self.subkeys.last_mut() {
            None if matches!(sig_type, 0x10..=0x13 | SIG_DIRECT_KEY) => {
                self.primary.flags = Some(flags);
            }
            Some(Some(subkey)) if sig_type == SIG_SUBKEY_BINDING => {
                subkey.flags = Some(flags);
            }
            _ => {}
        }
    }
}

/// Extract one identity per primary key in a decoded key block.
///
/// Keys with no signing-capable key packet are skipped, as are keys of
/// packet versions other than 4, 5 and 6.
pub fn parse_key_identities(packets: &[u8]) -> Result<Vec<KeyIdentity>, ArmorError> {
    let mut identities = Vec::new();
    let mut pending: Option<PendingKey> = None;

    for packet in read_packets(packets)? {
        match packet.tag {
            TAG_PUBLIC_KEY => {
                if let Some(done) = pending.take().and_then(PendingKey::finish) {
                    identities.push(done);
                }
                pending = parse_key_packet(&packet)?.map(|primary| PendingKey {
                    primary,
                    user_id: None,
                    subkeys: Vec::new(),
                });
            }
            TAG_USER_ID => {
                if let Some(key) = pending.as_mut() {
                    key.user_id
                        .get_or_insert_with(|| String::from_utf8_lossy(packet.body).into_owned());
                }
            }
            TAG_PUBLIC_SUBKEY => {
                let subkey = parse_key_packet(&packet)?;
                if let Some(key) = pending.as_mut() {
                    key.subkeys.push(subkey);
                }
            }
            TAG_SIGNATURE => {
                if let (Some(key), Some((sig_type, Some(flags)))) =
                    (pending.as_mut(), signature_key_flags(packet.body))
                {
                    key.apply_signature(sig_type, flags);
                }
            }
            _ => {}
        }
    }

    if let Some(done) = pending.and_then(PendingKey::finish) {
        identities.push(done);
    }

    Ok(identities)
}

fn malformed(offset: usize, reason: impl Into<String>) -> ArmorError {
    ArmorError::MalformedPacket {
        offset,
        reason: reason.into(),
    }
}

fn read_packets(data: &[u8]) -> Result<Vec<Packet<'_>>, ArmorError> {
    let mut packets = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let offset = pos;
        let ctb = data[pos];
        if ctb & 0x80 == 0 {
            return Err(malformed(offset, "packet tag bit not set"));
        }

        let (tag, header_len, body_len) = if ctb & 0x40 != 0 {
            let tag = ctb & 0x3F;
            let first = take(data, offset, pos + 1, 1)?[0];
            match first {
                0..=191 => (tag, 2, usize::from(first)),
                192..=223 => {
                    let second = take(data, offset, pos + 2, 1)?[0];
                    let len = ((usize::from(first) - 192) << 8) + usize::from(second) + 192;
                    (tag, 3, len)
                }
                255 => {
                    let b = take(data, offset, pos + 2, 4)?;
                    (tag, 6, u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
                }
                _ => return Err(malformed(offset, "partial body lengths are not supported")),
            }
        } else {
            let tag = (ctb >> 2) & 0x0F;
            match ctb & 0x03 {
                0 => (tag, 2, usize::from(take(data, offset, pos + 1, 1)?[0])),
                1 => {
                    let b = take(data, offset, pos + 1, 2)?;
                    (tag, 3, usize::from(u16::from_be_bytes([b[0], b[1]])))
                }
                2 => {
                    let b = take(data, offset, pos + 1, 4)?;
                    (tag, 5, u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
                }
                _ => (tag, 1, data.len() - pos - 1),
            }
        };

        let start = pos + header_len;
        let body = data
            .get(start..start + body_len)
            .ok_or_else(|| malformed(offset, "packet body exceeds block"))?;

        packets.push(Packet { tag, offset, body });
        pos = start + body_len;
    }

    Ok(packets)
}

fn take(data: &[u8], offset: usize, from: usize, n: usize) -> Result<&[u8], ArmorError> {
    data.get(from..from + n)
        .ok_or_else(|| malformed(offset, "truncated packet header"))
}

/// Parse a key packet; `None` for versions this reader does not support.
fn parse_key_packet(packet: &Packet<'_>) -> Result<Option<KeyPacket>, ArmorError> {
    let body = packet.body;
    let version = *body
        .first()
        .ok_or_else(|| malformed(packet.offset, "empty key packet"))?;

    if !matches!(version, 4..=6) {
        debug!(version, offset = packet.offset, "skipping key packet");
        return Ok(None);
    }
    if body.len() < 6 {
        return Err(malformed(packet.offset, "key packet too short"));
    }
    let created = u32::from_be_bytes([body[1], body[2], body[3], body[4]]);
    let algorithm = body[5];

    let (id, fingerprint) = match version {
        4 => {
            let len = u16::try_from(body.len())
                .map_err(|_| malformed(packet.offset, "v4 key packet too long"))?;
            let mut hasher = Sha1::new();
            hasher.update([0x99]);
            hasher.update(len.to_be_bytes());
            hasher.update(body);
            let digest = hasher.finalize();
            // key id is the low 64 bits of the fingerprint
            (hex::encode_upper(&digest[12..]), hex::encode_upper(&digest[..]))
        }
        _ => {
            let len = u32::try_from(body.len())
                .map_err(|_| malformed(packet.offset, "key packet too long"))?;
            let prefix = if version == 5 { 0x9A } else { 0x9B };
            let mut hasher = Sha256::new();
            hasher.update([prefix]);
            hasher.update(len.to_be_bytes());
            hasher.update(body);
            let digest = hasher.finalize();
            // key id is the high 64 bits of the fingerprint
            (hex::encode_upper(&digest[..8]), hex::encode_upper(&digest[..]))
        }
    };

    Ok(Some(KeyPacket {
        id,
        fingerprint,
        created,
        algorithm,
        flags: None,
    }))
}

/// Signature type and key flags of a signature packet.
///
/// Only the hashed subpacket area is consulted. Signatures that cannot be
/// read (v3, truncated) yield `None` and are ignored.
fn signature_key_flags(body: &[u8]) -> Option<(u8, Option<u8>)> {
    let version = *body.first()?;
    let sig_type = *body.get(1)?;

    let (hashed_len, start): (usize, usize) = match version {
        4 | 5 => (usize::from(u16::from_be_bytes([*body.get(4)?, *body.get(5)?])), 6),
        6 => {
            let b = body.get(4..8)?;
            (u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize, 8)
        }
        _ => return None,
    };
    let mut area = body.get(start..start.checked_add(hashed_len)?)?;

    let mut flags = None;
    while let Some(&first) = area.first() {
        let (len, header): (usize, usize) = match first {
            0..=191 => (usize::from(first), 1),
            192..=254 => {
                let second = *area.get(1)?;
                (((usize::from(first) - 192) << 8) + usize::from(second) + 192, 2)
            }
            255 => {
                let b = area.get(1..5)?;
                (u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize, 5)
            }
        };
        let subpacket = area.get(header..header.checked_add(len)?)?;
        // high bit marks the subpacket critical
        if let [kind, data @ ..] = subpacket {
            if kind & 0x7F == SUBPACKET_KEY_FLAGS {
                flags = data.first().copied();
            }
        }
        area = &area[header + len..];
    }

    Some((sig_type, flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_format(tag: u8, body: &[u8]) -> Vec<u8> {
        assert!(body.len() < 192);
        let mut out = vec![0xC0 | tag, body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    fn v4_body(algorithm: u8, created: u32, material: &[u8]) -> Vec<u8> {
        let mut body = vec![4];
        body.extend_from_slice(&created.to_be_bytes());
        body.push(algorithm);
        body.extend_from_slice(material);
        body
    }

    fn v4_fingerprint(body: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update((body.len() as u16).to_be_bytes());
        hasher.update(body);
        hex::encode_upper(&hasher.finalize()[..])
    }

    #[test]
    fn test_single_v4_key() {
        let body = v4_body(1, 1_700_000_000, b"\x00\x08\xff\x00\x02\x03");
        let mut block = new_format(TAG_PUBLIC_KEY, &body);
        block.extend(new_format(TAG_USER_ID, b"Fedora <fedora@example.org>"));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities.len(), 1);

        let identity = &identities[0];
        let fingerprint = v4_fingerprint(&body);
        assert_eq!(identity.fingerprint, fingerprint);
        assert_eq!(identity.id, fingerprint[24..]);
        assert_eq!(identity.id.len(), 16);
        assert_eq!(identity.user_id, "Fedora <fedora@example.org>");
        assert_eq!(identity.timestamp.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_first_user_id_wins() {
        let body = v4_body(22, 1, b"material");
        let mut block = new_format(TAG_PUBLIC_KEY, &body);
        block.extend(new_format(TAG_USER_ID, b"first"));
        block.extend(new_format(TAG_USER_ID, b"second"));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities[0].user_id, "first");
    }

    #[test]
    fn test_encrypt_only_primary_uses_signing_subkey() {
        // ElGamal primary (16) cannot sign
        let primary = v4_body(16, 1, b"primary");
        let encrypt_sub = v4_body(18, 2, b"ecdh");
        let sign_sub = v4_body(27, 3, b"ed25519");

        let mut block = new_format(TAG_PUBLIC_KEY, &primary);
        block.extend(new_format(TAG_USER_ID, b"user"));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &encrypt_sub));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &sign_sub));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&sign_sub));
        assert_eq!(identities[0].user_id, "user");
    }

    #[test]
    fn test_key_without_signing_capability_skipped() {
        let block = new_format(TAG_PUBLIC_KEY, &v4_body(16, 1, b"primary"));
        assert!(parse_key_identities(&block).unwrap().is_empty());
    }

    #[test]
    fn test_multiple_keys_in_order() {
        let first = v4_body(1, 1, b"one");
        let second = v4_body(1, 2, b"two");
        let mut block = new_format(TAG_PUBLIC_KEY, &first);
        block.extend(new_format(TAG_USER_ID, b"one"));
        block.extend(new_format(TAG_PUBLIC_KEY, &second));
        block.extend(new_format(TAG_USER_ID, b"two"));

        let identities = parse_key_identities(&block).unwrap();
        let users: Vec<_> = identities.iter().map(|i| i.user_id.as_str()).collect();
        assert_eq!(users, vec!["one", "two"]);
    }

    #[test]
    fn test_old_format_header() {
        let body = v4_body(17, 5, b"dsa");
        // old format, tag 6, one-byte length
        let mut block = vec![0x80 | (TAG_PUBLIC_KEY << 2), body.len() as u8];
        block.extend_from_slice(&body);

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&body));
    }

    #[test]
    fn test_v6_key_id_is_fingerprint_prefix() {
        let mut body = vec![6];
        body.extend_from_slice(&7_u32.to_be_bytes());
        body.push(27);
        body.extend_from_slice(&[0, 0, 0, 2, 0xAA, 0xBB]);

        let identities = parse_key_identities(&new_format(TAG_PUBLIC_KEY, &body)).unwrap();
        let identity = &identities[0];
        assert_eq!(identity.fingerprint.len(), 64);
        assert_eq!(identity.id, identity.fingerprint[..16]);
    }

    #[test]
    fn test_v3_key_skipped() {
        let v3 = [3, 0, 0, 0, 1, 0, 0, 1];
        let v4 = v4_body(1, 9, b"modern");

        let mut block = new_format(TAG_PUBLIC_KEY, &v3);
        block.extend(new_format(TAG_USER_ID, b"legacy"));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &v3));
        block.extend(new_format(TAG_PUBLIC_KEY, &v4));
        block.extend(new_format(TAG_USER_ID, b"modern"));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].user_id, "modern");
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&v4));
    }

    #[test]
    fn test_only_v3_key_yields_nothing() {
        let block = new_format(TAG_PUBLIC_KEY, &[3, 0, 0, 0, 1, 0, 0, 1]);
        assert!(parse_key_identities(&block).unwrap().is_empty());
    }

    /// V4 signature with a creation time and, optionally, key flags.
    fn v4_signature(sig_type: u8, flags: Option<u8>, critical: bool) -> Vec<u8> {
        let mut hashed = vec![5, 2, 0, 0, 0, 1];
        if let Some(flags) = flags {
            let kind = if critical { 0x80 | SUBPACKET_KEY_FLAGS } else { SUBPACKET_KEY_FLAGS };
            hashed.extend_from_slice(&[2, kind, flags]);
        }

        let mut body = vec![4, sig_type, 27, 8];
        body.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
        body.extend(hashed);
        // unhashed area: issuer key id
        body.extend_from_slice(&[0, 10, 9, 16, 1, 2, 3, 4, 5, 6, 7, 8]);
        body.extend_from_slice(&[0xAB, 0xCD]);
        body.extend_from_slice(b"signature material");
        body
    }

    #[test]
    fn test_certify_only_primary_uses_signing_subkey() {
        // Ed25519 can sign, but the flags restrict the primary to certification
        let primary = v4_body(27, 1, b"cert");
        let subkey = v4_body(27, 2, b"sign");

        let mut block = new_format(TAG_PUBLIC_KEY, &primary);
        block.extend(new_format(TAG_USER_ID, b"Sub Test"));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x13, Some(0x01), false)));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &subkey));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x18, Some(0x02), false)));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities.len(), 1);
        let fingerprint = v4_fingerprint(&subkey);
        assert_eq!(identities[0].fingerprint, fingerprint);
        assert_eq!(identities[0].id, fingerprint[24..]);
        assert_eq!(identities[0].user_id, "Sub Test");
        assert_eq!(identities[0].timestamp.unwrap().timestamp(), 2);
    }

    #[test]
    fn test_rsa_certify_only_primary_skips_encryption_subkey() {
        let primary = v4_body(1, 1, b"rsa cert");
        let encrypt = v4_body(1, 2, b"rsa encrypt");
        let sign = v4_body(1, 3, b"rsa sign");

        let mut block = new_format(TAG_PUBLIC_KEY, &primary);
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(SIG_DIRECT_KEY, Some(0x01), true)));
        block.extend(new_format(TAG_USER_ID, b"rsa"));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &encrypt));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x18, Some(0x0C), false)));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &sign));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x18, Some(0x02), false)));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&sign));
    }

    #[test]
    fn test_primary_with_sign_flag_preferred() {
        let primary = v4_body(27, 1, b"cert+sign");
        let subkey = v4_body(27, 2, b"sign");

        let mut block = new_format(TAG_PUBLIC_KEY, &primary);
        block.extend(new_format(TAG_USER_ID, b"user"));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x13, Some(0x03), false)));
        block.extend(new_format(TAG_PUBLIC_SUBKEY, &subkey));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x18, Some(0x02), false)));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&primary));
    }

    #[test]
    fn test_signature_without_flags_falls_back_to_algorithm() {
        let primary = v4_body(1, 1, b"rsa");

        let mut block = new_format(TAG_PUBLIC_KEY, &primary);
        block.extend(new_format(TAG_USER_ID, b"user"));
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x13, None, false)));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&primary));
    }

    #[test]
    fn test_binding_signature_before_subkey_ignored() {
        // a binding signature only describes the subkey it follows
        let primary = v4_body(27, 1, b"primary");

        let mut block = new_format(TAG_PUBLIC_KEY, &primary);
        block.extend(new_format(TAG_SIGNATURE, &v4_signature(0x18, Some(0x01), false)));

        let identities = parse_key_identities(&block).unwrap();
        assert_eq!(identities[0].fingerprint, v4_fingerprint(&primary));
    }

    #[test]
    fn test_signature_key_flags() {
        assert_eq!(
            signature_key_flags(&v4_signature(0x18, Some(0x02), false)),
            Some((0x18, Some(0x02)))
        );
        assert_eq!(
            signature_key_flags(&v4_signature(0x13, Some(0x01), true)),
            Some((0x13, Some(0x01)))
        );
        assert_eq!(signature_key_flags(&v4_signature(0x13, None, false)), Some((0x13, None)));
        // v3 signatures have no subpackets
        assert_eq!(signature_key_flags(&[3, 5, 0x13, 0, 0, 0, 1]), None);
        // hashed area longer than the packet
        assert_eq!(signature_key_flags(&[4, 0x13, 27, 8, 0, 40, 2, 27, 1]), None);
    }

    #[test]
    fn test_truncated_body() {
        let mut block = new_format(TAG_PUBLIC_KEY, &v4_body(1, 1, b"abc"));
        block.truncate(block.len() - 2);
        assert!(matches!(
            parse_key_identities(&block),
            Err(ArmorError::MalformedPacket { offset: 0, .. })
        ));
    }

    #[test]
    fn test_missing_tag_bit() {
        assert!(matches!(
            parse_key_identities(b"\x06\x01\x00"),
            Err(ArmorError::MalformedPacket { .. })
        ));
    }
}
