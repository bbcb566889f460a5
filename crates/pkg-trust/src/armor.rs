//! ASCII armor decoding and encoding for OpenPGP key material.
//!
//! Armor layout:
//!
//! ```text
//! -----BEGIN PGP PUBLIC KEY BLOCK-----
//! Comment: optional header lines
//!
//! mQINBGR...base64 body...
//! =ABCD
//! -----END PGP PUBLIC KEY BLOCK-----
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::ArmorError;

const BEGIN_PREFIX: &str = "-----BEGIN PGP ";
const END_PREFIX: &str = "-----END PGP ";
const DASHES: &str = "-----";

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// Line width of the encoded body.
const LINE_WIDTH: usize = 64;

/// Type of an armored block, taken from its header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKey,
    SecretKey,
    Signature,
    Message,
    Other(String),
}

impl ArmorKind {
    fn from_label(label: &str) -> Self {
        match label {
            "PUBLIC KEY BLOCK" => Self::PublicKey,
            "PRIVATE KEY BLOCK" | "SECRET KEY BLOCK" => Self::SecretKey,
            "SIGNATURE" => Self::Signature,
            "MESSAGE" => Self::Message,
            other => Self::Other(other.to_string()),
        }
    }

    /// Label used in the BEGIN/END lines.
    pub fn label(&self) -> &str {
        match self {
            Self::PublicKey => "PUBLIC KEY BLOCK",
            Self::SecretKey => "PRIVATE KEY BLOCK",
            Self::Signature => "SIGNATURE",
            Self::Message => "MESSAGE",
            Self::Other(label) => label,
        }
    }
}

/// A decoded armor block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorBlock {
    /// Block type.
    pub kind: ArmorKind,

    /// Armor headers (`Comment`, `Version`, ...), in order.
    pub headers: Vec<(String, String)>,

    /// Decoded packet bytes.
    pub packets: Vec<u8>,
}

#[derive(Clone, Copy)]
enum State {
    Headers,
    Body,
    Checksum(u32),
}

/// Decode the first armor block found in `input`.
///
/// Text before the BEGIN line is ignored. Input without a BEGIN line fails
/// with [`ArmorError::MissingHeader`].
pub fn decode_armor(input: &[u8]) -> Result<ArmorBlock, ArmorError> {
    let text = String::from_utf8_lossy(input);
    let mut lines = text.lines().map(str::trim_end);

    let label = lines
        .by_ref()
        .find_map(|line| {
            line.trim_start()
                .strip_prefix(BEGIN_PREFIX)
                .and_then(|rest| rest.strip_suffix(DASHES))
        })
        .ok_or(ArmorError::MissingHeader)?
        .to_string();

    let mut headers = Vec::new();
    let mut body = String::new();
    let mut state = State::Headers;
    let mut closed = false;

    for line in lines {
        let line = line.trim_start();

        if let Some(rest) = line.strip_prefix(END_PREFIX) {
            if rest.strip_suffix(DASHES) != Some(label.as_str()) {
                return Err(ArmorError::MissingTail(label));
            }
            closed = true;
            break;
        }

        match state {
            State::Headers => {
                if line.is_empty() {
                    state = State::Body;
                } else if let Some((key, value)) = line.split_once(':') {
                    headers.push((key.trim().to_string(), value.trim().to_string()));
                } else {
                    // no blank separator, this is already body
                    body.push_str(line);
                    state = State::Body;
                }
            }
            State::Body => {
                if let Some(encoded) = line.strip_prefix('=') {
                    state = State::Checksum(decode_checksum(encoded)?);
                } else {
                    body.push_str(line);
                }
            }
            State::Checksum(_) => {
                if !line.is_empty() {
                    return Err(ArmorError::InvalidBase64(
                        "data after armor checksum".to_string(),
                    ));
                }
            }
        }
    }

    if !closed {
        return Err(ArmorError::MissingTail(label));
    }

    let packets = BASE64
        .decode(body.as_bytes())
        .map_err(|e| ArmorError::InvalidBase64(e.to_string()))?;

    if packets.is_empty() {
        return Err(ArmorError::Empty);
    }

    if let State::Checksum(expected) = state {
        let computed = crc24(&packets);
        if expected != computed {
            return Err(ArmorError::ChecksumMismatch { expected, computed });
        }
    }

    Ok(ArmorBlock {
        kind: ArmorKind::from_label(&label),
        headers,
        packets,
    })
}

/// Armor `packets` as a block of the given kind, with checksum.
pub fn encode_armor(kind: &ArmorKind, packets: &[u8]) -> String {
    let label = kind.label();
    let encoded = BASE64.encode(packets);
    let crc = crc24(packets).to_be_bytes();

    let mut out = format!("{BEGIN_PREFIX}{label}{DASHES}\n\n");
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push('=');
    out.push_str(&BASE64.encode(&crc[1..]));
    out.push('\n');
    out.push_str(&format!("{END_PREFIX}{label}{DASHES}\n"));
    out
}

fn decode_checksum(encoded: &str) -> Result<u32, ArmorError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| ArmorError::InvalidBase64(format!("checksum: {}", e)))?;

    match bytes.as_slice() {
        [a, b, c] => Ok(u32::from_be_bytes([0, *a, *b, *c])),
        _ => Err(ArmorError::InvalidBase64(format!(
            "checksum must be 3 bytes, got {}",
            bytes.len()
        ))),
    }
}

/// CRC-24 as defined for OpenPGP armor.
pub(crate) fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= u32::from(*byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKETS: &[u8] = b"\x99\x00\x03abc";

    #[test]
    fn test_crc24_known_values() {
        assert_eq!(crc24(b""), CRC24_INIT);
        // reference value for "123456789"
        assert_eq!(crc24(b"123456789"), 0x0021_CF02);
    }

    #[test]
    fn test_decode_encoded_public_key() {
        let armored = encode_armor(&ArmorKind::PublicKey, PACKETS);
        assert!(armored.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n"));

        let block = decode_armor(armored.as_bytes()).unwrap();
        assert_eq!(block.kind, ArmorKind::PublicKey);
        assert_eq!(block.packets, PACKETS);
        assert!(block.headers.is_empty());
    }

    #[test]
    fn test_decode_indented_begin_line() {
        let armored = format!(
            "  \t-----BEGIN PGP PUBLIC KEY BLOCK-----  \n\n{}\n  -----END PGP PUBLIC KEY BLOCK-----\n",
            BASE64.encode(PACKETS)
        );

        let block = decode_armor(armored.as_bytes()).unwrap();
        assert_eq!(block.kind, ArmorKind::PublicKey);
        assert_eq!(block.packets, PACKETS);
    }

    #[test]
    fn test_decode_with_headers_and_leading_text() {
        let armored = format!(
            "some preamble\n-----BEGIN PGP SIGNATURE-----\nVersion: GnuPG v2\nComment: test\n\n{}\n-----END PGP SIGNATURE-----\n",
            BASE64.encode(PACKETS)
        );

        let block = decode_armor(armored.as_bytes()).unwrap();
        assert_eq!(block.kind, ArmorKind::Signature);
        assert_eq!(
            block.headers,
            vec![
                ("Version".to_string(), "GnuPG v2".to_string()),
                ("Comment".to_string(), "test".to_string()),
            ]
        );
        assert_eq!(block.packets, PACKETS);
    }

    #[test]
    fn test_decode_without_blank_separator() {
        let armored = format!(
            "-----BEGIN PGP PUBLIC KEY BLOCK-----\n{}\n-----END PGP PUBLIC KEY BLOCK-----\n",
            BASE64.encode(PACKETS)
        );
        let block = decode_armor(armored.as_bytes()).unwrap();
        assert_eq!(block.packets, PACKETS);
    }

    #[test]
    fn test_checksum_mismatch() {
        let armored = encode_armor(&ArmorKind::PublicKey, PACKETS);
        let tampered = armored.replace(&BASE64.encode(PACKETS), &BASE64.encode(b"\x99\x00\x03abd"));

        let err = decode_armor(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, ArmorError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_unarmored_input() {
        assert_eq!(decode_armor(PACKETS), Err(ArmorError::MissingHeader));
    }

    #[test]
    fn test_missing_tail() {
        let armored = format!(
            "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n{}\n",
            BASE64.encode(PACKETS)
        );
        assert_eq!(
            decode_armor(armored.as_bytes()),
            Err(ArmorError::MissingTail("PUBLIC KEY BLOCK".to_string()))
        );
    }

    #[test]
    fn test_mismatched_tail() {
        let armored = format!(
            "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n{}\n-----END PGP SIGNATURE-----\n",
            BASE64.encode(PACKETS)
        );
        assert!(matches!(
            decode_armor(armored.as_bytes()),
            Err(ArmorError::MissingTail(_))
        ));
    }

    #[test]
    fn test_empty_body() {
        let armored = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n-----END PGP PUBLIC KEY BLOCK-----\n";
        assert_eq!(decode_armor(armored.as_bytes()), Err(ArmorError::Empty));
    }

    #[test]
    fn test_invalid_base64() {
        let armored = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n!!!not base64!!!\n-----END PGP PUBLIC KEY BLOCK-----\n";
        assert!(matches!(
            decode_armor(armored.as_bytes()),
            Err(ArmorError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_secret_key_labels() {
        for label in ["PRIVATE KEY BLOCK", "SECRET KEY BLOCK"] {
            let armored = format!(
                "-----BEGIN PGP {label}-----\n\n{}\n-----END PGP {label}-----\n",
                BASE64.encode(PACKETS)
            );
            let block = decode_armor(armored.as_bytes()).unwrap();
            assert_eq!(block.kind, ArmorKind::SecretKey);
        }
    }
}
