//! Principal identifiers
//!
//! A principal is treated as opaque text everywhere in the client. The only
//! place bytes are involved is when a principal is derived from key material,
//! where the textual form is `base32(crc32(bytes) ++ bytes)` in lowercase,
//! grouped in dash-separated chunks of five characters.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use std::fmt;

/// Byte tag appended to principals derived from a public key
const SELF_AUTHENTICATING_TAG: u8 = 0x02;

/// The anonymous principal is this single tag byte
const ANONYMOUS_TAG: u8 = 0x04;

/// Lowercase RFC 4648 base32 alphabet
const BASE32_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

const GROUP_LENGTH: usize = 5;

/// Opaque textual identifier of a caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap text received from a remote service. The text is never parsed.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Encode raw principal bytes into their textual form
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(bytes.len() + 4);
        payload.extend_from_slice(&crc32fast::hash(bytes).to_be_bytes());
        payload.extend_from_slice(bytes);

        let encoded = base32_encode(&payload);
        let groups: Vec<&str> = encoded
            .as_bytes()
            .chunks(GROUP_LENGTH)
            // The alphabet is ASCII, so every chunk is valid UTF-8
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect();

        Self(groups.join("-"))
    }

    /// The principal of unauthenticated callers
    pub fn anonymous() -> Self {
        Self::from_bytes(&[ANONYMOUS_TAG])
    }

    /// Principal controlled by the holder of the given DER-encoded public key
    pub fn self_authenticating(public_key_der: &[u8]) -> Self {
        let mut bytes = Sha224::digest(public_key_der).to_vec();
        bytes.push(SELF_AUTHENTICATING_TAG);
        Self::from_bytes(&bytes)
    }

    pub fn is_anonymous(&self) -> bool {
        *self == Self::anonymous()
    }

    pub fn as_text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unpadded base32 encoding
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let idx = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[idx] as char);
        }
    }

    if bits > 0 {
        let idx = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[idx] as char);
    }

    out
}
