//! The hashing service.
//!
//! One algorithm for the whole system: chain verification assumes every
//! digest is a 64-character lowercase hex SHA-256.

use sha2::{Digest, Sha256};

use evidentia_contracts::error::{EvResult, EvidentiaError};

/// Name of the fixed digest algorithm, recorded in exports.
pub const HASH_ALGORITHM: &str = "sha256";

/// Length of a hex-encoded digest.
pub const HASH_HEX_LEN: usize = 64;

/// SHA-256 of `content` as lowercase hex.
pub fn hash_bytes(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// SHA-256 of the UTF-8 bytes of `s`.
pub fn hash_string(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash a sequence of fields with unambiguous framing.
///
/// Each part is prefixed with its length as 8-byte little-endian so that
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn hash_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// True if `s` is exactly 64 lowercase hex characters.
pub fn is_valid_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Fail fast with `InvalidHash` unless `s` is a well-formed digest.
pub fn require_valid_hash(s: &str) -> EvResult<()> {
    if is_valid_hash(s) {
        Ok(())
    } else {
        Err(EvidentiaError::InvalidHash {
            value: s.to_string(),
        })
    }
}

/// True if `content` hashes to `expected`.  A malformed `expected` never
/// matches.
pub fn verify_document_hash(content: &[u8], expected: &str) -> bool {
    is_valid_hash(expected) && hash_bytes(content) == expected
}
