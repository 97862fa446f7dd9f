//! Hash-chain primitives for audit trails.
//!
//! `compute_entry_hash` is the only place an entry hash is computed.  The
//! write path and the verify path both call it, so what was hashed and what
//! is re-hashed cannot drift apart.
//!
//! Hash input layout (each part length-prefixed, see `hashing::hash_parts`):
//!   1. sequence as 8-byte little-endian
//!   2. event type
//!   3. canonical JSON of the payload (object keys sorted)
//!   4. actor type name
//!   5. actor id, or the empty string
//!   6. previous hash (64 ASCII hex chars)
//!   7. created_at as RFC 3339 with nanoseconds

use chrono::{DateTime, SecondsFormat, Utc};

use evidentia_contracts::{
    audit::{event_category, AuditTrailEntry},
    verify::ChainVerificationResult,
};
use evidentia_core::hashing;

/// The fields an entry hash commits to.
#[derive(Debug, Clone, Copy)]
pub struct EntryHashInput<'a> {
    pub sequence: u64,
    pub event_type: &'a str,
    pub payload: &'a serde_json::Value,
    pub actor_type: &'a str,
    pub actor_id: Option<&'a str>,
    pub previous_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> EntryHashInput<'a> {
    /// Borrow the hashed fields of a stored entry.
    pub fn of(entry: &'a AuditTrailEntry) -> Self {
        Self {
            sequence: entry.sequence,
            event_type: &entry.event_type,
            payload: &entry.payload,
            actor_type: entry.actor.actor_type.as_str(),
            actor_id: entry.actor.actor_id.as_deref(),
            previous_hash: &entry.previous_hash,
            created_at: entry.created_at,
        }
    }
}

/// Compute the SHA-256 hash for one audit entry.
///
/// Returns a lowercase 64-character hex string.
pub fn compute_entry_hash(input: &EntryHashInput<'_>) -> String {
    // serde_json's default map is ordered, so `to_string` is canonical.
    let payload = input.payload.to_string();
    let created_at = input.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);

    hashing::hash_parts(&[
        &input.sequence.to_le_bytes(),
        input.event_type.as_bytes(),
        payload.as_bytes(),
        input.actor_type.as_bytes(),
        input.actor_id.unwrap_or("").as_bytes(),
        input.previous_hash.as_bytes(),
        created_at.as_bytes(),
    ])
}

/// Walk `entries` in order and report every integrity break found.
///
/// Checks, per entry:
///
/// 1. **Contiguity** — sequence numbers run 1, 2, 3, … with no gap or
///    duplicate.
/// 2. **Linkage** — `previous_hash` equals the stored `hash` of the entry
///    before it, or `GENESIS_HASH` for the first.
/// 3. **Hash correctness** — the stored `hash` equals the recomputed one.
/// 4. **Category** — `event_category` matches the event type prefix.
/// 5. Whatever `check_token` reports for entries carrying a TSA token.
///
/// Verification never stops at the first break.  An empty slice is valid.
pub fn verify_entries<F>(entries: &[AuditTrailEntry], mut check_token: F) -> ChainVerificationResult
where
    F: FnMut(&AuditTrailEntry) -> Option<String>,
{
    if entries.is_empty() {
        return ChainVerificationResult::empty();
    }

    let mut errors = Vec::new();
    let mut expected_sequence = AuditTrailEntry::FIRST_SEQUENCE;
    let mut expected_prev = AuditTrailEntry::GENESIS_HASH.to_string();

    for entry in entries {
        let seq = entry.sequence;

        if seq != expected_sequence {
            if seq > expected_sequence {
                errors.push(format!(
                    "entry {seq}: sequence gap, expected {expected_sequence}"
                ));
            } else {
                errors.push(format!(
                    "entry {seq}: duplicate or out-of-order sequence, expected {expected_sequence}"
                ));
            }
        }

        if entry.previous_hash != expected_prev {
            errors.push(format!(
                "entry {seq}: previous_hash does not link to the preceding entry"
            ));
        }

        let recomputed = compute_entry_hash(&EntryHashInput::of(entry));
        if entry.hash != recomputed {
            errors.push(format!(
                "entry {seq}: hash mismatch (stored {}, computed {})",
                entry.hash, recomputed
            ));
        }

        if entry.event_category != event_category(&entry.event_type) {
            errors.push(format!(
                "entry {seq}: event category '{}' does not match event type '{}'",
                entry.event_category, entry.event_type
            ));
        }

        if entry.tsa_token_id.is_some() {
            if let Some(problem) = check_token(entry) {
                errors.push(format!("entry {seq}: {problem}"));
            }
        }

        expected_sequence = seq + 1;
        expected_prev = entry.hash.clone();
    }

    ChainVerificationResult {
        valid: errors.is_empty(),
        entries_verified: entries.len() as u64,
        first_sequence: entries.first().map(|e| e.sequence),
        last_sequence: entries.last().map(|e| e.sequence),
        errors,
    }
}
