//! Cumulative-hash primitives for TSA chains.
//!
//! Each chain entry commits to everything before it:
//!
//!   cumulative(n) = H(cumulative(n-1), token timestamp(n), sealed hash(n))
//!
//! with an empty previous part for entry 0.  The write path in the engine
//! and the verifier below both go through these functions.

use chrono::{DateTime, SecondsFormat, Utc};

use evidentia_contracts::{
    chain::{TsaChain, TsaChainEntry},
    verify::ChainVerificationResult,
};
use evidentia_core::hashing;

/// First sequence number of every chain.
pub const INITIAL_SEQUENCE: u64 = 0;

/// Cumulative hash of an entry.  `previous` is `None` only for entry 0.
pub fn compute_cumulative_hash(
    previous: Option<&str>,
    timestamp: DateTime<Utc>,
    sealed_hash: &str,
) -> String {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    hashing::hash_parts(&[
        previous.unwrap_or("").as_bytes(),
        timestamp.as_bytes(),
        sealed_hash.as_bytes(),
    ])
}

/// Fresh representation of the protected artifact at a reseal: the chain so
/// far bound to the preserved content hash.
pub fn reseal_sealed_hash(latest_cumulative: &str, preserved_hash: &str) -> String {
    hashing::hash_string(&format!("{latest_cumulative}|{preserved_hash}"))
}

/// The digest sent to the TSA for a reseal.
pub fn reseal_request_hash(previous_cumulative: &str, sealed_hash: &str) -> String {
    hashing::hash_string(&format!("{previous_cumulative}|{sealed_hash}"))
}

/// The digest the token of `entry` must carry.
///
/// Entry 0 timestamps the content hash itself; later entries timestamp the
/// link between the previous cumulative hash and the new sealed hash.
pub fn expected_token_hash(entry: &TsaChainEntry) -> String {
    match &entry.previous_entry_hash {
        Some(prev) => reseal_request_hash(prev, &entry.sealed_hash),
        None => entry.sealed_hash.clone(),
    }
}

/// Walk a chain's entries and report every break found.
///
/// Per entry: sequence contiguity from 0, linkage to the previous entry,
/// the sealed hash binding to the preserved hash, cumulative hash
/// recomputation, and whatever `check_token` reports.  The chain head is
/// checked for `seal_count` and the initial token.
///
/// `check_token` receives the entry and the instant at which its token must
/// still have been valid: the next entry's timestamp, or `None` for the
/// latest entry (checked at "now" by the caller).
pub fn verify_chain_entries<F>(
    chain: &TsaChain,
    entries: &[TsaChainEntry],
    mut check_token: F,
) -> ChainVerificationResult
where
    F: FnMut(&TsaChainEntry, Option<DateTime<Utc>>) -> Option<String>,
{
    let mut errors = Vec::new();

    if entries.is_empty() {
        errors.push("chain has no entries".to_string());
    }

    let mut expected_sequence = INITIAL_SEQUENCE;
    let mut previous: Option<&TsaChainEntry> = None;

    for (i, entry) in entries.iter().enumerate() {
        let seq = entry.sequence;

        if entry.chain_id != chain.id {
            errors.push(format!("entry {seq}: belongs to another chain"));
        }

        if seq > expected_sequence {
            errors.push(format!(
                "entry {seq}: sequence gap, expected {expected_sequence}"
            ));
        } else if seq < expected_sequence {
            errors.push(format!(
                "entry {seq}: duplicate or out-of-order sequence, expected {expected_sequence}"
            ));
        }

        match previous {
            None => {
                if entry.previous_entry_hash.is_some() || entry.previous_entry_id.is_some() {
                    errors.push(format!("entry {seq}: first entry must not link backwards"));
                }
                if entry.sealed_hash != chain.preserved_hash {
                    errors.push(format!(
                        "entry {seq}: initial seal does not cover the preserved hash"
                    ));
                }
                if entry.token_id != chain.initial_token_id {
                    errors.push(format!(
                        "entry {seq}: token differs from the chain's initial token"
                    ));
                }
            }
            Some(prev) => {
                if entry.previous_entry_hash.as_deref() != Some(prev.cumulative_hash.as_str())
                    || entry.previous_entry_id != Some(prev.id)
                {
                    errors.push(format!(
                        "entry {seq}: does not link to the preceding entry"
                    ));
                }
                let expected_sealed =
                    reseal_sealed_hash(&prev.cumulative_hash, &chain.preserved_hash);
                if entry.sealed_hash != expected_sealed {
                    errors.push(format!(
                        "entry {seq}: sealed hash does not bind the preserved hash"
                    ));
                }
            }
        }

        let recomputed = compute_cumulative_hash(
            entry.previous_entry_hash.as_deref(),
            entry.timestamp,
            &entry.sealed_hash,
        );
        if entry.cumulative_hash != recomputed {
            errors.push(format!(
                "entry {seq}: cumulative hash mismatch (stored {}, computed {})",
                entry.cumulative_hash, recomputed
            ));
        }

        let valid_until = entries.get(i + 1).map(|next| next.timestamp);
        if let Some(problem) = check_token(entry, valid_until) {
            errors.push(format!("entry {seq}: {problem}"));
        }

        expected_sequence = seq + 1;
        previous = Some(entry);
    }

    if chain.seal_count != entries.len() as u64 {
        errors.push(format!(
            "seal count {} does not match {} stored entries",
            chain.seal_count,
            entries.len()
        ));
    }

    ChainVerificationResult {
        valid: errors.is_empty(),
        entries_verified: entries.len() as u64,
        first_sequence: entries.first().map(|e| e.sequence),
        last_sequence: entries.last().map(|e| e.sequence),
        errors,
    }
}
