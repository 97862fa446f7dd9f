//! Structured verification outcomes.
//!
//! These are the read contracts handed to verification-facing callers.  A
//! verification that finds a broken chain is a successful verification with
//! `valid = false`, never an error.

use serde::{Deserialize, Serialize};

/// Result of walking a hash chain (audit trail or TSA chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    /// True only if no error was found.
    pub valid: bool,
    pub entries_verified: u64,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,

    /// Every break found, in walk order.
    pub errors: Vec<String>,
}

impl ChainVerificationResult {
    /// The result for a chain with no entries.
    pub fn empty() -> Self {
        Self {
            valid: true,
            entries_verified: 0,
            first_sequence: None,
            last_sequence: None,
            errors: Vec::new(),
        }
    }
}

/// Result of an archive integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub errors: Vec<String>,

    /// The delegated TSA chain verification, when the chain could be read.
    pub chain: Option<ChainVerificationResult>,
}

/// How many independent checks passed.  Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceLevel {
    /// Map a count of passed checks (out of three) to a level.
    pub fn from_passed_checks(passed: usize) -> Self {
        match passed {
            0 => Self::None,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Component outcome of verifying a presented document against its archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicVerification {
    pub document_hash_matches: bool,
    pub chain_valid: bool,
    pub tsa_valid: bool,
    pub confidence: ConfidenceLevel,
}

impl PublicVerification {
    pub fn new(document_hash_matches: bool, chain_valid: bool, tsa_valid: bool) -> Self {
        let passed = [document_hash_matches, chain_valid, tsa_valid]
            .iter()
            .filter(|ok| **ok)
            .count();
        Self {
            document_hash_matches,
            chain_valid,
            tsa_valid,
            confidence: ConfidenceLevel::from_passed_checks(passed),
        }
    }
}
