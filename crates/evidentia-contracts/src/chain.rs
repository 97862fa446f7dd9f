//! Long-lived TSA chains and their entries.
//!
//! A `TsaChain` protects one document's content hash across years by being
//! re-sealed (re-timestamped) before the previous timestamp's trust anchor
//! weakens.  Its entries form a cumulative hash chain starting at sequence 0.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{ChainEntryId, ChainId, DocumentId, TenantId, TokenId},
    error::EvidentiaError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    LongTermArchive,
    Signature,
}

/// Lifecycle status of a chain.
///
/// `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Active,
    /// Tampering detected or reseal permanently failed. Needs manual work.
    Invalid,
    /// The document was re-archived under a newer chain.
    Superseded,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invalid => "invalid",
            Self::Superseded => "superseded",
        }
    }

    /// True if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ChainStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Invalid) | (Self::Active, Self::Superseded)
        )
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent verification (or reseal failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
    Invalid,
}

/// Why a chain entry was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResealReason {
    Initial,
    Scheduled,
    Manual,
    Forced,
}

impl ResealReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Forced => "forced",
        }
    }
}

impl FromStr for ResealReason {
    type Err = EvidentiaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            "forced" => Ok(Self::Forced),
            other => Err(EvidentiaError::InvalidInput {
                reason: format!("unknown reseal reason '{other}'"),
            }),
        }
    }
}

/// Chain head record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsaChain {
    pub id: ChainId,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub chain_type: ChainType,

    /// The original content hash this chain protects. Never changes.
    pub preserved_hash: String,

    pub initial_token_id: TokenId,
    pub status: ChainStatus,
    pub verification_status: VerificationStatus,

    /// Number of entries, including the initial seal.
    pub seal_count: u64,

    /// Reseal interval this chain was scheduled with.
    pub reseal_interval_days: u32,

    pub next_seal_due_at: DateTime<Utc>,
    pub last_sealed_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,

    /// Last permanent reseal failure, kept for operators.
    pub last_failure: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl TsaChain {
    /// True for chains an operator has to look at: failed verification or a
    /// permanently failed reseal.
    pub fn needs_attention(&self) -> bool {
        self.status == ChainStatus::Invalid
            || self.verification_status == VerificationStatus::Invalid
    }
}

/// One link in a `TsaChain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsaChainEntry {
    pub id: ChainEntryId,
    pub chain_id: ChainId,

    /// 0 for the initial seal, contiguous thereafter.
    pub sequence: u64,

    pub token_id: TokenId,
    pub previous_entry_id: Option<ChainEntryId>,

    /// `cumulative_hash` of the previous entry. `None` only for sequence 0.
    pub previous_entry_hash: Option<String>,

    /// H(previous cumulative hash, token timestamp, sealed hash).
    pub cumulative_hash: String,

    /// Hash of the protected artifact state at this seal.
    pub sealed_hash: String,

    pub reason: ResealReason,

    /// The token's `issued_at`, copied so the cumulative hash can be
    /// recomputed without the token.
    pub timestamp: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

/// What to anchor when a chain is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSubject {
    pub document_id: DocumentId,
    pub content_hash: String,
    pub chain_type: ChainType,
}

/// Result of a reseal request.
#[derive(Debug, Clone)]
pub enum ResealOutcome {
    /// A new entry was appended.
    Sealed(TsaChainEntry),
    /// The chain was sealed recently enough that a scheduled reseal was
    /// skipped.  Carries the current latest entry.
    AlreadySealed(TsaChainEntry),
}

impl ResealOutcome {
    pub fn entry(&self) -> &TsaChainEntry {
        match self {
            Self::Sealed(e) | Self::AlreadySealed(e) => e,
        }
    }

    pub fn is_new_seal(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }
}
