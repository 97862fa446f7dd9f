//! Audit trail entry types.
//!
//! `AuditTrailEntry` is a single link in a per-entity hash chain.  Entries are
//! created once by the audit engine and never mutated afterwards; any change
//! to a hashed field invalidates the entry's hash and every later link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{EntityRef, EntryId, TenantId, TokenId},
    verify::ChainVerificationResult,
};

/// Who caused an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    User,
    Signer,
    Api,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Signer => "signer",
            Self::Api => "api",
        }
    }
}

/// Actor type plus an optional identifier.  System events carry no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: None,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::User,
            actor_id: Some(id.into()),
        }
    }

    pub fn signer(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Signer,
            actor_id: Some(id.into()),
        }
    }
}

/// Request metadata captured alongside an event.  Not part of the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One immutable record of a domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub entity: EntityRef,

    /// Position in the entity's trail, starting at 1.
    pub sequence: u64,

    /// Dotted taxonomy, e.g. `document.uploaded`.
    pub event_type: String,

    /// Prefix of `event_type` before the first dot.
    pub event_category: String,

    pub payload: serde_json::Value,
    pub actor: Actor,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,

    /// `hash` of the previous entry, or `GENESIS_HASH` for sequence 1.
    pub previous_hash: String,

    /// SHA-256 over (sequence, event type, payload, actor, previous hash,
    /// created_at).
    pub hash: String,

    /// Present only for TSA-critical event types.
    pub tsa_token_id: Option<TokenId>,

    pub created_at: DateTime<Utc>,
}

impl AuditTrailEntry {
    /// The `previous_hash` of the first entry in every trail.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// First sequence number of every trail.
    pub const FIRST_SEQUENCE: u64 = 1;
}

/// Derive the category prefix of a dotted event type.
///
/// `document.uploaded` → `document`; an undotted type is its own category.
pub fn event_category(event_type: &str) -> &str {
    event_type.split('.').next().unwrap_or(event_type)
}

/// A sealed export of one entity's trail, suitable for handing to an auditor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub tenant_id: TenantId,
    pub entity: EntityRef,
    pub entries: Vec<AuditTrailEntry>,

    /// `hash` of the last entry; `GENESIS_HASH` for an empty trail.
    pub terminal_hash: String,

    pub exported_at: DateTime<Utc>,
    pub verification: ChainVerificationResult,
}
