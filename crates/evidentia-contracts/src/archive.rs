//! Archived document records and storage tiers.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{ArchiveId, ChainId, DocumentId, PolicyId, TenantId},
    error::EvidentiaError,
};

/// Storage classes trading access latency for cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveTier {
    Hot,
    Cold,
    Archive,
}

impl ArchiveTier {
    pub const ALL: [ArchiveTier; 3] = [Self::Hot, Self::Cold, Self::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Cold => "cold",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for ArchiveTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveTier {
    type Err = EvidentiaError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(Self::Hot),
            "cold" => Ok(Self::Cold),
            "archive" => Ok(Self::Archive),
            _ => Err(EvidentiaError::InvalidTier {
                tier: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Active,
    /// A tier move is in flight.  Acts as a claim on the record.
    Migrating,
    PendingDeletion,
    Expired,
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Migrating => "migrating",
            Self::PendingDeletion => "pending_deletion",
            Self::Expired => "expired",
        }
    }
}

/// Where bytes live: a named disk plus a path on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub disk: String,
    pub path: String,
}

impl StorageLocation {
    pub fn new(disk: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            disk: disk.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.disk, self.path)
    }
}

/// A document as handed over by the external document service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub document_type: Option<String>,

    /// Where the document service keeps the original bytes.
    pub location: StorageLocation,

    /// Content hash already known to the document service, if any.
    pub content_hash: Option<String>,
}

/// A document's presence in long-term storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedDocument {
    pub id: ArchiveId,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub document_type: Option<String>,
    pub tier: ArchiveTier,
    pub status: ArchiveStatus,

    /// SHA-256 of the archived bytes.
    pub archive_hash: String,

    pub location: StorageLocation,
    pub retention_policy_id: PolicyId,
    pub retention_expires_at: DateTime<Utc>,
    pub next_reseal_at: DateTime<Utc>,
    pub chain_id: ChainId,
    pub pdfa_required: bool,
    pub archived_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub tier_changed_at: DateTime<Utc>,

    /// Bumped by the store on every write.  An update carrying an older
    /// version is refused.
    #[serde(default)]
    pub version: u64,
}

impl ArchivedDocument {
    /// The last time anyone touched the document: last access, else archival.
    pub fn last_touched_at(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.archived_at)
    }
}

/// Handle returned by a restore, for rehydration by the document service.
#[derive(Debug, Clone)]
pub struct RestoredDocument {
    pub archive_id: ArchiveId,
    pub document_id: DocumentId,
    pub location: StorageLocation,
    pub content: Vec<u8>,
}
