//! Trait seams of the Evidentia core.
//!
//! - `Auditable`    — capability of an entity to carry an audit trail
//! - `Clock`        — source of "now"
//! - `TsaClient`    — external time-stamping authority
//! - `ContentStore` — byte storage addressed by (disk, path)
//! - `AuditStore`, `ChainStore`, `ArchiveStore`, `PolicySource` — persisted
//!   state
//!
//! Only the engines mutate the audit and chain stores.  Store implementations
//! enforce the sequencing invariants themselves so a buggy caller cannot
//! fork a chain: appends are conditional on the head the writer observed.

use chrono::{DateTime, Utc};

use evidentia_contracts::{
    archive::{ArchivedDocument, DocumentRef, StorageLocation},
    audit::AuditTrailEntry,
    chain::{TsaChain, TsaChainEntry},
    entity::{ArchiveId, ChainId, DocumentId, EntityRef, TenantId, TokenId},
    error::EvResult,
    retention::RetentionPolicy,
    tsa::TsaToken,
};

/// An entity that carries an audit trail.
pub trait Auditable {
    /// The (kind, id) key the entity's trail is filed under.
    fn audit_key(&self) -> EntityRef;
}

impl Auditable for EntityRef {
    fn audit_key(&self) -> EntityRef {
        *self
    }
}

impl Auditable for DocumentRef {
    fn audit_key(&self) -> EntityRef {
        EntityRef::document(self.document_id)
    }
}

impl Auditable for ArchivedDocument {
    fn audit_key(&self) -> EntityRef {
        EntityRef::document(self.document_id)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// A time-stamping authority.
///
/// Implementations must be safe to call concurrently and must not have side
/// effects on Evidentia state: a failed request leaves nothing behind.
pub trait TsaClient: Send + Sync {
    /// Name recorded on every token this client issues.
    fn authority(&self) -> &str;

    /// Obtain a token attesting that `data_hash` exists now.
    ///
    /// Fails with `InvalidHash` for a malformed digest and with
    /// `TsaUnavailable` when the authority cannot be reached.
    fn request_timestamp(&self, tenant_id: TenantId, data_hash: &str) -> EvResult<TsaToken>;

    /// Check token structure, status and expiry at `now`, and any
    /// cryptographic material the client understands.
    fn verify_timestamp(&self, token: &TsaToken, now: DateTime<Utc>) -> bool;
}

/// Byte storage owned by the external document service.
pub trait ContentStore: Send + Sync {
    fn read(&self, location: &StorageLocation) -> EvResult<Vec<u8>>;
    fn write(&self, location: &StorageLocation, content: &[u8]) -> EvResult<()>;
    fn delete(&self, location: &StorageLocation) -> EvResult<()>;
    fn exists(&self, location: &StorageLocation) -> EvResult<bool>;
}

/// Last entry of an audit trail, as seen by a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailHead {
    pub sequence: u64,
    pub hash: String,
}

/// Persisted audit trail entries and their tokens.
pub trait AuditStore: Send + Sync {
    fn head(&self, tenant_id: TenantId, entity: EntityRef) -> EvResult<Option<TrailHead>>;

    /// Insert `entry` (and its token, if any) atomically.
    ///
    /// Must fail with `SequenceConflict` and write nothing unless
    /// `entry.sequence` is exactly head + 1 and `entry.previous_hash` equals
    /// the head hash (or the genesis hash for an empty trail).
    fn append(&self, entry: AuditTrailEntry, token: Option<TsaToken>) -> EvResult<()>;

    /// All entries for the entity, oldest first.
    fn entries(&self, tenant_id: TenantId, entity: EntityRef) -> EvResult<Vec<AuditTrailEntry>>;

    /// Up to `limit` entries with sequence greater than `after_sequence`.
    fn entries_after(
        &self,
        tenant_id: TenantId,
        entity: EntityRef,
        after_sequence: u64,
        limit: usize,
    ) -> EvResult<Vec<AuditTrailEntry>>;

    /// Entries for the entity in every tenant.  Admin use only.
    fn entries_any_tenant(&self, entity: EntityRef) -> EvResult<Vec<AuditTrailEntry>>;

    fn token(&self, tenant_id: TenantId, token_id: TokenId) -> EvResult<Option<TsaToken>>;
}

/// Persisted TSA chains, their entries and tokens.
pub trait ChainStore: Send + Sync {
    /// Insert a new chain with its sequence-0 entry and token atomically.
    fn create(&self, chain: TsaChain, entry: TsaChainEntry, token: TsaToken) -> EvResult<()>;

    fn chain(&self, tenant_id: TenantId, chain_id: ChainId) -> EvResult<Option<TsaChain>>;

    /// All entries of the chain, ordered by sequence.
    fn entries(&self, tenant_id: TenantId, chain_id: ChainId) -> EvResult<Vec<TsaChainEntry>>;

    fn latest_entry(&self, tenant_id: TenantId, chain_id: ChainId)
        -> EvResult<Option<TsaChainEntry>>;

    /// The chain head together with its entries, read as of one instant.
    fn snapshot(
        &self,
        tenant_id: TenantId,
        chain_id: ChainId,
    ) -> EvResult<Option<(TsaChain, Vec<TsaChainEntry>)>>;

    /// Append a reseal entry and replace the chain head atomically.
    ///
    /// Must fail with `SequenceConflict` and write nothing if the stored
    /// `seal_count` differs from `expected_seal_count`.
    fn append(
        &self,
        chain: TsaChain,
        entry: TsaChainEntry,
        token: TsaToken,
        expected_seal_count: u64,
    ) -> EvResult<()>;

    /// Replace mutable head fields (status, verification, schedule).
    ///
    /// Must reject changes to `preserved_hash` with `InvalidInput`, and a
    /// head whose `seal_count` is stale with `SequenceConflict`.
    fn update(&self, chain: TsaChain) -> EvResult<()>;

    fn token(&self, tenant_id: TenantId, token_id: TokenId) -> EvResult<Option<TsaToken>>;

    /// Active chains with `next_seal_due_at <= cutoff`, oldest due first.
    fn active_due_by(&self, cutoff: DateTime<Utc>) -> EvResult<Vec<TsaChain>>;

    /// Chains whose status or verification status is invalid.
    fn needing_attention(&self) -> EvResult<Vec<TsaChain>>;
}

/// Persisted archive records.
pub trait ArchiveStore: Send + Sync {
    fn insert(&self, document: ArchivedDocument) -> EvResult<()>;

    fn get(&self, tenant_id: TenantId, archive_id: ArchiveId) -> EvResult<Option<ArchivedDocument>>;

    /// The active (or migrating) archive record for a document, if any.
    fn find_by_document(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> EvResult<Option<ArchivedDocument>>;

    /// Replace the record if its stored `version` still equals
    /// `document.version`, and return it with the version bumped.
    ///
    /// A stale version fails with `ConcurrentModification` and writes
    /// nothing.
    fn update(&self, document: ArchivedDocument) -> EvResult<ArchivedDocument>;

    /// Drop a record that was inserted by an archive that did not complete.
    fn remove(&self, tenant_id: TenantId, archive_id: ArchiveId) -> EvResult<()>;

    /// Move an `Active` record to `Migrating` and return it, version bumped.
    ///
    /// Fails with `ConcurrentModification` if it is already migrating.
    fn claim_for_migration(
        &self,
        tenant_id: TenantId,
        archive_id: ArchiveId,
    ) -> EvResult<ArchivedDocument>;

    /// Every record across tenants, for the scheduled scans.
    fn all(&self) -> EvResult<Vec<ArchivedDocument>>;
}

/// Where retention policies come from.
pub trait PolicySource: Send + Sync {
    fn policies(&self) -> EvResult<Vec<RetentionPolicy>>;
}
