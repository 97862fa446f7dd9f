//! The archive tier manager.
//!
//! An archived document is a copy of the document's bytes on one of three
//! disks, plus a record tying it to its retention policy and TSA chain.
//!
//! `archive()` flow:
//!
//!   read source → hash → resolve policy → write hot copy → init chain
//!              → audit → retire previous record → insert record
//!              → supersede previous chain
//!
//! A failure after the hot copy is written removes it again, retires the
//! new chain and reinstates the previous record, so a failed archive leaves
//! no stray bytes, chains or records behind.
//!
//! Records carry a `version`; every write is a compare-and-swap on it, so a
//! restore or schedule sync never overwrites a concurrent tier move.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::{debug, info, warn};

use evidentia_contracts::{
    archive::{
        ArchiveStatus, ArchiveTier, ArchivedDocument, DocumentRef, RestoredDocument,
        StorageLocation,
    },
    audit::{Actor, RequestMeta},
    chain::{ChainStatus, ChainSubject, ChainType},
    entity::{ArchiveId, ChainId, DocumentId},
    error::{EvResult, EvidentiaError},
    retention::PolicySubject,
    verify::{IntegrityReport, PublicVerification},
};
use evidentia_core::{
    config::ArchiveConfig,
    hashing,
    traits::{ArchiveStore, Clock, ContentStore},
    TenantContext,
};
use evidentia_audit::AuditTrailEngine;
use evidentia_reseal::ResealEngine;
use evidentia_retention::RetentionResolver;

/// How often a record write re-reads a record that changed underneath.
const WRITE_ATTEMPTS: u32 = 3;

/// Writers other than `move_tier` keep off a record while it migrates.
fn ensure_settled(record: &ArchivedDocument) -> EvResult<()> {
    if record.status == ArchiveStatus::Migrating {
        return Err(EvidentiaError::ConcurrentModification {
            resource: format!("archive {}", record.id),
        });
    }
    Ok(())
}

pub struct ArchiveManager {
    store: Arc<dyn ArchiveStore>,
    content: Arc<dyn ContentStore>,
    resolver: Arc<RetentionResolver>,
    reseal: Arc<ResealEngine>,
    clock: Arc<dyn Clock>,
    config: ArchiveConfig,
    audit: Option<Arc<AuditTrailEngine>>,
}

impl ArchiveManager {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        content: Arc<dyn ContentStore>,
        resolver: Arc<RetentionResolver>,
        reseal: Arc<ResealEngine>,
        clock: Arc<dyn Clock>,
        config: ArchiveConfig,
    ) -> Self {
        Self {
            store,
            content,
            resolver,
            reseal,
            clock,
            config,
            audit: None,
        }
    }

    /// Record archive lifecycle events on the document's audit trail.
    pub fn with_audit(mut self, audit: Arc<AuditTrailEngine>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn reseal_engine(&self) -> &Arc<ResealEngine> {
        &self.reseal
    }

    fn location_for(
        &self,
        tier: ArchiveTier,
        ctx: &TenantContext,
        document_id: DocumentId,
        archive_id: ArchiveId,
    ) -> StorageLocation {
        StorageLocation::new(
            self.config.disk_for(tier),
            format!(
                "{}/{}/{}/{}",
                self.config.path_prefix, ctx.tenant_id, document_id, archive_id
            ),
        )
    }

    fn get(&self, ctx: &TenantContext, archive_id: ArchiveId) -> EvResult<ArchivedDocument> {
        self.store
            .get(ctx.tenant_id, archive_id)?
            .ok_or_else(|| EvidentiaError::ArchiveNotFound {
                archive_id: archive_id.to_string(),
            })
    }

    fn audit_event(
        &self,
        ctx: &TenantContext,
        document: &ArchivedDocument,
        event_type: &str,
        payload: serde_json::Value,
    ) -> EvResult<()> {
        if let Some(audit) = &self.audit {
            audit.record(
                Some(ctx),
                document,
                event_type,
                payload,
                Actor::system(),
                RequestMeta::default(),
            )?;
        }
        Ok(())
    }

    /// Archive `document` on the hot tier under a fresh TSA chain.
    ///
    /// All or nothing: when any step after the hot copy fails, the copy is
    /// deleted, the new chain retired and a previous archive reinstated.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the document belongs to another tenant or its
    ///   bytes do not match the hash the document service reported
    /// - `NoPolicyFound` when no retention policy resolves
    /// - `TsaUnavailable` when the initial seal or the audit timestamp
    ///   cannot be obtained
    /// - `ConcurrentModification` while a previous archive is migrating or
    ///   changed underneath
    pub fn archive(&self, ctx: &TenantContext, document: &DocumentRef) -> EvResult<ArchivedDocument> {
        if document.tenant_id != ctx.tenant_id {
            return Err(EvidentiaError::InvalidInput {
                reason: format!("document {} belongs to another tenant", document.document_id),
            });
        }

        let bytes = self.content.read(&document.location)?;
        let archive_hash = hashing::hash_bytes(&bytes);
        if let Some(expected) = &document.content_hash {
            if *expected != archive_hash {
                return Err(EvidentiaError::InvalidInput {
                    reason: format!(
                        "document {} content does not match its recorded hash",
                        document.document_id
                    ),
                });
            }
        }

        let previous = self
            .store
            .find_by_document(ctx.tenant_id, document.document_id)?;
        if let Some(prev) = &previous {
            if prev.status == ArchiveStatus::Migrating {
                return Err(EvidentiaError::ConcurrentModification {
                    resource: format!("archive {}", prev.id),
                });
            }
            // The old chain must at least be readable before anything is written.
            self.reseal.chain(ctx, prev.chain_id)?;
        }

        let policy = self.resolver.policy_for_document(&PolicySubject {
            tenant_id: ctx.tenant_id,
            document_type: document.document_type.clone(),
        })?;
        let now = self.clock.now();
        let applied = self.resolver.apply_policy(now, &policy)?;

        let archive_id = ArchiveId::new();
        let location = self.location_for(ArchiveTier::Hot, ctx, document.document_id, archive_id);
        self.content.write(&location, &bytes)?;

        let chain = match self.reseal.initialize_chain(
            ctx,
            &ChainSubject {
                document_id: document.document_id,
                content_hash: archive_hash.clone(),
                chain_type: ChainType::LongTermArchive,
            },
            applied.reseal_interval_days,
        ) {
            Ok(chain) => chain,
            Err(e) => {
                self.discard_copy(&location);
                return Err(e);
            }
        };

        let record = ArchivedDocument {
            id: archive_id,
            tenant_id: ctx.tenant_id,
            document_id: document.document_id,
            document_type: document.document_type.clone(),
            tier: ArchiveTier::Hot,
            status: ArchiveStatus::Active,
            archive_hash,
            location,
            retention_policy_id: applied.retention_policy_id,
            retention_expires_at: applied.retention_expires_at,
            next_reseal_at: chain.next_seal_due_at,
            chain_id: chain.id,
            pdfa_required: applied.pdfa_required,
            archived_at: now,
            last_accessed_at: None,
            tier_changed_at: now,
            version: 0,
        };

        // An audit entry cannot be undone; it precedes the commit.
        let audited = self.audit_event(
            ctx,
            &record,
            "document.archived",
            json!({
                "archive_id": record.id.to_string(),
                "archive_hash": record.archive_hash,
                "chain_id": record.chain_id.to_string(),
                "retention_policy": policy.name,
            }),
        );
        if let Err(e) = audited.and_then(|()| self.commit_archive(ctx, &record, previous)) {
            self.discard_archive(ctx, &record);
            return Err(e);
        }

        info!(
            tenant_id = %ctx.tenant_id,
            archive_id = %record.id,
            document_id = %record.document_id,
            policy = %policy.name,
            retention_expires_at = %record.retention_expires_at,
            "document archived"
        );
        Ok(record)
    }

    /// Persist `record` and retire `previous`, undoing its own writes on
    /// failure.
    fn commit_archive(
        &self,
        ctx: &TenantContext,
        record: &ArchivedDocument,
        previous: Option<ArchivedDocument>,
    ) -> EvResult<()> {
        let retired = match previous {
            Some(mut prev) => {
                prev.status = ArchiveStatus::PendingDeletion;
                Some(self.store.update(prev)?)
            }
            None => None,
        };

        if let Err(e) = self.store.insert(record.clone()) {
            self.reinstate(retired);
            return Err(e);
        }

        if let Some(prev) = &retired {
            if let Err(e) = self.retire_chain(ctx, prev.chain_id) {
                if let Err(undo) = self.store.remove(ctx.tenant_id, record.id) {
                    warn!(archive_id = %record.id, error = %undo, "failed to remove new record");
                }
                self.reinstate(retired);
                return Err(e);
            }
            info!(
                archive_id = %prev.id,
                chain_id = %prev.chain_id,
                "previous archive superseded"
            );
        }
        Ok(())
    }

    /// Supersede an active chain.  A chain already invalid or superseded is
    /// replaced as it is.
    fn retire_chain(&self, ctx: &TenantContext, chain_id: ChainId) -> EvResult<()> {
        let chain = self.reseal.chain(ctx, chain_id)?;
        if chain.status != ChainStatus::Active {
            debug!(chain_id = %chain_id, status = %chain.status, "previous chain left as is");
            return Ok(());
        }
        match self.reseal.supersede(ctx, chain_id) {
            Ok(_) => Ok(()),
            // Invalidated by a concurrent verification.
            Err(EvidentiaError::InvalidStateTransition { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn reinstate(&self, retired: Option<ArchivedDocument>) {
        if let Some(mut prev) = retired {
            prev.status = ArchiveStatus::Active;
            if let Err(e) = self.store.update(prev) {
                warn!(error = %e, "failed to reinstate previous archive");
            }
        }
    }

    /// Undo the uncommitted parts of an archive: its chain and hot copy.
    fn discard_archive(&self, ctx: &TenantContext, record: &ArchivedDocument) {
        if let Err(e) = self.reseal.supersede(ctx, record.chain_id) {
            warn!(chain_id = %record.chain_id, error = %e, "failed to retire abandoned chain");
        }
        self.discard_copy(&record.location);
    }

    fn discard_copy(&self, location: &StorageLocation) {
        if let Err(e) = self.content.delete(location) {
            warn!(location = %location, error = %e, "failed to remove abandoned copy");
        }
    }

    /// Move the archived copy to `target` (`hot`, `cold` or `archive`).
    ///
    /// Moving to the current tier is a no-op.  The copy on the new tier is
    /// read back and hash-checked, and the move audited, before the record
    /// switches over and the old copy is deleted.  A failed move releases
    /// the claim and leaves the record on its old copy.
    pub fn move_tier(
        &self,
        ctx: &TenantContext,
        archive_id: ArchiveId,
        target: &str,
    ) -> EvResult<ArchivedDocument> {
        let target: ArchiveTier = target.parse()?;

        let current = self.get(ctx, archive_id)?;
        if current.tier == target && current.status == ArchiveStatus::Active {
            debug!(archive_id = %archive_id, tier = %target, "already on target tier");
            return Ok(current);
        }

        let claimed = self.store.claim_for_migration(ctx.tenant_id, archive_id)?;
        let destination = self.location_for(target, ctx, claimed.document_id, claimed.id);
        let relocating = destination != claimed.location;

        let staged = if relocating {
            self.stage_copy(&claimed, &destination)
        } else {
            Ok(())
        };
        let switched = staged
            .and_then(|()| {
                self.audit_event(
                    ctx,
                    &claimed,
                    "document.tier_changed",
                    json!({
                        "archive_id": archive_id.to_string(),
                        "from": claimed.tier.as_str(),
                        "to": target.as_str(),
                    }),
                )
            })
            .and_then(|()| {
                let mut moved = claimed.clone();
                moved.tier = target;
                moved.location = destination.clone();
                moved.tier_changed_at = self.clock.now();
                moved.status = ArchiveStatus::Active;
                self.store.update(moved)
            });

        match switched {
            Ok(moved) => {
                // The record already points at the new copy; a leftover old
                // copy is harmless.
                if relocating {
                    if let Err(e) = self.content.delete(&claimed.location) {
                        warn!(
                            location = %claimed.location,
                            error = %e,
                            "failed to remove previous tier copy"
                        );
                    }
                }
                info!(
                    tenant_id = %ctx.tenant_id,
                    archive_id = %archive_id,
                    from = %claimed.tier,
                    to = %target,
                    "archive tier changed"
                );
                Ok(moved)
            }
            Err(e) => {
                if relocating {
                    self.discard_copy(&destination);
                }
                let mut released = claimed;
                released.status = ArchiveStatus::Active;
                if let Err(release) = self.store.update(released) {
                    warn!(archive_id = %archive_id, error = %release, "failed to release claim");
                }
                warn!(archive_id = %archive_id, to = %target, error = %e, "tier move failed");
                Err(e)
            }
        }
    }

    /// Write the record's bytes to `destination` and check them back.
    fn stage_copy(&self, record: &ArchivedDocument, destination: &StorageLocation) -> EvResult<()> {
        let bytes = self.content.read(&record.location)?;
        self.content.write(destination, &bytes)?;

        let copied = self.content.read(destination)?;
        if !hashing::verify_document_hash(&copied, &record.archive_hash) {
            return Err(EvidentiaError::Storage {
                reason: format!(
                    "copy of archive {} on {} failed its hash check",
                    record.id, destination.disk
                ),
            });
        }
        Ok(())
    }

    /// Check stored bytes against the archive hash and verify the chain.
    ///
    /// Integrity problems are reported in the result, never as `Err`.
    pub fn verify_integrity(
        &self,
        ctx: &TenantContext,
        archive_id: ArchiveId,
    ) -> EvResult<IntegrityReport> {
        let record = self.get(ctx, archive_id)?;
        let mut errors = Vec::new();

        if !self.content.exists(&record.location)? {
            errors.push(format!("content missing at {}", record.location));
        } else {
            let bytes = self.content.read(&record.location)?;
            if !hashing::verify_document_hash(&bytes, &record.archive_hash) {
                errors.push("content hash mismatch".to_string());
            }
        }

        let chain = match self.reseal.chain(ctx, record.chain_id) {
            Ok(head) => {
                if head.preserved_hash != record.archive_hash {
                    errors.push("TSA chain does not protect the archived hash".to_string());
                }
                let result = self.reseal.verify_chain(ctx, record.chain_id)?;
                if !result.valid {
                    errors.push(format!(
                        "TSA chain invalid: {} problem(s)",
                        result.errors.len()
                    ));
                }
                Some(result)
            }
            Err(e) => {
                errors.push(format!("TSA chain unavailable: {e}"));
                None
            }
        };

        if errors.is_empty() {
            debug!(archive_id = %archive_id, "archive integrity verified");
        } else {
            warn!(
                tenant_id = %ctx.tenant_id,
                archive_id = %archive_id,
                errors = errors.len(),
                "archive integrity check failed"
            );
        }

        Ok(IntegrityReport {
            is_valid: errors.is_empty(),
            errors,
            chain,
        })
    }

    /// Check `presented` bytes against an archive, component by component.
    pub fn verify_document(
        &self,
        ctx: &TenantContext,
        archive_id: ArchiveId,
        presented: &[u8],
    ) -> EvResult<PublicVerification> {
        let record = self.get(ctx, archive_id)?;
        let document_hash_matches = hashing::verify_document_hash(presented, &record.archive_hash);
        let chain_valid = self.reseal.verify_chain(ctx, record.chain_id)?.valid;
        let tsa_valid = self.reseal.latest_token_valid(ctx, record.chain_id)?;

        let outcome = PublicVerification::new(document_hash_matches, chain_valid, tsa_valid);
        debug!(archive_id = %archive_id, confidence = ?outcome.confidence, "document verified");
        Ok(outcome)
    }

    /// Read the archived bytes back for the document service.
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` while the record is migrating between tiers;
    /// `Storage` if the stored bytes no longer match the archive hash.
    pub fn restore(&self, ctx: &TenantContext, archive_id: ArchiveId) -> EvResult<RestoredDocument> {
        let record = self.get(ctx, archive_id)?;
        ensure_settled(&record)?;
        let content = self.content.read(&record.location)?;
        if !hashing::verify_document_hash(&content, &record.archive_hash) {
            return Err(EvidentiaError::Storage {
                reason: format!("archive {archive_id} content hash mismatch, refusing to restore"),
            });
        }

        self.audit_event(
            ctx,
            &record,
            "document.restored",
            json!({ "archive_id": archive_id.to_string(), "tier": record.tier.as_str() }),
        )?;
        let now = self.clock.now();
        let touched = self.modify(ctx, archive_id, |r| {
            r.last_accessed_at = Some(now);
            Ok(())
        })?;
        info!(tenant_id = %ctx.tenant_id, archive_id = %archive_id, "archive restored");

        Ok(RestoredDocument {
            archive_id,
            document_id: touched.document_id,
            location: touched.location,
            content,
        })
    }

    /// Copy the chain's next due date onto the archive record.
    pub fn sync_reseal_schedule(
        &self,
        ctx: &TenantContext,
        archive_id: ArchiveId,
    ) -> EvResult<ArchivedDocument> {
        let record = self.get(ctx, archive_id)?;
        let chain = self.reseal.chain(ctx, record.chain_id)?;
        if record.next_reseal_at == chain.next_seal_due_at {
            return Ok(record);
        }
        self.modify(ctx, archive_id, |r| {
            r.next_reseal_at = chain.next_seal_due_at;
            Ok(())
        })
    }

    /// Push back retention and persist the result.
    pub fn extend_retention(
        &self,
        ctx: &TenantContext,
        archive_id: ArchiveId,
        years: i32,
        days: i32,
    ) -> EvResult<ArchivedDocument> {
        self.modify(ctx, archive_id, |r| {
            *r = self.resolver.extend_retention(r, years, days)?;
            Ok(())
        })
    }

    /// Apply `change` to a fresh read of the record until the write lands on
    /// the version it read.
    fn modify<F>(
        &self,
        ctx: &TenantContext,
        archive_id: ArchiveId,
        mut change: F,
    ) -> EvResult<ArchivedDocument>
    where
        F: FnMut(&mut ArchivedDocument) -> EvResult<()>,
    {
        let mut attempt = 1;
        loop {
            let mut record = self.get(ctx, archive_id)?;
            ensure_settled(&record)?;
            change(&mut record)?;
            match self.store.update(record) {
                Err(EvidentiaError::ConcurrentModification { .. }) if attempt < WRITE_ATTEMPTS => {
                    debug!(archive_id = %archive_id, attempt, "archive record changed, re-reading");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn archived(&self, ctx: &TenantContext, archive_id: ArchiveId) -> EvResult<ArchivedDocument> {
        self.get(ctx, archive_id)
    }

    pub fn find_by_document(
        &self,
        ctx: &TenantContext,
        document_id: DocumentId,
    ) -> EvResult<Option<ArchivedDocument>> {
        self.store.find_by_document(ctx.tenant_id, document_id)
    }

    // ── Scheduled scans (all tenants) ─────────────────────────────────────────

    fn active(&self) -> EvResult<Vec<ArchivedDocument>> {
        Ok(self
            .store
            .all()?
            .into_iter()
            .filter(|d| d.status == ArchiveStatus::Active)
            .collect())
    }

    /// Active archives whose reseal is due within `grace_days`.
    pub fn documents_due_for_reseal(&self, grace_days: u32) -> EvResult<Vec<ArchivedDocument>> {
        let cutoff = self.clock.now() + Duration::days(i64::from(grace_days));
        let mut due: Vec<ArchivedDocument> = self
            .active()?
            .into_iter()
            .filter(|d| d.next_reseal_at <= cutoff)
            .collect();
        due.sort_by_key(|d| (d.next_reseal_at, d.id));
        Ok(due)
    }

    /// Active archives that have gone untouched long enough to move down a
    /// tier, each paired with its target tier.
    pub fn documents_for_tier_migration(&self) -> EvResult<Vec<(ArchivedDocument, ArchiveTier)>> {
        let now = self.clock.now();
        let hot_cutoff = now - Duration::days(i64::from(self.config.hot_to_cold_days));
        let cold_cutoff = now - Duration::days(i64::from(self.config.cold_to_archive_days));

        Ok(self
            .active()?
            .into_iter()
            .filter_map(|d| {
                let idle_since = d.last_touched_at();
                match d.tier {
                    ArchiveTier::Hot if idle_since <= hot_cutoff => Some((d, ArchiveTier::Cold)),
                    ArchiveTier::Cold if idle_since <= cold_cutoff => {
                        Some((d, ArchiveTier::Archive))
                    }
                    _ => None,
                }
            })
            .collect())
    }

    pub fn documents_expiring(&self, within_days: u32) -> EvResult<Vec<ArchivedDocument>> {
        Ok(self
            .active()?
            .into_iter()
            .filter(|d| self.resolver.is_expiring_soon(d, within_days))
            .collect())
    }

    pub fn expired_documents(&self) -> EvResult<Vec<ArchivedDocument>> {
        Ok(self
            .active()?
            .into_iter()
            .filter(|d| self.resolver.is_expired(d))
            .collect())
    }
}
