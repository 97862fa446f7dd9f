//! The audit trail engine.
//!
//! `record()` is the only write path into an `AuditStore`.  Pipeline per
//! call:
//!
//!   tenant → validate → read head → hash → [TSA token] → conditional append
//!
//! Sequencing uses optimistic concurrency: the store refuses an append whose
//! sequence or previous hash no longer matches the head, and the engine
//! re-reads the head and tries again.  The TSA token, when required, is
//! obtained before the append and persisted in the same store operation, so
//! no entry ever exists without its token.

use std::sync::Arc;

use tracing::{debug, info, warn};

use evidentia_contracts::{
    audit::{event_category, Actor, AuditExport, AuditTrailEntry, RequestMeta},
    entity::{EntryId, TenantId},
    error::{EvResult, EvidentiaError},
    tsa::TsaToken,
    verify::ChainVerificationResult,
};
use evidentia_core::{
    config::AuditConfig,
    require_tenant,
    traits::{AuditStore, Auditable, Clock, TsaClient},
    CrossTenantGrant, TenantContext,
};

use crate::chain::{compute_entry_hash, verify_entries, EntryHashInput};

/// Reject event types outside the dotted `[a-z0-9_]` taxonomy.
pub fn validate_event_type(event_type: &str) -> EvResult<()> {
    let well_formed = !event_type.is_empty()
        && event_type.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        });
    if well_formed {
        Ok(())
    } else {
        Err(EvidentiaError::InvalidEventType {
            event_type: event_type.to_string(),
        })
    }
}

/// Appends and verifies per-entity audit trails.
pub struct AuditTrailEngine {
    store: Arc<dyn AuditStore>,
    tsa: Arc<dyn TsaClient>,
    clock: Arc<dyn Clock>,
    config: AuditConfig,
}

impl AuditTrailEngine {
    pub fn new(
        store: Arc<dyn AuditStore>,
        tsa: Arc<dyn TsaClient>,
        clock: Arc<dyn Clock>,
        config: AuditConfig,
    ) -> Self {
        Self {
            store,
            tsa,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Append one event to `subject`'s trail.
    ///
    /// # Errors
    ///
    /// - `NoTenantContext` if `ctx` is `None`
    /// - `InvalidEventType` for a malformed event type
    /// - `TsaUnavailable` if the event is TSA-critical and no token could be
    ///   obtained; nothing is persisted
    /// - `SequenceConflict` if the append lost the race more than
    ///   `max_append_retries` times
    pub fn record(
        &self,
        ctx: Option<&TenantContext>,
        subject: &dyn Auditable,
        event_type: &str,
        payload: serde_json::Value,
        actor: Actor,
        meta: RequestMeta,
    ) -> EvResult<AuditTrailEntry> {
        let tenant_id = require_tenant(ctx)?;
        validate_event_type(event_type)?;

        let entity = subject.audit_key();
        let critical = self.config.is_critical(tenant_id, event_type);
        let max_attempts = self.config.max_append_retries.max(1);

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let (sequence, previous_hash) = match self.store.head(tenant_id, entity)? {
                Some(head) => (head.sequence + 1, head.hash),
                None => (
                    AuditTrailEntry::FIRST_SEQUENCE,
                    AuditTrailEntry::GENESIS_HASH.to_string(),
                ),
            };
            let created_at = self.clock.now();

            let hash = compute_entry_hash(&EntryHashInput {
                sequence,
                event_type,
                payload: &payload,
                actor_type: actor.actor_type.as_str(),
                actor_id: actor.actor_id.as_deref(),
                previous_hash: &previous_hash,
                created_at,
            });

            // A failed TSA request aborts here, before anything is written.
            let token: Option<TsaToken> = if critical {
                Some(self.tsa.request_timestamp(tenant_id, &hash)?)
            } else {
                None
            };

            let entry = AuditTrailEntry {
                id: EntryId::new(),
                tenant_id,
                entity,
                sequence,
                event_type: event_type.to_string(),
                event_category: event_category(event_type).to_string(),
                payload: payload.clone(),
                actor: actor.clone(),
                ip_address: meta.ip_address.clone(),
                user_agent: meta.user_agent.clone(),
                previous_hash,
                hash,
                tsa_token_id: token.as_ref().map(|t| t.id),
                created_at,
            };

            match self.store.append(entry.clone(), token) {
                Ok(()) => {
                    info!(
                        tenant_id = %tenant_id,
                        entity = %entity,
                        sequence,
                        event_type,
                        timestamped = entry.tsa_token_id.is_some(),
                        "audit entry recorded"
                    );
                    return Ok(entry);
                }
                Err(EvidentiaError::SequenceConflict { .. }) if attempt < max_attempts => {
                    debug!(entity = %entity, attempt, "sequence race lost, re-reading head");
                }
                Err(e) => {
                    warn!(entity = %entity, error = %e, "audit append failed");
                    return Err(e);
                }
            }
        }
    }

    /// Verify the hash chain of `subject`'s trail in the caller's tenant.
    ///
    /// Integrity breaks are reported in the result, never as `Err`.
    pub fn verify_chain(
        &self,
        ctx: Option<&TenantContext>,
        subject: &dyn Auditable,
    ) -> EvResult<ChainVerificationResult> {
        let tenant_id = require_tenant(ctx)?;
        let entity = subject.audit_key();
        let entries = self.store.entries(tenant_id, entity)?;

        let result = verify_entries(&entries, |entry| self.check_token(tenant_id, entry));

        if result.valid {
            debug!(entity = %entity, entries = result.entries_verified, "audit chain verified");
        } else {
            warn!(
                tenant_id = %tenant_id,
                entity = %entity,
                errors = result.errors.len(),
                "audit chain verification found integrity breaks"
            );
        }
        Ok(result)
    }

    /// The whole trail, oldest first.
    pub fn trail_for(
        &self,
        ctx: Option<&TenantContext>,
        subject: &dyn Auditable,
    ) -> EvResult<Vec<AuditTrailEntry>> {
        let tenant_id = require_tenant(ctx)?;
        self.store.entries(tenant_id, subject.audit_key())
    }

    /// Up to `limit` entries after `after_sequence` (use 0 for the first page).
    pub fn trail_page(
        &self,
        ctx: Option<&TenantContext>,
        subject: &dyn Auditable,
        after_sequence: u64,
        limit: usize,
    ) -> EvResult<Vec<AuditTrailEntry>> {
        let tenant_id = require_tenant(ctx)?;
        self.store
            .entries_after(tenant_id, subject.audit_key(), after_sequence, limit)
    }

    /// Read a trail across every tenant.  Requires an explicit grant.
    pub fn trail_for_any_tenant(
        &self,
        grant: &CrossTenantGrant,
        subject: &dyn Auditable,
    ) -> EvResult<Vec<AuditTrailEntry>> {
        let entity = subject.audit_key();
        warn!(entity = %entity, reason = grant.reason(), "cross-tenant audit read");
        self.store.entries_any_tenant(entity)
    }

    /// The TSA token attached to `entry`, if any, within the caller's tenant.
    pub fn token_for(
        &self,
        ctx: Option<&TenantContext>,
        entry: &AuditTrailEntry,
    ) -> EvResult<Option<TsaToken>> {
        let tenant_id = require_tenant(ctx)?;
        match entry.tsa_token_id {
            Some(token_id) => self.store.token(tenant_id, token_id),
            None => Ok(None),
        }
    }

    /// Export the trail with its verification result and terminal hash.
    pub fn export(
        &self,
        ctx: Option<&TenantContext>,
        subject: &dyn Auditable,
    ) -> EvResult<AuditExport> {
        let tenant_id = require_tenant(ctx)?;
        let entity = subject.audit_key();
        let entries = self.store.entries(tenant_id, entity)?;
        let verification = verify_entries(&entries, |entry| self.check_token(tenant_id, entry));
        let terminal_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| AuditTrailEntry::GENESIS_HASH.to_string());

        Ok(AuditExport {
            tenant_id,
            entity,
            entries,
            terminal_hash,
            exported_at: self.clock.now(),
            verification,
        })
    }

    /// Check an entry's token: present, bound to the entry hash, and valid at
    /// the moment it was issued.  Later expiry of an audit token does not
    /// invalidate the entry; long-lived protection is the reseal chain's job.
    fn check_token(&self, tenant_id: TenantId, entry: &AuditTrailEntry) -> Option<String> {
        let token_id = entry.tsa_token_id?;
        let token = match self.store.token(tenant_id, token_id) {
            Ok(Some(token)) => token,
            Ok(None) => return Some(format!("TSA token {token_id} is missing")),
            Err(e) => return Some(format!("TSA token {token_id} could not be read: {e}")),
        };
        if token.data_hash != entry.hash {
            return Some(format!("TSA token {token_id} does not match the entry hash"));
        }
        if !self.tsa.verify_timestamp(&token, token.issued_at) {
            return Some(format!("TSA token {token_id} failed verification"));
        }
        None
    }
}
