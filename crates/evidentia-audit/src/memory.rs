//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` is the reference store.  One `Mutex` guards every
//! trail, so the conditional append (sequence = head + 1 and previous hash =
//! head hash) is checked and applied atomically, the same guarantee a
//! database gives with a unique index on (tenant, entity, sequence) inside a
//! transaction.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::debug;

use evidentia_contracts::{
    audit::AuditTrailEntry,
    entity::{EntityRef, TenantId, TokenId},
    error::{EvResult, EvidentiaError},
    tsa::TsaToken,
};
use evidentia_core::traits::{AuditStore, TrailHead};

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct AuditState {
    /// Entries per (tenant, entity), in sequence order.
    pub(crate) trails: HashMap<(TenantId, EntityRef), Vec<AuditTrailEntry>>,

    pub(crate) tokens: HashMap<TokenId, TsaToken>,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An append-only audit store kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    pub(crate) state: Arc<Mutex<AuditState>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EvResult<MutexGuard<'_, AuditState>> {
        self.state.lock().map_err(|e| EvidentiaError::Storage {
            reason: format!("audit state lock poisoned: {}", e),
        })
    }
}

impl AuditStore for InMemoryAuditStore {
    fn head(&self, tenant_id: TenantId, entity: EntityRef) -> EvResult<Option<TrailHead>> {
        let state = self.lock()?;
        Ok(state
            .trails
            .get(&(tenant_id, entity))
            .and_then(|trail| trail.last())
            .map(|last| TrailHead {
                sequence: last.sequence,
                hash: last.hash.clone(),
            }))
    }

    fn append(&self, entry: AuditTrailEntry, token: Option<TsaToken>) -> EvResult<()> {
        let mut state = self.lock()?;

        let key = (entry.tenant_id, entry.entity);
        let (expected_sequence, expected_prev) = match state.trails.get(&key).and_then(|t| t.last())
        {
            Some(last) => (last.sequence + 1, last.hash.as_str()),
            None => (
                AuditTrailEntry::FIRST_SEQUENCE,
                AuditTrailEntry::GENESIS_HASH,
            ),
        };

        if entry.sequence != expected_sequence || entry.previous_hash != expected_prev {
            debug!(
                entity = %entry.entity,
                attempted = entry.sequence,
                expected = expected_sequence,
                "audit append lost sequence race"
            );
            return Err(EvidentiaError::SequenceConflict {
                scope: entry.entity.to_string(),
                expected: expected_sequence,
            });
        }

        if let Some(token) = token {
            state.tokens.insert(token.id, token);
        }
        state.trails.entry(key).or_default().push(entry);
        Ok(())
    }

    fn entries(&self, tenant_id: TenantId, entity: EntityRef) -> EvResult<Vec<AuditTrailEntry>> {
        let state = self.lock()?;
        Ok(state
            .trails
            .get(&(tenant_id, entity))
            .cloned()
            .unwrap_or_default())
    }

    fn entries_after(
        &self,
        tenant_id: TenantId,
        entity: EntityRef,
        after_sequence: u64,
        limit: usize,
    ) -> EvResult<Vec<AuditTrailEntry>> {
        let state = self.lock()?;
        Ok(state
            .trails
            .get(&(tenant_id, entity))
            .map(|trail| {
                trail
                    .iter()
                    .filter(|e| e.sequence > after_sequence)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn entries_any_tenant(&self, entity: EntityRef) -> EvResult<Vec<AuditTrailEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<AuditTrailEntry> = state
            .trails
            .iter()
            .filter(|((_, e), _)| *e == entity)
            .flat_map(|(_, trail)| trail.iter().cloned())
            .collect();
        entries.sort_by(|a, b| {
            (a.tenant_id, a.sequence).cmp(&(b.tenant_id, b.sequence))
        });
        Ok(entries)
    }

    fn token(&self, tenant_id: TenantId, token_id: TokenId) -> EvResult<Option<TsaToken>> {
        let state = self.lock()?;
        Ok(state
            .tokens
            .get(&token_id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }
}
