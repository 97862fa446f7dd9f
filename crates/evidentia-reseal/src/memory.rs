//! In-memory implementation of `ChainStore`.
//!
//! Chain heads, entries and tokens live behind one `Mutex`.  `append` is a
//! compare-and-swap on `seal_count`: of two concurrent reseals computed
//! from the same head, exactly one lands.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use tracing::debug;

use evidentia_contracts::{
    chain::{ChainStatus, TsaChain, TsaChainEntry},
    entity::{ChainId, TenantId, TokenId},
    error::{EvResult, EvidentiaError},
    tsa::TsaToken,
};
use evidentia_core::traits::ChainStore;

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct ChainState {
    pub(crate) chains: HashMap<ChainId, TsaChain>,

    /// Entries per chain, in sequence order.
    pub(crate) entries: HashMap<ChainId, Vec<TsaChainEntry>>,

    pub(crate) tokens: HashMap<TokenId, TsaToken>,
}

// ── Public store ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryChainStore {
    pub(crate) state: Arc<Mutex<ChainState>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EvResult<MutexGuard<'_, ChainState>> {
        self.state.lock().map_err(|e| EvidentiaError::Storage {
            reason: format!("chain state lock poisoned: {}", e),
        })
    }
}

fn not_found(chain_id: ChainId) -> EvidentiaError {
    EvidentiaError::ChainNotFound {
        chain_id: chain_id.to_string(),
    }
}

impl ChainStore for InMemoryChainStore {
    fn create(&self, chain: TsaChain, entry: TsaChainEntry, token: TsaToken) -> EvResult<()> {
        let mut state = self.lock()?;

        if state.chains.contains_key(&chain.id) {
            return Err(EvidentiaError::Storage {
                reason: format!("chain {} already exists", chain.id),
            });
        }
        if entry.chain_id != chain.id || entry.sequence != 0 || chain.seal_count != 1 {
            return Err(EvidentiaError::InvalidInput {
                reason: "a new chain must start with exactly its sequence-0 entry".to_string(),
            });
        }

        state.tokens.insert(token.id, token);
        state.entries.insert(chain.id, vec![entry]);
        state.chains.insert(chain.id, chain);
        Ok(())
    }

    fn chain(&self, tenant_id: TenantId, chain_id: ChainId) -> EvResult<Option<TsaChain>> {
        let state = self.lock()?;
        Ok(state
            .chains
            .get(&chain_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    fn entries(&self, tenant_id: TenantId, chain_id: ChainId) -> EvResult<Vec<TsaChainEntry>> {
        let state = self.lock()?;
        match state.chains.get(&chain_id) {
            Some(c) if c.tenant_id == tenant_id => {
                Ok(state.entries.get(&chain_id).cloned().unwrap_or_default())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn latest_entry(
        &self,
        tenant_id: TenantId,
        chain_id: ChainId,
    ) -> EvResult<Option<TsaChainEntry>> {
        let state = self.lock()?;
        match state.chains.get(&chain_id) {
            Some(c) if c.tenant_id == tenant_id => Ok(state
                .entries
                .get(&chain_id)
                .and_then(|entries| entries.last())
                .cloned()),
            _ => Ok(None),
        }
    }

    fn snapshot(
        &self,
        tenant_id: TenantId,
        chain_id: ChainId,
    ) -> EvResult<Option<(TsaChain, Vec<TsaChainEntry>)>> {
        let state = self.lock()?;
        Ok(state
            .chains
            .get(&chain_id)
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| {
                let entries = state.entries.get(&chain_id).cloned().unwrap_or_default();
                (c.clone(), entries)
            }))
    }

    fn append(
        &self,
        chain: TsaChain,
        entry: TsaChainEntry,
        token: TsaToken,
        expected_seal_count: u64,
    ) -> EvResult<()> {
        let mut state = self.lock()?;

        let stored = state.chains.get(&chain.id).ok_or_else(|| not_found(chain.id))?;
        if stored.seal_count != expected_seal_count {
            debug!(
                chain_id = %chain.id,
                stored = stored.seal_count,
                expected = expected_seal_count,
                "reseal lost compare-and-swap"
            );
            return Err(EvidentiaError::SequenceConflict {
                scope: format!("chain {}", chain.id),
                expected: stored.seal_count,
            });
        }
        if stored.status != ChainStatus::Active {
            return Err(EvidentiaError::ChainNotActive {
                chain_id: chain.id.to_string(),
                status: stored.status.to_string(),
            });
        }
        if stored.preserved_hash != chain.preserved_hash
            || chain.seal_count != expected_seal_count + 1
            || entry.sequence != expected_seal_count
            || entry.chain_id != chain.id
        {
            return Err(EvidentiaError::InvalidInput {
                reason: format!("append to chain {} does not extend its head", chain.id),
            });
        }

        state.tokens.insert(token.id, token);
        state.entries.entry(chain.id).or_default().push(entry);
        state.chains.insert(chain.id, chain);
        Ok(())
    }

    fn update(&self, chain: TsaChain) -> EvResult<()> {
        let mut state = self.lock()?;

        let stored = state.chains.get(&chain.id).ok_or_else(|| not_found(chain.id))?;
        if stored.preserved_hash != chain.preserved_hash {
            return Err(EvidentiaError::InvalidInput {
                reason: format!("update of chain {} may not change its preserved hash", chain.id),
            });
        }
        if stored.seal_count != chain.seal_count {
            return Err(EvidentiaError::SequenceConflict {
                scope: format!("chain {}", chain.id),
                expected: stored.seal_count,
            });
        }
        if stored.status != chain.status && !stored.status.can_transition_to(chain.status) {
            return Err(EvidentiaError::InvalidStateTransition {
                from: stored.status.to_string(),
                to: chain.status.to_string(),
            });
        }

        state.chains.insert(chain.id, chain);
        Ok(())
    }

    fn token(&self, tenant_id: TenantId, token_id: TokenId) -> EvResult<Option<TsaToken>> {
        let state = self.lock()?;
        Ok(state
            .tokens
            .get(&token_id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    fn active_due_by(&self, cutoff: DateTime<Utc>) -> EvResult<Vec<TsaChain>> {
        let state = self.lock()?;
        let mut due: Vec<TsaChain> = state
            .chains
            .values()
            .filter(|c| c.status == ChainStatus::Active && c.next_seal_due_at <= cutoff)
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.next_seal_due_at, c.id));
        Ok(due)
    }

    fn needing_attention(&self) -> EvResult<Vec<TsaChain>> {
        let state = self.lock()?;
        let mut chains: Vec<TsaChain> = state
            .chains
            .values()
            .filter(|c| c.needs_attention())
            .cloned()
            .collect();
        chains.sort_by_key(|c| (c.created_at, c.id));
        Ok(chains)
    }
}
