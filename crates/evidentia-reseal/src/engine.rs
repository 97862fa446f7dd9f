//! The reseal engine.
//!
//! Owns the lifecycle of every `TsaChain`:
//!
//!   initialize → reseal (scheduled | manual | forced) … → supersede
//!                      ↘ verify → Invalid on any break
//!
//! A reseal requests its token outside any lock and then lands with a
//! compare-and-swap on `seal_count`.  Every failure leaves the chain exactly
//! as it was.

use std::{collections::HashMap, sync::Arc};

use chrono::Duration;
use tracing::{debug, error, info, warn};

use evidentia_contracts::{
    chain::{
        ChainStatus, ChainSubject, ResealOutcome, ResealReason, TsaChain, TsaChainEntry,
        VerificationStatus,
    },
    entity::{ChainEntryId, ChainId, TenantId, TokenId},
    error::{EvResult, EvidentiaError},
    tsa::TsaToken,
    verify::ChainVerificationResult,
};
use evidentia_core::{
    config::ResealConfig,
    hashing,
    traits::{ChainStore, Clock, TsaClient},
    TenantContext,
};

use crate::chain::{
    compute_cumulative_hash, expected_token_hash, reseal_request_hash, reseal_sealed_hash,
    verify_chain_entries, INITIAL_SEQUENCE,
};

/// How often a head write re-reads a chain that was resealed under it.
const HEAD_WRITE_ATTEMPTS: u32 = 3;

pub struct ResealEngine {
    store: Arc<dyn ChainStore>,
    tsa: Arc<dyn TsaClient>,
    clock: Arc<dyn Clock>,
    config: ResealConfig,
}

impl ResealEngine {
    pub fn new(
        store: Arc<dyn ChainStore>,
        tsa: Arc<dyn TsaClient>,
        clock: Arc<dyn Clock>,
        config: ResealConfig,
    ) -> Self {
        Self {
            store,
            tsa,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ResealConfig {
        &self.config
    }

    /// Create a chain anchoring `subject.content_hash` with its first token.
    ///
    /// # Errors
    ///
    /// `InvalidHash` for a malformed content hash, `InvalidInput` for a zero
    /// interval, `TsaUnavailable` if the initial token cannot be obtained.
    pub fn initialize_chain(
        &self,
        ctx: &TenantContext,
        subject: &ChainSubject,
        interval_days: u32,
    ) -> EvResult<TsaChain> {
        hashing::require_valid_hash(&subject.content_hash)?;
        if interval_days == 0 {
            return Err(EvidentiaError::InvalidInput {
                reason: "reseal interval must be at least one day".to_string(),
            });
        }

        let token = self
            .tsa
            .request_timestamp(ctx.tenant_id, &subject.content_hash)?;
        let now = self.clock.now();

        let chain_id = ChainId::new();
        let entry = TsaChainEntry {
            id: ChainEntryId::new(),
            chain_id,
            sequence: INITIAL_SEQUENCE,
            token_id: token.id,
            previous_entry_id: None,
            previous_entry_hash: None,
            cumulative_hash: compute_cumulative_hash(None, token.issued_at, &subject.content_hash),
            sealed_hash: subject.content_hash.clone(),
            reason: ResealReason::Initial,
            timestamp: token.issued_at,
            created_at: now,
        };
        let chain = TsaChain {
            id: chain_id,
            tenant_id: ctx.tenant_id,
            document_id: subject.document_id,
            chain_type: subject.chain_type,
            preserved_hash: subject.content_hash.clone(),
            initial_token_id: token.id,
            status: ChainStatus::Active,
            verification_status: VerificationStatus::Unverified,
            seal_count: 1,
            reseal_interval_days: interval_days,
            next_seal_due_at: now + Duration::days(i64::from(interval_days)),
            last_sealed_at: token.issued_at,
            last_verified_at: None,
            last_failure: None,
            created_at: now,
        };

        self.store.create(chain.clone(), entry, token)?;

        info!(
            tenant_id = %ctx.tenant_id,
            chain_id = %chain.id,
            document_id = %subject.document_id,
            next_seal_due_at = %chain.next_seal_due_at,
            "TSA chain initialized"
        );
        Ok(chain)
    }

    /// Extend the chain with a fresh timestamp.
    ///
    /// A `Scheduled` reseal of a chain sealed within the configured spacing
    /// returns `AlreadySealed` and changes nothing.
    ///
    /// # Errors
    ///
    /// - `ChainNotFound` / `ChainNotActive`
    /// - `InvalidInput` for `ResealReason::Initial`
    /// - `TsaUnavailable` when no token could be obtained
    /// - `SequenceConflict` when a concurrent reseal landed first
    pub fn reseal(
        &self,
        ctx: &TenantContext,
        chain_id: ChainId,
        reason: ResealReason,
    ) -> EvResult<ResealOutcome> {
        if reason == ResealReason::Initial {
            return Err(EvidentiaError::InvalidInput {
                reason: "the initial seal is created by initialize_chain".to_string(),
            });
        }

        let chain = self.chain(ctx, chain_id)?;
        if chain.status != ChainStatus::Active {
            return Err(EvidentiaError::ChainNotActive {
                chain_id: chain_id.to_string(),
                status: chain.status.to_string(),
            });
        }
        let latest = self
            .store
            .latest_entry(ctx.tenant_id, chain_id)?
            .ok_or_else(|| EvidentiaError::Storage {
                reason: format!("chain {chain_id} has no entries"),
            })?;

        let now = self.clock.now();
        let spacing = Duration::hours(i64::from(self.config.min_reseal_spacing_hours));
        if reason == ResealReason::Scheduled && now - chain.last_sealed_at < spacing {
            debug!(
                chain_id = %chain_id,
                last_sealed_at = %chain.last_sealed_at,
                "scheduled reseal skipped, chain sealed recently"
            );
            return Ok(ResealOutcome::AlreadySealed(latest));
        }

        let sealed_hash = reseal_sealed_hash(&latest.cumulative_hash, &chain.preserved_hash);
        let request_hash = reseal_request_hash(&latest.cumulative_hash, &sealed_hash);
        let token = self.tsa.request_timestamp(ctx.tenant_id, &request_hash)?;

        let entry = TsaChainEntry {
            id: ChainEntryId::new(),
            chain_id,
            sequence: chain.seal_count,
            token_id: token.id,
            previous_entry_id: Some(latest.id),
            previous_entry_hash: Some(latest.cumulative_hash.clone()),
            cumulative_hash: compute_cumulative_hash(
                Some(&latest.cumulative_hash),
                token.issued_at,
                &sealed_hash,
            ),
            sealed_hash,
            reason,
            timestamp: token.issued_at,
            created_at: now,
        };

        let expected_seal_count = chain.seal_count;
        let updated = TsaChain {
            seal_count: chain.seal_count + 1,
            last_sealed_at: token.issued_at,
            next_seal_due_at: now + Duration::days(i64::from(chain.reseal_interval_days)),
            last_failure: None,
            // A good seal clears a previous reseal failure; tampering found by
            // verification keeps the chain Invalid and never reaches here.
            verification_status: match chain.verification_status {
                VerificationStatus::Invalid => VerificationStatus::Unverified,
                other => other,
            },
            ..chain
        };

        self.store
            .append(updated.clone(), entry.clone(), token, expected_seal_count)?;

        info!(
            tenant_id = %ctx.tenant_id,
            chain_id = %chain_id,
            sequence = entry.sequence,
            reason = reason.as_str(),
            next_seal_due_at = %updated.next_seal_due_at,
            "chain resealed"
        );
        Ok(ResealOutcome::Sealed(entry))
    }

    /// Verify the chain and record the outcome on its head.
    ///
    /// Earlier tokens must have been valid when the next seal was made; the
    /// latest token must be valid now.  A failed verification moves an
    /// active chain to `Invalid`.
    ///
    /// The head and entries are read as one snapshot.  A reseal landing
    /// before the outcome is recorded makes the snapshot stale and the walk
    /// is repeated, up to `HEAD_WRITE_ATTEMPTS` times.
    ///
    /// # Errors
    ///
    /// Storage failures (including token reads) are returned as `Err` and
    /// leave the chain unchanged; they are never reported as integrity
    /// breaks.
    pub fn verify_chain(
        &self,
        ctx: &TenantContext,
        chain_id: ChainId,
    ) -> EvResult<ChainVerificationResult> {
        let mut attempt = 1;
        loop {
            match self.verify_once(ctx, chain_id) {
                Err(EvidentiaError::SequenceConflict { expected, .. })
                    if attempt < HEAD_WRITE_ATTEMPTS =>
                {
                    debug!(
                        chain_id = %chain_id,
                        seal_count = expected,
                        attempt,
                        "chain resealed during verification, re-reading"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn verify_once(
        &self,
        ctx: &TenantContext,
        chain_id: ChainId,
    ) -> EvResult<ChainVerificationResult> {
        let (chain, entries) = self
            .store
            .snapshot(ctx.tenant_id, chain_id)?
            .ok_or_else(|| EvidentiaError::ChainNotFound {
                chain_id: chain_id.to_string(),
            })?;
        let tokens = self.load_tokens(ctx.tenant_id, &entries)?;
        let now = self.clock.now();

        let result = verify_chain_entries(&chain, &entries, |entry, valid_until| {
            self.check_token(tokens.get(&entry.token_id), entry, valid_until.unwrap_or(now))
        });

        let mut head = chain;
        head.last_verified_at = Some(now);
        if result.valid {
            head.verification_status = VerificationStatus::Verified;
            debug!(chain_id = %chain_id, entries = result.entries_verified, "TSA chain verified");
        } else {
            head.verification_status = VerificationStatus::Invalid;
            if head.status.can_transition_to(ChainStatus::Invalid) {
                head.status = ChainStatus::Invalid;
            }
            warn!(
                tenant_id = %ctx.tenant_id,
                chain_id = %chain_id,
                errors = result.errors.len(),
                "TSA chain verification failed"
            );
        }
        self.store.update(head)?;

        Ok(result)
    }

    /// Every stored token referenced by `entries`.  A token that is simply
    /// absent is left out and reported by the walk.
    fn load_tokens(
        &self,
        tenant_id: TenantId,
        entries: &[TsaChainEntry],
    ) -> EvResult<HashMap<TokenId, TsaToken>> {
        let mut tokens = HashMap::with_capacity(entries.len());
        for entry in entries {
            if let Some(token) = self.store.token(tenant_id, entry.token_id)? {
                tokens.insert(token.id, token);
            }
        }
        Ok(tokens)
    }

    /// Active chains due within `grace_days` from now, across all tenants,
    /// oldest due first.
    pub fn chains_due_for_reseal(&self, grace_days: u32) -> EvResult<Vec<TsaChain>> {
        let cutoff = self.clock.now() + Duration::days(i64::from(grace_days));
        self.store.active_due_by(cutoff)
    }

    /// Record a permanent reseal failure.
    ///
    /// The chain stays `Active` so a later sweep can retry, but is flagged
    /// for attention until a reseal succeeds.
    pub fn mark_reseal_failed(
        &self,
        ctx: &TenantContext,
        chain_id: ChainId,
        reason: &str,
    ) -> EvResult<TsaChain> {
        let mut chain = self.chain(ctx, chain_id)?;
        chain.verification_status = VerificationStatus::Invalid;
        chain.last_failure = Some(reason.to_string());
        self.store.update(chain.clone())?;

        error!(
            tenant_id = %ctx.tenant_id,
            chain_id = %chain_id,
            next_seal_due_at = %chain.next_seal_due_at,
            reason,
            "reseal permanently failed"
        );
        Ok(chain)
    }

    pub fn chains_needing_attention(&self) -> EvResult<Vec<TsaChain>> {
        self.store.needing_attention()
    }

    /// Retire an active chain after its document was re-archived.
    pub fn supersede(&self, ctx: &TenantContext, chain_id: ChainId) -> EvResult<TsaChain> {
        let mut attempt = 1;
        loop {
            let mut chain = self.chain(ctx, chain_id)?;
            if !chain.status.can_transition_to(ChainStatus::Superseded) {
                return Err(EvidentiaError::InvalidStateTransition {
                    from: chain.status.to_string(),
                    to: ChainStatus::Superseded.to_string(),
                });
            }
            chain.status = ChainStatus::Superseded;
            match self.store.update(chain.clone()) {
                Ok(()) => {
                    info!(tenant_id = %ctx.tenant_id, chain_id = %chain_id, "TSA chain superseded");
                    return Ok(chain);
                }
                Err(EvidentiaError::SequenceConflict { .. }) if attempt < HEAD_WRITE_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn chain(&self, ctx: &TenantContext, chain_id: ChainId) -> EvResult<TsaChain> {
        self.store
            .chain(ctx.tenant_id, chain_id)?
            .ok_or_else(|| EvidentiaError::ChainNotFound {
                chain_id: chain_id.to_string(),
            })
    }

    pub fn entries(&self, ctx: &TenantContext, chain_id: ChainId) -> EvResult<Vec<TsaChainEntry>> {
        self.chain(ctx, chain_id)?;
        self.store.entries(ctx.tenant_id, chain_id)
    }

    /// The token of the chain's latest entry.
    pub fn latest_token(&self, ctx: &TenantContext, chain_id: ChainId) -> EvResult<TsaToken> {
        let latest = self
            .store
            .latest_entry(ctx.tenant_id, chain_id)?
            .ok_or_else(|| EvidentiaError::ChainNotFound {
                chain_id: chain_id.to_string(),
            })?;
        self.store
            .token(ctx.tenant_id, latest.token_id)?
            .ok_or_else(|| EvidentiaError::TokenNotFound {
                token_id: latest.token_id.to_string(),
            })
    }

    /// True if the latest token verifies now and is bound to its entry.
    pub fn latest_token_valid(&self, ctx: &TenantContext, chain_id: ChainId) -> EvResult<bool> {
        let latest = match self.store.latest_entry(ctx.tenant_id, chain_id)? {
            Some(entry) => entry,
            None => return Ok(false),
        };
        let token = self.store.token(ctx.tenant_id, latest.token_id)?;
        Ok(self
            .check_token(token.as_ref(), &latest, self.clock.now())
            .is_none())
    }

    fn check_token(
        &self,
        token: Option<&TsaToken>,
        entry: &TsaChainEntry,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Option<String> {
        let Some(token) = token else {
            return Some(format!("TSA token {} is missing", entry.token_id));
        };
        if token.data_hash != expected_token_hash(entry) {
            return Some(format!("TSA token {} is not bound to this entry", token.id));
        }
        if token.issued_at != entry.timestamp {
            return Some(format!("TSA token {} timestamp differs from the entry", token.id));
        }
        if !self.tsa.verify_timestamp(token, at) {
            return Some(format!("TSA token {} failed verification", token.id));
        }
        None
    }
}
