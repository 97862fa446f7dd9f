//! # evidentia-reseal
//!
//! Long-term TSA chains for archived documents.
//!
//! A timestamp token is only as trustworthy as the authority's key and
//! algorithm at verification time.  A `TsaChain` keeps a document's content
//! hash provable for decades by re-sealing it on a schedule: every new token
//! covers the cumulative hash of all previous seals, so an old token only
//! needs to have been valid when the next one was issued.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evidentia_reseal::{InMemoryChainStore, ResealEngine};
//!
//! let engine = ResealEngine::new(store, tsa, clock, config.reseal.clone());
//! let chain = engine.initialize_chain(&ctx, &subject, 365)?;
//!
//! for due in engine.chains_due_for_reseal(7)? {
//!     engine.reseal(&ctx, due.id, ResealReason::Scheduled)?;
//! }
//! ```

pub mod chain;
pub mod engine;
pub mod memory;

pub use chain::{compute_cumulative_hash, verify_chain_entries};
pub use engine::ResealEngine;
pub use memory::InMemoryChainStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use chrono::{Duration, TimeZone, Utc};

    use evidentia_contracts::{
        chain::{
            ChainStatus, ChainSubject, ChainType, ResealReason, TsaChain, TsaChainEntry,
            VerificationStatus,
        },
        entity::{ChainId, DocumentId, TenantId, TokenId},
        error::{EvResult, EvidentiaError},
        tsa::TsaToken,
    };
    use evidentia_core::{
        config::ResealConfig,
        hashing,
        traits::{ChainStore, TsaClient},
        ManualClock, TenantContext,
    };
    use evidentia_tsa::MockTsaClient;

    use super::{InMemoryChainStore, ResealEngine};

    // ── Helpers ───────────────────────────────────────────────────────────────

    struct Fixture {
        engine: ResealEngine,
        store: InMemoryChainStore,
        tsa: Arc<MockTsaClient>,
        clock: Arc<ManualClock>,
        ctx: TenantContext,
    }

    fn fixture_with_validity(validity_years: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        let tsa = Arc::new(MockTsaClient::with_validity(clock.clone(), validity_years));
        let store = InMemoryChainStore::new();
        let engine = ResealEngine::new(
            Arc::new(store.clone()),
            tsa.clone(),
            clock.clone(),
            ResealConfig::default(),
        );
        Fixture {
            engine,
            store,
            tsa,
            clock,
            ctx: TenantContext::new(TenantId::new()),
        }
    }

    fn fixture() -> Fixture {
        fixture_with_validity(10)
    }

    fn subject(id: u64) -> ChainSubject {
        ChainSubject {
            document_id: DocumentId(id),
            content_hash: hashing::hash_bytes(format!("document {id}").as_bytes()),
            chain_type: ChainType::LongTermArchive,
        }
    }

    fn init(f: &Fixture, id: u64) -> TsaChain {
        f.engine.initialize_chain(&f.ctx, &subject(id), 365).unwrap()
    }

    // ── Initialization ────────────────────────────────────────────────────────

    #[test]
    fn test_initialize_creates_sequence_zero() {
        let f = fixture();
        let chain = init(&f, 1);

        assert_eq!(chain.seal_count, 1);
        assert_eq!(chain.status, ChainStatus::Active);
        assert_eq!(chain.verification_status, VerificationStatus::Unverified);
        assert_eq!(chain.next_seal_due_at, f.clock_now() + Duration::days(365));

        let entries = f.engine.entries(&f.ctx, chain.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence, 0);
        assert!(entries[0].previous_entry_hash.is_none());
        assert_eq!(entries[0].sealed_hash, chain.preserved_hash);
        assert_eq!(entries[0].reason, ResealReason::Initial);

        assert!(f.engine.verify_chain(&f.ctx, chain.id).unwrap().valid);
    }

    #[test]
    fn test_initialize_rejects_bad_input() {
        let f = fixture();
        let mut bad = subject(1);
        bad.content_hash = "not-a-hash".to_string();
        assert!(matches!(
            f.engine.initialize_chain(&f.ctx, &bad, 365).unwrap_err(),
            EvidentiaError::InvalidHash { .. }
        ));
        assert!(matches!(
            f.engine.initialize_chain(&f.ctx, &subject(1), 0).unwrap_err(),
            EvidentiaError::InvalidInput { .. }
        ));
        assert_eq!(f.tsa.request_count(), 0);
    }

    // ── Resealing ─────────────────────────────────────────────────────────────

    /// Initialize, then a scheduled reseal once the chain is due.
    #[test]
    fn test_scheduled_reseal_extends_chain() {
        let f = fixture();
        let chain = init(&f, 1);
        f.clock.advance(Duration::days(365));

        let outcome = f
            .engine
            .reseal(&f.ctx, chain.id, ResealReason::Scheduled)
            .unwrap();
        assert!(outcome.is_new_seal());

        let chain = f.engine.chain(&f.ctx, chain.id).unwrap();
        let entries = f.engine.entries(&f.ctx, chain.id).unwrap();
        assert_eq!(chain.seal_count, 2);
        assert_eq!(entries.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(
            entries[1].previous_entry_hash.as_deref(),
            Some(entries[0].cumulative_hash.as_str())
        );
        assert_eq!(entries[1].previous_entry_id, Some(entries[0].id));
        assert_ne!(entries[1].sealed_hash, chain.preserved_hash);
        assert_eq!(chain.next_seal_due_at, f.clock_now() + Duration::days(365));

        let result = f.engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(result.valid, "errors: {:?}", result.errors);
        assert_eq!(result.entries_verified, 2);
    }

    #[test]
    fn test_scheduled_reseal_skipped_when_recent() {
        let f = fixture();
        let chain = init(&f, 1);
        f.clock.advance(Duration::hours(3));

        let outcome = f
            .engine
            .reseal(&f.ctx, chain.id, ResealReason::Scheduled)
            .unwrap();
        assert!(!outcome.is_new_seal());
        assert_eq!(outcome.entry().sequence, 0);
        assert_eq!(f.engine.chain(&f.ctx, chain.id).unwrap().seal_count, 1);
        assert_eq!(f.tsa.request_count(), 1, "no token requested for a skipped reseal");

        // Manual and forced reseals bypass the guard.
        let manual = f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();
        let forced = f.engine.reseal(&f.ctx, chain.id, ResealReason::Forced).unwrap();
        assert_eq!(manual.entry().sequence, 1);
        assert_eq!(forced.entry().sequence, 2);
        assert!(f.engine.verify_chain(&f.ctx, chain.id).unwrap().valid);
    }

    #[test]
    fn test_reseal_with_initial_reason_rejected() {
        let f = fixture();
        let chain = init(&f, 1);
        assert!(matches!(
            f.engine
                .reseal(&f.ctx, chain.id, ResealReason::Initial)
                .unwrap_err(),
            EvidentiaError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_tsa_failure_leaves_chain_untouched() {
        let f = fixture();
        let chain = init(&f, 1);
        f.clock.advance(Duration::days(400));
        f.tsa.set_unavailable(true);

        let err = f
            .engine
            .reseal(&f.ctx, chain.id, ResealReason::Scheduled)
            .unwrap_err();
        assert!(matches!(err, EvidentiaError::TsaUnavailable { .. }));
        assert!(err.is_retryable());

        let after = f.engine.chain(&f.ctx, chain.id).unwrap();
        assert_eq!(after.seal_count, 1);
        assert_eq!(after.next_seal_due_at, chain.next_seal_due_at);
        assert_eq!(f.engine.entries(&f.ctx, chain.id).unwrap().len(), 1);
    }

    /// Two reseals computed from the same head: the second append loses.
    #[test]
    fn test_seal_count_compare_and_swap() {
        let f = fixture();
        let chain = init(&f, 1);
        f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();

        let head = f.engine.chain(&f.ctx, chain.id).unwrap();
        let latest = f.store.latest_entry(f.ctx.tenant_id, chain.id).unwrap().unwrap();
        let token = f.tsa.request_timestamp(f.ctx.tenant_id, &latest.sealed_hash).unwrap();

        // Stale writer still believes seal_count is 1.
        let err = f
            .store
            .append(head.clone(), latest.clone(), token, 1)
            .unwrap_err();
        assert!(matches!(err, EvidentiaError::SequenceConflict { expected: 2, .. }));
        assert_eq!(f.engine.entries(&f.ctx, chain.id).unwrap().len(), 2);
    }

    #[test]
    fn test_update_cannot_rewrite_preserved_hash() {
        let f = fixture();
        let mut chain = init(&f, 1);
        chain.preserved_hash = hashing::hash_string("forged");
        assert!(matches!(
            f.store.update(chain).unwrap_err(),
            EvidentiaError::InvalidInput { .. }
        ));
    }

    // ── Verification ──────────────────────────────────────────────────────────

    /// Entries 0 and 2 with 1 missing.
    #[test]
    fn test_gap_detected_and_chain_invalidated() {
        let f = fixture();
        let chain = init(&f, 1);
        f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();
        f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();

        {
            let mut state = f.store.state.lock().unwrap();
            state.entries.get_mut(&chain.id).unwrap().remove(1);
        }

        let result = f.engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("gap")), "{:?}", result.errors);

        let after = f.engine.chain(&f.ctx, chain.id).unwrap();
        assert_eq!(after.status, ChainStatus::Invalid);
        assert_eq!(after.verification_status, VerificationStatus::Invalid);
        assert!(after.last_verified_at.is_some());
        assert!(f
            .engine
            .chains_needing_attention()
            .unwrap()
            .iter()
            .any(|c| c.id == chain.id));

        // An invalid chain cannot be resealed.
        assert!(matches!(
            f.engine
                .reseal(&f.ctx, chain.id, ResealReason::Forced)
                .unwrap_err(),
            EvidentiaError::ChainNotActive { .. }
        ));
    }

    #[test]
    fn test_tampered_cumulative_hash_detected() {
        let f = fixture();
        let chain = init(&f, 1);
        f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();

        {
            let mut state = f.store.state.lock().unwrap();
            state.entries.get_mut(&chain.id).unwrap()[0].cumulative_hash = "a".repeat(64);
        }

        let result = f.engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.starts_with("entry 0: cumulative hash mismatch")));
        assert!(result.errors.iter().any(|e| e.starts_with("entry 1: does not link")));
    }

    #[test]
    fn test_seal_count_mismatch_detected() {
        let f = fixture();
        let chain = init(&f, 1);
        {
            let mut state = f.store.state.lock().unwrap();
            state.chains.get_mut(&chain.id).unwrap().seal_count = 3;
        }
        let result = f.engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.starts_with("seal count 3")));
    }

    /// Old tokens only need to have been valid when the next seal was made.
    #[test]
    fn test_resealing_outlives_token_validity() {
        let f = fixture_with_validity(2);
        let chain = init(&f, 1);

        for _ in 0..3 {
            f.clock.advance(Duration::days(365));
            f.engine
                .reseal(&f.ctx, chain.id, ResealReason::Scheduled)
                .unwrap();
        }
        // The initial token expired a year ago; the chain still verifies.
        let result = f.engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(f.engine.latest_token_valid(&f.ctx, chain.id).unwrap());

        // Let the latest token lapse without a reseal.
        f.clock.advance(Duration::days(365 * 3));
        assert!(!f.engine.latest_token_valid(&f.ctx, chain.id).unwrap());
        let result = f.engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("failed verification")));
    }

    // ── Scheduling & lifecycle ────────────────────────────────────────────────

    #[test]
    fn test_due_query_respects_grace_and_order() {
        let f = fixture();
        let overdue = init(&f, 1);
        let later = init(&f, 2);
        let now = f.clock_now();

        {
            let mut state = f.store.state.lock().unwrap();
            state.chains.get_mut(&overdue.id).unwrap().next_seal_due_at = now - Duration::days(5);
            state.chains.get_mut(&later.id).unwrap().next_seal_due_at = now + Duration::days(30);
        }

        let due = f.engine.chains_due_for_reseal(0).unwrap();
        assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![overdue.id]);

        let due = f.engine.chains_due_for_reseal(30).unwrap();
        assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![overdue.id, later.id]);
    }

    #[test]
    fn test_mark_reseal_failed_flags_until_next_success() {
        let f = fixture();
        let chain = init(&f, 1);

        let failed = f
            .engine
            .mark_reseal_failed(&f.ctx, chain.id, "TSA unavailable after 3 attempt(s)")
            .unwrap();
        assert_eq!(failed.status, ChainStatus::Active);
        assert_eq!(failed.verification_status, VerificationStatus::Invalid);
        assert!(failed.needs_attention());
        assert_eq!(f.engine.chains_needing_attention().unwrap().len(), 1);

        f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();
        let healed = f.engine.chain(&f.ctx, chain.id).unwrap();
        assert!(!healed.needs_attention());
        assert!(healed.last_failure.is_none());
    }

    #[test]
    fn test_supersede_is_terminal() {
        let f = fixture();
        let chain = init(&f, 1);

        let superseded = f.engine.supersede(&f.ctx, chain.id).unwrap();
        assert_eq!(superseded.status, ChainStatus::Superseded);
        assert!(f.engine.chains_due_for_reseal(10_000).unwrap().is_empty());

        assert!(matches!(
            f.engine.supersede(&f.ctx, chain.id).unwrap_err(),
            EvidentiaError::InvalidStateTransition { .. }
        ));
        assert!(matches!(
            f.engine
                .reseal(&f.ctx, chain.id, ResealReason::Manual)
                .unwrap_err(),
            EvidentiaError::ChainNotActive { .. }
        ));
    }

    #[test]
    fn test_chains_are_tenant_scoped() {
        let f = fixture();
        let chain = init(&f, 1);
        let other = TenantContext::new(TenantId::new());

        assert!(matches!(
            f.engine.chain(&other, chain.id).unwrap_err(),
            EvidentiaError::ChainNotFound { .. }
        ));
        assert!(matches!(
            f.engine
                .reseal(&other, chain.id, ResealReason::Manual)
                .unwrap_err(),
            EvidentiaError::ChainNotFound { .. }
        ));
    }

    // ── Storage faults ────────────────────────────────────────────────────────

    type Hook = Box<dyn FnOnce() + Send>;

    /// Delegates to an in-memory store, failing the next N token reads and
    /// running a one-shot hook before the next head update.
    #[derive(Default)]
    struct FaultyChainStore {
        inner: InMemoryChainStore,
        failing_token_reads: AtomicUsize,
        before_update: Mutex<Option<Hook>>,
    }

    impl ChainStore for FaultyChainStore {
        fn create(&self, chain: TsaChain, entry: TsaChainEntry, token: TsaToken) -> EvResult<()> {
            self.inner.create(chain, entry, token)
        }

        fn chain(&self, tenant_id: TenantId, chain_id: ChainId) -> EvResult<Option<TsaChain>> {
            self.inner.chain(tenant_id, chain_id)
        }

        fn entries(&self, tenant_id: TenantId, chain_id: ChainId) -> EvResult<Vec<TsaChainEntry>> {
            self.inner.entries(tenant_id, chain_id)
        }

        fn latest_entry(
            &self,
            tenant_id: TenantId,
            chain_id: ChainId,
        ) -> EvResult<Option<TsaChainEntry>> {
            self.inner.latest_entry(tenant_id, chain_id)
        }

        fn snapshot(
            &self,
            tenant_id: TenantId,
            chain_id: ChainId,
        ) -> EvResult<Option<(TsaChain, Vec<TsaChainEntry>)>> {
            self.inner.snapshot(tenant_id, chain_id)
        }

        fn append(
            &self,
            chain: TsaChain,
            entry: TsaChainEntry,
            token: TsaToken,
            expected_seal_count: u64,
        ) -> EvResult<()> {
            self.inner.append(chain, entry, token, expected_seal_count)
        }

        fn update(&self, chain: TsaChain) -> EvResult<()> {
            let hook = self.before_update.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            self.inner.update(chain)
        }

        fn token(&self, tenant_id: TenantId, token_id: TokenId) -> EvResult<Option<TsaToken>> {
            let failing = self
                .failing_token_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(EvidentiaError::Storage {
                    reason: "connection reset".to_string(),
                });
            }
            self.inner.token(tenant_id, token_id)
        }

        fn active_due_by(&self, cutoff: chrono::DateTime<Utc>) -> EvResult<Vec<TsaChain>> {
            self.inner.active_due_by(cutoff)
        }

        fn needing_attention(&self) -> EvResult<Vec<TsaChain>> {
            self.inner.needing_attention()
        }
    }

    fn faulty_engine(f: &Fixture, store: Arc<FaultyChainStore>) -> Arc<ResealEngine> {
        Arc::new(ResealEngine::new(
            store,
            f.tsa.clone(),
            f.clock.clone(),
            ResealConfig::default(),
        ))
    }

    /// A token read that fails is an operational error, not tampering.
    #[test]
    fn test_token_read_failure_leaves_chain_untouched() {
        let f = fixture();
        let store = Arc::new(FaultyChainStore::default());
        let engine = faulty_engine(&f, store.clone());
        let chain = engine.initialize_chain(&f.ctx, &subject(1), 365).unwrap();

        store.failing_token_reads.store(1, Ordering::SeqCst);
        let err = engine.verify_chain(&f.ctx, chain.id).unwrap_err();
        assert!(matches!(err, EvidentiaError::Storage { .. }));

        let after = engine.chain(&f.ctx, chain.id).unwrap();
        assert_eq!(after.status, ChainStatus::Active);
        assert_eq!(after.verification_status, VerificationStatus::Unverified);
        assert!(after.last_verified_at.is_none());

        assert!(engine.verify_chain(&f.ctx, chain.id).unwrap().valid);
        f.clock.advance(Duration::days(1));
        assert!(engine
            .reseal(&f.ctx, chain.id, ResealReason::Manual)
            .unwrap()
            .is_new_seal());

        store.failing_token_reads.store(1, Ordering::SeqCst);
        assert!(engine.latest_token_valid(&f.ctx, chain.id).is_err());
    }

    /// A reseal landing between the read and the recorded outcome makes the
    /// verifier walk the chain again instead of reporting a seal-count break.
    #[test]
    fn test_verify_rereads_chain_resealed_underneath() {
        let f = fixture();
        let store = Arc::new(FaultyChainStore::default());
        let engine = faulty_engine(&f, store.clone());
        let chain = engine.initialize_chain(&f.ctx, &subject(1), 365).unwrap();

        let resealer = engine.clone();
        let ctx = f.ctx;
        let chain_id = chain.id;
        *store.before_update.lock().unwrap() = Some(Box::new(move || {
            resealer
                .reseal(&ctx, chain_id, ResealReason::Manual)
                .unwrap();
        }));

        let result = engine.verify_chain(&f.ctx, chain.id).unwrap();
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.entries_verified, 2);

        let after = engine.chain(&f.ctx, chain.id).unwrap();
        assert_eq!(after.seal_count, 2);
        assert_eq!(after.status, ChainStatus::Active);
        assert_eq!(after.verification_status, VerificationStatus::Verified);
    }

    #[test]
    fn test_stale_head_update_is_a_sequence_conflict() {
        let f = fixture();
        let chain = init(&f, 1);
        f.engine.reseal(&f.ctx, chain.id, ResealReason::Manual).unwrap();

        assert!(matches!(
            f.store.update(chain).unwrap_err(),
            EvidentiaError::SequenceConflict { expected: 2, .. }
        ));
    }

    impl Fixture {
        fn clock_now(&self) -> chrono::DateTime<Utc> {
            use evidentia_core::traits::Clock;
            self.clock.now()
        }
    }
}
