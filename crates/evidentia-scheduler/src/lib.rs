//! # evidentia-scheduler
//!
//! Job runners for the periodic work of the Evidentia core.
//!
//! - [`ResealSweep`] reseals every TSA chain coming due and keeps archive
//!   schedules in step.
//! - [`TierMigrationSweep`] moves idle archives to cheaper tiers.
//!
//! Both are plain synchronous functions meant to be invoked by whatever
//! scheduler the host runs (cron, a queue worker, the demo CLI).  Each unit
//! of work is retried per [`RetryPolicy`] and is safe to run again.

pub mod retry;
pub mod sweep;

pub use retry::{RetryPolicy, Sleeper};
pub use sweep::{ResealSweep, SweepReport, TierMigrationSweep};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration as StdDuration,
    };

    use chrono::{Duration, TimeZone, Utc};

    use evidentia_archive::{ArchiveManager, InMemoryArchiveStore, MemoryContentStore};
    use evidentia_contracts::{
        archive::{ArchiveStatus, ArchiveTier, DocumentRef, StorageLocation},
        entity::{DocumentId, PolicyId, TenantId},
        error::EvidentiaError,
        retention::{ExpiryAction, RetentionPolicy},
    };
    use evidentia_core::{
        config::{ArchiveConfig, ResealConfig},
        traits::{ArchiveStore, Clock, ContentStore},
        ManualClock, TenantContext,
    };
    use evidentia_reseal::{InMemoryChainStore, ResealEngine};
    use evidentia_retention::{RetentionResolver, StaticPolicySource};
    use evidentia_tsa::MockTsaClient;

    use super::{ResealSweep, RetryPolicy, TierMigrationSweep};

    // ── Helpers ───────────────────────────────────────────────────────────────

    struct Fixture {
        reseal: Arc<ResealEngine>,
        archive: Arc<ArchiveManager>,
        records: InMemoryArchiveStore,
        content: MemoryContentStore,
        tsa: Arc<MockTsaClient>,
        clock: Arc<ManualClock>,
        ctx: TenantContext,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 2, 0, 0).unwrap(),
        ));
        let tsa = Arc::new(MockTsaClient::new(clock.clone()));
        let reseal = Arc::new(ResealEngine::new(
            Arc::new(InMemoryChainStore::new()),
            tsa.clone(),
            clock.clone(),
            ResealConfig::default(),
        ));
        let policy = RetentionPolicy {
            id: PolicyId::new(),
            tenant_id: None,
            name: "Global default".to_string(),
            retention_years: 10,
            retention_days: 0,
            reseal_interval_days: 365,
            is_default: true,
            priority: 100,
            on_expiry: ExpiryAction::Archive,
            active: true,
            document_type: None,
            requires_pdfa: false,
        };
        let resolver = Arc::new(RetentionResolver::new(
            Arc::new(StaticPolicySource::new(vec![policy]).unwrap()),
            clock.clone(),
        ));
        let content = MemoryContentStore::new();
        let records = InMemoryArchiveStore::new();
        let archive = Arc::new(ArchiveManager::new(
            Arc::new(records.clone()),
            Arc::new(content.clone()),
            resolver,
            reseal.clone(),
            clock.clone(),
            ArchiveConfig::default(),
        ));
        Fixture {
            reseal,
            archive,
            records,
            content,
            tsa,
            clock,
            ctx: TenantContext::new(TenantId::new()),
        }
    }

    fn archive_doc(f: &Fixture, id: u64) -> evidentia_contracts::archive::ArchivedDocument {
        let location = StorageLocation::new("documents", format!("{id}.pdf"));
        f.content
            .write(&location, format!("%PDF document {id}").as_bytes())
            .unwrap();
        f.archive
            .archive(
                &f.ctx,
                &DocumentRef {
                    tenant_id: f.ctx.tenant_id,
                    document_id: DocumentId(id),
                    document_type: None,
                    location,
                    content_hash: None,
                },
            )
            .unwrap()
    }

    fn sweep(f: &Fixture) -> ResealSweep {
        ResealSweep::new(f.reseal.clone(), RetryPolicy::immediate(3)).with_archive(f.archive.clone())
    }

    // ── Reseal sweep ──────────────────────────────────────────────────────────

    #[test]
    fn test_reseal_sweep_reseals_due_chains_and_syncs_archives() {
        let f = fixture();
        let first = archive_doc(&f, 1);
        f.clock.advance(Duration::days(100));
        let second = archive_doc(&f, 2);

        f.clock.advance(Duration::days(270));
        let report = sweep(&f).run(7).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.succeeded, 1);
        assert!(report.is_clean());

        let chain = f.reseal.chain(&f.ctx, first.chain_id).unwrap();
        assert_eq!(chain.seal_count, 2);
        let synced = f.archive.archived(&f.ctx, first.id).unwrap();
        assert_eq!(synced.next_reseal_at, chain.next_seal_due_at);

        let untouched = f.reseal.chain(&f.ctx, second.chain_id).unwrap();
        assert_eq!(untouched.seal_count, 1);
    }

    /// A record claimed for a tier move refuses the schedule write until
    /// the move settles.
    #[test]
    fn test_schedule_sync_retried_past_a_migration() {
        let f = fixture();
        let first = archive_doc(&f, 1);
        f.records.claim_for_migration(f.ctx.tenant_id, first.id).unwrap();

        let records = f.records.clone();
        let tenant_id = f.ctx.tenant_id;
        let id = first.id;
        let retry = RetryPolicy::immediate(3).with_sleeper(Arc::new(move |_| {
            let mut record = records.get(tenant_id, id).unwrap().unwrap();
            if record.status == ArchiveStatus::Migrating {
                record.status = ArchiveStatus::Active;
                records.update(record).unwrap();
            }
        }));
        f.clock.advance(Duration::days(370));
        let report = ResealSweep::new(f.reseal.clone(), retry)
            .with_archive(f.archive.clone())
            .run(7)
            .unwrap();

        assert_eq!(report.succeeded, 1);
        let chain = f.reseal.chain(&f.ctx, first.chain_id).unwrap();
        let synced = f.archive.archived(&f.ctx, first.id).unwrap();
        assert_eq!(synced.status, ArchiveStatus::Active);
        assert_eq!(synced.next_reseal_at, chain.next_seal_due_at);
    }

    #[test]
    fn test_recently_sealed_chains_are_skipped() {
        let f = fixture();
        archive_doc(&f, 1);

        let report = sweep(&f).run(400).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 0);
    }

    #[test]
    fn test_transient_tsa_failures_are_retried() {
        let f = fixture();
        let doc = archive_doc(&f, 1);
        f.clock.advance(Duration::days(365));

        f.tsa.fail_next(2);
        let report = sweep(&f).run(0).unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.reseal.chain(&f.ctx, doc.chain_id).unwrap().seal_count, 2);
    }

    /// One chain exhausts its retries; the other still gets resealed.
    #[test]
    fn test_exhausted_retries_flag_chain_and_sweep_continues() {
        let f = fixture();
        archive_doc(&f, 1);
        archive_doc(&f, 2);
        f.clock.advance(Duration::days(365));

        f.tsa.fail_next(3);
        let report = sweep(&f).run(0).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("TSA unavailable"));

        let flagged = f.reseal.chains_needing_attention().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id.to_string(), report.failed[0].0);
        assert!(flagged[0].last_failure.is_some());

        // The flagged chain is still active and due, so the next run heals it.
        let report = sweep(&f).run(0).unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(f.reseal.chains_needing_attention().unwrap().is_empty());
    }

    // ── Tier migration sweep ──────────────────────────────────────────────────

    #[test]
    fn test_tier_migration_sweep_moves_idle_archives() {
        let f = fixture();
        let idle = archive_doc(&f, 1);
        let busy = archive_doc(&f, 2);

        f.clock.advance(Duration::days(366));
        f.archive.restore(&f.ctx, busy.id).unwrap();

        let migrations = TierMigrationSweep::new(f.archive.clone(), RetryPolicy::immediate(2));
        let report = migrations.run().unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.succeeded, 1);

        assert_eq!(f.archive.archived(&f.ctx, idle.id).unwrap().tier, ArchiveTier::Cold);
        assert_eq!(f.archive.archived(&f.ctx, busy.id).unwrap().tier, ArchiveTier::Hot);
        assert_eq!(migrations.run().unwrap().processed, 0);
    }

    // ── Retry policy ──────────────────────────────────────────────────────────

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(
            policy.backoff,
            vec![
                StdDuration::from_secs(60),
                StdDuration::from_secs(300),
                StdDuration::from_secs(900)
            ]
        );
        assert_eq!(policy.timeout, StdDuration::from_secs(300));
    }

    #[test]
    fn test_retry_policy_waits_and_stops_on_permanent_errors() {
        let slept = Arc::new(Mutex::new(Vec::<StdDuration>::new()));
        let recorder = slept.clone();
        let policy = RetryPolicy::new(
            4,
            vec![StdDuration::from_millis(1), StdDuration::from_millis(2)],
            StdDuration::from_secs(60),
        )
        .with_sleeper(Arc::new(move |d: StdDuration| {
            recorder.lock().unwrap().push(d)
        }));

        let mut calls = 0;
        let result: Result<(), EvidentiaError> = policy.run("unit", || {
            calls += 1;
            Err(EvidentiaError::ConcurrentModification {
                resource: "archive".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 4);
        assert_eq!(
            *slept.lock().unwrap(),
            vec![
                StdDuration::from_millis(1),
                StdDuration::from_millis(2),
                StdDuration::from_millis(2)
            ]
        );

        let mut calls = 0;
        let result: Result<(), EvidentiaError> = policy.run("unit", || {
            calls += 1;
            Err(EvidentiaError::InvalidTier {
                tier: "glacier".to_string(),
            })
        });
        assert!(matches!(result, Err(EvidentiaError::InvalidTier { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_policy_respects_time_budget() {
        let policy = RetryPolicy::new(
            10,
            vec![StdDuration::from_secs(120)],
            StdDuration::from_secs(60),
        )
        .with_sleeper(Arc::new(|_: StdDuration| {}));

        let mut calls = 0;
        let _ = policy.run::<(), _>("unit", || {
            calls += 1;
            Err(EvidentiaError::TsaUnavailable {
                attempts: 1,
                reason: "timeout".to_string(),
            })
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_clock_drives_due_window() {
        let f = fixture();
        archive_doc(&f, 1);
        let due_at = f.clock.now() + Duration::days(365);

        f.clock.set(due_at - Duration::days(8));
        assert_eq!(sweep(&f).run(7).unwrap().processed, 0);
        f.clock.set(due_at - Duration::days(7));
        assert_eq!(sweep(&f).run(7).unwrap().processed, 1);
    }
}
