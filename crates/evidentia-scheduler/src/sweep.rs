//! The scheduled sweeps.
//!
//! A sweep enumerates due work across all tenants and runs each unit
//! independently under the unit's own tenant context.  One unit failing
//! never stops the sweep; it is recorded in the report.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use evidentia_archive::ArchiveManager;
use evidentia_contracts::{
    chain::{ResealOutcome, ResealReason, TsaChain},
    error::{EvResult, EvidentiaError},
};
use evidentia_core::TenantContext;
use evidentia_reseal::ResealEngine;

use crate::retry::RetryPolicy;

/// Outcome counts of one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,

    /// (record id, reason) for every unit that failed for good.
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reseals every chain coming due.
pub struct ResealSweep {
    reseal: Arc<ResealEngine>,
    archive: Option<Arc<ArchiveManager>>,
    retry: RetryPolicy,
}

impl ResealSweep {
    pub fn new(reseal: Arc<ResealEngine>, retry: RetryPolicy) -> Self {
        Self {
            reseal,
            archive: None,
            retry,
        }
    }

    /// Keep archive records' `next_reseal_at` in step with their chains.
    pub fn with_archive(mut self, archive: Arc<ArchiveManager>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Reseal chains due within `grace_days`.
    ///
    /// Only enumeration failures are returned as `Err`.
    pub fn run(&self, grace_days: u32) -> EvResult<SweepReport> {
        let due = self.reseal.chains_due_for_reseal(grace_days)?;
        let mut report = SweepReport::default();

        for chain in &due {
            report.processed += 1;
            let ctx = TenantContext::new(chain.tenant_id);
            let unit = format!("reseal chain {}", chain.id);

            let outcome = self
                .retry
                .run(&unit, || self.reseal.reseal(&ctx, chain.id, ResealReason::Scheduled));

            match outcome {
                Ok(ResealOutcome::Sealed(_)) => {
                    report.succeeded += 1;
                    self.sync_archive(&ctx, chain);
                }
                Ok(ResealOutcome::AlreadySealed(_)) => report.skipped += 1,
                Err(EvidentiaError::ChainNotActive { .. }) => report.skipped += 1,
                Err(e) => {
                    let reason = e.to_string();
                    if let Err(mark) = self.reseal.mark_reseal_failed(&ctx, chain.id, &reason) {
                        warn!(chain_id = %chain.id, error = %mark, "could not flag failed chain");
                    }
                    report.failed.push((chain.id.to_string(), reason));
                }
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed.len(),
            "reseal sweep finished"
        );
        Ok(report)
    }

    fn sync_archive(&self, ctx: &TenantContext, chain: &TsaChain) {
        let Some(archive) = &self.archive else {
            return;
        };
        let unit = format!("sync archive schedule for chain {}", chain.id);
        // A record mid-migration refuses the write; retried like any unit.
        let synced = self.retry.run(&unit, || {
            match archive.find_by_document(ctx, chain.document_id)? {
                Some(record) if record.chain_id == chain.id => {
                    archive.sync_reseal_schedule(ctx, record.id).map(|_| ())
                }
                _ => Ok(()),
            }
        });
        if let Err(e) = synced {
            warn!(chain_id = %chain.id, error = %e, "archive reseal schedule not synced");
        }
    }
}

/// Moves idle archives down a tier.
pub struct TierMigrationSweep {
    archive: Arc<ArchiveManager>,
    retry: RetryPolicy,
}

impl TierMigrationSweep {
    pub fn new(archive: Arc<ArchiveManager>, retry: RetryPolicy) -> Self {
        Self { archive, retry }
    }

    pub fn run(&self) -> EvResult<SweepReport> {
        let candidates = self.archive.documents_for_tier_migration()?;
        let mut report = SweepReport::default();

        for (document, target) in &candidates {
            report.processed += 1;
            let ctx = TenantContext::new(document.tenant_id);
            let unit = format!("move archive {} to {}", document.id, target);

            match self
                .retry
                .run(&unit, || self.archive.move_tier(&ctx, document.id, target.as_str()))
            {
                Ok(_) => report.succeeded += 1,
                Err(e) => report.failed.push((document.id.to_string(), e.to_string())),
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "tier migration sweep finished"
        );
        Ok(report)
    }
}
