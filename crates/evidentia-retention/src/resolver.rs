//! Retention policy resolution and date arithmetic.
//!
//! Resolution order for a document:
//!
//! 1. Active tenant-scoped non-default policies whose document-type filter
//!    matches, lowest `priority` first (ties: name, then id).
//! 2. The tenant's default policy.
//! 3. The global default policy.
//! 4. Otherwise `NoPolicyFound`.
//!
//! Global non-default policies are never picked by resolution; a tenant
//! opts into a specific rule set by scoping a policy to itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use tracing::{debug, warn};

use evidentia_contracts::{
    archive::ArchivedDocument,
    entity::TenantId,
    error::{EvResult, EvidentiaError},
    retention::{AppliedPolicy, PolicySubject, RetentionPolicy},
};
use evidentia_core::traits::{Clock, PolicySource};

pub struct RetentionResolver {
    source: Arc<dyn PolicySource>,
    clock: Arc<dyn Clock>,
}

impl RetentionResolver {
    pub fn new(source: Arc<dyn PolicySource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    /// Pick the policy governing `subject`.
    pub fn policy_for_document(&self, subject: &PolicySubject) -> EvResult<RetentionPolicy> {
        let candidates: Vec<RetentionPolicy> = self
            .source
            .policies()?
            .into_iter()
            .filter(|p| p.active && document_type_matches(p, subject))
            .collect();

        let tenant = Some(subject.tenant_id);
        let best = |is_default: bool, scope: Option<TenantId>| {
            candidates
                .iter()
                .filter(|p| p.is_default == is_default && p.tenant_id == scope)
                .min_by(|a, b| {
                    (a.priority, &a.name, a.id).cmp(&(b.priority, &b.name, b.id))
                })
                .cloned()
        };

        let resolved = best(false, tenant)
            .or_else(|| best(true, tenant))
            .or_else(|| best(true, None));

        match resolved {
            Some(policy) => {
                debug!(
                    tenant_id = %subject.tenant_id,
                    document_type = subject.document_type.as_deref().unwrap_or("-"),
                    policy = %policy.name,
                    scope = if policy.tenant_id.is_some() { "tenant" } else { "global" },
                    "retention policy resolved"
                );
                Ok(policy)
            }
            None => {
                warn!(tenant_id = %subject.tenant_id, "no retention policy resolves");
                Err(EvidentiaError::NoPolicyFound {
                    tenant: subject.tenant_id.to_string(),
                })
            }
        }
    }

    /// Stamp `policy` onto a document archived at `archived_at`.
    ///
    /// Years are added as calendar years, so a document archived on 29
    /// February expires on 28 February of a non-leap year.
    pub fn apply_policy(
        &self,
        archived_at: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> EvResult<AppliedPolicy> {
        let retention_expires_at =
            add_period(archived_at, policy.retention_years, policy.retention_days)?;
        let next_reseal_at =
            self.clock.now() + Duration::days(i64::from(policy.reseal_interval_days));

        Ok(AppliedPolicy {
            retention_policy_id: policy.id,
            retention_expires_at,
            next_reseal_at,
            reseal_interval_days: policy.reseal_interval_days,
            pdfa_required: policy.requires_pdfa,
        })
    }

    pub fn is_expired(&self, document: &ArchivedDocument) -> bool {
        document.retention_expires_at <= self.clock.now()
    }

    /// Not yet expired, but will be within `within_days`.
    pub fn is_expiring_soon(&self, document: &ArchivedDocument, within_days: u32) -> bool {
        let now = self.clock.now();
        document.retention_expires_at > now
            && document.retention_expires_at <= now + Duration::days(i64::from(within_days))
    }

    /// Push the retention end further out.  Never shortens it.
    ///
    /// Returns the updated record; persisting it is the caller's job.
    pub fn extend_retention(
        &self,
        document: &ArchivedDocument,
        years: i32,
        days: i32,
    ) -> EvResult<ArchivedDocument> {
        if years < 0 || days < 0 {
            return Err(EvidentiaError::InvalidInput {
                reason: format!("retention can only be extended (got {years} years, {days} days)"),
            });
        }

        let mut extended = document.clone();
        extended.retention_expires_at =
            add_period(document.retention_expires_at, years as u32, days as u32)?;
        debug!(
            archive_id = %document.id,
            retention_expires_at = %extended.retention_expires_at,
            "retention extended"
        );
        Ok(extended)
    }
}

fn document_type_matches(policy: &RetentionPolicy, subject: &PolicySubject) -> bool {
    match &policy.document_type {
        None => true,
        Some(filter) => subject.document_type.as_deref() == Some(filter.as_str()),
    }
}

/// `at` plus calendar `years` plus `days`.
pub fn add_period(at: DateTime<Utc>, years: u32, days: u32) -> EvResult<DateTime<Utc>> {
    let out_of_range = || EvidentiaError::InvalidInput {
        reason: format!("retention period of {years} years and {days} days is out of range"),
    };
    at.checked_add_months(Months::new(years.checked_mul(12).ok_or_else(out_of_range)?))
        .and_then(|t| t.checked_add_signed(Duration::days(i64::from(days))))
        .ok_or_else(out_of_range)
}
