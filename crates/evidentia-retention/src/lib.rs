//! # evidentia-retention
//!
//! Retention policy resolution for archived documents.
//!
//! ## Overview
//!
//! Policies are declared in a TOML file (see [`policy`]) or supplied in code,
//! and exposed through the [`PolicySource`](evidentia_core::traits::PolicySource)
//! trait.  [`RetentionResolver`] picks the governing policy for a document
//! and turns it into concrete dates: when retention ends and when the first
//! reseal is due.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::{path::Path, sync::Arc};
//! use evidentia_retention::{RetentionResolver, TomlPolicySource};
//!
//! let source = TomlPolicySource::from_file(Path::new("policies.toml"))?;
//! let resolver = RetentionResolver::new(Arc::new(source), clock);
//! let policy = resolver.policy_for_document(&subject)?;
//! let applied = resolver.apply_policy(archived_at, &policy)?;
//! ```

pub mod policy;
pub mod resolver;

pub use policy::{validate_policies, PolicyFile, PolicyRecord, StaticPolicySource, TomlPolicySource};
pub use resolver::{add_period, RetentionResolver};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use evidentia_contracts::{
        archive::{ArchiveStatus, ArchiveTier, ArchivedDocument, StorageLocation},
        entity::{ArchiveId, ChainId, DocumentId, PolicyId, TenantId},
        error::EvidentiaError,
        retention::{ExpiryAction, PolicySubject, RetentionPolicy},
    };
    use evidentia_core::{traits::PolicySource, ManualClock};

    use crate::{RetentionResolver, StaticPolicySource, TomlPolicySource};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn policy(name: &str, tenant: Option<TenantId>, years: u32, is_default: bool) -> RetentionPolicy {
        RetentionPolicy {
            id: PolicyId::new(),
            tenant_id: tenant,
            name: name.to_string(),
            retention_years: years,
            retention_days: 0,
            reseal_interval_days: 365,
            is_default,
            priority: 100,
            on_expiry: ExpiryAction::Archive,
            active: true,
            document_type: None,
            requires_pdfa: false,
        }
    }

    fn resolver(policies: Vec<RetentionPolicy>) -> (RetentionResolver, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let source = StaticPolicySource::new(policies).unwrap();
        (RetentionResolver::new(Arc::new(source), clock.clone()), clock)
    }

    fn subject(tenant: TenantId, document_type: Option<&str>) -> PolicySubject {
        PolicySubject {
            tenant_id: tenant,
            document_type: document_type.map(String::from),
        }
    }

    fn archived(expires_at: DateTime<Utc>) -> ArchivedDocument {
        ArchivedDocument {
            id: ArchiveId::new(),
            tenant_id: TenantId::new(),
            document_id: DocumentId(1),
            document_type: None,
            tier: ArchiveTier::Hot,
            status: ArchiveStatus::Active,
            archive_hash: "0".repeat(64),
            location: StorageLocation::new("archive-hot", "archives/1"),
            retention_policy_id: PolicyId::new(),
            retention_expires_at: expires_at,
            next_reseal_at: start(),
            chain_id: ChainId::new(),
            pdfa_required: false,
            archived_at: start(),
            last_accessed_at: None,
            tier_changed_at: start(),
            version: 0,
        }
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    /// A tenant-specific non-default policy beats the global default.
    #[test]
    fn test_tenant_policy_beats_global_default() {
        let tenant = TenantId::new();
        let mut specific = policy("Tenant 10y", Some(tenant), 10, false);
        specific.priority = 50;
        let (r, _) = resolver(vec![policy("Global 5y", None, 5, true), specific]);

        let resolved = r.policy_for_document(&subject(tenant, None)).unwrap();
        assert_eq!(resolved.retention_years, 10);
        assert_eq!(resolved.name, "Tenant 10y");
    }

    #[test]
    fn test_fallback_order() {
        let tenant = TenantId::new();
        let other = TenantId::new();
        let (r, _) = resolver(vec![
            policy("Global default", None, 5, true),
            policy("Tenant default", Some(tenant), 7, true),
            policy("Other tenant rule", Some(other), 12, false),
        ]);

        assert_eq!(
            r.policy_for_document(&subject(tenant, None)).unwrap().name,
            "Tenant default"
        );
        assert_eq!(
            r.policy_for_document(&subject(other, None)).unwrap().name,
            "Other tenant rule"
        );
        assert_eq!(
            r.policy_for_document(&subject(TenantId::new(), None)).unwrap().name,
            "Global default"
        );
    }

    #[test]
    fn test_no_policy_found() {
        let tenant = TenantId::new();
        let (r, _) = resolver(vec![policy("Global non-default", None, 5, false)]);
        let err = r.policy_for_document(&subject(tenant, None)).unwrap_err();
        assert!(matches!(err, EvidentiaError::NoPolicyFound { .. }));
    }

    #[test]
    fn test_priority_then_name_breaks_ties() {
        let tenant = TenantId::new();
        let mut low = policy("Zulu", Some(tenant), 3, false);
        low.priority = 10;
        let mut tie_a = policy("Alpha", Some(tenant), 4, false);
        tie_a.priority = 20;
        let mut tie_b = policy("Bravo", Some(tenant), 5, false);
        tie_b.priority = 20;

        let (r, _) = resolver(vec![tie_b.clone(), tie_a.clone(), low]);
        assert_eq!(r.policy_for_document(&subject(tenant, None)).unwrap().name, "Zulu");

        let (r, _) = resolver(vec![tie_b, tie_a]);
        assert_eq!(r.policy_for_document(&subject(tenant, None)).unwrap().name, "Alpha");
    }

    #[test]
    fn test_document_type_filter_and_inactive_policies() {
        let tenant = TenantId::new();
        let mut contracts = policy("Contracts", Some(tenant), 30, false);
        contracts.document_type = Some("contract".to_string());
        let mut retired = policy("Retired", Some(tenant), 1, false);
        retired.active = false;
        let (r, _) = resolver(vec![policy("Global", None, 5, true), contracts, retired]);

        assert_eq!(
            r.policy_for_document(&subject(tenant, Some("contract"))).unwrap().name,
            "Contracts"
        );
        assert_eq!(
            r.policy_for_document(&subject(tenant, Some("invoice"))).unwrap().name,
            "Global"
        );
        assert_eq!(r.policy_for_document(&subject(tenant, None)).unwrap().name, "Global");
    }

    // ── Dates ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_apply_policy_uses_calendar_years() {
        let mut p = policy("Leap", None, 1, true);
        p.retention_days = 10;
        p.reseal_interval_days = 180;
        p.requires_pdfa = true;
        let (r, _) = resolver(vec![p.clone()]);

        let leap_day = Utc.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap();
        let applied = r.apply_policy(leap_day, &p).unwrap();

        assert_eq!(
            applied.retention_expires_at,
            Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
        );
        assert_eq!(applied.next_reseal_at, start() + Duration::days(180));
        assert_eq!(applied.retention_policy_id, p.id);
        assert!(applied.pdfa_required);
    }

    #[test]
    fn test_expiry_checks() {
        let (r, clock) = resolver(vec![policy("Global", None, 5, true)]);
        let doc = archived(start() + Duration::days(20));

        assert!(!r.is_expired(&doc));
        assert!(!r.is_expiring_soon(&doc, 10));
        assert!(r.is_expiring_soon(&doc, 30));

        clock.advance(Duration::days(21));
        assert!(r.is_expired(&doc));
        assert!(!r.is_expiring_soon(&doc, 30), "already expired is not 'soon'");
    }

    #[test]
    fn test_extend_retention_is_additive() {
        let (r, _) = resolver(vec![policy("Global", None, 5, true)]);
        let doc = archived(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());

        let extended = r.extend_retention(&doc, 2, 5).unwrap();
        assert_eq!(
            extended.retention_expires_at,
            Utc.with_ymd_and_hms(2032, 1, 6, 0, 0, 0).unwrap()
        );

        let err = r.extend_retention(&doc, -1, 0).unwrap_err();
        assert!(matches!(err, EvidentiaError::InvalidInput { .. }));
    }

    // ── TOML loading ──────────────────────────────────────────────────────────

    #[test]
    fn test_toml_source_loads_and_defaults() {
        let tenant = TenantId::new();
        let toml = format!(
            r#"
            [[policies]]
            name = "Global default"
            retention_years = 5
            is_default = true

            [[policies]]
            name = "Tenant contracts"
            tenant_id = "{tenant}"
            retention_years = 10
            priority = 50
            document_type = "contract"
            on_expiry = "notify"
            requires_pdfa = true
            "#
        );

        let source = TomlPolicySource::from_toml_str(&toml).unwrap();
        let policies = source.policies().unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].reseal_interval_days, 365);
        assert_eq!(policies[0].priority, 100);
        assert!(policies[0].active);
        assert_eq!(policies[1].tenant_id, Some(tenant));
        assert_eq!(policies[1].on_expiry, ExpiryAction::Notify);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlPolicySource::from_toml_str("[[policies]\nname = ").unwrap_err();
        match err {
            EvidentiaError::ConfigError { reason } => {
                assert!(reason.contains("failed to parse retention policy TOML"), "{reason}")
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_policy_sets_rejected() {
        let zero_interval = r#"
            [[policies]]
            name = "Broken"
            retention_years = 5
            reseal_interval_days = 0
        "#;
        assert!(matches!(
            TomlPolicySource::from_toml_str(zero_interval).unwrap_err(),
            EvidentiaError::ConfigError { .. }
        ));

        let two_defaults = r#"
            [[policies]]
            name = "A"
            retention_years = 5
            is_default = true

            [[policies]]
            name = "B"
            retention_years = 6
            is_default = true
        "#;
        let err = TomlPolicySource::from_toml_str(two_defaults).unwrap_err();
        assert!(err.to_string().contains("another default policy"));

        let no_period = r#"
            [[policies]]
            name = "Empty"
        "#;
        assert!(TomlPolicySource::from_toml_str(no_period).is_err());
    }
}
