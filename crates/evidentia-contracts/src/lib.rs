//! # evidentia-contracts
//!
//! Shared data model, verification outcomes, and error types for the
//! Evidentia evidentiary core.
//!
//! All crates in the workspace import from here. No engine logic lives in
//! this crate, only data definitions, small pure helpers, and error types.

pub mod archive;
pub mod audit;
pub mod chain;
pub mod entity;
pub mod error;
pub mod retention;
pub mod tsa;
pub mod verify;

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use archive::ArchiveTier;
    use audit::event_category;
    use chain::{ChainStatus, ResealReason};
    use entity::{EntityKind, EntityRef, TenantId};
    use error::{ErrorClass, EvidentiaError};
    use tsa::{TokenStatus, TsaToken};
    use verify::{ConfidenceLevel, PublicVerification};

    // ── ArchiveTier ──────────────────────────────────────────────────────────

    #[test]
    fn tier_parses_known_names_case_insensitively() {
        assert_eq!("hot".parse::<ArchiveTier>().unwrap(), ArchiveTier::Hot);
        assert_eq!(" Cold ".parse::<ArchiveTier>().unwrap(), ArchiveTier::Cold);
        assert_eq!("ARCHIVE".parse::<ArchiveTier>().unwrap(), ArchiveTier::Archive);
    }

    #[test]
    fn tier_rejects_unknown_name() {
        match "glacier".parse::<ArchiveTier>() {
            Err(EvidentiaError::InvalidTier { tier }) => assert_eq!(tier, "glacier"),
            other => panic!("expected InvalidTier, got {:?}", other),
        }
    }

    // ── Chain status state machine ───────────────────────────────────────────

    #[test]
    fn chain_status_only_leaves_active() {
        assert!(ChainStatus::Active.can_transition_to(ChainStatus::Invalid));
        assert!(ChainStatus::Active.can_transition_to(ChainStatus::Superseded));
        assert!(!ChainStatus::Invalid.can_transition_to(ChainStatus::Active));
        assert!(!ChainStatus::Superseded.can_transition_to(ChainStatus::Invalid));
        assert!(!ChainStatus::Active.can_transition_to(ChainStatus::Active));
    }

    #[test]
    fn reseal_reason_parses() {
        assert_eq!("scheduled".parse::<ResealReason>().unwrap(), ResealReason::Scheduled);
        assert!("sometimes".parse::<ResealReason>().is_err());
    }

    // ── Entity references ────────────────────────────────────────────────────

    #[test]
    fn entity_ref_display_uses_stable_kind_name() {
        let entity = EntityRef::new(EntityKind::ArchivedDocument, 7);
        assert_eq!(entity.to_string(), "archived_document#7");
    }

    #[test]
    fn event_category_is_prefix() {
        assert_eq!(event_category("document.uploaded"), "document");
        assert_eq!(event_category("signature.otp.verified"), "signature");
        assert_eq!(event_category("login"), "login");
    }

    // ── Tokens ───────────────────────────────────────────────────────────────

    #[test]
    fn token_reports_expired_after_expiry() {
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let token = TsaToken {
            id: entity::TokenId::new(),
            tenant_id: TenantId::new(),
            data_hash: "a".repeat(64),
            issued_at: issued,
            expires_at: issued + Duration::days(30),
            status: TokenStatus::Valid,
            authority: "mock-tsa".to_string(),
            serial: 1,
            material: vec![1, 2, 3],
        };

        assert_eq!(token.status_at(issued + Duration::days(1)), TokenStatus::Valid);
        assert_eq!(token.status_at(issued + Duration::days(30)), TokenStatus::Expired);

        let revoked = TsaToken {
            status: TokenStatus::Revoked,
            ..token
        };
        assert_eq!(revoked.status_at(issued), TokenStatus::Revoked);
    }

    // ── Verification outcomes ────────────────────────────────────────────────

    #[test]
    fn confidence_counts_passed_checks() {
        assert_eq!(PublicVerification::new(true, true, true).confidence, ConfidenceLevel::High);
        assert_eq!(PublicVerification::new(true, false, true).confidence, ConfidenceLevel::Medium);
        assert_eq!(PublicVerification::new(false, false, true).confidence, ConfidenceLevel::Low);
        assert_eq!(PublicVerification::new(false, false, false).confidence, ConfidenceLevel::None);
    }

    // ── Error taxonomy ───────────────────────────────────────────────────────

    #[test]
    fn error_classes_follow_taxonomy() {
        assert_eq!(EvidentiaError::NoTenantContext.class(), ErrorClass::Configuration);
        assert!(!EvidentiaError::NoTenantContext.is_retryable());

        let tsa = EvidentiaError::TsaUnavailable {
            attempts: 3,
            reason: "timeout".to_string(),
        };
        assert_eq!(tsa.class(), ErrorClass::Transient);
        assert!(tsa.is_retryable());

        let tier = EvidentiaError::InvalidTier {
            tier: "x".to_string(),
        };
        assert_eq!(tier.class(), ErrorClass::InvalidInput);
        assert!(!tier.is_retryable());
    }

    #[test]
    fn write_races_are_retryable_conflicts() {
        let sequence = EvidentiaError::SequenceConflict {
            scope: "chain 1".to_string(),
            expected: 2,
        };
        assert_eq!(sequence.class(), ErrorClass::Conflict);
        assert!(sequence.is_retryable());

        let record = EvidentiaError::ConcurrentModification {
            resource: "archive 1".to_string(),
        };
        assert_eq!(record.class(), ErrorClass::Conflict);
        assert!(record.is_retryable());
    }

    #[test]
    fn error_display_carries_context() {
        let err = EvidentiaError::TsaUnavailable {
            attempts: 3,
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("connection refused"));

        let err = EvidentiaError::SequenceConflict {
            scope: "document#1".to_string(),
            expected: 4,
        };
        assert!(err.to_string().contains("document#1"));
    }
}
