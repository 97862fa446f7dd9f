//! Error taxonomy for the Evidentia core.
//!
//! Every fallible engine operation returns `EvResult<T>`.  Integrity problems
//! discovered in historical data are never errors: they are reported through
//! `ChainVerificationResult` / `IntegrityReport` with `valid = false`.

use thiserror::Error;

/// Coarse classification used by callers (job runners, API layers) to decide
/// whether an error is worth retrying and how to surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Misconfiguration. Fatal to the current operation, never retried.
    Configuration,
    /// External service failure. Safe to retry; no partial state left.
    Transient,
    /// Rejected before any state mutation.
    InvalidInput,
    /// Lost a race with a concurrent writer. Safe to retry after a re-read.
    Conflict,
    /// The referenced record does not exist in the caller's tenant scope.
    NotFound,
    /// The underlying store failed.
    Storage,
}

/// The unified error type for the Evidentia crates.
#[derive(Debug, Error)]
pub enum EvidentiaError {
    /// The operation was invoked without an explicit tenant context.
    #[error("no tenant context supplied")]
    NoTenantContext,

    /// No retention policy resolves for the document, not even a global default.
    #[error("no retention policy found for tenant '{tenant}'")]
    NoPolicyFound { tenant: String },

    /// A configuration document is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The time-stamping authority could not be reached.
    #[error("TSA unavailable after {attempts} attempt(s): {reason}")]
    TsaUnavailable { attempts: u32, reason: String },

    /// A concurrent writer claimed the sequence number this write computed.
    #[error("sequence conflict on {scope}: expected next sequence {expected}")]
    SequenceConflict { scope: String, expected: u64 },

    /// Another operation currently holds the record (e.g. a tier move in flight).
    #[error("concurrent modification of {resource}")]
    ConcurrentModification { resource: String },

    /// The requested storage tier is not one of hot, cold, archive.
    #[error("invalid archive tier '{tier}'")]
    InvalidTier { tier: String },

    /// A value that must be a 64-character lowercase hex digest is not one.
    #[error("invalid hash '{value}': expected 64 lowercase hex characters")]
    InvalidHash { value: String },

    /// The event type does not follow the dotted taxonomy.
    #[error("invalid event type '{event_type}'")]
    InvalidEventType { event_type: String },

    /// Any other argument rejected before mutation.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A chain status change outside the allowed state machine.
    #[error("invalid chain status transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The chain exists but is no longer active.
    #[error("chain {chain_id} is not active (status: {status})")]
    ChainNotActive { chain_id: String, status: String },

    #[error("chain {chain_id} not found")]
    ChainNotFound { chain_id: String },

    #[error("archived document {archive_id} not found")]
    ArchiveNotFound { archive_id: String },

    #[error("TSA token {token_id} not found")]
    TokenNotFound { token_id: String },

    /// The store could not complete the read or write.
    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl EvidentiaError {
    /// Classify the error per the taxonomy above.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoTenantContext | Self::NoPolicyFound { .. } | Self::ConfigError { .. } => {
                ErrorClass::Configuration
            }
            Self::TsaUnavailable { .. } => ErrorClass::Transient,
            Self::SequenceConflict { .. } | Self::ConcurrentModification { .. } => {
                ErrorClass::Conflict
            }
            Self::InvalidTier { .. }
            | Self::InvalidHash { .. }
            | Self::InvalidEventType { .. }
            | Self::InvalidInput { .. }
            | Self::InvalidStateTransition { .. }
            | Self::ChainNotActive { .. } => ErrorClass::InvalidInput,
            Self::ChainNotFound { .. }
            | Self::ArchiveNotFound { .. }
            | Self::TokenNotFound { .. } => ErrorClass::NotFound,
            Self::Storage { .. } => ErrorClass::Storage,
        }
    }

    /// True when a job runner may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transient | ErrorClass::Conflict | ErrorClass::Storage
        )
    }
}

/// Convenience alias used throughout the Evidentia crates.
pub type EvResult<T> = Result<T, EvidentiaError>;
