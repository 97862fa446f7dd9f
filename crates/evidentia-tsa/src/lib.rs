//! # evidentia-tsa
//!
//! Time-stamping authority clients implementing
//! [`TsaClient`](evidentia_core::traits::TsaClient).
//!
//! - [`MockTsaClient`]: deterministic tokens, failure injection, no network.
//! - [`SignedTsaClient`]: ed25519-signed tokens verified against
//!   [`TrustAnchors`].
//! - [`RetryingTsaClient`]: bounded retries with backoff around either.
//!
//! The wire protocol of a real RFC 3161 authority is deliberately not
//! modelled: callers only depend on the trait.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! let client = evidentia_tsa::build_client(&config.tsa, clock.clone())?;
//! let token = client.request_timestamp(tenant_id, &entry_hash)?;
//! assert!(client.verify_timestamp(&token, clock.now()));
//! ```

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Months, SecondsFormat, Utc};

use evidentia_contracts::{
    error::{EvResult, EvidentiaError},
    tsa::{TokenStatus, TsaToken},
};
use evidentia_core::{
    config::{TsaMode, TsaSettings},
    hashing,
    traits::{Clock, TsaClient},
};

pub mod mock;
pub mod retry;
pub mod signed;

pub use mock::MockTsaClient;
pub use retry::RetryingTsaClient;
pub use signed::{seed_from_hex, SignedTsaClient, TrustAnchors};

/// Checks shared by every client: digest format, non-empty material, a sane
/// validity window, and a `Valid` effective status at `now`.
pub(crate) fn is_structurally_valid(token: &TsaToken, now: DateTime<Utc>) -> bool {
    hashing::is_valid_hash(&token.data_hash)
        && !token.material.is_empty()
        && token.issued_at < token.expires_at
        && token.issued_at <= now
        && token.status_at(now) == TokenStatus::Valid
}

/// `issued_at` plus whole calendar years.
pub(crate) fn expiry_after_years(issued_at: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    issued_at
        .checked_add_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Canonical text form of a timestamp inside signed or hashed messages.
pub(crate) fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Build the configured client, wrapped in the retry policy.
pub fn build_client(settings: &TsaSettings, clock: Arc<dyn Clock>) -> EvResult<Arc<dyn TsaClient>> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    let client: Arc<dyn TsaClient> = match settings.mode {
        TsaMode::Mock => Arc::new(RetryingTsaClient::new(
            MockTsaClient::with_validity(clock, settings.validity_years)
                .with_authority(settings.authority.clone()),
            settings.max_attempts,
            settings.backoff(),
            timeout,
        )),
        TsaMode::Signed => {
            let seed_hex = settings.signing_seed_hex.as_deref().ok_or_else(|| {
                EvidentiaError::ConfigError {
                    reason: "tsa.signing_seed_hex is required in signed mode".to_string(),
                }
            })?;
            let seed = seed_from_hex(seed_hex)?;
            Arc::new(RetryingTsaClient::new(
                SignedTsaClient::from_seed(
                    settings.authority.clone(),
                    &seed,
                    settings.validity_years,
                    clock,
                ),
                settings.max_attempts,
                settings.backoff(),
                timeout,
            ))
        }
    };
    Ok(client)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
