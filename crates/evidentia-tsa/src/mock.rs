//! Deterministic mock authority.
//!
//! Produces self-consistent tokens without network access.  The token
//! material is a digest of (data hash, issue time, serial), so a verifier can
//! recompute it.  Failure injection lets tests exercise the "TSA down" paths.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use evidentia_contracts::{
    entity::{TenantId, TokenId},
    error::{EvResult, EvidentiaError},
    tsa::{TokenStatus, TsaToken},
};
use evidentia_core::{
    hashing,
    traits::{Clock, TsaClient},
};

use crate::{expiry_after_years, is_structurally_valid, timestamp_text};

#[derive(Debug, Default)]
struct MockState {
    serial: u64,
    requests: u64,
    fail_next: u32,
    unavailable: bool,
}

/// A `TsaClient` that never leaves the process.
pub struct MockTsaClient {
    authority: String,
    validity_years: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<MockState>,
}

impl MockTsaClient {
    pub const DEFAULT_AUTHORITY: &'static str = "mock-tsa";

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_validity(clock, 10)
    }

    pub fn with_validity(clock: Arc<dyn Clock>, validity_years: u32) -> Self {
        Self {
            authority: Self::DEFAULT_AUTHORITY.to_string(),
            validity_years,
            clock,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Make the next `n` requests fail with `TsaUnavailable`.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Make every request fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Requests received, including failed ones.
    pub fn request_count(&self) -> u64 {
        self.lock().requests
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn material(data_hash: &str, issued_at: DateTime<Utc>, serial: u64) -> Vec<u8> {
        hashing::hash_string(&format!(
            "mock-tsa|{}|{}|{}",
            data_hash,
            timestamp_text(issued_at),
            serial
        ))
        .into_bytes()
    }
}

impl TsaClient for MockTsaClient {
    fn authority(&self) -> &str {
        &self.authority
    }

    fn request_timestamp(&self, tenant_id: TenantId, data_hash: &str) -> EvResult<TsaToken> {
        hashing::require_valid_hash(data_hash)?;

        let serial = {
            let mut state = self.lock();
            state.requests += 1;
            if state.unavailable {
                return Err(EvidentiaError::TsaUnavailable {
                    attempts: 1,
                    reason: "mock authority is offline".to_string(),
                });
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(EvidentiaError::TsaUnavailable {
                    attempts: 1,
                    reason: "injected mock failure".to_string(),
                });
            }
            state.serial += 1;
            state.serial
        };

        let issued_at = self.clock.now();
        Ok(TsaToken {
            id: TokenId::new(),
            tenant_id,
            data_hash: data_hash.to_string(),
            issued_at,
            expires_at: expiry_after_years(issued_at, self.validity_years),
            status: TokenStatus::Valid,
            authority: self.authority.clone(),
            serial,
            material: Self::material(data_hash, issued_at, serial),
        })
    }

    fn verify_timestamp(&self, token: &TsaToken, now: DateTime<Utc>) -> bool {
        is_structurally_valid(token, now)
            && token.authority == self.authority
            && token.material == Self::material(&token.data_hash, token.issued_at, token.serial)
    }
}
