//! Locally signed authority.
//!
//! Tokens are ed25519 signatures over a canonical message binding the data
//! hash to the issue time, expiry and serial.  Verification checks the
//! signature against `TrustAnchors`, the set of authority keys the verifier
//! accepts.  Keeping retired keys in the anchor set is what lets a chain
//! sealed under an old key still verify after the authority rotates.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::debug;

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

/// Decode a hex-encoded 32-byte ed25519 seed.
pub fn seed_from_hex(s: &str) -> EvResult<[u8; 32]> {
    let bytes = hex::decode(s.trim()).map_err(|e| EvidentiaError::ConfigError {
        reason: format!("signing seed is not valid hex: {}", e),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| EvidentiaError::ConfigError {
        reason: format!("signing seed must be 32 bytes, got {}", b.len()),
    })
}

/// Verifying keys accepted per authority name.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    keys: HashMap<String, Vec<VerifyingKey>>,
}

impl TrustAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust(&mut self, authority: impl Into<String>, key: VerifyingKey) {
        let keys = self.keys.entry(authority.into()).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    /// True if any anchor for `authority` accepts `signature` over `message`.
    pub fn verify(&self, authority: &str, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.keys
            .get(authority)
            .map(|keys| keys.iter().any(|k| k.verify(message, &signature).is_ok()))
            .unwrap_or(false)
    }
}

/// A `TsaClient` that signs tokens with an in-process ed25519 key.
pub struct SignedTsaClient {
    authority: String,
    signing_key: SigningKey,
    anchors: TrustAnchors,
    validity_years: u32,
    clock: Arc<dyn Clock>,
    serial: AtomicU64,
}

impl SignedTsaClient {
    /// Build an authority from a 32-byte seed.  Its own key is trusted.
    pub fn from_seed(
        authority: impl Into<String>,
        seed: &[u8; 32],
        validity_years: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authority = authority.into();
        let signing_key = SigningKey::from_bytes(seed);
        let mut anchors = TrustAnchors::new();
        anchors.trust(authority.clone(), signing_key.verifying_key());
        Self {
            authority,
            signing_key,
            anchors,
            validity_years,
            clock,
            serial: AtomicU64::new(0),
        }
    }

    /// Also accept tokens signed by `key` under `authority` (e.g. a retired
    /// key of this authority).
    pub fn trust(&mut self, authority: impl Into<String>, key: VerifyingKey) {
        self.anchors.trust(authority, key);
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn message(token: &TsaToken) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}",
            token.authority,
            token.data_hash,
            timestamp_text(token.issued_at),
            timestamp_text(token.expires_at),
            token.serial
        )
        .into_bytes()
    }
}

impl TsaClient for SignedTsaClient {
    fn authority(&self) -> &str {
        &self.authority
    }

    fn request_timestamp(&self, tenant_id: TenantId, data_hash: &str) -> EvResult<TsaToken> {
        hashing::require_valid_hash(data_hash)?;

        let issued_at = self.clock.now();
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        let mut token = TsaToken {
            id: TokenId::new(),
            tenant_id,
            data_hash: data_hash.to_string(),
            issued_at,
            expires_at: expiry_after_years(issued_at, self.validity_years),
            status: TokenStatus::Valid,
            authority: self.authority.clone(),
            serial,
            material: Vec::new(),
        };
        let signature: Signature = self.signing_key.sign(&Self::message(&token));
        token.material = signature.to_bytes().to_vec();

        debug!(authority = %self.authority, serial, data_hash, "issued signed timestamp");
        Ok(token)
    }

    fn verify_timestamp(&self, token: &TsaToken, now: DateTime<Utc>) -> bool {
        is_structurally_valid(token, now)
            && self
                .anchors
                .verify(&token.authority, &Self::message(token), &token.material)
    }
}
