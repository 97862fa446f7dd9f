//! Time-stamp tokens issued by a TSA.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{TenantId, TokenId};

/// Stored status of a token.  Only `Valid → Expired` and `Valid → Revoked`
/// ever happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Valid,
    Expired,
    Revoked,
}

/// A timestamp attesting that `data_hash` existed at `issued_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsaToken {
    pub id: TokenId,
    pub tenant_id: TenantId,

    /// The digest that was timestamped, exactly as requested.
    pub data_hash: String,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: TokenStatus,

    /// Name of the issuing authority (e.g. `mock-tsa`).
    pub authority: String,

    /// Authority-assigned serial number, unique per authority.
    pub serial: u64,

    /// Opaque token material kept for later verification.
    pub material: Vec<u8>,
}

impl TsaToken {
    /// Effective status at `now`: a stored `Valid` token past its expiry
    /// reports `Expired`.
    pub fn status_at(&self, now: DateTime<Utc>) -> TokenStatus {
        match self.status {
            TokenStatus::Valid if now >= self.expires_at => TokenStatus::Expired,
            other => other,
        }
    }
}
