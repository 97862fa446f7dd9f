//! Retention policy configuration entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{PolicyId, TenantId};

/// What happens when a document's retention expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryAction {
    Archive,
    Delete,
    Notify,
    Extend,
}

/// A retention policy.  `tenant_id = None` marks a global policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub id: PolicyId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub retention_years: u32,
    pub retention_days: u32,
    pub reseal_interval_days: u32,
    pub is_default: bool,

    /// Lower number wins.
    pub priority: i32,

    pub on_expiry: ExpiryAction,
    pub active: bool,

    /// Restrict the policy to one document type. `None` matches all.
    pub document_type: Option<String>,

    pub requires_pdfa: bool,
}

/// The values stamped onto an archive record when a policy is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPolicy {
    pub retention_policy_id: PolicyId,
    pub retention_expires_at: DateTime<Utc>,
    pub next_reseal_at: DateTime<Utc>,
    pub reseal_interval_days: u32,
    pub pdfa_required: bool,
}

/// The attributes policy resolution looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySubject {
    pub tenant_id: TenantId,
    pub document_type: Option<String>,
}
