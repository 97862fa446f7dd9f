//! Retention policy sources.
//!
//! A `PolicyFile` is deserialized from TOML and holds every policy the
//! resolver may choose from, global and tenant-scoped alike.
//!
//! ```toml
//! [[policies]]
//! name = "Global default"
//! retention_years = 5
//! is_default = true
//!
//! [[policies]]
//! name = "Contracts, ACME"
//! tenant_id = "0b6a…"
//! retention_years = 10
//! priority = 50
//! document_type = "contract"
//! on_expiry = "notify"
//! ```

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};

use evidentia_contracts::{
    entity::{PolicyId, TenantId},
    error::{EvResult, EvidentiaError},
    retention::{ExpiryAction, RetentionPolicy},
};
use evidentia_core::traits::PolicySource;

fn default_reseal_interval_days() -> u32 {
    365
}

fn default_priority() -> i32 {
    100
}

fn default_on_expiry() -> ExpiryAction {
    ExpiryAction::Archive
}

fn default_active() -> bool {
    true
}

/// One `[[policies]]` table.
///
/// Omitted `id`s are generated at load time; give one explicitly when the
/// id is referenced by stored archive records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: Option<PolicyId>,

    /// Absent for a global policy.
    pub tenant_id: Option<TenantId>,

    pub name: String,

    #[serde(default)]
    pub retention_years: u32,

    #[serde(default)]
    pub retention_days: u32,

    #[serde(default = "default_reseal_interval_days")]
    pub reseal_interval_days: u32,

    #[serde(default)]
    pub is_default: bool,

    /// Lower number wins.
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_on_expiry")]
    pub on_expiry: ExpiryAction,

    #[serde(default = "default_active")]
    pub active: bool,

    pub document_type: Option<String>,

    #[serde(default)]
    pub requires_pdfa: bool,
}

impl PolicyRecord {
    fn into_policy(self) -> RetentionPolicy {
        RetentionPolicy {
            id: self.id.unwrap_or_default(),
            tenant_id: self.tenant_id,
            name: self.name,
            retention_years: self.retention_years,
            retention_days: self.retention_days,
            reseal_interval_days: self.reseal_interval_days,
            is_default: self.is_default,
            priority: self.priority,
            on_expiry: self.on_expiry,
            active: self.active,
            document_type: self.document_type,
            requires_pdfa: self.requires_pdfa,
        }
    }
}

/// The top-level structure of a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PolicyRecord>,
}

/// Reject policy sets the resolver could not decide between, or policies
/// that would produce a meaningless schedule.
pub fn validate_policies(policies: &[RetentionPolicy]) -> EvResult<()> {
    let invalid = |reason: String| Err(EvidentiaError::ConfigError { reason });

    let mut ids = HashSet::new();
    let mut defaults = HashSet::new();

    for p in policies {
        if p.name.trim().is_empty() {
            return invalid(format!("policy {} has an empty name", p.id));
        }
        if !ids.insert(p.id) {
            return invalid(format!("duplicate policy id {}", p.id));
        }
        if p.reseal_interval_days == 0 {
            return invalid(format!(
                "policy '{}': reseal_interval_days must be > 0",
                p.name
            ));
        }
        if p.retention_years == 0 && p.retention_days == 0 {
            return invalid(format!("policy '{}': retention period must be > 0", p.name));
        }
        if p.is_default && p.active {
            let scope = (p.tenant_id, p.priority, p.document_type.clone());
            if !defaults.insert(scope) {
                return invalid(format!(
                    "policy '{}': another default policy already exists for this scope at priority {}",
                    p.name, p.priority
                ));
            }
        }
    }
    Ok(())
}

/// Policies loaded from a TOML document.
#[derive(Debug, Clone)]
pub struct TomlPolicySource {
    policies: Vec<RetentionPolicy>,
}

impl TomlPolicySource {
    /// Parse `s` as a policy file and validate it.
    ///
    /// Returns `ConfigError` if the TOML is malformed or the policy set is
    /// invalid.
    pub fn from_toml_str(s: &str) -> EvResult<Self> {
        let file: PolicyFile = toml::from_str(s).map_err(|e| EvidentiaError::ConfigError {
            reason: format!("failed to parse retention policy TOML: {}", e),
        })?;
        let policies: Vec<RetentionPolicy> =
            file.policies.into_iter().map(PolicyRecord::into_policy).collect();
        validate_policies(&policies)?;
        Ok(Self { policies })
    }

    pub fn from_file(path: &Path) -> EvResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EvidentiaError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}

impl PolicySource for TomlPolicySource {
    fn policies(&self) -> EvResult<Vec<RetentionPolicy>> {
        Ok(self.policies.clone())
    }
}

/// A fixed, in-code policy set.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    policies: Vec<RetentionPolicy>,
}

impl StaticPolicySource {
    pub fn new(policies: Vec<RetentionPolicy>) -> EvResult<Self> {
        validate_policies(&policies)?;
        Ok(Self { policies })
    }
}

impl PolicySource for StaticPolicySource {
    fn policies(&self) -> EvResult<Vec<RetentionPolicy>> {
        Ok(self.policies.clone())
    }
}
