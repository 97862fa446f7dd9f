//! Engine configuration.
//!
//! `EngineConfig` is deserialized from TOML.  Every section and field has a
//! default, so an empty document is a valid configuration.
//!
//! ```toml
//! [audit]
//! critical_events = ["document.uploaded", "document.signed"]
//!
//! [audit.tenant_critical_events]
//! "6f0d…" = ["document.signed"]
//!
//! [reseal]
//! min_reseal_spacing_hours = 24
//!
//! [tsa]
//! mode = "signed"
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use evidentia_contracts::{
    archive::ArchiveTier,
    entity::TenantId,
    error::{EvResult, EvidentiaError},
};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audit: AuditConfig,
    pub reseal: ResealConfig,
    pub archive: ArchiveConfig,
    pub tsa: TsaSettings,
    pub jobs: JobSettings,
}

impl EngineConfig {
    /// Parse `s` as TOML and validate it.
    ///
    /// Returns `ConfigError` if the TOML is malformed or a value is out of
    /// range.
    pub fn from_toml_str(s: &str) -> EvResult<Self> {
        let config: EngineConfig = toml::from_str(s).map_err(|e| EvidentiaError::ConfigError {
            reason: format!("failed to parse engine config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EvResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EvidentiaError::ConfigError {
            reason: format!("failed to read engine config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> EvResult<()> {
        let invalid = |reason: &str| {
            Err(EvidentiaError::ConfigError {
                reason: reason.to_string(),
            })
        };

        if self.audit.max_append_retries == 0 {
            return invalid("audit.max_append_retries must be > 0");
        }
        if self.reseal.default_interval_days == 0 {
            return invalid("reseal.default_interval_days must be > 0");
        }
        if self.archive.hot_to_cold_days == 0 || self.archive.cold_to_archive_days == 0 {
            return invalid("archive migration thresholds must be > 0");
        }
        if self.tsa.validity_years == 0 {
            return invalid("tsa.validity_years must be > 0");
        }
        if self.tsa.max_attempts == 0 || self.jobs.max_attempts == 0 {
            return invalid("max_attempts must be > 0");
        }
        let disks = [
            &self.archive.hot_disk,
            &self.archive.cold_disk,
            &self.archive.archive_disk,
        ];
        if disks.iter().any(|d| d.trim().is_empty()) {
            return invalid("archive disk names must not be empty");
        }
        Ok(())
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Event types that require a TSA token, for tenants without an override.
    pub critical_events: BTreeSet<String>,

    /// Per-tenant replacement of `critical_events`, keyed by tenant UUID.
    pub tenant_critical_events: HashMap<String, BTreeSet<String>>,

    /// How often a writer re-reads the head after losing a sequence race.
    pub max_append_retries: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            critical_events: [
                "document.uploaded",
                "document.signed",
                "document.archived",
                "envelope.completed",
                "signature.completed",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            tenant_critical_events: HashMap::new(),
            max_append_retries: 8,
        }
    }
}

impl AuditConfig {
    /// The critical set that applies to `tenant_id`.
    pub fn critical_events_for(&self, tenant_id: TenantId) -> &BTreeSet<String> {
        self.tenant_critical_events
            .get(&tenant_id.to_string())
            .unwrap_or(&self.critical_events)
    }

    pub fn is_critical(&self, tenant_id: TenantId, event_type: &str) -> bool {
        self.critical_events_for(tenant_id).contains(event_type)
    }
}

/// Reseal scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResealConfig {
    /// A scheduled reseal within this many hours of the last seal is skipped.
    pub min_reseal_spacing_hours: u32,

    /// Interval used when no retention policy supplies one.
    pub default_interval_days: u32,

    /// How far ahead the sweep looks for due chains.
    pub grace_days: u32,
}

impl Default for ResealConfig {
    fn default() -> Self {
        Self {
            min_reseal_spacing_hours: 24,
            default_interval_days: 365,
            grace_days: 7,
        }
    }
}

/// Archive tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub hot_disk: String,
    pub cold_disk: String,
    pub archive_disk: String,

    /// Path prefix under which archived copies are written on every disk.
    pub path_prefix: String,

    /// Days without access before a hot document moves to cold.
    pub hot_to_cold_days: u32,

    /// Days without access before a cold document moves to archive.
    pub cold_to_archive_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            hot_disk: "archive-hot".to_string(),
            cold_disk: "archive-cold".to_string(),
            archive_disk: "archive-deep".to_string(),
            path_prefix: "archives".to_string(),
            hot_to_cold_days: 365,
            cold_to_archive_days: 730,
        }
    }
}

impl ArchiveConfig {
    pub fn disk_for(&self, tier: ArchiveTier) -> &str {
        match tier {
            ArchiveTier::Hot => &self.hot_disk,
            ArchiveTier::Cold => &self.cold_disk,
            ArchiveTier::Archive => &self.archive_disk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TsaMode {
    /// Deterministic tokens, no cryptography, no network.
    Mock,
    /// Tokens signed by a local ed25519 authority.
    Signed,
}

/// TSA client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TsaSettings {
    pub mode: TsaMode,
    pub authority: String,
    pub validity_years: u32,
    pub max_attempts: u32,

    /// Delay before each retry; the last value repeats.
    pub backoff_secs: Vec<u64>,

    /// Budget for one request, including its retries.
    pub timeout_secs: u64,

    /// Hex-encoded 32-byte ed25519 seed.  Required in `signed` mode.
    pub signing_seed_hex: Option<String>,
}

impl Default for TsaSettings {
    fn default() -> Self {
        Self {
            mode: TsaMode::Mock,
            authority: "mock-tsa".to_string(),
            validity_years: 10,
            max_attempts: 3,
            backoff_secs: vec![1, 5, 15],
            timeout_secs: 30,
            signing_seed_hex: None,
        }
    }
}

impl TsaSettings {
    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect()
    }
}

/// Scheduled job retry convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub max_attempts: u32,
    pub backoff_secs: Vec<u64>,
    pub timeout_secs: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: vec![60, 300, 900],
            timeout_secs: 300,
        }
    }
}
