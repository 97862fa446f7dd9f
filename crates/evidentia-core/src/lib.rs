//! # evidentia-core
//!
//! Foundations shared by every Evidentia engine:
//!
//! - the hashing service (`hashing`)
//! - explicit tenant context (`tenant`)
//! - the clock abstraction (`clock`)
//! - engine configuration loaded from TOML (`config`)
//! - the trait seams engines are written against (`traits`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evidentia_core::{hashing, tenant::TenantContext};
//!
//! let digest = hashing::hash_bytes(b"%PDF-1.7 ...");
//! assert!(hashing::is_valid_hash(&digest));
//! ```

pub mod clock;
pub mod config;
pub mod hashing;
pub mod tenant;
pub mod traits;

pub use clock::{ManualClock, SystemClock};
pub use config::EngineConfig;
pub use tenant::{require_tenant, CrossTenantGrant, TenantContext};

// ── Tests ─────────────────────────────────────────────────────────────────────
