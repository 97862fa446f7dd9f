//! # evidentia-archive
//!
//! Long-term storage of documents across hot, cold and archive tiers.
//!
//! ## Overview
//!
//! [`ArchiveManager`] copies a document's bytes into the hot tier, stamps the
//! governing retention policy onto the record and anchors the content hash
//! in a TSA chain.  Later it moves copies between tiers, verifies integrity
//! and restores bytes on request.  The scan methods feed the scheduled jobs
//! in `evidentia-scheduler`.
//!
//! Two content stores are provided: [`MemoryContentStore`] and
//! [`FsContentStore`] (one root directory per disk).
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = ArchiveManager::new(store, content, resolver, reseal, clock, config.archive)
//!     .with_audit(audit);
//! let archived = manager.archive(&ctx, &document)?;
//! manager.move_tier(&ctx, archived.id, "cold")?;
//! assert!(manager.verify_integrity(&ctx, archived.id)?.is_valid);
//! ```

pub mod fs;
pub mod manager;
pub mod memory;

pub use fs::FsContentStore;
pub use manager::ArchiveManager;
pub use memory::{InMemoryArchiveStore, MemoryContentStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
