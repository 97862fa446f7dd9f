//! # evidentia-audit
//!
//! Append-only, per-entity, SHA-256 hash-chained audit trail.
//!
//! ## Overview
//!
//! Every domain event recorded against an entity becomes an
//! `AuditTrailEntry` linked to the previous entry of the same entity by its
//! hash.  Changing any hashed field of any entry breaks the chain and is
//! reported by `verify_chain`.  Events in the tenant's critical set are also
//! anchored with a TSA token over the entry hash.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evidentia_audit::{AuditTrailEngine, InMemoryAuditStore};
//!
//! let engine = AuditTrailEngine::new(store, tsa, clock, config.audit.clone());
//! let entry = engine.record(Some(&ctx), &doc, "document.uploaded", payload, actor, meta)?;
//!
//! let result = engine.verify_chain(Some(&ctx), &doc)?;
//! assert!(result.valid);
//! ```

pub mod chain;
pub mod engine;
pub mod memory;

pub use chain::{compute_entry_hash, verify_entries, EntryHashInput};
pub use engine::{validate_event_type, AuditTrailEngine};
pub use memory::InMemoryAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
