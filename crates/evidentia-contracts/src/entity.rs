//! Tenant and entity identity.
//!
//! Auditable things are addressed by `EntityRef`, a typed (kind, id) pair.
//! Record identifiers are UUID newtypes so a chain id can never be passed
//! where an archive id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Owner of every record. All reads and writes are scoped by it.
    TenantId
);
uuid_id!(
    /// Identifier of one audit trail entry.
    EntryId
);
uuid_id!(
    /// Identifier of a stored TSA token.
    TokenId
);
uuid_id!(
    /// Identifier of a long-lived TSA chain.
    ChainId
);
uuid_id!(ChainEntryId);
uuid_id!(
    /// Identifier of an archive record (not the underlying document).
    ArchiveId
);
uuid_id!(PolicyId);

/// Identifier of a document owned by the external document service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kinds of entity that carry an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Document,
    Envelope,
    Signature,
    Signer,
    ArchivedDocument,
    User,
}

impl EntityKind {
    /// Stable name used in hashes, logs, and exports. Never change these.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Envelope => "envelope",
            Self::Signature => "signature",
            Self::Signer => "signer",
            Self::ArchivedDocument => "archived_document",
            Self::User => "user",
        }
    }
}

/// A typed reference to an auditable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub fn document(id: DocumentId) -> Self {
        Self::new(EntityKind::Document, id.0)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.as_str(), self.id)
    }
}
