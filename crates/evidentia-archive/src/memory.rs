//! In-memory `ArchiveStore` and `ContentStore`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use evidentia_contracts::{
    archive::{ArchiveStatus, ArchivedDocument, StorageLocation},
    entity::{ArchiveId, DocumentId, TenantId},
    error::{EvResult, EvidentiaError},
};
use evidentia_core::traits::{ArchiveStore, ContentStore};

fn poisoned(what: &str, e: impl std::fmt::Display) -> EvidentiaError {
    EvidentiaError::Storage {
        reason: format!("{what} lock poisoned: {e}"),
    }
}

// ── Archive records ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryArchiveStore {
    pub(crate) records: Arc<Mutex<HashMap<ArchiveId, ArchivedDocument>>>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EvResult<MutexGuard<'_, HashMap<ArchiveId, ArchivedDocument>>> {
        self.records.lock().map_err(|e| poisoned("archive", e))
    }
}

impl ArchiveStore for InMemoryArchiveStore {
    fn insert(&self, document: ArchivedDocument) -> EvResult<()> {
        let mut records = self.lock()?;
        if records.contains_key(&document.id) {
            return Err(EvidentiaError::Storage {
                reason: format!("archive record {} already exists", document.id),
            });
        }
        records.insert(document.id, document);
        Ok(())
    }

    fn get(&self, tenant_id: TenantId, archive_id: ArchiveId) -> EvResult<Option<ArchivedDocument>> {
        let records = self.lock()?;
        Ok(records
            .get(&archive_id)
            .filter(|d| d.tenant_id == tenant_id)
            .cloned())
    }

    fn find_by_document(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> EvResult<Option<ArchivedDocument>> {
        let records = self.lock()?;
        Ok(records
            .values()
            .filter(|d| d.tenant_id == tenant_id && d.document_id == document_id)
            .filter(|d| matches!(d.status, ArchiveStatus::Active | ArchiveStatus::Migrating))
            .max_by_key(|d| d.archived_at)
            .cloned())
    }

    fn update(&self, document: ArchivedDocument) -> EvResult<ArchivedDocument> {
        let mut records = self.lock()?;
        match records.get_mut(&document.id) {
            Some(existing) if existing.tenant_id == document.tenant_id => {
                if existing.version != document.version {
                    return Err(EvidentiaError::ConcurrentModification {
                        resource: format!("archive {}", document.id),
                    });
                }
                let mut stored = document;
                stored.version += 1;
                *existing = stored.clone();
                Ok(stored)
            }
            _ => Err(EvidentiaError::ArchiveNotFound {
                archive_id: document.id.to_string(),
            }),
        }
    }

    fn remove(&self, tenant_id: TenantId, archive_id: ArchiveId) -> EvResult<()> {
        let mut records = self.lock()?;
        match records.get(&archive_id) {
            Some(existing) if existing.tenant_id == tenant_id => {
                records.remove(&archive_id);
                Ok(())
            }
            _ => Err(EvidentiaError::ArchiveNotFound {
                archive_id: archive_id.to_string(),
            }),
        }
    }

    fn claim_for_migration(
        &self,
        tenant_id: TenantId,
        archive_id: ArchiveId,
    ) -> EvResult<ArchivedDocument> {
        let mut records = self.lock()?;
        let record = records
            .get_mut(&archive_id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or_else(|| EvidentiaError::ArchiveNotFound {
                archive_id: archive_id.to_string(),
            })?;

        match record.status {
            ArchiveStatus::Active => {
                record.status = ArchiveStatus::Migrating;
                record.version += 1;
                Ok(record.clone())
            }
            ArchiveStatus::Migrating => Err(EvidentiaError::ConcurrentModification {
                resource: format!("archive {archive_id}"),
            }),
            other => Err(EvidentiaError::InvalidInput {
                reason: format!(
                    "archive {archive_id} is {} and cannot change tier",
                    other.as_str()
                ),
            }),
        }
    }

    fn all(&self) -> EvResult<Vec<ArchivedDocument>> {
        let records = self.lock()?;
        let mut all: Vec<ArchivedDocument> = records.values().cloned().collect();
        all.sort_by_key(|d| (d.archived_at, d.id));
        Ok(all)
    }
}

// ── Content ───────────────────────────────────────────────────────────────────

/// Bytes keyed by location, for tests and the demo.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    blobs: Arc<Mutex<HashMap<StorageLocation, Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EvResult<MutexGuard<'_, HashMap<StorageLocation, Vec<u8>>>> {
        self.blobs.lock().map_err(|e| poisoned("content", e))
    }

    /// Number of stored blobs across all disks.
    pub fn len(&self) -> usize {
        self.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryContentStore {
    fn read(&self, location: &StorageLocation) -> EvResult<Vec<u8>> {
        self.lock()?
            .get(location)
            .cloned()
            .ok_or_else(|| EvidentiaError::Storage {
                reason: format!("no content at {location}"),
            })
    }

    fn write(&self, location: &StorageLocation, content: &[u8]) -> EvResult<()> {
        self.lock()?.insert(location.clone(), content.to_vec());
        Ok(())
    }

    fn delete(&self, location: &StorageLocation) -> EvResult<()> {
        self.lock()?.remove(location);
        Ok(())
    }

    fn exists(&self, location: &StorageLocation) -> EvResult<bool> {
        Ok(self.lock()?.contains_key(location))
    }
}
