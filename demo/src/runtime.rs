//! Wiring of every engine over in-memory stores.
//!
//! The demo runs on a `ManualClock` so that reseal schedules and tier
//! migrations measured in years can be shown in a single process.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use evidentia_archive::{ArchiveManager, InMemoryArchiveStore, MemoryContentStore};
use evidentia_audit::{AuditTrailEngine, InMemoryAuditStore};
use evidentia_contracts::{
    archive::{DocumentRef, StorageLocation},
    entity::{DocumentId, TenantId},
    error::EvResult,
};
use evidentia_core::{
    hashing,
    traits::{ContentStore, PolicySource},
    EngineConfig, ManualClock, TenantContext,
};
use evidentia_reseal::{InMemoryChainStore, ResealEngine};
use evidentia_retention::RetentionResolver;

/// Tenant that `config/policies.toml` scopes its tenant policy to.
pub const ACME_TENANT: Uuid = Uuid::from_u128(0x8a6e2f3b_1f7c_4b8e_9d2a_6c4e1b7f9a10);

pub fn acme() -> TenantContext {
    TenantContext::new(TenantId(ACME_TENANT))
}

pub struct Runtime {
    pub config: EngineConfig,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<AuditTrailEngine>,
    pub reseal: Arc<ResealEngine>,
    pub resolver: Arc<RetentionResolver>,
    pub archive: Arc<ArchiveManager>,
    pub content: MemoryContentStore,
}

impl Runtime {
    pub fn build(config: EngineConfig, policies: Arc<dyn PolicySource>) -> EvResult<Self> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tsa = evidentia_tsa::build_client(&config.tsa, clock.clone())?;

        let audit = Arc::new(AuditTrailEngine::new(
            Arc::new(InMemoryAuditStore::new()),
            tsa.clone(),
            clock.clone(),
            config.audit.clone(),
        ));
        let reseal = Arc::new(ResealEngine::new(
            Arc::new(InMemoryChainStore::new()),
            tsa,
            clock.clone(),
            config.reseal.clone(),
        ));
        let resolver = Arc::new(RetentionResolver::new(policies, clock.clone()));
        let content = MemoryContentStore::new();
        let archive = Arc::new(
            ArchiveManager::new(
                Arc::new(InMemoryArchiveStore::new()),
                Arc::new(content.clone()),
                resolver.clone(),
                reseal.clone(),
                clock.clone(),
                config.archive.clone(),
            )
            .with_audit(audit.clone()),
        );

        Ok(Self {
            config,
            clock,
            audit,
            reseal,
            resolver,
            archive,
            content,
        })
    }

    /// Hand a document to the runtime as the document service would.
    pub fn upload(
        &self,
        ctx: &TenantContext,
        id: u64,
        document_type: Option<&str>,
        bytes: &[u8],
    ) -> EvResult<DocumentRef> {
        let location = StorageLocation::new("documents", format!("{}/{id}.pdf", ctx.tenant_id));
        self.content.write(&location, bytes)?;
        Ok(DocumentRef {
            tenant_id: ctx.tenant_id,
            document_id: DocumentId(id),
            document_type: document_type.map(String::from),
            location,
            content_hash: Some(hashing::hash_bytes(bytes)),
        })
    }
}
