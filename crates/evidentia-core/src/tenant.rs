//! Explicit tenant context.
//!
//! Every engine operation takes the tenant as a parameter.  There is no
//! ambient "current tenant"; background workers serving many tenants pass a
//! context per unit of work.

use evidentia_contracts::{
    entity::TenantId,
    error::{EvResult, EvidentiaError},
};

/// The tenant an operation runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantContext {
    pub tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }
}

/// Resolve the tenant from an optional context.
///
/// Returns `NoTenantContext` when the caller did not supply one.
pub fn require_tenant(ctx: Option<&TenantContext>) -> EvResult<TenantId> {
    ctx.map(|c| c.tenant_id).ok_or(EvidentiaError::NoTenantContext)
}

/// Explicit permission to read across tenants.
///
/// Only administrative tooling constructs one, and the reason is logged with
/// every use.
#[derive(Debug, Clone)]
pub struct CrossTenantGrant {
    reason: String,
}

impl CrossTenantGrant {
    pub fn new(reason: impl Into<String>) -> EvResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(EvidentiaError::InvalidInput {
                reason: "cross-tenant grant requires a reason".to_string(),
            });
        }
        Ok(Self { reason })
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
