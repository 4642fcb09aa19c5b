use async_trait::async_trait;
use shared::types::{GuardType, Member};
use uuid::Uuid;

use crate::error::GuardServiceError;

/// Read-only view of the department roster and guard type catalog.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait RosterClient: Send + Sync {
    async fn get_members(&self, tenant_id: Uuid) -> Result<Vec<Member>, GuardServiceError>;
    async fn get_guard_types(&self, tenant_id: Uuid)
    -> Result<Vec<GuardType>, GuardServiceError>;
}
