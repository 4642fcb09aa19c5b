use std::sync::Arc;

use async_trait::async_trait;
use shared::types::{GuardType, Member};
use uuid::Uuid;

use super::client::RedisCache;
use crate::domain::config::CacheSettings;
use crate::domain::roster::RosterClient;
use crate::error::GuardServiceError;

fn key_members(tenant_id: Uuid) -> String {
    format!("roster:{tenant_id}:members")
}

fn key_guard_types(tenant_id: Uuid) -> String {
    format!("roster:{tenant_id}:guard-types")
}

/// Cache-aside decorator around a [`RosterClient`].
///
/// The roster is owned by another service, so entries are never invalidated
/// here; they simply age out. Guard types change rarely and live longer.
pub struct CachedRosterClient {
    inner: Arc<dyn RosterClient>,
    cache: RedisCache,
    settings: CacheSettings,
}

impl CachedRosterClient {
    pub fn new(inner: Arc<dyn RosterClient>, cache: RedisCache, settings: CacheSettings) -> Self {
        Self {
            inner,
            cache,
            settings,
        }
    }
}

#[async_trait]
impl RosterClient for CachedRosterClient {
    async fn get_members(&self, tenant_id: Uuid) -> Result<Vec<Member>, GuardServiceError> {
        let key = key_members(tenant_id);
        if let Some(cached) = self.cache.get::<Vec<Member>>(&key).await {
            return Ok(cached);
        }
        let output = self.inner.get_members(tenant_id).await?;
        self.cache
            .set(&key, &output, self.settings.members_ttl_secs)
            .await;

        Ok(output)
    }

    async fn get_guard_types(&self, tenant_id: Uuid) -> Result<Vec<GuardType>, GuardServiceError> {
        let key = key_guard_types(tenant_id);
        if let Some(cached) = self.cache.get::<Vec<GuardType>>(&key).await {
            return Ok(cached);
        }
        let output = self.inner.get_guard_types(tenant_id).await?;
        self.cache
            .set(&key, &output, self.settings.guard_types_ttl_secs)
            .await;

        Ok(output)
    }
}
