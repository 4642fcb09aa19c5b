use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::GuardServiceError;

#[derive(Debug, Clone, Copy)]
struct LockedRange {
    token: Uuid,
    from: NaiveDate,
    to: NaiveDate,
}

/// Per-tenant registry of date ranges currently being attributed.
///
/// Two runs for the same tenant may proceed only if their ranges are
/// disjoint. Different tenants never contend.
#[derive(Clone, Default)]
pub struct RunLockRegistry {
    held: Arc<Mutex<HashMap<Uuid, Vec<LockedRange>>>>,
}

/// Releases its range when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RunLockGuard {
    registry: RunLockRegistry,
    tenant_id: Uuid,
    token: Uuid,
}

impl RunLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RunLockGuard, GuardServiceError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let ranges = held.entry(tenant_id).or_default();

        if let Some(existing) = ranges.iter().find(|r| r.from <= to && from <= r.to) {
            return Err(GuardServiceError::RunLockHeld {
                tenant_id,
                from: existing.from,
                to: existing.to,
            });
        }

        let token = Uuid::new_v4();
        ranges.push(LockedRange { token, from, to });
        tracing::debug!(%tenant_id, %from, %to, "Attribution run lock acquired");

        Ok(RunLockGuard {
            registry: self.clone(),
            tenant_id,
            token,
        })
    }

    fn release(&self, tenant_id: Uuid, token: Uuid) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ranges) = held.get_mut(&tenant_id) {
            ranges.retain(|r| r.token != token);
            if ranges.is_empty() {
                held.remove(&tenant_id);
            }
        }
        tracing::debug!(%tenant_id, "Attribution run lock released");
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        self.registry.release(self.tenant_id, self.token);
    }
}
