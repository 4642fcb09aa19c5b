use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::types::{ReplacementRequest, ReplacementStatus, Urgency};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::assignment::NewAssignment;
use crate::domain::replacement_state::stale;
use crate::error::GuardServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct NewReplacementRequest {
    pub tenant_id: Uuid,
    pub requester_id: Option<Uuid>,
    pub guard_type_id: Uuid,
    pub date: NaiveDate,
    pub shift_starts_at: DateTime<Utc>,
    pub reason: String,
    pub urgency: Urgency,
    pub original_assignment_id: Option<Uuid>,
}

impl NewReplacementRequest {
    /// A fresh request is pending and due immediately.
    pub fn into_request(self, id: Uuid, now: DateTime<Utc>) -> ReplacementRequest {
        ReplacementRequest {
            id,
            tenant_id: self.tenant_id,
            requester_id: self.requester_id,
            guard_type_id: self.guard_type_id,
            date: self.date,
            shift_starts_at: self.shift_starts_at,
            reason: self.reason,
            status: ReplacementStatus::Pending,
            urgency: self.urgency,
            original_assignment_id: self.original_assignment_id,
            replacement_member_id: None,
            replacement_assignment_id: None,
            attempt_history: Vec::new(),
            contacted_member_ids: Vec::new(),
            next_attempt_at: Some(now),
            attempt_count: 0,
            wave_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body of a flag-gap call: an uncovered slot with nobody to replace.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FlagGap {
    pub guard_type_id: Uuid,
    pub date: NaiveDate,
    pub reason: String,
}

/// Body of a candidate answer callback.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CandidateAnswer {
    pub member_id: Uuid,
}

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait ReplacementRepository: Send + Sync {
    /// Stores a new request. When `original_assignment_id` is set, the
    /// original assignment is marked `ReplacementRequested` in the same write;
    /// an original that is already handed over is a
    /// [`GuardServiceError::BadRequest`] and nothing is stored.
    async fn create(
        &self,
        request: NewReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError>;
    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ReplacementRequest>, GuardServiceError>;
    /// Requests of a tenant with the given status, or the pending and
    /// in-progress ones when `status` is `None`. Oldest first.
    async fn find_listed(
        &self,
        tenant_id: Uuid,
        status: Option<ReplacementStatus>,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError>;
    /// Requests across all tenants the worker should advance now: pending
    /// ones, and in-progress ones whose deadline has passed.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError>;
    /// Writes `request` if the stored version still equals `request.version`
    /// and returns it with the version bumped. A mismatch is a
    /// [`GuardServiceError::StaleStateTransition`].
    async fn save(
        &self,
        request: &ReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError>;
    /// Books `assignment` and saves the accepted `request` pointing at it, as
    /// one write under the same version check as [`Self::save`]. On any error
    /// neither is stored.
    async fn accept_with_assignment(
        &self,
        request: &ReplacementRequest,
        assignment: NewAssignment,
    ) -> Result<ReplacementRequest, GuardServiceError>;
}

pub(crate) fn already_handed_over(assignment_id: Uuid) -> GuardServiceError {
    GuardServiceError::BadRequest(format!(
        "Assignment {assignment_id} is already waiting for a replacement"
    ))
}

pub(crate) fn stale_version(request: &ReplacementRequest) -> GuardServiceError {
    stale(
        request,
        format!("request was modified concurrently (version {})", request.version),
    )
}
