use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::types::{
    Assignment, AssignmentStatus, AttributionParameters, Availability, ReplacementRequest,
    ReplacementStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::assignment::{AssignmentRepository, NewAssignment};
use crate::domain::availability::{AvailabilityRepository, NewAvailability, ResetFilter};
use crate::domain::parameters::ParametersRepository;
use crate::domain::replacement::{
    NewReplacementRequest, ReplacementRepository, already_handed_over, stale_version,
};
use crate::error::GuardServiceError;

#[derive(Default)]
struct Tables {
    availabilities: Vec<Availability>,
    assignments: Vec<Assignment>,
    replacements: HashMap<Uuid, ReplacementRequest>,
    parameters: HashMap<Uuid, AttributionParameters>,
}

/// Process-local storage behind every repository trait. Each call holds the
/// table lock for its whole duration, so batches are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryStore {
    async fn find_for_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Availability>, GuardServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .availabilities
            .iter()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && a.member_id == member_id
                    && a.date >= from
                    && a.date <= to
            })
            .cloned()
            .collect())
    }

    async fn find_in_range(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Availability>, GuardServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .availabilities
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.date >= from && a.date <= to)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        availability: NewAvailability,
    ) -> Result<Availability, GuardServiceError> {
        let created = availability.into_availability(Uuid::new_v4(), Utc::now());
        self.tables.write().await.availabilities.push(created.clone());
        Ok(created)
    }

    async fn apply_batch(
        &self,
        tenant_id: Uuid,
        remove: Vec<Uuid>,
        create: Vec<NewAvailability>,
    ) -> Result<Vec<Availability>, GuardServiceError> {
        let mut tables = self.tables.write().await;
        tables
            .availabilities
            .retain(|a| a.tenant_id != tenant_id || !remove.contains(&a.id));

        let now = Utc::now();
        let created: Vec<Availability> = create
            .into_iter()
            .map(|new| new.into_availability(Uuid::new_v4(), now))
            .collect();
        tables.availabilities.extend(created.iter().cloned());
        Ok(created)
    }

    async fn delete_matching(&self, filter: ResetFilter) -> Result<u64, GuardServiceError> {
        let mut tables = self.tables.write().await;
        let before = tables.availabilities.len();
        tables.availabilities.retain(|a| !filter.matches(a));
        Ok((before - tables.availabilities.len()) as u64)
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Assignment>, GuardServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .iter()
            .find(|a| a.tenant_id == tenant_id && a.id == id)
            .cloned())
    }

    async fn find_in_range(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        let tables = self.tables.read().await;
        let mut found: Vec<Assignment> = tables
            .assignments
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.date >= from && a.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.date, a.start_time));
        Ok(found)
    }

    async fn find_for_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && a.member_id == member_id
                    && a.date >= from
                    && a.date <= to
            })
            .cloned()
            .collect())
    }

    async fn create(&self, assignment: NewAssignment) -> Result<Assignment, GuardServiceError> {
        let created = assignment.into_assignment(Uuid::new_v4(), Utc::now());
        self.tables.write().await.assignments.push(created.clone());
        Ok(created)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), GuardServiceError> {
        let mut tables = self.tables.write().await;
        let before = tables.assignments.len();
        tables
            .assignments
            .retain(|a| a.tenant_id != tenant_id || a.id != id);
        if tables.assignments.len() == before {
            return Err(GuardServiceError::NotFound(format!("Assignment {id} not found")));
        }
        Ok(())
    }

    async fn apply_attribution(
        &self,
        tenant_id: Uuid,
        remove: Vec<Uuid>,
        create: Vec<NewAssignment>,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        let mut tables = self.tables.write().await;
        tables
            .assignments
            .retain(|a| a.tenant_id != tenant_id || !remove.contains(&a.id));

        let now = Utc::now();
        let created: Vec<Assignment> = create
            .into_iter()
            .map(|new| new.into_assignment(Uuid::new_v4(), now))
            .collect();
        tables.assignments.extend(created.iter().cloned());
        Ok(created)
    }
}

/// Version check shared by every replacement write.
fn stored_request<'t>(
    tables: &'t mut Tables,
    request: &ReplacementRequest,
) -> Result<&'t mut ReplacementRequest, GuardServiceError> {
    let stored = tables
        .replacements
        .get_mut(&request.id)
        .filter(|r| r.tenant_id == request.tenant_id)
        .ok_or_else(|| {
            GuardServiceError::NotFound(format!("Replacement request {} not found", request.id))
        })?;
    if stored.version != request.version {
        return Err(stale_version(request));
    }
    Ok(stored)
}

fn bumped(request: &ReplacementRequest, now: DateTime<Utc>) -> ReplacementRequest {
    let mut saved = request.clone();
    saved.version += 1;
    saved.updated_at = now;
    saved
}

#[async_trait]
impl ReplacementRepository for InMemoryStore {
    async fn create(
        &self,
        request: NewReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(original_id) = request.original_assignment_id {
            let original = tables
                .assignments
                .iter_mut()
                .find(|a| a.tenant_id == request.tenant_id && a.id == original_id)
                .ok_or_else(|| {
                    GuardServiceError::NotFound(format!("Assignment {original_id} not found"))
                })?;
            if !original.is_held() {
                return Err(already_handed_over(original_id));
            }
            original.status = AssignmentStatus::ReplacementRequested;
            original.updated_at = now;
        }

        let created = request.into_request(Uuid::new_v4(), now);
        tables.replacements.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ReplacementRequest>, GuardServiceError> {
        let tables = self.tables.read().await;
        Ok(tables
            .replacements
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_listed(
        &self,
        tenant_id: Uuid,
        status: Option<ReplacementStatus>,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError> {
        let tables = self.tables.read().await;
        let mut listed: Vec<ReplacementRequest> = tables
            .replacements
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| match status {
                Some(status) => r.status == status,
                None => !r.status.is_terminal(),
            })
            .cloned()
            .collect();
        listed.sort_by_key(|r| r.created_at);
        Ok(listed)
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError> {
        let tables = self.tables.read().await;
        let mut due: Vec<ReplacementRequest> = tables
            .replacements
            .values()
            .filter(|r| match r.status {
                ReplacementStatus::Pending => true,
                ReplacementStatus::InProgress => r.next_attempt_at.is_some_and(|at| at <= now),
                _ => false,
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.next_attempt_at, r.created_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn save(
        &self,
        request: &ReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let mut tables = self.tables.write().await;
        let stored = stored_request(&mut tables, request)?;

        let saved = bumped(request, Utc::now());
        *stored = saved.clone();
        Ok(saved)
    }

    async fn accept_with_assignment(
        &self,
        request: &ReplacementRequest,
        assignment: NewAssignment,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        stored_request(&mut tables, request)?;

        let booked = assignment.into_assignment(Uuid::new_v4(), now);
        let mut saved = bumped(request, now);
        saved.replacement_assignment_id = Some(booked.id);

        tables.assignments.push(booked);
        tables.replacements.insert(saved.id, saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl ParametersRepository for InMemoryStore {
    async fn find(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<AttributionParameters>, GuardServiceError> {
        Ok(self.tables.read().await.parameters.get(&tenant_id).cloned())
    }

    async fn upsert(
        &self,
        tenant_id: Uuid,
        params: AttributionParameters,
    ) -> Result<AttributionParameters, GuardServiceError> {
        self.tables
            .write()
            .await
            .parameters
            .insert(tenant_id, params.clone());
        Ok(params)
    }
}
