use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use shared::types::{
    Assignment, AttributionParameters, Availability, GuardType, ReplacementRequest,
};
use uuid::Uuid;

use crate::domain::assignment::{
    AssignmentRepository, CreateManualAssignment, NewAssignment, find_overlap, ledger_span,
};
use crate::domain::attribution::{
    AttributionInput, AttributionReport, RunAttribution, plan_attribution,
};
use crate::domain::availability::{
    AvailabilityRepository, BulkGenerateAvailability, BulkGenerationOutcome, DeclareAvailability,
    ResetAvailability, check_bounds, find_conflict, plan_bulk,
};
use crate::domain::config::ServiceConfig;
use crate::domain::escalation::EscalationEngine;
use crate::domain::parameters::{self, ParametersRepository};
use crate::domain::replacement::already_handed_over;
use crate::domain::roster::RosterClient;
use crate::domain::run_lock::RunLockRegistry;
use crate::error::{ConflictingRecord, GuardServiceError};

/// Front door for attribution runs, assignment and availability edits, and
/// tenant parameters. Replacement handling is delegated to the
/// [`EscalationEngine`].
pub struct GuardService {
    roster: Arc<dyn RosterClient>,
    availability_repo: Arc<dyn AvailabilityRepository>,
    assignment_repo: Arc<dyn AssignmentRepository>,
    parameters_repo: Arc<dyn ParametersRepository>,
    escalation: EscalationEngine,
    run_locks: RunLockRegistry,
    max_run_days: u32,
}

impl GuardService {
    pub fn new(
        roster: Arc<dyn RosterClient>,
        availability_repo: Arc<dyn AvailabilityRepository>,
        assignment_repo: Arc<dyn AssignmentRepository>,
        parameters_repo: Arc<dyn ParametersRepository>,
        escalation: EscalationEngine,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            roster,
            availability_repo,
            assignment_repo,
            parameters_repo,
            escalation,
            run_locks: RunLockRegistry::new(),
            max_run_days: config.max_run_days,
        }
    }

    pub fn escalation(&self) -> &EscalationEngine {
        &self.escalation
    }

    /// Plans and persists automatic assignments for `week_start..=week_end`.
    /// The tenant's parameters are read once, before anything else.
    #[tracing::instrument(skip(self))]
    pub async fn run_attribution(
        &self,
        tenant_id: Uuid,
        run: RunAttribution,
        now: DateTime<Utc>,
    ) -> Result<AttributionReport, GuardServiceError> {
        let RunAttribution {
            week_start,
            week_end,
            reset_existing,
        } = run;
        self.check_run_range(week_start, week_end)?;

        let params = match self.parameters_repo.find(tenant_id).await? {
            Some(params) if params.auto_attribution_enabled => params,
            _ => {
                tracing::info!(%tenant_id, "Automatic attribution disabled, nothing to do");
                return Ok(AttributionReport::disabled(tenant_id, week_start, week_end));
            }
        };

        let _lock = self.run_locks.try_acquire(tenant_id, week_start, week_end)?;

        let members = self.roster.get_members(tenant_id).await?;
        let guard_types = self.roster.get_guard_types(tenant_id).await?;
        let availabilities = self
            .availability_repo
            .find_in_range(tenant_id, week_start, week_end)
            .await?;
        let (ledger_from, ledger_to) = ledger_span(week_start, week_end);
        let existing = self
            .assignment_repo
            .find_in_range(tenant_id, ledger_from, ledger_to)
            .await?;

        let plan = plan_attribution(&AttributionInput {
            tenant_id,
            week_start,
            week_end,
            reset_existing,
            params: &params,
            members: &members,
            guard_types: &guard_types,
            availabilities: &availabilities,
            existing: &existing,
            planned_at: now,
        });

        self.assignment_repo
            .apply_attribution(tenant_id, plan.remove, plan.create)
            .await?;

        let report = plan.report;
        tracing::info!(
            %tenant_id,
            created = report.assignments_created,
            removed = report.assignments_removed,
            understaffed = report.understaffed.len(),
            "Attribution run completed"
        );
        Ok(report)
    }

    fn check_run_range(&self, from: NaiveDate, to: NaiveDate) -> Result<(), GuardServiceError> {
        if to < from {
            return Err(GuardServiceError::BadRequest(
                "week_end must not be before week_start".into(),
            ));
        }
        let days = (to - from).num_days() + 1;
        if days > i64::from(self.max_run_days) {
            return Err(GuardServiceError::BadRequest(format!(
                "attribution range spans {days} days, at most {} allowed",
                self.max_run_days
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_manual_assignment(
        &self,
        tenant_id: Uuid,
        request: CreateManualAssignment,
    ) -> Result<Assignment, GuardServiceError> {
        let guard = self
            .find_guard_type(tenant_id, request.guard_type_id)
            .await?;
        let members = self.roster.get_members(tenant_id).await?;
        if !members.iter().any(|m| m.id == request.member_id) {
            return Err(GuardServiceError::NotFound(format!(
                "Member {} not found",
                request.member_id
            )));
        }

        let held = self
            .assignment_repo
            .find_for_member(tenant_id, request.member_id, request.date, request.date)
            .await?;
        if let Some(existing) = find_overlap(
            &held,
            request.member_id,
            request.date,
            &guard.window(),
            guard.is_external,
        ) {
            return Err(GuardServiceError::Conflict(ConflictingRecord::Assignment(
                Box::new(existing.clone()),
            )));
        }

        let assignment = self
            .assignment_repo
            .create(NewAssignment::manual(
                request.member_id,
                &guard,
                request.date,
                request.operator_id,
                request.note,
            ))
            .await?;
        tracing::info!(assignment_id = %assignment.id, "Manual assignment created");
        Ok(assignment)
    }

    /// Releases a guard. With `find_replacement` the assignment is kept as
    /// handed over and a replacement request starts escalating; otherwise it
    /// is deleted.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_assignment(
        &self,
        tenant_id: Uuid,
        assignment_id: Uuid,
        reason: String,
        find_replacement: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ReplacementRequest>, GuardServiceError> {
        let assignment = self
            .assignment_repo
            .find_by_id(tenant_id, assignment_id)
            .await?
            .ok_or_else(|| {
                GuardServiceError::NotFound(format!("Assignment {assignment_id} not found"))
            })?;

        if !assignment.is_held() {
            return Err(already_handed_over(assignment_id));
        }

        if !find_replacement {
            self.assignment_repo.delete(tenant_id, assignment_id).await?;
            tracing::info!(%assignment_id, "Assignment cancelled without replacement");
            return Ok(None);
        }

        // Opening the request also marks the assignment as handed over.
        let request = self
            .escalation
            .open_for_cancelled(&assignment, reason, now)
            .await?;
        self.escalation.spawn_advance(tenant_id, request.id);
        Ok(Some(request))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_assignments(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError> {
        if to < from {
            return Err(GuardServiceError::BadRequest(
                "'to' must not be before 'from'".into(),
            ));
        }
        self.assignment_repo.find_in_range(tenant_id, from, to).await
    }

    /// Records one availability entry, refusing it when it contradicts an
    /// existing entry of the member on the same date.
    #[tracing::instrument(skip(self))]
    pub async fn declare_availability(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        declaration: DeclareAvailability,
    ) -> Result<Availability, GuardServiceError> {
        let entry = declaration.for_member(tenant_id, member_id);
        check_bounds(entry.start_time, entry.end_time)?;

        let existing = self
            .availability_repo
            .find_for_member(tenant_id, member_id, entry.date, entry.date)
            .await?;
        if let Some(conflict) = find_conflict(&existing, &entry) {
            return Err(GuardServiceError::Conflict(
                ConflictingRecord::Availability(Box::new(conflict.clone())),
            ));
        }

        self.availability_repo.create(entry).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn bulk_generate_availability(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        request: BulkGenerateAvailability,
    ) -> Result<BulkGenerationOutcome, GuardServiceError> {
        if request.to < request.from {
            return Err(GuardServiceError::BadRequest(
                "'to' must not be before 'from'".into(),
            ));
        }
        check_bounds(request.pattern.start_time, request.pattern.end_time)?;

        let existing = self
            .availability_repo
            .find_for_member(tenant_id, member_id, request.from, request.to)
            .await?;
        let plan = plan_bulk(
            &existing,
            tenant_id,
            member_id,
            &request.pattern,
            request.from,
            request.to,
            request.conflict_policy,
        )?;

        self.availability_repo
            .apply_batch(tenant_id, plan.remove, plan.create)
            .await?;
        tracing::info!(
            %member_id,
            created = plan.outcome.created,
            skipped = plan.outcome.skipped,
            replaced = plan.outcome.replaced,
            "Availability generated"
        );
        Ok(plan.outcome)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reset_availability(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        request: ResetAvailability,
    ) -> Result<u64, GuardServiceError> {
        if request.to < request.from {
            return Err(GuardServiceError::BadRequest(
                "'to' must not be before 'from'".into(),
            ));
        }
        let removed = self
            .availability_repo
            .delete_matching(request.for_member(tenant_id, member_id))
            .await?;
        tracing::info!(%member_id, removed, "Availability reset");
        Ok(removed)
    }

    pub async fn get_parameters(
        &self,
        tenant_id: Uuid,
    ) -> Result<AttributionParameters, GuardServiceError> {
        self.parameters_repo.find(tenant_id).await?.ok_or_else(|| {
            GuardServiceError::NotFound(format!("No parameters configured for tenant {tenant_id}"))
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn put_parameters(
        &self,
        tenant_id: Uuid,
        params: AttributionParameters,
    ) -> Result<AttributionParameters, GuardServiceError> {
        parameters::validate(&params)?;
        self.parameters_repo.upsert(tenant_id, params).await
    }

    async fn find_guard_type(
        &self,
        tenant_id: Uuid,
        guard_type_id: Uuid,
    ) -> Result<GuardType, GuardServiceError> {
        self.roster
            .get_guard_types(tenant_id)
            .await?
            .into_iter()
            .find(|g| g.id == guard_type_id)
            .ok_or_else(|| {
                GuardServiceError::NotFound(format!("Guard type {guard_type_id} not found"))
            })
    }
}
