use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use shared::time::local_to_utc;
use shared::types::{
    Assignment, AttributionParameters, Availability, GuardType, Member, ReplacementRequest,
    ReplacementStatus, Urgency,
};
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::assignment::{
    AssignmentRepository, LedgerView, NewAssignment, find_overlap, ledger_span,
};
use crate::domain::availability::AvailabilityRepository;
use crate::domain::config::ServiceConfig;
use crate::domain::eligibility::{
    CandidateContext, EvaluationMode, RankedCandidate, rank_candidates,
};
use crate::domain::notification::{NotificationDispatcher, ReplacementOffer};
use crate::domain::parameters::ParametersRepository;
use crate::domain::replacement::{FlagGap, NewReplacementRequest, ReplacementRepository};
use crate::domain::replacement_state::{Advance, OpenReplacement, stale};
use crate::domain::roster::RosterClient;
use crate::error::{ConflictingRecord, GuardServiceError};

/// Everything candidate ranking reads for one request, loaded up front.
struct Snapshot {
    guard: GuardType,
    members: Vec<Member>,
    availabilities: Vec<Availability>,
    assignments: Vec<Assignment>,
    params: AttributionParameters,
}

impl Snapshot {
    fn ranked(&self, request: &ReplacementRequest) -> Vec<RankedCandidate<'_>> {
        let ctx = CandidateContext {
            availabilities: &self.availabilities,
            ledger: LedgerView::new(&self.assignments),
            params: &self.params,
        };
        let mut excluded: HashSet<Uuid> = request.contacted_member_ids.iter().copied().collect();
        excluded.extend(request.requester_id);

        rank_candidates(
            &self.members,
            request.date,
            &self.guard,
            &ctx,
            EvaluationMode::Replacement,
            &excluded,
        )
        .candidates
    }
}

/// Drives replacement requests through their waves. All state lives in the
/// replacement repository; the engine itself can be dropped and rebuilt at
/// any point.
#[derive(Clone)]
pub struct EscalationEngine {
    roster: Arc<dyn RosterClient>,
    availability_repo: Arc<dyn AvailabilityRepository>,
    assignment_repo: Arc<dyn AssignmentRepository>,
    replacement_repo: Arc<dyn ReplacementRepository>,
    parameters_repo: Arc<dyn ParametersRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    timezone: Tz,
    default_parameters: AttributionParameters,
    batch_size: u32,
    task_tracker: TaskTracker,
}

impl EscalationEngine {
    pub fn new(
        roster: Arc<dyn RosterClient>,
        availability_repo: Arc<dyn AvailabilityRepository>,
        assignment_repo: Arc<dyn AssignmentRepository>,
        replacement_repo: Arc<dyn ReplacementRepository>,
        parameters_repo: Arc<dyn ParametersRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            roster,
            availability_repo,
            assignment_repo,
            replacement_repo,
            parameters_repo,
            notifier,
            timezone: config.timezone(),
            default_parameters: config.default_parameters.clone(),
            batch_size: config.escalation.batch_size,
            task_tracker: TaskTracker::new(),
        }
    }

    pub fn task_tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    /// Opens a request for a guard whose holder dropped out.
    #[tracing::instrument(skip(self, assignment), fields(assignment_id = %assignment.id))]
    pub async fn open_for_cancelled(
        &self,
        assignment: &Assignment,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let shift_starts_at = local_to_utc(assignment.date, assignment.start_time, self.timezone);
        self.open_request(NewReplacementRequest {
            tenant_id: assignment.tenant_id,
            requester_id: Some(assignment.member_id),
            guard_type_id: assignment.guard_type_id,
            date: assignment.date,
            shift_starts_at,
            reason,
            urgency: Urgency::for_shift(shift_starts_at, now),
            original_assignment_id: Some(assignment.id),
        })
        .await
    }

    /// Opens a request for an uncovered slot and starts contacting candidates
    /// in the background.
    #[tracing::instrument(skip(self))]
    pub async fn flag_gap(
        &self,
        tenant_id: Uuid,
        gap: FlagGap,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let guard = self.find_guard_type(tenant_id, gap.guard_type_id).await?;
        let shift_starts_at = local_to_utc(gap.date, guard.start_time, self.timezone);
        let request = self
            .open_request(NewReplacementRequest {
                tenant_id,
                requester_id: None,
                guard_type_id: guard.id,
                date: gap.date,
                shift_starts_at,
                reason: gap.reason,
                urgency: Urgency::for_shift(shift_starts_at, now),
                original_assignment_id: None,
            })
            .await?;
        self.spawn_advance(tenant_id, request.id);
        Ok(request)
    }

    async fn open_request(
        &self,
        new: NewReplacementRequest,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let request = self.replacement_repo.create(new).await?;
        tracing::info!(
            request_id = %request.id,
            guard_type_id = %request.guard_type_id,
            date = %request.date,
            urgency = ?request.urgency,
            "Replacement request opened"
        );
        Ok(request)
    }

    /// Spawns [`Self::advance`] on the engine's task tracker.
    pub fn spawn_advance(&self, tenant_id: Uuid, request_id: Uuid) {
        let engine = self.clone();
        let span = tracing::info_span!("advance_replacement", %tenant_id, %request_id);
        self.task_tracker.spawn(
            async move {
                if let Err(e) = engine.advance(tenant_id, request_id, Utc::now()).await {
                    tracing::warn!("Replacement request {request_id} not advanced: {e}");
                }
            }
            .instrument(span),
        );
    }

    /// Opens the next wave when the request is due. Requests that are not due
    /// or already terminal are returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn advance(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let request = self.load(tenant_id, request_id).await?;
        let Some(open) = OpenReplacement::from_request(request.clone()) else {
            return Ok(request);
        };
        if !open.is_due(now) {
            return Ok(request);
        }

        if request.shift_starts_at <= now {
            tracing::warn!(%request_id, "Shift already started, expiring replacement request");
            return self.replacement_repo.save(&open.force_expire(now)).await;
        }

        let snapshot = self.snapshot(&request).await?;
        let ranked = snapshot.ranked(&request);
        let delay = snapshot.params.wave_delay(request.urgency);
        let advance = open.open_wave(&ranked, snapshot.params.offers_per_wave(), now, delay);
        self.commit(advance, &snapshot.params, now).await
    }

    /// Advances every due request, oldest first. Individual failures are
    /// logged and retried on a later pass.
    #[tracing::instrument(skip(self))]
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<usize, GuardServiceError> {
        let due = self.replacement_repo.find_due(now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = due.len(), "Advancing due replacement requests");
        let mut advanced = 0;
        for request in due {
            match self.advance(request.tenant_id, request.id, now).await {
                Ok(_) => advanced += 1,
                Err(e) if e.is_upstream_outage() => {
                    tracing::warn!("Roster unavailable, deferring remaining replacements: {e}");
                    break;
                }
                Err(e) => {
                    tracing::warn!(request_id = %request.id, "Failed to advance replacement: {e}");
                }
            }
        }
        Ok(advanced)
    }

    /// A candidate took the guard. The acceptance and the replacement
    /// assignment are written together, so a concurrent second acceptance
    /// fails the version check and a failed write leaves the request open.
    #[tracing::instrument(skip(self))]
    pub async fn accept(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let request = self.load(tenant_id, request_id).await?;
        let open = Self::require_open(request)?;
        let guard = self
            .find_guard_type(tenant_id, open.inner().guard_type_id)
            .await?;
        let date = open.inner().date;

        let held = self
            .assignment_repo
            .find_for_member(tenant_id, member_id, date, date)
            .await?;
        if let Some(existing) =
            find_overlap(&held, member_id, date, &guard.window(), guard.is_external)
        {
            return Err(GuardServiceError::Conflict(ConflictingRecord::Assignment(
                Box::new(existing.clone()),
            )));
        }

        let accepted = open.accept(member_id, now)?;
        let booking = NewAssignment::replacement(
            member_id,
            &guard,
            date,
            accepted.id,
            accepted.requester_id,
            accepted.original_assignment_id,
        );
        let accepted = self
            .replacement_repo
            .accept_with_assignment(&accepted, booking)
            .await?;
        tracing::info!(
            %request_id,
            %member_id,
            assignment_id = ?accepted.replacement_assignment_id,
            "Replacement accepted"
        );
        Ok(accepted)
    }

    /// A candidate refused. The freed offer goes to the next ranked candidate
    /// right away, under the running wave deadline.
    #[tracing::instrument(skip(self))]
    pub async fn decline(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let request = self.load(tenant_id, request_id).await?;
        let open = Self::require_open(request)?.refuse(member_id, now)?;

        let snapshot = self.snapshot(open.inner()).await?;
        let ranked = snapshot.ranked(open.inner());
        let advance = open.fill_vacancies(&ranked, snapshot.params.offers_per_wave(), now);
        self.commit(advance, &snapshot.params, now).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn force_expire(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let request = self.load(tenant_id, request_id).await?;
        let expired = Self::require_open(request)?.force_expire(now);
        self.replacement_repo.save(&expired).await
    }

    /// Cancels the request; the worker never picks it up again.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        let request = self.load(tenant_id, request_id).await?;
        let cancelled = Self::require_open(request)?.cancel(now);
        self.replacement_repo.save(&cancelled).await
    }

    /// Open requests, or those in `status` when given. Expired requests are
    /// the ones an operator has to resolve by hand.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<ReplacementStatus>,
    ) -> Result<Vec<ReplacementRequest>, GuardServiceError> {
        self.replacement_repo.find_listed(tenant_id, status).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        self.load(tenant_id, request_id).await
    }

    async fn load(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        self.replacement_repo
            .find_by_id(tenant_id, request_id)
            .await?
            .ok_or_else(|| {
                GuardServiceError::NotFound(format!("Replacement request {request_id} not found"))
            })
    }

    fn require_open(request: ReplacementRequest) -> Result<OpenReplacement, GuardServiceError> {
        match OpenReplacement::from_request(request.clone()) {
            Some(open) => Ok(open),
            None => Err(stale(&request, "request is already closed")),
        }
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

    async fn snapshot(&self, request: &ReplacementRequest) -> Result<Snapshot, GuardServiceError> {
        let tenant_id = request.tenant_id;
        let guard = self.find_guard_type(tenant_id, request.guard_type_id).await?;
        let members = self.roster.get_members(tenant_id).await?;
        let availabilities = self
            .availability_repo
            .find_in_range(tenant_id, request.date, request.date)
            .await?;
        let (from, to) = ledger_span(request.date, request.date);
        let assignments = self.assignment_repo.find_in_range(tenant_id, from, to).await?;
        let params = self
            .parameters_repo
            .find(tenant_id)
            .await?
            .unwrap_or_else(|| self.default_parameters.clone());

        Ok(Snapshot {
            guard,
            members,
            availabilities,
            assignments,
            params,
        })
    }

    /// Persists the transition, then sends whatever offers it produced. A
    /// failed send leaves the offer to expire with the wave.
    async fn commit(
        &self,
        advance: Advance,
        params: &AttributionParameters,
        now: DateTime<Utc>,
    ) -> Result<ReplacementRequest, GuardServiceError> {
        match advance {
            Advance::Exhausted(request) => {
                tracing::warn!(
                    request_id = %request.id,
                    attempts = request.attempt_count,
                    "No candidates left, replacement needs manual resolution"
                );
                self.replacement_repo.save(&request).await
            }
            Advance::Waiting { request, offers } => {
                let saved = self.replacement_repo.save(request.inner()).await?;
                let deadline = saved.next_attempt_at.unwrap_or(now);
                for member_id in offers {
                    let offer = ReplacementOffer {
                        tenant_id: saved.tenant_id,
                        request_id: saved.id,
                        member_id,
                        guard_type_id: saved.guard_type_id,
                        date: saved.date,
                        shift_starts_at: saved.shift_starts_at,
                        deadline,
                        urgency: saved.urgency,
                        mode: params.notification_mode,
                    };
                    if let Err(e) = self.notifier.send_offer(offer).await {
                        tracing::warn!(
                            request_id = %saved.id,
                            %member_id,
                            "Offer not delivered: {e}"
                        );
                    }
                }
                Ok(saved)
            }
        }
    }
}
