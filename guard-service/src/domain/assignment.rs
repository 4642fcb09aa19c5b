use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use shared::time::{TimeWindow, iso_week_bounds, month_bounds};
use shared::types::{
    Assignment, AssignmentOrigin, AssignmentStatus, GuardType, Justification, JustificationEntry,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::GuardServiceError;

/// Body of an operator booking a member onto a guard.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateManualAssignment {
    pub member_id: Uuid,
    pub guard_type_id: Uuid,
    pub date: NaiveDate,
    pub operator_id: Option<Uuid>,
    pub note: Option<String>,
}

fn default_find_replacement() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CancelAssignment {
    pub reason: String,
    /// Open a replacement request for the freed guard.
    #[serde(default = "default_find_replacement")]
    pub find_replacement: bool,
}

/// An assignment about to be written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub guard_type_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_external: bool,
    pub status: AssignmentStatus,
    pub origin: AssignmentOrigin,
    pub justification: Justification,
    pub replaces_assignment_id: Option<Uuid>,
}

impl NewAssignment {
    fn for_guard(
        member_id: Uuid,
        guard: &GuardType,
        date: NaiveDate,
        status: AssignmentStatus,
        origin: AssignmentOrigin,
        justification: Justification,
    ) -> Self {
        Self {
            tenant_id: guard.tenant_id,
            member_id,
            guard_type_id: guard.id,
            date,
            start_time: guard.start_time,
            end_time: guard.end_time,
            is_external: guard.is_external,
            status,
            origin,
            justification,
            replaces_assignment_id: None,
        }
    }

    pub fn automatic(
        member_id: Uuid,
        guard: &GuardType,
        date: NaiveDate,
        justification: Justification,
    ) -> Self {
        Self::for_guard(
            member_id,
            guard,
            date,
            AssignmentStatus::Planned,
            AssignmentOrigin::Auto,
            justification,
        )
    }

    pub fn manual(
        member_id: Uuid,
        guard: &GuardType,
        date: NaiveDate,
        operator_id: Option<Uuid>,
        note: Option<String>,
    ) -> Self {
        Self::for_guard(
            member_id,
            guard,
            date,
            AssignmentStatus::Confirmed,
            AssignmentOrigin::Manual,
            Justification::ManualOverride { operator_id, note },
        )
    }

    pub fn replacement(
        member_id: Uuid,
        guard: &GuardType,
        date: NaiveDate,
        request_id: Uuid,
        replaced_member_id: Option<Uuid>,
        replaces_assignment_id: Option<Uuid>,
    ) -> Self {
        Self {
            replaces_assignment_id,
            ..Self::for_guard(
                member_id,
                guard,
                date,
                AssignmentStatus::Confirmed,
                AssignmentOrigin::ManualAdvanced,
                Justification::ReplacementAccepted {
                    request_id,
                    replaced_member_id,
                },
            )
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    /// Materializes the assignment with the given identity. The justification
    /// history starts with the creation justification.
    pub fn into_assignment(self, id: Uuid, now: DateTime<Utc>) -> Assignment {
        Assignment {
            id,
            tenant_id: self.tenant_id,
            member_id: self.member_id,
            guard_type_id: self.guard_type_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            is_external: self.is_external,
            status: self.status,
            origin: self.origin,
            justification_history: vec![JustificationEntry {
                recorded_at: now,
                justification: self.justification.clone(),
            }],
            justification: self.justification,
            replaces_assignment_id: self.replaces_assignment_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Assignment>, GuardServiceError>;
    async fn find_in_range(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError>;
    async fn find_for_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Assignment>, GuardServiceError>;
    async fn create(&self, assignment: NewAssignment) -> Result<Assignment, GuardServiceError>;
    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), GuardServiceError>;
    /// Removes `remove` and inserts `create` in one transaction.
    async fn apply_attribution(
        &self,
        tenant_id: Uuid,
        remove: Vec<Uuid>,
        create: Vec<NewAssignment>,
    ) -> Result<Vec<Assignment>, GuardServiceError>;
}

/// The first assignment of `member_id` on `date` that a new window would
/// collide with.
///
/// Internal guards may not overlap internal guards and external guards may
/// not overlap external guards; an on-call guard can sit on top of an
/// internal one.
pub fn find_overlap<'a>(
    assignments: &'a [Assignment],
    member_id: Uuid,
    date: NaiveDate,
    window: &TimeWindow,
    is_external: bool,
) -> Option<&'a Assignment> {
    assignments.iter().find(|a| {
        a.is_held()
            && a.member_id == member_id
            && a.date == date
            && a.is_external == is_external
            && a.window().overlaps(window)
    })
}

/// Dates an assignment load must cover so week and month figures are exact for
/// every date in `from..=to`.
pub fn ledger_span(from: NaiveDate, to: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = iso_week_bounds(from).0.min(month_bounds(from).0);
    let end = iso_week_bounds(to).1.max(month_bounds(to).1);
    (start, end)
}

/// Read-only load figures over the held assignments of a set. The set must
/// cover the ISO week and the month of every date asked about.
pub struct LedgerView<'a> {
    assignments: &'a [Assignment],
}

impl<'a> LedgerView<'a> {
    pub fn new(assignments: &'a [Assignment]) -> Self {
        Self { assignments }
    }

    pub fn all(&self) -> &'a [Assignment] {
        self.assignments
    }

    fn held(&self) -> impl Iterator<Item = &'a Assignment> {
        self.assignments.iter().filter(|a| a.is_held())
    }

    /// Minutes of internal guards held in the ISO week of `date`.
    pub fn week_internal_minutes(&self, member_id: Uuid, date: NaiveDate) -> u32 {
        let (monday, sunday) = iso_week_bounds(date);
        self.held()
            .filter(|a| {
                a.member_id == member_id && !a.is_external && a.date >= monday && a.date <= sunday
            })
            .map(Assignment::duration_minutes)
            .sum()
    }

    pub fn month_assignments(&self, member_id: Uuid, date: NaiveDate) -> u32 {
        let (first, last) = month_bounds(date);
        self.held()
            .filter(|a| a.member_id == member_id && a.date >= first && a.date <= last)
            .count() as u32
    }

    pub fn slot_members(&self, guard_type_id: Uuid, date: NaiveDate) -> Vec<Uuid> {
        self.held()
            .filter(|a| a.guard_type_id == guard_type_id && a.date == date)
            .map(|a| a.member_id)
            .collect()
    }
}
