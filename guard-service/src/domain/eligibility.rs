use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use shared::time::TimeWindow;
use shared::types::{
    AttributionParameters, Availability, AvailabilityModel, AvailabilityStatus, EmploymentType,
    GuardType, Member,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::assignment::{LedgerView, find_overlap};

/// Float slack when comparing hours against a weekly cap.
const CAP_EPSILON_MINUTES: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Weekly attribution: only part-time members with declared availability.
    Automatic,
    /// Replacement offers: full-time members are reachable regardless of
    /// their declared availability.
    Replacement,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ineligibility {
    Inactive,
    FullTimeExcluded,
    NoAvailability,
    Unavailable { availability_id: Uuid },
    OfficerRequired,
    MissingCompetencies { missing: Vec<Uuid> },
    HourCapExceeded {
        assigned_hours: f64,
        shift_hours: f64,
        cap_hours: f64,
    },
    Overlap { assignment_id: Uuid },
}

impl Ineligibility {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::FullTimeExcluded => "full_time_excluded",
            Self::NoAvailability => "no_availability",
            Self::Unavailable { .. } => "unavailable",
            Self::OfficerRequired => "officer_required",
            Self::MissingCompetencies { .. } => "missing_competencies",
            Self::HourCapExceeded { .. } => "hour_cap_exceeded",
            Self::Overlap { .. } => "overlap",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Option<Ineligibility>,
    /// Eligible only because overtime is enabled.
    pub over_cap: bool,
}

impl Eligibility {
    fn eligible(over_cap: bool) -> Self {
        Self {
            eligible: true,
            reason: None,
            over_cap,
        }
    }

    fn rejected(reason: Ineligibility) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
            over_cap: false,
        }
    }
}

/// Everything the evaluator reads besides the member and the guard.
pub struct CandidateContext<'a> {
    /// Availability records; only the ones for the candidate and date are used.
    pub availabilities: &'a [Availability],
    pub ledger: LedgerView<'a>,
    pub params: &'a AttributionParameters,
}

/// Checks one member against one guard instance. Rules run in a fixed order
/// and the first failure is reported.
pub fn evaluate(
    member: &Member,
    date: NaiveDate,
    guard: &GuardType,
    ctx: &CandidateContext<'_>,
    mode: EvaluationMode,
) -> Eligibility {
    match check(member, date, guard, ctx, mode) {
        Ok(over_cap) => Eligibility::eligible(over_cap),
        Err(reason) => {
            tracing::debug!(
                member_id = %member.id,
                guard_type_id = %guard.id,
                %date,
                reason = reason.kind(),
                "Candidate rejected"
            );
            Eligibility::rejected(reason)
        }
    }
}

fn check(
    member: &Member,
    date: NaiveDate,
    guard: &GuardType,
    ctx: &CandidateContext<'_>,
    mode: EvaluationMode,
) -> Result<bool, Ineligibility> {
    if !member.is_active() {
        return Err(Ineligibility::Inactive);
    }

    match (mode, member.employment) {
        (EvaluationMode::Automatic, EmploymentType::FullTime) => {
            return Err(Ineligibility::FullTimeExcluded);
        }
        (EvaluationMode::Replacement, EmploymentType::FullTime) => {}
        (_, EmploymentType::PartTime) => check_availability(member, date, guard, ctx)?,
    }

    if guard.officer_required && !member.can_lead() {
        return Err(Ineligibility::OfficerRequired);
    }

    let missing: Vec<Uuid> = guard
        .required_competencies
        .iter()
        .filter(|c| !member.competencies.contains(c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(Ineligibility::MissingCompetencies { missing });
    }

    let over_cap = !guard.is_external && exceeds_cap(member, date, guard, ctx);
    if over_cap && !ctx.params.overtime_enabled {
        let assigned = ctx.ledger.week_internal_minutes(member.id, date);
        return Err(Ineligibility::HourCapExceeded {
            assigned_hours: f64::from(assigned) / 60.0,
            shift_hours: guard.calculated_duration_hours(),
            cap_hours: member.weekly_hour_cap,
        });
    }

    if let Some(existing) = find_overlap(
        ctx.ledger.all(),
        member.id,
        date,
        &guard.window(),
        guard.is_external,
    ) {
        return Err(Ineligibility::Overlap {
            assignment_id: existing.id,
        });
    }

    Ok(over_cap)
}

fn check_availability(
    member: &Member,
    date: NaiveDate,
    guard: &GuardType,
    ctx: &CandidateContext<'_>,
) -> Result<(), Ineligibility> {
    let window = guard.window();
    let records: Vec<&Availability> = ctx
        .availabilities
        .iter()
        .filter(|a| a.member_id == member.id && a.date == date)
        .collect();

    if let Some(blocked) = records
        .iter()
        .find(|a| a.status == AvailabilityStatus::Unavailable && a.window().overlaps(&window))
    {
        return Err(Ineligibility::Unavailable {
            availability_id: blocked.id,
        });
    }

    if records.is_empty() && ctx.params.availability_model == AvailabilityModel::Implicit {
        return Ok(());
    }

    // Only the part of an overnight guard on its start date is checked.
    let parts: Vec<TimeWindow> = records
        .iter()
        .filter(|a| a.status == AvailabilityStatus::Available)
        .map(|a| a.window())
        .collect();
    if window.clipped_to_day().covered_by(&parts) {
        Ok(())
    } else {
        Err(Ineligibility::NoAvailability)
    }
}

fn exceeds_cap(
    member: &Member,
    date: NaiveDate,
    guard: &GuardType,
    ctx: &CandidateContext<'_>,
) -> bool {
    let assigned = ctx.ledger.week_internal_minutes(member.id, date);
    let total = f64::from(assigned + guard.duration_minutes());
    total > member.weekly_hour_cap * 60.0 + CAP_EPSILON_MINUTES
}

#[derive(Debug, Clone)]
pub struct RankedCandidate<'a> {
    pub member: &'a Member,
    pub week_minutes: u32,
    pub month_assignments: u32,
    pub over_cap: bool,
}

impl RankedCandidate<'_> {
    fn sort_key(&self) -> (bool, u32, u32, Uuid) {
        (
            self.over_cap,
            self.week_minutes,
            self.month_assignments,
            self.member.id,
        )
    }
}

#[derive(Debug, Default)]
pub struct Ranking<'a> {
    pub candidates: Vec<RankedCandidate<'a>>,
    /// Rejection counts keyed by [`Ineligibility::kind`].
    pub rejections: BTreeMap<String, u32>,
}

/// Evaluates every member not in `excluded` and orders the eligible ones:
/// over-cap members last, then fewest internal minutes this week, then fewest
/// assignments this month, then member id.
pub fn rank_candidates<'a>(
    members: &'a [Member],
    date: NaiveDate,
    guard: &GuardType,
    ctx: &CandidateContext<'_>,
    mode: EvaluationMode,
    excluded: &HashSet<Uuid>,
) -> Ranking<'a> {
    let mut ranking = Ranking::default();

    for member in members.iter().filter(|m| !excluded.contains(&m.id)) {
        let eligibility = evaluate(member, date, guard, ctx, mode);
        match eligibility.reason {
            Some(reason) => {
                *ranking
                    .rejections
                    .entry(reason.kind().to_string())
                    .or_default() += 1;
            }
            None => ranking.candidates.push(RankedCandidate {
                member,
                week_minutes: ctx.ledger.week_internal_minutes(member.id, date),
                month_assignments: ctx.ledger.month_assignments(member.id, date),
                over_cap: eligibility.over_cap,
            }),
        }
    }

    ranking.candidates.sort_by_key(RankedCandidate::sort_key);
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc, Weekday};
    use shared::types::{Assignment, AvailabilityPriority, AvailabilitySource, MemberStatus};

    use crate::domain::assignment::NewAssignment;

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()
    }

    fn member(employment: EmploymentType) -> Member {
        Member {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: "Sapeur".to_string(),
            status: MemberStatus::Active,
            employment,
            is_officer: false,
            is_acting_officer: false,
            competencies: vec![],
            weekly_hour_cap: 40.0,
        }
    }

    fn guard(start: u32, end: u32) -> GuardType {
        GuardType {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: "Jour".to_string(),
            start_time: t(start),
            end_time: t(end),
            stored_duration_hours: None,
            weekdays: vec![Weekday::Mon],
            required_headcount: 1,
            officer_required: false,
            required_competencies: vec![],
            is_external: false,
            external_hourly_rate: None,
            active: true,
        }
    }

    fn availability(
        member_id: Uuid,
        status: AvailabilityStatus,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Availability {
        Availability {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            member_id,
            date: monday(),
            status,
            start_time: start.map(t),
            end_time: end.map(t),
            reason: None,
            priority: AvailabilityPriority::Normal,
            source: AvailabilitySource::Manual,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn booked(member_id: Uuid, g: &GuardType, date: NaiveDate) -> Assignment {
        NewAssignment::manual(member_id, g, date, None, None)
            .into_assignment(Uuid::new_v4(), Utc::now())
    }

    fn reason(
        m: &Member,
        g: &GuardType,
        availabilities: &[Availability],
        assignments: &[Assignment],
        params: &AttributionParameters,
        mode: EvaluationMode,
    ) -> Option<Ineligibility> {
        let ctx = CandidateContext {
            availabilities,
            ledger: LedgerView::new(assignments),
            params,
        };
        evaluate(m, monday(), g, &ctx, mode).reason
    }

    #[test]
    fn covering_availability_is_eligible() {
        let m = member(EmploymentType::PartTime);
        let g = guard(8, 16);
        let avail = [availability(m.id, AvailabilityStatus::Available, Some(8), Some(16))];
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &avail, &[], &params, EvaluationMode::Automatic),
            None
        );
    }

    #[test]
    fn partial_availability_is_rejected() {
        let m = member(EmploymentType::PartTime);
        let g = guard(8, 16);
        let avail = [availability(m.id, AvailabilityStatus::Available, Some(9), Some(16))];
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &avail, &[], &params, EvaluationMode::Automatic),
            Some(Ineligibility::NoAvailability)
        );
    }

    #[test]
    fn unavailable_record_wins_over_available() {
        let m = member(EmploymentType::PartTime);
        let g = guard(8, 16);
        let blocked = availability(m.id, AvailabilityStatus::Unavailable, Some(12), Some(13));
        let blocked_id = blocked.id;
        let avail = [
            availability(m.id, AvailabilityStatus::Available, None, None),
            blocked,
        ];
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &avail, &[], &params, EvaluationMode::Automatic),
            Some(Ineligibility::Unavailable {
                availability_id: blocked_id
            })
        );
    }

    #[test]
    fn implicit_model_accepts_missing_records() {
        let m = member(EmploymentType::PartTime);
        let g = guard(8, 16);
        let params = AttributionParameters {
            availability_model: AvailabilityModel::Implicit,
            ..AttributionParameters::default()
        };

        assert_eq!(
            reason(&m, &g, &[], &[], &params, EvaluationMode::Automatic),
            None
        );
        assert_eq!(
            reason(
                &m,
                &g,
                &[],
                &[],
                &AttributionParameters::default(),
                EvaluationMode::Automatic
            ),
            Some(Ineligibility::NoAvailability)
        );
    }

    #[test]
    fn full_time_members_only_reach_replacements() {
        let m = member(EmploymentType::FullTime);
        let g = guard(8, 16);
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &[], &[], &params, EvaluationMode::Automatic),
            Some(Ineligibility::FullTimeExcluded)
        );
        assert_eq!(
            reason(&m, &g, &[], &[], &params, EvaluationMode::Replacement),
            None
        );
    }

    #[test]
    fn officer_and_competencies_are_required() {
        let mut m = member(EmploymentType::FullTime);
        let ladder = Uuid::new_v4();
        let mut g = guard(8, 16);
        g.officer_required = true;
        g.required_competencies = vec![ladder];
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &[], &[], &params, EvaluationMode::Replacement),
            Some(Ineligibility::OfficerRequired)
        );

        m.is_acting_officer = true;
        assert_eq!(
            reason(&m, &g, &[], &[], &params, EvaluationMode::Replacement),
            Some(Ineligibility::MissingCompetencies {
                missing: vec![ladder]
            })
        );

        m.competencies.push(ladder);
        assert_eq!(
            reason(&m, &g, &[], &[], &params, EvaluationMode::Replacement),
            None
        );
    }

    #[test]
    fn hour_cap_blocks_internal_guards_unless_overtime() {
        let mut m = member(EmploymentType::FullTime);
        m.weekly_hour_cap = 12.0;
        let earlier = guard(8, 16);
        let tuesday = monday() + chrono::Duration::days(1);
        let assignments = [booked(m.id, &earlier, tuesday)];
        let g = guard(8, 16);
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &[], &assignments, &params, EvaluationMode::Replacement),
            Some(Ineligibility::HourCapExceeded {
                assigned_hours: 8.0,
                shift_hours: 8.0,
                cap_hours: 12.0
            })
        );

        let overtime = AttributionParameters {
            overtime_enabled: true,
            ..AttributionParameters::default()
        };
        let ctx = CandidateContext {
            availabilities: &[],
            ledger: LedgerView::new(&assignments),
            params: &overtime,
        };
        let result = evaluate(&m, monday(), &g, &ctx, EvaluationMode::Replacement);
        assert!(result.eligible);
        assert!(result.over_cap);

        let mut on_call = guard(19, 7);
        on_call.is_external = true;
        assert_eq!(
            reason(&m, &on_call, &[], &assignments, &params, EvaluationMode::Replacement),
            None
        );
    }

    #[test]
    fn overlapping_assignment_is_rejected() {
        let m = member(EmploymentType::FullTime);
        let existing_guard = guard(8, 16);
        let assignments = [booked(m.id, &existing_guard, monday())];
        let g = guard(12, 20);
        let params = AttributionParameters::default();

        assert_eq!(
            reason(&m, &g, &[], &assignments, &params, EvaluationMode::Replacement),
            Some(Ineligibility::Overlap {
                assignment_id: assignments[0].id
            })
        );
    }

    #[test]
    fn ranking_prefers_least_loaded_then_id() {
        let g = guard(8, 16);
        let mut members = vec![
            member(EmploymentType::FullTime),
            member(EmploymentType::FullTime),
            member(EmploymentType::FullTime),
        ];
        members.sort_by_key(|m| m.id);
        let tuesday = monday() + chrono::Duration::days(1);
        let other = guard(8, 12);
        let assignments = [booked(members[0].id, &other, tuesday)];
        let params = AttributionParameters::default();
        let ctx = CandidateContext {
            availabilities: &[],
            ledger: LedgerView::new(&assignments),
            params: &params,
        };

        let excluded = HashSet::from([members[2].id]);
        let ranking = rank_candidates(
            &members,
            monday(),
            &g,
            &ctx,
            EvaluationMode::Replacement,
            &excluded,
        );
        let order: Vec<Uuid> = ranking.candidates.iter().map(|c| c.member.id).collect();

        assert_eq!(order, vec![members[1].id, members[0].id]);
        assert!(ranking.rejections.is_empty());
    }

    #[test]
    fn ranking_counts_rejections_by_kind() {
        let g = guard(8, 16);
        let mut inactive = member(EmploymentType::PartTime);
        inactive.status = MemberStatus::Inactive;
        let members = vec![
            inactive,
            member(EmploymentType::PartTime),
            member(EmploymentType::FullTime),
        ];
        let params = AttributionParameters::default();
        let ctx = CandidateContext {
            availabilities: &[],
            ledger: LedgerView::new(&[]),
            params: &params,
        };

        let ranking = rank_candidates(
            &members,
            monday(),
            &g,
            &ctx,
            EvaluationMode::Automatic,
            &HashSet::new(),
        );

        assert!(ranking.candidates.is_empty());
        assert_eq!(ranking.rejections.get("inactive"), Some(&1));
        assert_eq!(ranking.rejections.get("no_availability"), Some(&1));
        assert_eq!(ranking.rejections.get("full_time_excluded"), Some(&1));
    }
}
