use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::types::{
    Assignment, AssignmentOrigin, AttributionParameters, Availability, DurationMismatch, GuardType,
    Justification, Member, SelectionRule,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::assignment::{LedgerView, NewAssignment};
use crate::domain::eligibility::{CandidateContext, EvaluationMode, rank_candidates};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RunAttribution {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// Drop the automatic assignments of the range before planning.
    #[serde(default)]
    pub reset_existing: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnderstaffedSlot {
    pub date: NaiveDate,
    pub guard_type_id: Uuid,
    pub guard_type_name: String,
    pub required: u32,
    pub filled: u32,
    /// Rejected candidates per reason kind, from the last attempt on the slot.
    pub rejections: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttributionReport {
    pub tenant_id: Uuid,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// The tenant has no parameters or has automatic attribution turned off.
    pub disabled: bool,
    pub assignments_created: u32,
    pub assignments_removed: u32,
    pub dates_processed: Vec<NaiveDate>,
    pub slots_processed: u32,
    pub understaffed: Vec<UnderstaffedSlot>,
    pub duration_mismatches: Vec<DurationMismatch>,
}

impl AttributionReport {
    fn empty(tenant_id: Uuid, week_start: NaiveDate, week_end: NaiveDate) -> Self {
        Self {
            tenant_id,
            week_start,
            week_end,
            disabled: false,
            assignments_created: 0,
            assignments_removed: 0,
            dates_processed: Vec::new(),
            slots_processed: 0,
            understaffed: Vec::new(),
            duration_mismatches: Vec::new(),
        }
    }

    pub fn disabled(tenant_id: Uuid, week_start: NaiveDate, week_end: NaiveDate) -> Self {
        Self {
            disabled: true,
            ..Self::empty(tenant_id, week_start, week_end)
        }
    }
}

/// Immutable snapshot one run plans against.
pub struct AttributionInput<'a> {
    pub tenant_id: Uuid,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub reset_existing: bool,
    pub params: &'a AttributionParameters,
    pub members: &'a [Member],
    pub guard_types: &'a [GuardType],
    pub availabilities: &'a [Availability],
    /// Must cover the ISO weeks and months the range touches so hour caps
    /// and monthly counts see assignments outside the range.
    pub existing: &'a [Assignment],
    pub planned_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AttributionPlan {
    pub remove: Vec<Uuid>,
    pub create: Vec<NewAssignment>,
    pub report: AttributionReport,
}

/// Fills every slot in `week_start..=week_end`, one date at a time and one
/// guard type at a time ordered by start time. Each pick is added to the
/// working ledger before the next slot is evaluated.
pub fn plan_attribution(input: &AttributionInput<'_>) -> AttributionPlan {
    let mut report = AttributionReport::empty(input.tenant_id, input.week_start, input.week_end);

    let remove: Vec<Uuid> = if input.reset_existing {
        input
            .existing
            .iter()
            .filter(|a| {
                a.origin == AssignmentOrigin::Auto
                    && a.is_held()
                    && a.date >= input.week_start
                    && a.date <= input.week_end
            })
            .map(|a| a.id)
            .collect()
    } else {
        Vec::new()
    };
    let removed: HashSet<Uuid> = remove.iter().copied().collect();
    let mut working: Vec<Assignment> = input
        .existing
        .iter()
        .filter(|a| !removed.contains(&a.id))
        .cloned()
        .collect();
    report.assignments_removed = remove.len() as u32;

    let mut guards: Vec<&GuardType> = input.guard_types.iter().filter(|g| g.active).collect();
    guards.sort_by_key(|g| (g.start_time, g.id));

    for guard in &guards {
        if let Some(mismatch) = guard.duration_mismatch() {
            tracing::warn!(
                guard_type_id = %mismatch.guard_type_id,
                stored_hours = mismatch.stored_hours,
                calculated_hours = mismatch.calculated_hours,
                "Stored guard duration disagrees with its time window, using calculated duration"
            );
            report.duration_mismatches.push(mismatch);
        }
    }

    let mut create = Vec::new();
    for date in input
        .week_start
        .iter_days()
        .take_while(|d| *d <= input.week_end)
    {
        report.dates_processed.push(date);

        for guard in guards.iter().filter(|g| g.applies_on(date)) {
            report.slots_processed += 1;
            let required = guard.required_headcount.max(1);

            loop {
                let assigned = LedgerView::new(&working).slot_members(guard.id, date);
                if assigned.len() as u32 >= required {
                    break;
                }

                let ctx = CandidateContext {
                    availabilities: input.availabilities,
                    ledger: LedgerView::new(&working),
                    params: input.params,
                };
                let excluded: HashSet<Uuid> = assigned.iter().copied().collect();
                let ranking = rank_candidates(
                    input.members,
                    date,
                    guard,
                    &ctx,
                    EvaluationMode::Automatic,
                    &excluded,
                );

                let Some(best) = ranking.candidates.first() else {
                    tracing::info!(
                        %date,
                        guard_type_id = %guard.id,
                        required,
                        filled = assigned.len(),
                        "Slot left understaffed"
                    );
                    report.understaffed.push(UnderstaffedSlot {
                        date,
                        guard_type_id: guard.id,
                        guard_type_name: guard.name.clone(),
                        required,
                        filled: assigned.len() as u32,
                        rejections: ranking.rejections,
                    });
                    break;
                };

                let justification = Justification::RuleSelected {
                    rule: if best.over_cap {
                        SelectionRule::OvertimeFallback
                    } else {
                        SelectionRule::LeastLoaded
                    },
                    week_hours_before: f64::from(best.week_minutes) / 60.0,
                    month_assignments_before: best.month_assignments,
                    eligible_candidates: ranking.candidates.len() as u32,
                };
                let new = NewAssignment::automatic(best.member.id, guard, date, justification);
                working.push(new.clone().into_assignment(Uuid::new_v4(), input.planned_at));
                create.push(new);
            }
        }
    }

    report.assignments_created = create.len() as u32;
    AttributionPlan {
        remove,
        create,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};
    use shared::time::iso_week_bounds;
    use shared::types::{
        AvailabilityPriority, AvailabilitySource, AvailabilityStatus, EmploymentType,
        MemberStatus,
    };

    use crate::domain::assignment::find_overlap;

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn member(name: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: name.to_string(),
            status: MemberStatus::Active,
            employment: EmploymentType::PartTime,
            is_officer: false,
            is_acting_officer: false,
            competencies: vec![],
            weekly_hour_cap: 48.0,
        }
    }

    fn guard(start: u32, end: u32, weekdays: Vec<Weekday>) -> GuardType {
        GuardType {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: format!("{start}h-{end}h"),
            start_time: t(start),
            end_time: t(end),
            stored_duration_hours: None,
            weekdays,
            required_headcount: 1,
            officer_required: false,
            required_competencies: vec![],
            is_external: false,
            external_hourly_rate: None,
            active: true,
        }
    }

    fn all_week() -> Vec<Weekday> {
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
    }

    fn available(
        member_id: Uuid,
        on: NaiveDate,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Availability {
        Availability {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            member_id,
            date: on,
            status: AvailabilityStatus::Available,
            start_time: start.map(t),
            end_time: end.map(t),
            reason: None,
            priority: AvailabilityPriority::Normal,
            source: AvailabilitySource::Manual,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn whole_range(members: &[Member], from: NaiveDate, to: NaiveDate) -> Vec<Availability> {
        members
            .iter()
            .flat_map(|m| {
                from.iter_days()
                    .take_while(move |d| *d <= to)
                    .map(move |d| available(m.id, d, None, None))
            })
            .collect()
    }

    fn enabled() -> AttributionParameters {
        AttributionParameters {
            auto_attribution_enabled: true,
            ..AttributionParameters::default()
        }
    }

    fn input<'a>(
        params: &'a AttributionParameters,
        members: &'a [Member],
        guards: &'a [GuardType],
        availabilities: &'a [Availability],
        existing: &'a [Assignment],
        from: NaiveDate,
        to: NaiveDate,
    ) -> AttributionInput<'a> {
        AttributionInput {
            tenant_id: Uuid::nil(),
            week_start: from,
            week_end: to,
            reset_existing: true,
            params,
            members,
            guard_types: guards,
            availabilities,
            existing,
            planned_at: Utc::now(),
        }
    }

    fn materialize(plan: &AttributionPlan) -> Vec<Assignment> {
        plan.create
            .iter()
            .cloned()
            .map(|n| n.into_assignment(Uuid::new_v4(), Utc::now()))
            .collect()
    }

    fn footprint(assignments: &[NewAssignment]) -> Vec<(Uuid, Uuid, NaiveDate)> {
        let mut out: Vec<_> = assignments
            .iter()
            .map(|a| (a.member_id, a.guard_type_id, a.date))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn single_covering_availability_yields_one_auto_assignment() {
        let m = member("M");
        let g = guard(8, 16, vec![Weekday::Mon]);
        let day = date(2025, 12, 1);
        let (from, to) = iso_week_bounds(day);
        let avail = [available(m.id, day, Some(8), Some(16))];
        let params = enabled();
        let members = [m.clone()];
        let guards = [g.clone()];

        let plan = plan_attribution(&input(&params, &members, &guards, &avail, &[], from, to));

        assert_eq!(plan.create.len(), 1);
        let created = &plan.create[0];
        assert_eq!((created.member_id, created.guard_type_id, created.date), (m.id, g.id, day));
        assert_eq!(created.origin, AssignmentOrigin::Auto);
        assert!(plan.report.understaffed.is_empty());
        assert_eq!(plan.report.slots_processed, 1);
    }

    #[test]
    fn every_date_is_processed_once_across_month_boundaries() {
        let mut members = [member("A"), member("B")];
        for m in &mut members {
            m.weekly_hour_cap = 100.0;
        }
        let guards = [guard(8, 16, all_week()), guard(19, 7, all_week())];
        let params = enabled();

        for start in [date(2025, 12, 1), date(2025, 12, 29), date(2026, 2, 25), date(2024, 2, 26)] {
            let end = start + chrono::Duration::days(6);
            let avail = whole_range(&members, start, end);
            let plan =
                plan_attribution(&input(&params, &members, &guards, &avail, &[], start, end));

            let distinct: HashSet<NaiveDate> =
                plan.report.dates_processed.iter().copied().collect();
            assert_eq!(plan.report.dates_processed.len(), 7);
            assert_eq!(distinct.len(), 7);
            assert_eq!(plan.report.slots_processed, 14);

            for day in start.iter_days().take(7) {
                for g in &guards {
                    assert!(
                        plan.create.iter().any(|a| a.date == day && a.guard_type_id == g.id),
                        "{} unfilled on {day}",
                        g.name
                    );
                }
            }
        }
    }

    #[test]
    fn reset_runs_are_idempotent() {
        let members = [member("A"), member("B"), member("C")];
        let guards = [guard(8, 16, all_week()), guard(16, 23, all_week())];
        let from = date(2025, 12, 1);
        let to = date(2025, 12, 7);
        let avail = whole_range(&members, from, to);
        let params = enabled();

        let first = plan_attribution(&input(&params, &members, &guards, &avail, &[], from, to));
        let stored = materialize(&first);
        let second =
            plan_attribution(&input(&params, &members, &guards, &avail, &stored, from, to));

        assert_eq!(second.remove.len(), stored.len());
        assert_eq!(footprint(&first.create), footprint(&second.create));
    }

    #[test]
    fn weekly_cap_is_never_exceeded_without_overtime() {
        let mut members = [member("A"), member("B")];
        for m in &mut members {
            m.weekly_hour_cap = 16.0;
        }
        let guards = [guard(8, 16, all_week())];
        let from = date(2025, 12, 1);
        let to = date(2025, 12, 7);
        let avail = whole_range(&members, from, to);
        let params = enabled();

        let plan = plan_attribution(&input(&params, &members, &guards, &avail, &[], from, to));
        let created = materialize(&plan);
        let ledger = LedgerView::new(&created);

        for m in &members {
            assert!(ledger.week_internal_minutes(m.id, from) <= 16 * 60);
        }
        assert_eq!(plan.create.len(), 4);
        assert_eq!(plan.report.understaffed.len(), 3);
        assert_eq!(
            plan.report.understaffed[0].rejections.get("hour_cap_exceeded"),
            Some(&2)
        );
    }

    #[test]
    fn overtime_fills_past_the_cap_and_says_so() {
        let mut m = member("A");
        m.weekly_hour_cap = 8.0;
        let members = [m];
        let guards = [guard(8, 16, vec![Weekday::Mon, Weekday::Tue])];
        let from = date(2025, 12, 1);
        let to = date(2025, 12, 2);
        let avail = whole_range(&members, from, to);
        let params = AttributionParameters {
            overtime_enabled: true,
            ..enabled()
        };

        let plan = plan_attribution(&input(&params, &members, &guards, &avail, &[], from, to));

        assert_eq!(plan.create.len(), 2);
        assert!(matches!(
            plan.create[1].justification,
            Justification::RuleSelected {
                rule: SelectionRule::OvertimeFallback,
                ..
            }
        ));
    }

    #[test]
    fn officer_guards_only_get_officers() {
        let mut chief = member("Chef");
        chief.is_acting_officer = true;
        chief.weekly_hour_cap = 60.0;
        let members = [member("A"), chief.clone(), member("B")];
        let mut g = guard(8, 16, all_week());
        g.officer_required = true;
        g.required_headcount = 2;
        let guards = [g];
        let from = date(2025, 12, 1);
        let to = date(2025, 12, 7);
        let avail = whole_range(&members, from, to);
        let params = enabled();

        let plan = plan_attribution(&input(&params, &members, &guards, &avail, &[], from, to));

        assert_eq!(plan.create.len(), 7);
        assert!(plan.create.iter().all(|a| a.member_id == chief.id));
        assert!(
            plan.report
                .understaffed
                .iter()
                .all(|s| s.filled == 1 && s.rejections.get("officer_required") == Some(&2))
        );
    }

    #[test]
    fn internal_assignments_never_overlap() {
        let members = [member("A"), member("B")];
        let guards = [
            guard(8, 16, all_week()),
            guard(12, 20, all_week()),
            guard(19, 7, all_week()),
        ];
        let from = date(2025, 12, 1);
        let to = date(2025, 12, 7);
        let avail = whole_range(&members, from, to);
        let params = enabled();

        let plan = plan_attribution(&input(&params, &members, &guards, &avail, &[], from, to));
        let created = materialize(&plan);

        for (i, a) in created.iter().enumerate() {
            let others: Vec<Assignment> = created
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| b.clone())
                .collect();
            assert!(find_overlap(&others, a.member_id, a.date, &a.window(), false).is_none());
        }
    }

    #[test]
    fn manual_assignments_are_kept_and_count_toward_headcount() {
        let members = [member("A"), member("B")];
        let g = guard(8, 16, vec![Weekday::Mon]);
        let day = date(2025, 12, 1);
        let manual = NewAssignment::manual(members[1].id, &g, day, None, None)
            .into_assignment(Uuid::new_v4(), Utc::now());
        let existing = [manual];
        let guards = [g];
        let avail = whole_range(&members, day, day);
        let params = enabled();

        let plan =
            plan_attribution(&input(&params, &members, &guards, &avail, &existing, day, day));

        assert!(plan.remove.is_empty());
        assert!(plan.create.is_empty());
        assert!(plan.report.understaffed.is_empty());
    }

    #[test]
    fn duration_mismatch_is_reported() {
        let members = [member("A")];
        let mut g = guard(8, 16, vec![Weekday::Mon]);
        g.stored_duration_hours = Some(10.0);
        let guards = [g];
        let day = date(2025, 12, 1);
        let params = enabled();

        let plan = plan_attribution(&input(&params, &members, &guards, &[], &[], day, day));

        assert_eq!(plan.report.duration_mismatches.len(), 1);
        assert_eq!(plan.report.duration_mismatches[0].calculated_hours, 8.0);
    }
}
