use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use shared::time::TimeWindow;
use shared::types::{Availability, AvailabilityPriority, AvailabilitySource, AvailabilityStatus};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ConflictingRecord, GuardServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct NewAvailability {
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub priority: AvailabilityPriority,
    pub source: AvailabilitySource,
}

impl NewAvailability {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_bounds(self.start_time, self.end_time)
    }

    /// Same member, day, status and interval as an existing record.
    pub fn duplicates(&self, existing: &Availability) -> bool {
        existing.member_id == self.member_id
            && existing.date == self.date
            && existing.status == self.status
            && existing.window() == self.window()
    }

    pub fn into_availability(self, id: Uuid, now: DateTime<Utc>) -> Availability {
        Availability {
            id,
            tenant_id: self.tenant_id,
            member_id: self.member_id,
            date: self.date,
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            reason: self.reason,
            priority: self.priority,
            source: self.source,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Equal bounds would read as a full day, so they are refused outright.
pub fn check_bounds(
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
) -> Result<(), GuardServiceError> {
    match (start_time, end_time) {
        (Some(start), Some(end)) if start == end => Err(GuardServiceError::BadRequest(
            "start_time and end_time must differ".into(),
        )),
        _ => Ok(()),
    }
}

/// Body of a declare-availability call.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DeclareAvailability {
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    #[serde(default)]
    pub priority: AvailabilityPriority,
    #[serde(default)]
    pub source: AvailabilitySource,
}

impl DeclareAvailability {
    pub fn for_member(self, tenant_id: Uuid, member_id: Uuid) -> NewAvailability {
        NewAvailability {
            tenant_id,
            member_id,
            date: self.date,
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            reason: self.reason,
            priority: self.priority,
            source: self.source,
        }
    }
}

/// A record of the opposite status whose interval overlaps the new one.
pub fn find_conflict<'a>(
    existing: &'a [Availability],
    new: &NewAvailability,
) -> Option<&'a Availability> {
    let window = new.window();
    existing.iter().find(|a| {
        a.member_id == new.member_id
            && a.date == new.date
            && a.status != new.status
            && a.window().overlaps(&window)
    })
}

/// What to do when a generated entry collides with an existing record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Skip,
    FailFast,
    Overwrite,
}

/// Rotating on/off pattern, e.g. `[true, true, false, false]` for two days on
/// and two days off. An empty cycle means every day.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AvailabilityPattern {
    pub status: AvailabilityStatus,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub cycle: Vec<bool>,
    /// Day the cycle starts on. Defaults to the start of the range.
    pub anchor: Option<NaiveDate>,
    #[schema(value_type = Option<Vec<String>>)]
    pub weekdays: Option<Vec<Weekday>>,
    pub reason: Option<String>,
}

impl AvailabilityPattern {
    pub fn is_on(&self, date: NaiveDate, range_start: NaiveDate) -> bool {
        if let Some(weekdays) = &self.weekdays
            && !weekdays.contains(&date.weekday())
        {
            return false;
        }
        if self.cycle.is_empty() {
            return true;
        }
        let anchor = self.anchor.unwrap_or(range_start);
        let len = self.cycle.len() as i64;
        let index = (date - anchor).num_days().rem_euclid(len) as usize;
        self.cycle[index]
    }

    fn entry(&self, tenant_id: Uuid, member_id: Uuid, date: NaiveDate) -> NewAvailability {
        NewAvailability {
            tenant_id,
            member_id,
            date,
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            reason: self.reason.clone(),
            priority: AvailabilityPriority::System,
            source: AvailabilitySource::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkGenerationOutcome {
    pub created: u32,
    pub skipped: u32,
    pub replaced: u32,
}

/// Writes a bulk generation resolves to, applied atomically.
#[derive(Debug, Default)]
pub struct BulkPlan {
    pub remove: Vec<Uuid>,
    pub create: Vec<NewAvailability>,
    pub outcome: BulkGenerationOutcome,
}

/// Expands `pattern` over `from..=to` against `existing` (the member's records
/// in that range). Entries matching an existing record are skipped so
/// regenerating is idempotent.
pub fn plan_bulk(
    existing: &[Availability],
    tenant_id: Uuid,
    member_id: Uuid,
    pattern: &AvailabilityPattern,
    from: NaiveDate,
    to: NaiveDate,
    policy: ConflictPolicy,
) -> Result<BulkPlan, GuardServiceError> {
    let mut plan = BulkPlan::default();

    for date in from.iter_days().take_while(|d| *d <= to) {
        if !pattern.is_on(date, from) {
            continue;
        }
        let entry = pattern.entry(tenant_id, member_id, date);

        if existing.iter().any(|a| entry.duplicates(a)) {
            plan.outcome.skipped += 1;
            continue;
        }

        let window = entry.window();
        let conflicts: Vec<&Availability> = existing
            .iter()
            .filter(|a| {
                a.member_id == member_id
                    && a.date == date
                    && a.status != entry.status
                    && a.window().overlaps(&window)
            })
            .collect();

        match (conflicts.first(), policy) {
            (None, _) => {}
            (Some(_), ConflictPolicy::Skip) => {
                plan.outcome.skipped += 1;
                continue;
            }
            (Some(first), ConflictPolicy::FailFast) => {
                return Err(GuardServiceError::Conflict(ConflictingRecord::Availability(
                    Box::new((*first).clone()),
                )));
            }
            (Some(_), ConflictPolicy::Overwrite) => {
                plan.remove.extend(conflicts.iter().map(|a| a.id));
                plan.outcome.replaced += conflicts.len() as u32;
            }
        }

        plan.create.push(entry);
        plan.outcome.created += 1;
    }

    Ok(plan)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkGenerateAvailability {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub pattern: AvailabilityPattern,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResetAvailability {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub source: Option<AvailabilitySource>,
    pub status: Option<AvailabilityStatus>,
}

impl ResetAvailability {
    pub fn for_member(self, tenant_id: Uuid, member_id: Uuid) -> ResetFilter {
        ResetFilter {
            tenant_id,
            member_id,
            from: self.from,
            to: self.to,
            source: self.source,
            status: self.status,
        }
    }
}

/// Selects records removed by a reset. `None` filters match everything.
#[derive(Debug, Clone)]
pub struct ResetFilter {
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub source: Option<AvailabilitySource>,
    pub status: Option<AvailabilityStatus>,
}

impl ResetFilter {
    pub fn matches(&self, a: &Availability) -> bool {
        a.tenant_id == self.tenant_id
            && a.member_id == self.member_id
            && a.date >= self.from
            && a.date <= self.to
            && self.source.is_none_or(|s| a.source == s)
            && self.status.is_none_or(|s| a.status == s)
    }
}

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn find_for_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Availability>, GuardServiceError>;
    async fn find_in_range(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Availability>, GuardServiceError>;
    async fn create(&self, availability: NewAvailability)
    -> Result<Availability, GuardServiceError>;
    /// Removes `remove` and inserts `create` in one transaction.
    async fn apply_batch(
        &self,
        tenant_id: Uuid,
        remove: Vec<Uuid>,
        create: Vec<NewAvailability>,
    ) -> Result<Vec<Availability>, GuardServiceError>;
    async fn delete_matching(&self, filter: ResetFilter) -> Result<u64, GuardServiceError>;
}
