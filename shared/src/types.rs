use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::time::TimeWindow;

/// Stored and calculated guard durations may drift by rounding; anything
/// beyond this is reported.
const DURATION_TOLERANCE_HOURS: f64 = 1.0 / 60.0;

// region: Roster Types

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
}

/// A firefighter as published by the roster service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Member {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub status: MemberStatus,
    pub employment: EmploymentType,
    pub is_officer: bool,
    pub is_acting_officer: bool,
    pub competencies: Vec<Uuid>,
    /// Weekly cap on internal guard hours.
    pub weekly_hour_cap: f64,
}

impl Member {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn can_lead(&self) -> bool {
        self.is_officer || self.is_acting_officer
    }
}

/// Shift template from the guard type catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuardType {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Duration as persisted by the catalog. Never trusted for hour math.
    pub stored_duration_hours: Option<f64>,
    #[schema(value_type = Vec<String>)]
    pub weekdays: Vec<Weekday>,
    pub required_headcount: u32,
    pub officer_required: bool,
    pub required_competencies: Vec<Uuid>,
    pub is_external: bool,
    pub external_hourly_rate: Option<f64>,
    pub active: bool,
}

impl GuardType {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.weekdays.contains(&date.weekday())
    }

    pub fn duration_minutes(&self) -> u32 {
        self.window().duration_minutes()
    }

    pub fn calculated_duration_hours(&self) -> f64 {
        f64::from(self.duration_minutes()) / 60.0
    }

    /// Reports a stored duration that disagrees with the one derived from
    /// the start and end times.
    pub fn duration_mismatch(&self) -> Option<DurationMismatch> {
        let stored = self.stored_duration_hours?;
        let calculated = self.calculated_duration_hours();
        if (stored - calculated).abs() > DURATION_TOLERANCE_HOURS {
            Some(DurationMismatch {
                guard_type_id: self.id,
                guard_type_name: self.name.clone(),
                stored_hours: stored,
                calculated_hours: calculated,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DurationMismatch {
    pub guard_type_id: Uuid,
    pub guard_type_name: String,
    pub stored_hours: f64,
    pub calculated_hours: f64,
}

// endregion: Roster Types

// region: Availability Types

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "availability_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "availability_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityPriority {
    #[default]
    Normal,
    /// e.g. vacation
    High,
    System,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "availability_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AvailabilitySource {
    #[default]
    Manual,
    Auto,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Availability {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub priority: AvailabilityPriority,
    pub source: AvailabilitySource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Availability {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_bounds(self.start_time, self.end_time)
    }
}

// endregion: Availability Types

// region: Assignment Types

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Planned,
    Confirmed,
    ReplacementRequested,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "assignment_origin", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOrigin {
    Auto,
    Manual,
    ManualAdvanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Fewest assigned hours this week, then fewest guards this month.
    LeastLoaded,
    /// Every eligible member was over their weekly cap; overtime allowed it.
    OvertimeFallback,
}

/// Why a member holds a guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Justification {
    RuleSelected {
        rule: SelectionRule,
        week_hours_before: f64,
        month_assignments_before: u32,
        eligible_candidates: u32,
    },
    ManualOverride {
        operator_id: Option<Uuid>,
        note: Option<String>,
    },
    ReplacementAccepted {
        request_id: Uuid,
        replaced_member_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JustificationEntry {
    pub recorded_at: DateTime<Utc>,
    pub justification: Justification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Assignment {
    pub id: Uuid,
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
    pub justification_history: Vec<JustificationEntry>,
    pub replaces_assignment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    /// Whether the member still occupies the slot. A guard handed over to a
    /// replacement request no longer counts toward load, overlap or headcount.
    pub fn is_held(&self) -> bool {
        self.status != AssignmentStatus::ReplacementRequested
    }

    pub fn duration_minutes(&self) -> u32 {
        self.window().duration_minutes()
    }
}

// endregion: Assignment Types

// region: Replacement Types

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "replacement_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStatus {
    Pending,
    InProgress,
    Accepted,
    Expired,
    Cancelled,
}

impl ReplacementStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Expired | Self::Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "replacement_urgency", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Urgent,
    Normal,
}

impl Urgency {
    /// Shifts starting within 24 hours are urgent.
    pub fn for_shift(shift_starts_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if shift_starts_at - now <= Duration::hours(24) {
            Self::Urgent
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Contacted,
    Accepted,
    Refused,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReplacementAttempt {
    pub member_id: Uuid,
    pub member_name: String,
    pub wave: u32,
    pub contacted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReplacementRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Member being replaced. `None` for a manually flagged gap.
    pub requester_id: Option<Uuid>,
    pub guard_type_id: Uuid,
    pub date: NaiveDate,
    pub shift_starts_at: DateTime<Utc>,
    pub reason: String,
    pub status: ReplacementStatus,
    pub urgency: Urgency,
    pub original_assignment_id: Option<Uuid>,
    pub replacement_member_id: Option<Uuid>,
    pub replacement_assignment_id: Option<Uuid>,
    pub attempt_history: Vec<ReplacementAttempt>,
    pub contacted_member_ids: Vec<Uuid>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub wave_count: u32,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// endregion: Replacement Types

// region: Tenant Parameters

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    #[default]
    Email,
    Push,
    Sms,
    All,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityModel {
    /// Members must declare an `available` interval covering the guard.
    #[default]
    Declared,
    /// A member with no availability records for a date counts as available.
    Implicit,
}

/// Tenant-scoped attribution settings, read once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AttributionParameters {
    pub auto_attribution_enabled: bool,
    pub overtime_enabled: bool,
    pub notification_mode: NotificationMode,
    pub wait_delay_hours: f64,
    pub urgent_wait_delay_hours: Option<f64>,
    pub simultaneous_offers: u32,
    pub availability_model: AvailabilityModel,
}

impl Default for AttributionParameters {
    fn default() -> Self {
        Self {
            auto_attribution_enabled: false,
            overtime_enabled: false,
            notification_mode: NotificationMode::Email,
            wait_delay_hours: 24.0,
            urgent_wait_delay_hours: None,
            simultaneous_offers: 1,
            availability_model: AvailabilityModel::Declared,
        }
    }
}

impl AttributionParameters {
    /// Longest accepted response delay, one year.
    pub const MAX_WAIT_DELAY_HOURS: f64 = 24.0 * 365.0;

    /// Response deadline for one wave. Urgent requests fall back to a quarter
    /// of the normal delay when no explicit urgent delay is configured. The
    /// result is clamped to `0..=MAX_WAIT_DELAY_HOURS`.
    pub fn wave_delay(&self, urgency: Urgency) -> Duration {
        let hours = match urgency {
            Urgency::Normal => self.wait_delay_hours,
            Urgency::Urgent => self
                .urgent_wait_delay_hours
                .unwrap_or(self.wait_delay_hours / 4.0)
                .min(self.wait_delay_hours),
        };
        let hours = if hours.is_nan() {
            0.0
        } else {
            hours.clamp(0.0, Self::MAX_WAIT_DELAY_HOURS)
        };
        Duration::try_minutes((hours * 60.0).round() as i64).unwrap_or_default()
    }

    pub fn offers_per_wave(&self) -> usize {
        self.simultaneous_offers.max(1) as usize
    }
}

// endregion: Tenant Parameters

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(start: (u32, u32), end: (u32, u32), stored: Option<f64>) -> GuardType {
        GuardType {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Garde".to_string(),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            stored_duration_hours: stored,
            weekdays: vec![Weekday::Mon, Weekday::Sat],
            required_headcount: 1,
            officer_required: false,
            required_competencies: vec![],
            is_external: false,
            external_hourly_rate: None,
            active: true,
        }
    }

    #[test]
    fn duration_mismatch_is_flagged() {
        let g = guard((8, 0), (16, 0), Some(12.0));
        let mismatch = g.duration_mismatch().unwrap();
        assert_eq!(mismatch.calculated_hours, 8.0);
        assert_eq!(mismatch.stored_hours, 12.0);
    }

    #[test]
    fn matching_or_missing_stored_duration_is_not_flagged() {
        assert!(guard((8, 0), (16, 0), Some(8.0)).duration_mismatch().is_none());
        assert!(guard((8, 0), (16, 0), None).duration_mismatch().is_none());
        assert!(guard((19, 0), (7, 0), Some(12.0)).duration_mismatch().is_none());
    }

    #[test]
    fn applies_on_matches_weekday_values() {
        let g = guard((8, 0), (16, 0), None);
        // 2025-12-01 is a Monday, 2025-12-02 a Tuesday
        assert!(g.applies_on(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()));
        assert!(!g.applies_on(NaiveDate::from_ymd_opt(2025, 12, 2).unwrap()));
    }

    #[test]
    fn urgency_boundary_is_twenty_four_hours() {
        let now = Utc::now();
        assert_eq!(
            Urgency::for_shift(now + Duration::hours(24), now),
            Urgency::Urgent
        );
        assert_eq!(
            Urgency::for_shift(now + Duration::hours(25), now),
            Urgency::Normal
        );
    }

    #[test]
    fn urgent_wave_delay_is_shorter() {
        let params = AttributionParameters {
            wait_delay_hours: 8.0,
            ..AttributionParameters::default()
        };
        assert_eq!(params.wave_delay(Urgency::Normal), Duration::hours(8));
        assert_eq!(params.wave_delay(Urgency::Urgent), Duration::hours(2));

        let capped = AttributionParameters {
            wait_delay_hours: 2.0,
            urgent_wait_delay_hours: Some(6.0),
            ..AttributionParameters::default()
        };
        assert_eq!(capped.wave_delay(Urgency::Urgent), Duration::hours(2));
    }
}
