use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Return the date in given timezone
///
/// This function mainly to help solving the problem with the DATE type in postgres
///
/// # Example
///```
/// use shared::time::today_in;
/// use chrono_tz::Europe::Paris;
/// let today = today_in(Paris);
/// ```
pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// Converts a local wall-clock start (`date` at `time` in `timezone`) into UTC.
///
/// A local time that does not exist (DST gap) is read as UTC.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, timezone: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match timezone.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// Monday and Sunday of the ISO week containing `date`.
pub fn iso_week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_first.map_or(date, |d| d - Duration::days(1));
    (first, last)
}

/// A half-open interval of minutes counted from midnight of its anchor date.
///
/// Windows whose end is not after their start wrap past midnight, so `end` may
/// exceed [`MINUTES_PER_DAY`]. A 07:00 -> 07:00 window is a full 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

impl TimeWindow {
    pub const FULL_DAY: Self = Self {
        start: 0,
        end: MINUTES_PER_DAY,
    };

    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        let start = minute_of_day(start);
        let mut end = minute_of_day(end);
        if end <= start {
            end += MINUTES_PER_DAY;
        }
        Self { start, end }
    }

    /// Builds a window from optional bounds. Missing bounds extend to the edge
    /// of the day; both missing means the whole day.
    pub fn from_bounds(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        match (start, end) {
            (Some(s), Some(e)) => Self::new(s, e),
            (Some(s), None) => Self {
                start: minute_of_day(s),
                end: MINUTES_PER_DAY,
            },
            (None, Some(e)) => Self {
                start: 0,
                end: match minute_of_day(e) {
                    0 => MINUTES_PER_DAY,
                    m => m,
                },
            },
            (None, None) => Self::FULL_DAY,
        }
    }

    pub fn start_minute(&self) -> u32 {
        self.start
    }

    pub fn end_minute(&self) -> u32 {
        self.end
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The part of the window that falls on its anchor date.
    pub fn clipped_to_day(&self) -> Self {
        Self {
            start: self.start.min(MINUTES_PER_DAY),
            end: self.end.min(MINUTES_PER_DAY),
        }
    }

    /// Whether the union of `parts` covers this window without gaps.
    pub fn covered_by(&self, parts: &[Self]) -> bool {
        let mut sorted: Vec<&Self> = parts.iter().filter(|p| p.overlaps(self)).collect();
        sorted.sort_by_key(|p| p.start);

        let mut reached = self.start;
        for part in sorted {
            if part.start > reached {
                return false;
            }
            reached = reached.max(part.end);
            if reached >= self.end {
                return true;
            }
        }
        reached >= self.end
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn overnight_window_wraps_past_midnight() {
        let w = TimeWindow::new(t(20, 0), t(8, 0));
        assert_eq!(w.duration_minutes(), 12 * 60);
        assert_eq!(w.end_minute(), MINUTES_PER_DAY + 8 * 60);
    }

    #[test]
    fn equal_bounds_mean_twenty_four_hours() {
        let w = TimeWindow::new(t(7, 0), t(7, 0));
        assert_eq!(w.duration_minutes(), MINUTES_PER_DAY);
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let morning = TimeWindow::new(t(8, 0), t(16, 0));
        let evening = TimeWindow::new(t(16, 0), t(23, 0));
        assert!(!morning.overlaps(&evening));
        assert!(morning.overlaps(&TimeWindow::new(t(15, 0), t(17, 0))));
    }

    #[test]
    fn adjacent_parts_cover_together() {
        let shift = TimeWindow::new(t(8, 0), t(16, 0));
        let parts = [
            TimeWindow::new(t(12, 0), t(16, 0)),
            TimeWindow::new(t(7, 0), t(12, 0)),
        ];
        assert!(shift.covered_by(&parts));
        assert!(!shift.covered_by(&parts[..1]));
    }

    #[test]
    fn gap_between_parts_is_not_covered() {
        let shift = TimeWindow::new(t(8, 0), t(16, 0));
        let parts = [
            TimeWindow::new(t(8, 0), t(11, 0)),
            TimeWindow::new(t(12, 0), t(16, 0)),
        ];
        assert!(!shift.covered_by(&parts));
    }

    #[test]
    fn iso_week_bounds_cross_year_boundary() {
        let (monday, sunday) = iso_week_bounds(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(monday, NaiveDate::from_ymd_opt(2025, 12, 29).unwrap());
        assert_eq!(sunday, NaiveDate::from_ymd_opt(2026, 1, 4).unwrap());
    }

    #[test]
    fn month_bounds_handles_december() {
        let (first, last) = month_bounds(NaiveDate::from_ymd_opt(2025, 12, 17).unwrap());
        assert_eq!(first, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn local_to_utc_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let utc = local_to_utc(date, t(8, 0), chrono_tz::Europe::Paris);
        assert_eq!(utc.time(), t(7, 0));
    }
}
