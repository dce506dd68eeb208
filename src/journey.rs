//! Daily journey calculation.
//!
//! Turns one [`DailyTimeRecord`] into worked, expected, overtime,
//! night and missing minutes.  All arithmetic is on whole minutes.

use crate::config::JourneyPolicy;
use crate::error::{Error, Result};
use crate::models::{DailyJourneyResult, DailyTimeRecord, DayStatus};
use chrono::{Duration, NaiveDateTime};

/// Checks `clock_in <= break_start <= break_end <= clock_out` for a
/// complete record.  Records without a closed shift always pass.
pub fn validate_record(record: &DailyTimeRecord) -> Result<()> {
    let (Some(clock_in), Some(clock_out)) = (record.clock_in, record.clock_out) else {
        return Ok(());
    };
    let integrity = |detail: String| Error::DataIntegrity {
        date: record.date,
        detail,
    };
    if clock_out < clock_in {
        return Err(integrity(format!(
            "clock-out {clock_out} before clock-in {clock_in}"
        )));
    }
    if let (Some(start), Some(end)) = (record.break_start, record.break_end) {
        if end < start {
            return Err(integrity(format!("break ends {end} before it starts {start}")));
        }
        if start < clock_in || end > clock_out {
            return Err(integrity(format!(
                "break {start}..{end} outside shift {clock_in}..{clock_out}"
            )));
        }
    }
    Ok(())
}

/// Worked spans of a complete record: the shift minus the break.
pub fn worked_intervals(record: &DailyTimeRecord) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let (Some(clock_in), Some(clock_out)) = (record.clock_in, record.clock_out) else {
        return Vec::new();
    };
    let spans = match (record.break_start, record.break_end) {
        (Some(start), Some(end)) => vec![(clock_in, start), (end, clock_out)],
        _ => vec![(clock_in, clock_out)],
    };
    spans.into_iter().filter(|(a, b)| b > a).collect()
}

/// Break length in minutes, zero when no break was recorded.
pub fn break_minutes(record: &DailyTimeRecord) -> i64 {
    match (record.break_start, record.break_end) {
        (Some(start), Some(end)) => (end - start).num_minutes().max(0),
        _ => 0,
    }
}

/// Expected minutes for a scheduled workday.
pub fn expected_daily_minutes(weekly_hours: u32, policy: &JourneyPolicy) -> u32 {
    weekly_hours.saturating_mul(60) / policy.working_days_per_week.max(1)
}

/// Minutes of `intervals` inside the nightly window.
pub fn night_minutes(intervals: &[(NaiveDateTime, NaiveDateTime)], policy: &JourneyPolicy) -> i64 {
    let wraps = policy.night_start > policy.night_end;
    let mut total = 0;
    for &(a, b) in intervals {
        let mut day = a.date() - Duration::days(1);
        while day <= b.date() {
            let window_start = day.and_time(policy.night_start);
            let window_end = if wraps {
                (day + Duration::days(1)).and_time(policy.night_end)
            } else {
                day.and_time(policy.night_end)
            };
            let overlap = (b.min(window_end) - a.max(window_start)).num_minutes();
            total += overlap.max(0);
            day += Duration::days(1);
        }
    }
    total
}

fn to_minutes(value: i64, record: &DailyTimeRecord, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::DataIntegrity {
        date: record.date,
        detail: format!("{what} out of range: {value}"),
    })
}

/// Builds the minute breakdown for one day.
///
/// Incomplete, absent and rest days get no worked time and no overtime;
/// a scheduled day without a closed shift counts its expected minutes as
/// missing.  Records with impossible timestamps fail with
/// [`Error::DataIntegrity`].
pub fn build_daily_journey(
    record: &DailyTimeRecord,
    weekly_hours: u32,
    policy: &JourneyPolicy,
) -> Result<DailyJourneyResult> {
    let expected = if record.is_workday && !record.is_rest_day() {
        expected_daily_minutes(weekly_hours, policy)
    } else {
        0
    };
    let mut result = DailyJourneyResult {
        date: record.date,
        status: record.status,
        worked_minutes: 0,
        expected_minutes: expected,
        overtime50_minutes: 0,
        overtime100_minutes: 0,
        night_shift_minutes: 0,
        missing_minutes: expected,
    };
    if record.status != DayStatus::Complete {
        return Ok(result);
    }
    validate_record(record)?;

    let intervals = worked_intervals(record);
    let worked: i64 = intervals.iter().map(|(a, b)| (*b - *a).num_minutes()).sum();
    let worked = to_minutes(worked, record, "worked minutes")?;
    result.worked_minutes = worked;
    result.night_shift_minutes = to_minutes(night_minutes(&intervals, policy), record, "night minutes")?;
    result.missing_minutes = expected.saturating_sub(worked);

    if record.is_rest_day() {
        result.overtime100_minutes = worked;
    } else if worked > expected {
        let variance = worked - expected;
        result.overtime50_minutes = variance.min(policy.overtime_daily_cap_minutes);
        result.overtime100_minutes = variance - result.overtime50_minutes;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn workday(
        clock_in: NaiveDateTime,
        clock_out: NaiveDateTime,
        brk: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> DailyTimeRecord {
        DailyTimeRecord {
            date: clock_in.date(),
            clock_in: Some(clock_in),
            clock_out: Some(clock_out),
            break_start: brk.map(|b| b.0),
            break_end: brk.map(|b| b.1),
            is_workday: true,
            is_sunday: false,
            is_holiday: false,
            status: DayStatus::Complete,
        }
    }

    #[test]
    fn test_regular_overtime_within_cap() {
        let record = workday(at(4, 8, 0), at(4, 18, 0), Some((at(4, 12, 0), at(4, 13, 0))));
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.worked_minutes, 540);
        assert_eq!(day.expected_minutes, 440);
        assert_eq!(day.overtime50_minutes, 100);
        assert_eq!(day.overtime100_minutes, 0);
        assert_eq!(day.missing_minutes, 0);
        assert_eq!(day.night_shift_minutes, 0);
    }

    #[test]
    fn test_overtime_beyond_cap_splits() {
        let record = workday(at(4, 7, 0), at(4, 19, 30), Some((at(4, 12, 0), at(4, 13, 0))));
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.worked_minutes, 690);
        assert_eq!(day.overtime50_minutes, 120);
        assert_eq!(day.overtime100_minutes, 130);
    }

    #[test]
    fn test_sunday_is_all_overtime100() {
        let mut record = workday(at(3, 8, 0), at(3, 14, 0), None);
        record.is_workday = false;
        record.is_sunday = true;
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.worked_minutes, 360);
        assert_eq!(day.expected_minutes, 0);
        assert_eq!(day.overtime100_minutes, 360);
        assert_eq!(day.overtime50_minutes, 0);
        assert_eq!(day.missing_minutes, 0);
    }

    #[test]
    fn test_holiday_flagged_workday_expects_nothing() {
        let mut record = workday(at(29, 8, 0), at(29, 12, 0), None);
        record.is_holiday = true;
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.expected_minutes, 0);
        assert_eq!(day.missing_minutes, 0);
        assert_eq!(day.overtime100_minutes, 240);
    }

    #[test]
    fn test_absurd_weekly_hours_saturate() {
        let policy = JourneyPolicy::default();
        assert_eq!(expected_daily_minutes(u32::MAX, &policy), u32::MAX / 6);
    }

    #[test]
    fn test_night_shift_crossing_midnight() {
        let record = workday(at(4, 22, 0), at(5, 6, 0), Some((at(5, 2, 0), at(5, 3, 0))));
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.worked_minutes, 420);
        assert_eq!(day.night_shift_minutes, 360);
    }

    #[test]
    fn test_early_morning_night_minutes() {
        let record = workday(at(4, 4, 0), at(4, 13, 0), Some((at(4, 9, 0), at(4, 10, 0))));
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.night_shift_minutes, 60);
    }

    #[test]
    fn test_short_day_reports_missing() {
        let record = workday(at(4, 8, 0), at(4, 12, 0), None);
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.worked_minutes, 240);
        assert_eq!(day.missing_minutes, 200);
        assert_eq!(day.overtime50_minutes + day.overtime100_minutes, 0);
    }

    #[test]
    fn test_incomplete_day_gets_no_overtime() {
        let mut record = workday(at(4, 8, 0), at(4, 20, 0), None);
        record.clock_out = None;
        record.status = DayStatus::Incomplete;
        let day = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap();
        assert_eq!(day.worked_minutes, 0);
        assert_eq!(day.overtime50_minutes, 0);
        assert_eq!(day.missing_minutes, 440);
    }

    #[test]
    fn test_clock_out_before_clock_in_is_integrity_error() {
        let record = workday(at(4, 18, 0), at(4, 8, 0), None);
        let err = build_daily_journey(&record, 44, &JourneyPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
    }

    #[test]
    fn test_break_outside_shift_is_integrity_error() {
        let record = workday(at(4, 8, 0), at(4, 17, 0), Some((at(4, 7, 0), at(4, 7, 30))));
        assert!(validate_record(&record).is_err());
    }
}
