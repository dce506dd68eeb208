//! Monthly aggregation.
//!
//! Sums daily journeys into a [`MonthlyJourneyResult`].  No business
//! rule lives here beyond addition; days whose punches fail the
//! integrity check are left out of the totals and listed in
//! `excluded_days`.

use crate::config::JourneyPolicy;
use crate::error::Error;
use crate::journey::build_daily_journey;
use crate::models::{
    CalendarDay, DailyJourneyResult, DailyTimeRecord, DayStatus, MonthlyJourneyResult, YearMonth,
};
use crate::store::Calendar;
use chrono::{Duration, NaiveDate};
use tracing::warn;

/// Builds the month for `employee_id` from its daily records.
/// Records outside `period` are ignored; business and rest day counts
/// cover the whole month according to `calendar`.
pub fn aggregate_month(
    employee_id: &str,
    period: YearMonth,
    records: &[DailyTimeRecord],
    weekly_hours: u32,
    policy: &JourneyPolicy,
    calendar: &dyn Calendar,
) -> MonthlyJourneyResult {
    let mut days = Vec::new();
    let mut excluded_days = Vec::new();

    for record in records.iter().filter(|r| period.contains(r.date)) {
        match build_daily_journey(record, weekly_hours, policy) {
            Ok(day) => days.push(day),
            Err(Error::DataIntegrity { date, detail }) => {
                warn!(employee_id, %date, %detail, "day excluded from monthly totals");
                excluded_days.push(date);
            }
            Err(err) => {
                warn!(employee_id, date = %record.date, error = %err, "day excluded from monthly totals");
                excluded_days.push(record.date);
            }
        }
    }

    let mut month = sum_days(employee_id, period, days);
    month.business_days = count_business_days(period.first_day(), period.last_day(), calendar);
    month.rest_days = count_sundays_and_holidays(period.first_day(), period.last_day(), calendar);
    month.excluded_days = excluded_days;
    month
}

/// Pure summation of daily results.
pub fn sum_days(
    employee_id: &str,
    period: YearMonth,
    days: Vec<DailyJourneyResult>,
) -> MonthlyJourneyResult {
    let sum = |f: fn(&DailyJourneyResult) -> u32| days.iter().map(f).sum::<u32>();
    let count = |status: DayStatus| days.iter().filter(|d| d.status == status).count() as u32;
    MonthlyJourneyResult {
        employee_id: employee_id.to_string(),
        year: period.year,
        month: period.month,
        total_worked_minutes: sum(|d| d.worked_minutes),
        total_expected_minutes: sum(|d| d.expected_minutes),
        total_overtime50_minutes: sum(|d| d.overtime50_minutes),
        total_overtime100_minutes: sum(|d| d.overtime100_minutes),
        total_night_shift_minutes: sum(|d| d.night_shift_minutes),
        total_missing_minutes: sum(|d| d.missing_minutes),
        business_days: 0,
        rest_days: 0,
        incomplete_days: count(DayStatus::Incomplete),
        absent_days: count(DayStatus::Absent),
        excluded_days: Vec::new(),
        days,
    }
}

/// Number of Sundays and holidays in `start..=end`.
pub fn count_sundays_and_holidays(start: NaiveDate, end: NaiveDate, calendar: &dyn Calendar) -> u32 {
    count_days(start, end, calendar, |day| day.is_sunday || day.is_holiday)
}

/// Number of scheduled workdays in `start..=end`.
pub fn count_business_days(start: NaiveDate, end: NaiveDate, calendar: &dyn Calendar) -> u32 {
    count_days(start, end, calendar, |day| day.is_workday)
}

fn count_days(
    start: NaiveDate,
    end: NaiveDate,
    calendar: &dyn Calendar,
    pred: impl Fn(&CalendarDay) -> bool,
) -> u32 {
    let mut count = 0;
    let mut date = start;
    while date <= end {
        if pred(&calendar.day(date)) {
            count += 1;
        }
        date += Duration::days(1);
    }
    count
}
