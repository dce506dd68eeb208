//! Data models for the Journey Engine.
//!
//! The `models` module defines the serialisable structs and enums
//! flowing through the engine: raw punches as recorded by attendance
//! capture, the per-day records and journeys derived from them, the
//! monthly totals, the monetary breakdown, the time bank ledger entry
//! and the compliance violations.  Apart from the ledger entry, every
//! derived type here is recomputed from punches, contract and calendar
//! on each request and never treated as a source of truth.

use crate::error::Error;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month, e.g. `2024-03`.
///
/// Serialised as the `YYYY-MM` string so it can be used as a JSON map
/// key and as a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, Error> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(Error::InvalidInput(format!("invalid month {year}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // `new` and `of` only build months chrono can represent
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day() - Duration::days(1)
    }

    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    pub fn prev(&self) -> Self {
        self.add_months(-1)
    }

    /// Shifts the month by `n` (may be negative).
    pub fn add_months(&self, n: i32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) + n;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Number of whole months from `self` to `other` (negative if `other` is earlier).
    pub fn months_until(&self, other: YearMonth) -> i32 {
        (other.year * 12 + other.month as i32) - (self.year * 12 + self.month as i32)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("expected YYYY-MM, got {s:?}")))?;
        let year = year
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid year in {s:?}")))?;
        let month = month
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid month in {s:?}")))?;
        YearMonth::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// The kind of an attendance punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchKind {
    ClockIn,
    ClockOut,
    BreakStart,
    BreakEnd,
}

/// A raw attendance punch.  Immutable once recorded; owned by the
/// attendance capture system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePunchEvent {
    pub employee_id: String,
    /// Local wall-clock time of the punch.
    pub timestamp: NaiveDateTime,
    pub kind: PunchKind,
    /// Where the punch came from (terminal id, `"mobile"`, `"manual"`, ...).
    pub source: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// What the calendar says about a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_workday: bool,
    pub is_sunday: bool,
    pub is_holiday: bool,
}

/// Attendance outcome of a single work-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// Clock-in and clock-out are both present.
    Complete,
    /// Some punches exist but the shift has no clock-in or no clock-out.
    /// No overtime or compliance checks are attempted for the day.
    Incomplete,
    /// Scheduled workday without any punch.
    Absent,
    /// Day off (Sunday, holiday or unscheduled) without any punch.
    Rest,
}

/// One work-day reconstructed from punches.
///
/// Punches of a shift crossing midnight belong to the day the shift
/// started, so `clock_out` (and the break) may fall on the next
/// calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTimeRecord {
    pub date: NaiveDate,
    pub clock_in: Option<NaiveDateTime>,
    pub clock_out: Option<NaiveDateTime>,
    pub break_start: Option<NaiveDateTime>,
    pub break_end: Option<NaiveDateTime>,
    pub is_workday: bool,
    pub is_sunday: bool,
    pub is_holiday: bool,
    pub status: DayStatus,
}

impl DailyTimeRecord {
    /// Sundays and holidays are paid rest days.
    pub fn is_rest_day(&self) -> bool {
        self.is_sunday || self.is_holiday
    }
}

/// Minute breakdown of one work-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyJourneyResult {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub worked_minutes: u32,
    pub expected_minutes: u32,
    /// Overtime paid at 50%: the first part of the daily excess, up to the daily cap.
    pub overtime50_minutes: u32,
    /// Overtime paid at 100%: excess beyond the daily cap, or any work on a rest day.
    pub overtime100_minutes: u32,
    pub night_shift_minutes: u32,
    pub missing_minutes: u32,
}

/// Monthly totals for one employee, with the per-day detail kept for
/// drill-down.  Every `total_*` equals the sum of the matching field
/// over `days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyJourneyResult {
    pub employee_id: String,
    pub year: i32,
    pub month: u32,
    pub days: Vec<DailyJourneyResult>,
    pub total_worked_minutes: u32,
    pub total_expected_minutes: u32,
    pub total_overtime50_minutes: u32,
    pub total_overtime100_minutes: u32,
    pub total_night_shift_minutes: u32,
    pub total_missing_minutes: u32,
    /// Scheduled workdays in the month according to the calendar,
    /// whether or not the employee worked them.  This is the DSR divisor.
    pub business_days: u32,
    /// Sundays and holidays in the month.
    pub rest_days: u32,
    pub incomplete_days: u32,
    pub absent_days: u32,
    /// Days left out of the totals because their punches were inconsistent.
    pub excluded_days: Vec<NaiveDate>,
}

impl MonthlyJourneyResult {
    pub fn period(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }

    pub fn total_overtime_minutes(&self) -> u32 {
        self.total_overtime50_minutes + self.total_overtime100_minutes
    }
}

/// Employment contract attributes supplied by the HR system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeContract {
    pub employee_id: String,
    pub company_id: String,
    /// Monthly base salary.
    pub base_salary: Decimal,
    /// Contracted weekly hours (44 is the statutory maximum).
    pub weekly_hours: u32,
    pub hire_date: NaiveDate,
    #[serde(default)]
    pub termination_date: Option<NaiveDate>,
}

impl EmployeeContract {
    /// Whether the contract covers at least one day of `period`.
    pub fn is_active_in(&self, period: YearMonth) -> bool {
        self.hire_date <= period.last_day()
            && self
                .termination_date
                .map_or(true, |end| end >= period.first_day())
    }
}

/// Additional earnings derived from a month of attendance.  This is
/// the delta on top of the base salary, not gross pay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryValues {
    pub overtime50_value: Decimal,
    pub overtime100_value: Decimal,
    pub night_shift_value: Decimal,
    /// Overtime reflected onto paid weekly rest days (DSR):
    /// overtime pay / `business_days` * `rest_days` of the month.
    pub dsr_value: Decimal,
    pub total_earnings: Decimal,
}

/// Whether a month's overtime is paid out or converted into compensatory time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OvertimePolicy {
    #[default]
    Paid,
    Banked,
}

/// Time bank position of one employee at the end of one month.
///
/// `balance_minutes = opening_balance_minutes + accrued_minutes
///  - compensated_minutes - expired_minutes`, always within `[0, cap]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBankLedgerEntry {
    pub employee_id: String,
    pub month: YearMonth,
    pub opening_balance_minutes: u32,
    pub accrued_minutes: u32,
    /// Accrual refused because the balance would have exceeded the cap.
    pub rejected_minutes: u32,
    pub compensated_minutes: u32,
    /// Compensation requested beyond the available balance.
    pub compensation_shortfall_minutes: u32,
    pub expired_minutes: u32,
    pub balance_minutes: u32,
}

/// Kinds of statutory rule breaches detected in a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    InsufficientRestInterval,
    MissingIntrajornadaBreak,
    ShortIntrajornadaBreak,
    ExcessiveDailyOvertime,
    RestDayWorkedWithoutCompensation,
    WeeklyRestViolation,
    DataIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceViolation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub date: NaiveDate,
    pub severity: Severity,
    pub detail: String,
}

/// All violations found for one employee-month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceViolations {
    pub violations: Vec<ComplianceViolation>,
    pub total_violations: usize,
    pub has_critical_violations: bool,
}

impl ComplianceViolations {
    /// Sorts the violations by date and type and fills in the summary fields.
    pub fn from_violations(mut violations: Vec<ComplianceViolation>) -> Self {
        violations.sort_by(|a, b| {
            (a.date, a.violation_type, &a.detail).cmp(&(b.date, b.violation_type, &b.detail))
        });
        let has_critical_violations = violations.iter().any(|v| v.severity == Severity::Critical);
        Self {
            total_violations: violations.len(),
            has_critical_violations,
            violations,
        }
    }

    pub fn count_of(&self, violation_type: ViolationType) -> usize {
        self.violations
            .iter()
            .filter(|v| v.violation_type == violation_type)
            .count()
    }
}

/// Per-request context for computing one employee-month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthContext {
    pub period: YearMonth,
    #[serde(default)]
    pub overtime_policy: OvertimePolicy,
    /// Compensatory time off taken this month, drawn from the time bank.
    #[serde(default)]
    pub compensated_minutes: u32,
    /// Days granted as compensatory rest for Sunday/holiday work.
    #[serde(default)]
    pub granted_rest_days: Vec<NaiveDate>,
    /// Reference date for "expiring soon" look-ahead; defaults to the
    /// last day of `period`.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

impl MonthContext {
    pub fn new(period: YearMonth) -> Self {
        Self {
            period,
            overtime_policy: OvertimePolicy::Paid,
            compensated_minutes: 0,
            granted_rest_days: Vec::new(),
            as_of: None,
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| self.period.last_day())
    }
}
