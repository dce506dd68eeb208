//! Compliance checks over a month of daily records.
//!
//! Rules need adjacency across days (rest between shifts, weekly rest),
//! so the detector works on the whole ordered sequence.  Days without a
//! closed shift are skipped; days with impossible timestamps produce a
//! `data_integrity` entry and take no further part in the checks.

use crate::config::{CompliancePolicy, JourneyPolicy};
use crate::journey::{break_minutes, build_daily_journey, validate_record};
use crate::models::{
    ComplianceViolation, ComplianceViolations, DailyTimeRecord, DayStatus, Severity, ViolationType,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ViolationDetector {
    journey: JourneyPolicy,
    compliance: CompliancePolicy,
}

fn hm(minutes: i64) -> String {
    format!("{}h{:02}", minutes / 60, minutes % 60)
}

impl ViolationDetector {
    pub fn new(journey: JourneyPolicy, compliance: CompliancePolicy) -> Self {
        Self {
            journey,
            compliance,
        }
    }

    /// Scans `records` (ordered by date).  `granted_rest_days` are the
    /// compensatory rest days given for Sunday or holiday work.
    pub fn detect(
        &self,
        records: &[DailyTimeRecord],
        weekly_hours: u32,
        granted_rest_days: &BTreeSet<NaiveDate>,
    ) -> ComplianceViolations {
        let mut violations = Vec::new();
        let mut shifts: Vec<&DailyTimeRecord> = Vec::new();
        let mut unknown_days: BTreeSet<NaiveDate> = BTreeSet::new();

        for record in records {
            match record.status {
                DayStatus::Complete => {}
                DayStatus::Incomplete => {
                    unknown_days.insert(record.date);
                    continue;
                }
                DayStatus::Absent | DayStatus::Rest => continue,
            }
            if let Err(err) = validate_record(record) {
                violations.push(ComplianceViolation {
                    violation_type: ViolationType::DataIntegrity,
                    date: record.date,
                    severity: Severity::Warning,
                    detail: err.to_string(),
                });
                unknown_days.insert(record.date);
                continue;
            }
            let day = match build_daily_journey(record, weekly_hours, &self.journey) {
                Ok(day) => day,
                Err(err) => {
                    violations.push(ComplianceViolation {
                        violation_type: ViolationType::DataIntegrity,
                        date: record.date,
                        severity: Severity::Warning,
                        detail: err.to_string(),
                    });
                    unknown_days.insert(record.date);
                    continue;
                }
            };
            shifts.push(record);

            let worked = day.worked_minutes;
            let pause = break_minutes(record);
            let c = &self.compliance;
            if worked > c.long_shift_threshold_minutes
                && pause < i64::from(c.long_shift_min_break_minutes)
            {
                violations.push(ComplianceViolation {
                    violation_type: ViolationType::MissingIntrajornadaBreak,
                    date: record.date,
                    severity: Severity::Critical,
                    detail: format!(
                        "worked {} with a break of {} (minimum {})",
                        hm(worked.into()),
                        hm(pause),
                        hm(c.long_shift_min_break_minutes.into())
                    ),
                });
            } else if worked > c.short_shift_threshold_minutes
                && worked <= c.long_shift_threshold_minutes
                && pause < i64::from(c.short_shift_min_break_minutes)
            {
                violations.push(ComplianceViolation {
                    violation_type: ViolationType::ShortIntrajornadaBreak,
                    date: record.date,
                    severity: Severity::Warning,
                    detail: format!(
                        "worked {} with a break of {pause} min (minimum {} min)",
                        hm(worked.into()),
                        c.short_shift_min_break_minutes
                    ),
                });
            }

            if !record.is_rest_day() && day.overtime100_minutes > 0 {
                violations.push(ComplianceViolation {
                    violation_type: ViolationType::ExcessiveDailyOvertime,
                    date: record.date,
                    severity: Severity::Warning,
                    detail: format!(
                        "{} of overtime beyond the daily cap of {}",
                        hm(day.overtime100_minutes.into()),
                        hm(self.journey.overtime_daily_cap_minutes.into())
                    ),
                });
            }

            if record.is_rest_day() && worked > 0 {
                let week = record.date.iso_week();
                if !granted_rest_days.iter().any(|d| d.iso_week() == week) {
                    violations.push(ComplianceViolation {
                        violation_type: ViolationType::RestDayWorkedWithoutCompensation,
                        date: record.date,
                        severity: Severity::Critical,
                        detail: format!(
                            "worked {} on a {} with no compensatory rest in week {}",
                            hm(worked.into()),
                            if record.is_holiday { "holiday" } else { "Sunday" },
                            week.week()
                        ),
                    });
                }
            }
        }

        violations.extend(self.rest_interval_violations(&shifts));
        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            violations.extend(self.weekly_rest_violations(&shifts, &unknown_days, first.date, last.date));
        }

        debug!(count = violations.len(), "violation scan finished");
        ComplianceViolations::from_violations(violations)
    }

    fn rest_interval_violations(&self, shifts: &[&DailyTimeRecord]) -> Vec<ComplianceViolation> {
        let min_rest = Duration::hours(i64::from(self.compliance.rest_interval_min_hours));
        shifts
            .windows(2)
            .filter_map(|pair| {
                let (prev_out, next_in) = (pair[0].clock_out?, pair[1].clock_in?);
                let rest = next_in - prev_out;
                (rest < min_rest).then(|| ComplianceViolation {
                    violation_type: ViolationType::InsufficientRestInterval,
                    date: pair[1].date,
                    severity: Severity::Critical,
                    detail: format!(
                        "rest of {} between {} and {} (minimum {}h)",
                        hm(rest.num_minutes()),
                        prev_out,
                        next_in,
                        self.compliance.rest_interval_min_hours
                    ),
                })
            })
            .collect()
    }

    /// Every 7-day window must contain an uninterrupted rest of the
    /// configured length.  A run of consecutive failing windows is
    /// reported once, at its first window.  Windows touching a day whose
    /// shift is unknown are not judged.
    fn weekly_rest_violations(
        &self,
        shifts: &[&DailyTimeRecord],
        unknown_days: &BTreeSet<NaiveDate>,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Vec<ComplianceViolation> {
        let min_rest = Duration::hours(i64::from(self.compliance.weekly_rest_min_hours));
        let spans: Vec<(NaiveDateTime, NaiveDateTime)> = shifts
            .iter()
            .filter_map(|r| Some((r.clock_in?, r.clock_out?)))
            .collect();

        let mut violations = Vec::new();
        let mut in_run = false;
        let mut start = first;
        while start + Duration::days(6) <= last {
            let end = start + Duration::days(7);
            if unknown_days.range(start..end).next().is_some() {
                in_run = false;
                start += Duration::days(1);
                continue;
            }
            let window = (start.and_hms_opt(0, 0, 0), end.and_hms_opt(0, 0, 0));
            let (Some(ws), Some(we)) = window else {
                break;
            };
            let longest = longest_gap(&spans, ws, we);
            if longest < min_rest {
                if !in_run {
                    violations.push(ComplianceViolation {
                        violation_type: ViolationType::WeeklyRestViolation,
                        date: start,
                        severity: Severity::Critical,
                        detail: format!(
                            "longest rest between {} and {} was {} (minimum {}h)",
                            start,
                            end - Duration::days(1),
                            hm(longest.num_minutes()),
                            self.compliance.weekly_rest_min_hours
                        ),
                    });
                }
                in_run = true;
            } else {
                in_run = false;
            }
            start += Duration::days(1);
        }
        violations
    }
}

/// Longest stretch inside `[ws, we)` not covered by any span.
fn longest_gap(spans: &[(NaiveDateTime, NaiveDateTime)], ws: NaiveDateTime, we: NaiveDateTime) -> Duration {
    let mut clipped: Vec<(NaiveDateTime, NaiveDateTime)> = spans
        .iter()
        .filter(|(a, b)| *b > ws && *a < we)
        .map(|(a, b)| ((*a).max(ws), (*b).min(we)))
        .collect();
    clipped.sort();

    let mut cursor = ws;
    let mut longest = Duration::zero();
    for (a, b) in clipped {
        if a > cursor {
            longest = longest.max(a - cursor);
        }
        cursor = cursor.max(b);
    }
    longest.max(we - cursor)
}
