//! Punch normalisation.
//!
//! Groups raw punches into one [`DailyTimeRecord`] per calendar day.
//! Punches are attributed to the work-day of the shift they belong to:
//! once a clock-in opens a shift, every following punch up to its
//! clock-out lands on the clock-in date, even past midnight.
//!
//! Per day the first clock-in and the last clock-out are kept.  Break
//! pairs are merged into one span from the earliest break start to
//! the latest break end; the gap between a clock-out and a later
//! clock-in on the same day counts as a break too.

use crate::config::JourneyPolicy;
use crate::error::{Error, Result};
use crate::models::{DailyTimeRecord, DayStatus, PunchKind, TimePunchEvent};
use crate::store::Calendar;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct DayPunches {
    clock_in: Option<NaiveDateTime>,
    clock_out: Option<NaiveDateTime>,
    break_start: Option<NaiveDateTime>,
    break_end: Option<NaiveDateTime>,
    /// A shift opened on this day was never closed.
    dangling: bool,
}

impl DayPunches {
    fn add_break(&mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) {
        if let Some(s) = start {
            self.break_start = Some(self.break_start.map_or(s, |b| b.min(s)));
        }
        if let Some(e) = end {
            self.break_end = Some(self.break_end.map_or(e, |b| b.max(e)));
        }
    }
}

struct OpenShift {
    day: NaiveDate,
    started: NaiveDateTime,
}

/// Builds one record per day in `from..=to` from `punches`.
///
/// `punches` may be in any order and may include punches outside the
/// range (e.g. the evening before `from`, so a shift started there is
/// attributed to that day instead of leaving an orphan clock-out).
pub fn normalize_punches(
    employee_id: &str,
    punches: &[TimePunchEvent],
    from: NaiveDate,
    to: NaiveDate,
    calendar: &dyn Calendar,
    policy: &JourneyPolicy,
) -> Result<Vec<DailyTimeRecord>> {
    if from > to {
        return Err(Error::InvalidInput(format!("empty date range {from}..{to}")));
    }
    if let Some(foreign) = punches.iter().find(|p| p.employee_id != employee_id) {
        return Err(Error::InvalidInput(format!(
            "punch at {} belongs to employee {}, not {}",
            foreign.timestamp, foreign.employee_id, employee_id
        )));
    }

    let mut sorted: Vec<&TimePunchEvent> = punches.iter().collect();
    sorted.sort_by_key(|p| p.timestamp);

    let max_span = Duration::minutes(i64::from(policy.max_shift_minutes));
    let mut days: BTreeMap<NaiveDate, DayPunches> = BTreeMap::new();
    let mut open: Option<OpenShift> = None;

    for punch in sorted {
        let ts = punch.timestamp;
        if let Some(shift) = &open {
            if ts - shift.started > max_span {
                warn!(employee_id, day = %shift.day, "shift never closed, dropping it");
                days.entry(shift.day).or_default().dangling = true;
                open = None;
            }
        }

        match punch.kind {
            PunchKind::ClockIn => {
                let day = ts.date();
                if let Some(shift) = &open {
                    if shift.day == day {
                        debug!(employee_id, %day, at = %ts, "duplicate clock-in ignored");
                        continue;
                    }
                    // a clock-in on a later day starts a new shift; the open one was never closed
                    warn!(employee_id, day = %shift.day, "shift never closed, next day started");
                    days.entry(shift.day).or_default().dangling = true;
                    open = None;
                }
                let entry = days.entry(day).or_default();
                match (entry.clock_in, entry.clock_out) {
                    (Some(_), Some(out)) if out <= ts => {
                        // re-entry after leaving: the time away is a break
                        entry.add_break(Some(out), Some(ts));
                    }
                    (Some(_), _) => {}
                    (None, _) => entry.clock_in = Some(ts),
                }
                open = Some(OpenShift { day, started: ts });
            }
            PunchKind::ClockOut => {
                let day = open.take().map_or(ts.date(), |s| s.day);
                let entry = days.entry(day).or_default();
                entry.clock_out = Some(entry.clock_out.map_or(ts, |o| o.max(ts)));
                entry.dangling = false;
            }
            PunchKind::BreakStart => {
                let day = open.as_ref().map_or(ts.date(), |s| s.day);
                days.entry(day).or_default().add_break(Some(ts), None);
            }
            PunchKind::BreakEnd => {
                let day = open.as_ref().map_or(ts.date(), |s| s.day);
                days.entry(day).or_default().add_break(None, Some(ts));
            }
        }
    }
    if let Some(shift) = open {
        days.entry(shift.day).or_default().dangling = true;
    }

    let mut records = Vec::new();
    let mut date = from;
    while date <= to {
        let mut cal = calendar.day(date);
        // Sundays and holidays are never scheduled, whatever the calendar says
        cal.is_workday = cal.is_workday && !cal.is_sunday && !cal.is_holiday;
        let record = match days.remove(&date) {
            None => DailyTimeRecord {
                date,
                clock_in: None,
                clock_out: None,
                break_start: None,
                break_end: None,
                is_workday: cal.is_workday,
                is_sunday: cal.is_sunday,
                is_holiday: cal.is_holiday,
                status: if cal.is_workday {
                    DayStatus::Absent
                } else {
                    DayStatus::Rest
                },
            },
            Some(mut day) => {
                if day.break_start.is_some() != day.break_end.is_some() {
                    warn!(employee_id, %date, "unpaired break punch ignored");
                    day.break_start = None;
                    day.break_end = None;
                }
                let status = if day.clock_in.is_some() && day.clock_out.is_some() && !day.dangling
                {
                    DayStatus::Complete
                } else {
                    debug!(employee_id, %date, "day has punches but no closed shift");
                    DayStatus::Incomplete
                };
                DailyTimeRecord {
                    date,
                    clock_in: day.clock_in,
                    clock_out: day.clock_out,
                    break_start: day.break_start,
                    break_end: day.break_end,
                    is_workday: cal.is_workday,
                    is_sunday: cal.is_sunday,
                    is_holiday: cal.is_holiday,
                    status,
                }
            }
        };
        records.push(record);
        date += Duration::days(1);
    }
    Ok(records)
}
