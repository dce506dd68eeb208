//! Collaborator traits and in-memory implementations.
//!
//! The engine never fetches data itself; it is handed a punch store, a
//! contract store and a calendar.  Production deployments implement
//! these traits over their own data stores.  The in-memory versions
//! here back the HTTP server (loaded from a directory of JSON files)
//! and the tests.
//!
//! Implementations must be thread‑safe (`Send + Sync`) because the
//! company rollup calls them from several worker threads at once.

use crate::error::{Error, Result};
use crate::models::{CalendarDay, EmployeeContract, TimePunchEvent, YearMonth};
use anyhow::Context;
use chrono::{Datelike, NaiveDate, Weekday};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Source of raw attendance punches.
pub trait PunchStore: Send + Sync {
    /// Punches of `employee_id` whose timestamp falls on a date in
    /// `from..=to`, ordered by timestamp.
    fn punches(&self, employee_id: &str, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<TimePunchEvent>>;
}

/// Source of employment contracts.
pub trait ContractStore: Send + Sync {
    /// Fails with [`Error::NotFound`] when the employee has no contract.
    fn contract(&self, employee_id: &str) -> Result<EmployeeContract>;

    /// Employees of `company_id` whose contract covers part of `period`.
    fn active_employees(&self, company_id: &str, period: YearMonth) -> Result<Vec<String>>;
}

/// Calendar and holiday lookup.
pub trait Calendar: Send + Sync {
    fn day(&self, date: NaiveDate) -> CalendarDay;
}

/// In-memory punch store.
#[derive(Debug, Default)]
pub struct InMemoryPunchStore {
    punches: RwLock<HashMap<String, Vec<TimePunchEvent>>>,
}

impl InMemoryPunchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, punch: TimePunchEvent) {
        let mut punches = self.punches.write();
        let list = punches.entry(punch.employee_id.clone()).or_default();
        list.push(punch);
        list.sort_by_key(|p| p.timestamp);
    }

    pub fn extend(&self, punches: impl IntoIterator<Item = TimePunchEvent>) {
        for punch in punches {
            self.record(punch);
        }
    }
}

impl PunchStore for InMemoryPunchStore {
    fn punches(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimePunchEvent>> {
        Ok(self
            .punches
            .read()
            .get(employee_id)
            .map(|list| {
                list.iter()
                    .filter(|p| (from..=to).contains(&p.timestamp.date()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory contract store.
#[derive(Debug, Default)]
pub struct InMemoryContractStore {
    contracts: RwLock<HashMap<String, EmployeeContract>>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contract: EmployeeContract) {
        self.contracts
            .write()
            .insert(contract.employee_id.clone(), contract);
    }
}

impl ContractStore for InMemoryContractStore {
    fn contract(&self, employee_id: &str) -> Result<EmployeeContract> {
        self.contracts
            .read()
            .get(employee_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("contract for employee {employee_id}")))
    }

    fn active_employees(&self, company_id: &str, period: YearMonth) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .contracts
            .read()
            .values()
            .filter(|c| c.company_id == company_id && c.is_active_in(period))
            .map(|c| c.employee_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// A holiday entry as stored in `holidays.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    /// If true, repeats every year on the same month and day.
    #[serde(default)]
    pub recurring: bool,
}

/// Calendar with a fixed weekly schedule and a holiday list.
#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    holidays: BTreeMap<NaiveDate, String>,
    recurring: BTreeSet<(u32, u32)>,
    scheduled: BTreeSet<u32>,
}

impl Default for HolidayCalendar {
    /// Monday to Saturday scheduled, no holidays.
    fn default() -> Self {
        Self::with_schedule([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
        ])
    }
}

impl HolidayCalendar {
    pub fn with_schedule(weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        Self {
            holidays: BTreeMap::new(),
            recurring: BTreeSet::new(),
            scheduled: weekdays
                .into_iter()
                .map(|d| d.num_days_from_monday())
                .collect(),
        }
    }

    pub fn add_holiday(&mut self, holiday: Holiday) {
        if holiday.recurring {
            self.recurring
                .insert((holiday.date.month(), holiday.date.day()));
        }
        self.holidays.insert(holiday.date, holiday.name);
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date) || self.recurring.contains(&(date.month(), date.day()))
    }
}

impl Calendar for HolidayCalendar {
    fn day(&self, date: NaiveDate) -> CalendarDay {
        let is_sunday = date.weekday() == Weekday::Sun;
        let is_holiday = self.is_holiday(date);
        let scheduled = self
            .scheduled
            .contains(&date.weekday().num_days_from_monday());
        CalendarDay {
            date,
            is_workday: scheduled && !is_sunday && !is_holiday,
            is_sunday,
            is_holiday,
        }
    }
}

/// Stores loaded from a data directory.
#[derive(Debug)]
pub struct Dataset {
    pub punches: InMemoryPunchStore,
    pub contracts: InMemoryContractStore,
    pub calendar: HolidayCalendar,
}

/// Load `punches.json`, `contracts.json` and `holidays.json` from a
/// directory.  Missing files are treated as empty; malformed files are
/// an error.
pub fn load_dataset_from_dir(path: &Path) -> anyhow::Result<Dataset> {
    let punches = InMemoryPunchStore::new();
    punches.extend(read_json_list::<TimePunchEvent>(&path.join("punches.json"))?);

    let contracts = InMemoryContractStore::new();
    for contract in read_json_list::<EmployeeContract>(&path.join("contracts.json"))? {
        contracts.insert(contract);
    }

    let mut calendar = HolidayCalendar::default();
    for holiday in read_json_list::<Holiday>(&path.join("holidays.json"))? {
        calendar.add_holiday(holiday);
    }

    tracing::info!(dir = %path.display(), "dataset loaded");
    Ok(Dataset {
        punches,
        contracts,
        calendar,
    })
}

fn read_json_list<T: serde::de::DeserializeOwned>(file: &Path) -> anyhow::Result<Vec<T>> {
    if !file.is_file() {
        tracing::warn!(file = %file.display(), "data file missing, using empty list");
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PunchKind;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_calendar_flags() {
        let mut calendar = HolidayCalendar::default();
        calendar.add_holiday(Holiday {
            date: date(2020, 12, 25),
            name: "Natal".into(),
            recurring: true,
        });
        let sunday = calendar.day(date(2024, 3, 3));
        assert!(sunday.is_sunday && !sunday.is_workday);
        let saturday = calendar.day(date(2024, 3, 2));
        assert!(saturday.is_workday);
        let christmas = calendar.day(date(2024, 12, 25));
        assert!(christmas.is_holiday && !christmas.is_workday);
    }

    #[test]
    fn test_punch_store_filters_range() {
        let store = InMemoryPunchStore::new();
        for (d, h) in [(1, 8), (2, 8), (5, 8)] {
            store.record(TimePunchEvent {
                employee_id: "e1".into(),
                timestamp: date(2024, 3, d).and_hms_opt(h, 0, 0).unwrap(),
                kind: PunchKind::ClockIn,
                source: "terminal".into(),
                location: None,
            });
        }
        let found = store.punches("e1", date(2024, 3, 2), date(2024, 3, 5)).unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.punches("e2", date(2024, 3, 1), date(2024, 3, 31)).unwrap().is_empty());
    }

    #[test]
    fn test_contract_store_not_found() {
        let store = InMemoryContractStore::new();
        store.insert(EmployeeContract {
            employee_id: "e1".into(),
            company_id: "acme".into(),
            base_salary: Decimal::new(250000, 2),
            weekly_hours: 44,
            hire_date: date(2023, 1, 1),
            termination_date: None,
        });
        assert!(matches!(store.contract("nobody"), Err(Error::NotFound(_))));
        let period = YearMonth::new(2024, 3).unwrap();
        assert_eq!(store.active_employees("acme", period).unwrap(), vec!["e1"]);
        assert!(store.active_employees("other", period).unwrap().is_empty());
    }
}
