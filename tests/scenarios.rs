//! End-to-end scenarios through the engine with in-memory stores.

use chrono::{NaiveDate, NaiveDateTime};
use journey_engine::config::EngineConfig;
use journey_engine::engine::{BatchControl, JourneyEngine};
use journey_engine::error::ErrorKind;
use journey_engine::models::{
    DailyJourneyResult, EmployeeContract, MonthContext, OvertimePolicy, PunchKind, Severity,
    TimePunchEvent, ViolationType, YearMonth,
};
use journey_engine::rollup::EmployeeMonthReport;
use journey_engine::store::{Holiday, HolidayCalendar, InMemoryContractStore, InMemoryPunchStore};
use journey_engine::time_bank::{EmployeeTimeBank, InMemoryLedgerStore, LedgerStore};
use journey_engine::Error;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::Arc;

use PunchKind::{BreakEnd, BreakStart, ClockIn, ClockOut};

fn march() -> YearMonth {
    YearMonth::new(2024, 3).unwrap()
}

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

struct Fixture {
    punches: Arc<InMemoryPunchStore>,
    contracts: Arc<InMemoryContractStore>,
    engine: JourneyEngine,
}

impl Fixture {
    fn new() -> Self {
        Self::with(HolidayCalendar::default(), Arc::new(InMemoryLedgerStore::new()))
    }

    fn with(calendar: HolidayCalendar, ledger: Arc<dyn LedgerStore>) -> Self {
        let punches = Arc::new(InMemoryPunchStore::new());
        let contracts = Arc::new(InMemoryContractStore::new());
        let engine = JourneyEngine::new(
            EngineConfig::default(),
            punches.clone(),
            contracts.clone(),
            Arc::new(calendar),
            ledger,
        )
        .unwrap();
        Self {
            punches,
            contracts,
            engine,
        }
    }

    fn hire(&self, employee_id: &str) {
        self.contracts.insert(EmployeeContract {
            employee_id: employee_id.into(),
            company_id: "acme".into(),
            base_salary: dec!(3000.00),
            weekly_hours: 44,
            hire_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            termination_date: None,
        });
    }

    fn punch(&self, employee_id: &str, timestamp: NaiveDateTime, kind: PunchKind) {
        self.punches.record(TimePunchEvent {
            employee_id: employee_id.into(),
            timestamp,
            kind,
            source: "terminal".into(),
            location: None,
        });
    }

    fn run(&self, employee_id: &str) -> EmployeeMonthReport {
        self.engine
            .compute_employee_month(employee_id, &MonthContext::new(march()))
            .unwrap()
    }
}

fn day(report: &EmployeeMonthReport, d: u32) -> &DailyJourneyResult {
    let date = NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
    report
        .monthly
        .days
        .iter()
        .find(|day| day.date == date)
        .unwrap()
}

#[test]
fn test_workday_with_overtime_under_the_cap() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.punch("e1", at(4, 8, 0), ClockIn);
    fx.punch("e1", at(4, 12, 0), BreakStart);
    fx.punch("e1", at(4, 13, 0), BreakEnd);
    fx.punch("e1", at(4, 18, 0), ClockOut);

    let report = fx.run("e1");
    let monday = day(&report, 4);
    assert_eq!(monday.worked_minutes, 540);
    assert_eq!(monday.expected_minutes, 440);
    assert_eq!(monday.overtime50_minutes, 100);
    assert_eq!(monday.overtime100_minutes, 0);
}

#[test]
fn test_workday_with_overtime_past_the_cap() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.punch("e1", at(4, 7, 0), ClockIn);
    fx.punch("e1", at(4, 12, 0), BreakStart);
    fx.punch("e1", at(4, 13, 0), BreakEnd);
    fx.punch("e1", at(4, 19, 30), ClockOut);

    let report = fx.run("e1");
    let monday = day(&report, 4);
    assert_eq!(monday.worked_minutes, 690);
    assert_eq!(monday.overtime50_minutes, 120);
    assert_eq!(monday.overtime100_minutes, 130);
    assert_eq!(
        report
            .violations
            .count_of(ViolationType::ExcessiveDailyOvertime),
        1
    );
}

#[test]
fn test_sunday_work_without_compensation() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.punch("e1", at(3, 8, 0), ClockIn);
    fx.punch("e1", at(3, 14, 0), ClockOut);

    let report = fx.run("e1");
    let sunday = day(&report, 3);
    assert_eq!(sunday.worked_minutes, 360);
    assert_eq!(sunday.overtime100_minutes, 360);
    assert_eq!(sunday.overtime50_minutes, 0);
    let rest_day = report
        .violations
        .violations
        .iter()
        .find(|v| v.violation_type == ViolationType::RestDayWorkedWithoutCompensation)
        .unwrap();
    assert_eq!(rest_day.severity, Severity::Critical);

    // a compensatory rest day in the same week clears it
    let mut ctx = MonthContext::new(march());
    ctx.granted_rest_days = vec![NaiveDate::from_ymd_opt(2024, 2, 28).unwrap()];
    let report = fx.engine.compute_employee_month("e1", &ctx).unwrap();
    assert_eq!(
        report
            .violations
            .count_of(ViolationType::RestDayWorkedWithoutCompensation),
        0
    );
}

#[test]
fn test_night_shift_crossing_midnight() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.punch("e1", at(4, 22, 0), ClockIn);
    fx.punch("e1", at(5, 2, 0), BreakStart);
    fx.punch("e1", at(5, 3, 0), BreakEnd);
    fx.punch("e1", at(5, 6, 0), ClockOut);

    let report = fx.run("e1");
    let shift = day(&report, 4);
    assert_eq!(shift.worked_minutes, 420);
    assert_eq!(shift.night_shift_minutes, 360);
    // the clock-out belongs to the shift, not to the 5th
    assert_eq!(day(&report, 5).worked_minutes, 0);
    assert_eq!(report.monthly.total_night_shift_minutes, 360);
}

#[test]
fn test_short_rest_between_shifts_is_critical() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.punch("e1", at(4, 12, 0), ClockIn);
    fx.punch("e1", at(4, 16, 0), BreakStart);
    fx.punch("e1", at(4, 17, 0), BreakEnd);
    fx.punch("e1", at(4, 21, 0), ClockOut);
    fx.punch("e1", at(5, 6, 0), ClockIn);
    fx.punch("e1", at(5, 10, 0), BreakStart);
    fx.punch("e1", at(5, 11, 0), BreakEnd);
    fx.punch("e1", at(5, 15, 0), ClockOut);

    let report = fx.run("e1");
    let rest = report
        .violations
        .violations
        .iter()
        .find(|v| v.violation_type == ViolationType::InsufficientRestInterval)
        .unwrap();
    assert_eq!(rest.severity, Severity::Critical);
    assert_eq!(rest.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    assert!(report.violations.has_critical_violations);
}

#[test]
fn test_banked_overtime_balance() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.punch("e1", at(4, 8, 0), ClockIn);
    fx.punch("e1", at(4, 12, 0), BreakStart);
    fx.punch("e1", at(4, 13, 0), BreakEnd);
    fx.punch("e1", at(4, 18, 0), ClockOut);

    let mut ctx = MonthContext::new(march());
    ctx.overtime_policy = OvertimePolicy::Banked;
    let report = fx.engine.compute_employee_month("e1", &ctx).unwrap();
    assert_eq!(report.time_bank.opening_balance_minutes, 0);
    assert_eq!(report.time_bank.accrued_minutes, 100);
    assert_eq!(report.time_bank.compensated_minutes, 0);
    assert_eq!(report.time_bank.expired_minutes, 0);
    assert_eq!(report.time_bank.balance_minutes, 100);
    assert!(report.expiring_soon.is_empty());

    // the lot expires on 2024-09-01 and shows up within 30 days of it
    let soon = fx
        .engine
        .time_bank()
        .expiring_soon("e1", NaiveDate::from_ymd_opt(2024, 8, 15).unwrap())
        .unwrap();
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].remaining_minutes, 100);
}

#[test]
fn test_missing_contract_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .engine
        .compute_employee_month("ghost", &MonthContext::new(march()))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_rollup_reports_each_employee() {
    let fx = Fixture::new();
    fx.hire("e1");
    fx.hire("e2");
    fx.punch("e2", at(4, 12, 0), ClockIn);
    fx.punch("e2", at(4, 21, 0), ClockOut);
    fx.punch("e2", at(5, 6, 0), ClockIn);
    fx.punch("e2", at(5, 15, 0), ClockOut);
    // a contract for another company is not part of the batch
    fx.contracts.insert(EmployeeContract {
        employee_id: "other".into(),
        company_id: "globex".into(),
        base_salary: dec!(2000),
        weekly_hours: 40,
        hire_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        termination_date: None,
    });

    let rollup = fx
        .engine
        .run_company_rollup("acme", &MonthContext::new(march()), &BatchControl::new())
        .unwrap();
    assert_eq!(rollup.totals.employees, 2);
    assert_eq!(rollup.totals.succeeded, 2);
    assert_eq!(rollup.critical_employees, vec!["e2"]);

    let ids = vec!["e1".to_string(), "ghost".to_string(), "e2".to_string()];
    let rollup = fx
        .engine
        .run_rollup_for("acme", &ids, &MonthContext::new(march()), &BatchControl::new());
    assert_eq!(rollup.totals.succeeded, 2);
    let failures = rollup.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "ghost");
    assert_eq!(failures[0].1.kind, ErrorKind::NotFound);
}

#[test]
fn test_weekday_holiday_work() {
    // Good Friday 2024 falls on the 29th
    let mut calendar = HolidayCalendar::default();
    calendar.add_holiday(Holiday {
        date: NaiveDate::from_ymd_opt(2024, 3, 29).unwrap(),
        name: "Sexta-feira Santa".into(),
        recurring: false,
    });
    let fx = Fixture::with(calendar, Arc::new(InMemoryLedgerStore::new()));
    fx.hire("e1");
    fx.punch("e1", at(29, 8, 0), ClockIn);
    fx.punch("e1", at(29, 12, 0), ClockOut);

    let report = fx.run("e1");
    let holiday = day(&report, 29);
    assert_eq!(holiday.worked_minutes, 240);
    assert_eq!(holiday.expected_minutes, 0);
    assert_eq!(holiday.missing_minutes, 0);
    assert_eq!(holiday.overtime100_minutes, 240);
    assert_eq!(holiday.overtime50_minutes, 0);

    let rest_day = report
        .violations
        .violations
        .iter()
        .find(|v| v.violation_type == ViolationType::RestDayWorkedWithoutCompensation)
        .unwrap();
    assert_eq!(rest_day.date, NaiveDate::from_ymd_opt(2024, 3, 29).unwrap());
    assert_eq!(rest_day.severity, Severity::Critical);

    // 26 Mon-Sat days minus the holiday; 5 Sundays plus the holiday
    assert_eq!(report.monthly.business_days, 25);
    assert_eq!(report.monthly.rest_days, 6);
    let overtime = report.monetary.overtime50_value + report.monetary.overtime100_value;
    assert!(overtime > Decimal::ZERO);
    assert_eq!(
        report.monetary.dsr_value,
        (overtime / Decimal::from(25u32) * Decimal::from(6u32))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    );
}

/// Ledger whose saves fail for one employee.
struct BrokenLedger {
    inner: InMemoryLedgerStore,
    broken: &'static str,
}

impl LedgerStore for BrokenLedger {
    fn load(&self, employee_id: &str) -> journey_engine::Result<Option<EmployeeTimeBank>> {
        self.inner.load(employee_id)
    }

    fn save(&self, bank: &EmployeeTimeBank, expected_version: u64) -> journey_engine::Result<bool> {
        if bank.employee_id == self.broken {
            return Err(Error::Persistence("ledger unavailable".into()));
        }
        self.inner.save(bank, expected_version)
    }
}

#[test]
fn test_rollup_records_ledger_failure_and_continues() {
    let ledger = Arc::new(BrokenLedger {
        inner: InMemoryLedgerStore::new(),
        broken: "e2",
    });
    let fx = Fixture::with(HolidayCalendar::default(), ledger);
    fx.hire("e1");
    fx.hire("e2");
    fx.hire("e3");
    fx.punch("e2", at(4, 8, 0), ClockIn);
    fx.punch("e2", at(4, 17, 0), ClockOut);

    let rollup = fx
        .engine
        .run_company_rollup("acme", &MonthContext::new(march()), &BatchControl::new())
        .unwrap();
    assert_eq!(rollup.totals.employees, 3);
    assert_eq!(rollup.totals.succeeded, 2);
    assert_eq!(rollup.totals.failed, 1);
    let failures = rollup.failures();
    assert_eq!(failures[0].0, "e2");
    assert_eq!(failures[0].1.kind, ErrorKind::Persistence);
    assert!(rollup.outcomes[0].report().is_some());
    assert!(rollup.outcomes[2].report().is_some());
}
