//! Per-employee reports and company-wide rollups.
//!
//! A rollup keeps one outcome per employee.  A failed employee carries
//! the error kind and message instead of a report; it never aborts the
//! batch and never contributes to the totals.

use crate::error::{Error, ErrorKind};
use crate::models::{
    ComplianceViolations, MonetaryValues, MonthlyJourneyResult, Severity, TimeBankLedgerEntry,
    YearMonth,
};
use crate::time_bank::AccrualLot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything computed for one employee-month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeMonthReport {
    pub employee_id: String,
    pub monthly: MonthlyJourneyResult,
    pub monetary: MonetaryValues,
    pub time_bank: TimeBankLedgerEntry,
    /// Banked minutes about to be forfeited.
    pub expiring_soon: Vec<AccrualLot>,
    pub violations: ComplianceViolations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for EmployeeFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeOutcome {
    pub employee_id: String,
    pub result: Result<EmployeeMonthReport, EmployeeFailure>,
}

impl EmployeeOutcome {
    pub fn report(&self) -> Option<&EmployeeMonthReport> {
        self.result.as_ref().ok()
    }
}

/// Company-wide sums over the successful employees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupTotals {
    pub employees: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_worked_minutes: u64,
    pub total_overtime50_minutes: u64,
    pub total_overtime100_minutes: u64,
    pub total_night_shift_minutes: u64,
    pub overtime50_value: Decimal,
    pub overtime100_value: Decimal,
    pub night_shift_value: Decimal,
    pub dsr_value: Decimal,
    pub total_earnings: Decimal,
    pub time_bank_balance_minutes: u64,
    pub total_violations: usize,
    pub critical_violations: usize,
}

impl RollupTotals {
    fn add(&mut self, report: &EmployeeMonthReport) {
        let m = &report.monthly;
        self.total_worked_minutes += u64::from(m.total_worked_minutes);
        self.total_overtime50_minutes += u64::from(m.total_overtime50_minutes);
        self.total_overtime100_minutes += u64::from(m.total_overtime100_minutes);
        self.total_night_shift_minutes += u64::from(m.total_night_shift_minutes);

        let v = &report.monetary;
        self.overtime50_value += v.overtime50_value;
        self.overtime100_value += v.overtime100_value;
        self.night_shift_value += v.night_shift_value;
        self.dsr_value += v.dsr_value;
        self.total_earnings += v.total_earnings;

        self.time_bank_balance_minutes += u64::from(report.time_bank.balance_minutes);
        self.total_violations += report.violations.total_violations;
        self.critical_violations += report
            .violations
            .violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRollup {
    pub company_id: String,
    pub period: YearMonth,
    /// Ordered by employee id.
    pub outcomes: Vec<EmployeeOutcome>,
    pub totals: RollupTotals,
    /// Employees with at least one critical violation.
    pub critical_employees: Vec<String>,
}

impl CompanyRollup {
    pub fn from_outcomes(company_id: &str, period: YearMonth, mut outcomes: Vec<EmployeeOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
        let mut totals = RollupTotals {
            employees: outcomes.len(),
            ..Default::default()
        };
        let mut critical_employees = Vec::new();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) => {
                    totals.succeeded += 1;
                    totals.add(report);
                    if report.violations.has_critical_violations {
                        critical_employees.push(outcome.employee_id.clone());
                    }
                }
                Err(_) => totals.failed += 1,
            }
        }
        Self {
            company_id: company_id.to_string(),
            period,
            outcomes,
            totals,
            critical_employees,
        }
    }

    /// Reports of employees with critical violations, for alerting.
    pub fn critical_reports(&self) -> Vec<&EmployeeMonthReport> {
        self.outcomes
            .iter()
            .filter_map(EmployeeOutcome::report)
            .filter(|r| r.violations.has_critical_violations)
            .collect()
    }

    pub fn failures(&self) -> Vec<(&str, &EmployeeFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|f| (o.employee_id.as_str(), f)))
            .collect()
    }
}
