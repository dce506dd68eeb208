//! Monetary valuation of monthly minutes.
//!
//! Converts overtime, night and rest-day reflection into currency using
//! the contract salary.  All money is `rust_decimal::Decimal`; each
//! component is rounded to cents and the total is the sum of the
//! rounded components.

use crate::config::PayPolicy;
use crate::error::{Error, Result};
use crate::models::{EmployeeContract, MonetaryValues, MonthlyJourneyResult, OvertimePolicy};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Minutes in a reduced night hour (52m30s).
const REDUCED_NIGHT_HOUR_MINUTES: Decimal = dec!(52.5);

const HOURS_PER_WEEK: u32 = 168;

#[derive(Debug, Clone)]
pub struct MonetaryValuator {
    policy: PayPolicy,
}

impl MonetaryValuator {
    pub fn new(policy: PayPolicy) -> Self {
        Self { policy }
    }

    /// Salary divided by the contract's monthly hours
    /// (`weekly_hours * weeks_per_month`).
    pub fn hourly_rate(&self, contract: &EmployeeContract) -> Result<Decimal> {
        Ok(self.minute_rate(contract)? * dec!(60))
    }

    fn minute_rate(&self, contract: &EmployeeContract) -> Result<Decimal> {
        if contract.weekly_hours == 0 || contract.weekly_hours > HOURS_PER_WEEK {
            return Err(Error::InvalidInput(format!(
                "contract of {} has {} weekly hours",
                contract.employee_id, contract.weekly_hours
            )));
        }
        if contract.base_salary < Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "contract of {} has a negative salary",
                contract.employee_id
            )));
        }
        let monthly_minutes =
            Decimal::from(contract.weekly_hours) * dec!(60) * self.policy.weeks_per_month;
        Ok(contract.base_salary / monthly_minutes)
    }

    /// Values a month with all overtime paid out.
    pub fn valuate(
        &self,
        monthly: &MonthlyJourneyResult,
        contract: &EmployeeContract,
    ) -> Result<MonetaryValues> {
        self.valuate_with_policy(monthly, contract, OvertimePolicy::Paid)
    }

    /// Values a month.  The DSR reflection divides overtime pay by the
    /// month's scheduled business days (not the days actually worked)
    /// and multiplies by its Sundays and holidays.  Banked overtime goes to the time bank instead of
    /// the payslip, so its overtime and DSR components are zero; the
    /// night premium is always paid.
    pub fn valuate_with_policy(
        &self,
        monthly: &MonthlyJourneyResult,
        contract: &EmployeeContract,
        overtime: OvertimePolicy,
    ) -> Result<MonetaryValues> {
        let rate = self.minute_rate(contract)?;

        let (overtime50_value, overtime100_value) = match overtime {
            OvertimePolicy::Paid => (
                cents(
                    Decimal::from(monthly.total_overtime50_minutes)
                        * rate
                        * self.policy.overtime50_multiplier,
                ),
                cents(
                    Decimal::from(monthly.total_overtime100_minutes)
                        * rate
                        * self.policy.overtime100_multiplier,
                ),
            ),
            OvertimePolicy::Banked => (Decimal::ZERO, Decimal::ZERO),
        };

        let mut night_minutes = Decimal::from(monthly.total_night_shift_minutes);
        if self.policy.reduced_night_hour {
            night_minutes = night_minutes * dec!(60) / REDUCED_NIGHT_HOUR_MINUTES;
        }
        let night_shift_value = cents(night_minutes * rate * self.policy.night_premium_rate);

        let dsr_value = if monthly.business_days == 0 {
            Decimal::ZERO
        } else {
            cents(
                (overtime50_value + overtime100_value) / Decimal::from(monthly.business_days)
                    * Decimal::from(monthly.rest_days),
            )
        };

        Ok(MonetaryValues {
            overtime50_value,
            overtime100_value,
            night_shift_value,
            dsr_value,
            total_earnings: overtime50_value + overtime100_value + night_shift_value + dsr_value,
        })
    }
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
