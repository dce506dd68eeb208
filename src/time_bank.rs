//! Compensatory time ledger ("banco de horas").
//!
//! The only accumulated state the engine owns.  For each employee the
//! ledger stores the per-month movements (minutes designated for
//! banking, minutes taken as time off) and derives everything else by
//! replaying them in month order:
//!
//! - accruals become dated lots that expire after the configured number
//!   of months;
//! - time off consumes the oldest unexpired lots first;
//! - the balance never exceeds the cap; accrual beyond it is rejected
//!   and reported on the entry.
//!
//! Recording a month replaces that month's movement and replays the
//! ledger, so running the same month twice never double-accrues, and a
//! revised month flows into every later month's balance.  Writes go
//! through a version-checked save and are retried on conflict.

use crate::config::TimeBankPolicy;
use crate::error::{Error, Result};
use crate::models::{TimeBankLedgerEntry, YearMonth};
use chrono::{Duration, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Minutes moved into and out of the bank in one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthMovement {
    /// Overtime designated for banking.
    pub accrual_minutes: u32,
    /// Time off taken against the bank.
    pub compensation_minutes: u32,
}

/// Minutes banked in one month and what is left of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualLot {
    pub accrued_in: YearMonth,
    pub minutes: u32,
    pub remaining_minutes: u32,
    /// First day on which the remaining minutes are forfeited.
    pub expires_on: NaiveDate,
}

/// Persisted time bank of one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTimeBank {
    pub employee_id: String,
    /// Bumped on every save; 0 means never stored.
    pub version: u64,
    pub movements: BTreeMap<YearMonth, MonthMovement>,
    pub entries: BTreeMap<YearMonth, TimeBankLedgerEntry>,
    pub lots: Vec<AccrualLot>,
}

impl EmployeeTimeBank {
    pub fn new(employee_id: &str) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            version: 0,
            movements: BTreeMap::new(),
            entries: BTreeMap::new(),
            lots: Vec::new(),
        }
    }

    /// Rebuilds entries and lots from the movements.
    pub fn replay(&mut self, policy: &TimeBankPolicy) {
        let mut lots: Vec<AccrualLot> = Vec::new();
        let mut entries = BTreeMap::new();
        let mut balance: u32 = 0;

        for (&month, movement) in &self.movements {
            let opening = balance;

            let mut expired = 0;
            for lot in lots.iter_mut() {
                if lot.remaining_minutes > 0 && lot.expires_on <= month.first_day() {
                    expired += lot.remaining_minutes;
                    lot.remaining_minutes = 0;
                }
            }

            let available: u32 = lots.iter().map(|l| l.remaining_minutes).sum();
            let compensated = movement.compensation_minutes.min(available);
            let mut to_take = compensated;
            for lot in lots.iter_mut() {
                if to_take == 0 {
                    break;
                }
                let taken = lot.remaining_minutes.min(to_take);
                lot.remaining_minutes -= taken;
                to_take -= taken;
            }

            let after_debits = opening - expired - compensated;
            let room = policy.cap_minutes.saturating_sub(after_debits);
            let accrued = movement.accrual_minutes.min(room);
            if accrued > 0 {
                lots.push(AccrualLot {
                    accrued_in: month,
                    minutes: accrued,
                    remaining_minutes: accrued,
                    expires_on: month
                        .add_months(policy.expiration_months as i32)
                        .first_day(),
                });
            }
            balance = after_debits + accrued;

            entries.insert(
                month,
                TimeBankLedgerEntry {
                    employee_id: self.employee_id.clone(),
                    month,
                    opening_balance_minutes: opening,
                    accrued_minutes: accrued,
                    rejected_minutes: movement.accrual_minutes - accrued,
                    compensated_minutes: compensated,
                    compensation_shortfall_minutes: movement.compensation_minutes - compensated,
                    expired_minutes: expired,
                    balance_minutes: balance,
                },
            );
        }

        self.entries = entries;
        self.lots = lots;
    }

    /// Lots with minutes left that expire after `as_of` but within `days`.
    pub fn expiring_within(&self, as_of: NaiveDate, days: u32) -> Vec<AccrualLot> {
        let horizon = as_of + Duration::days(i64::from(days));
        self.lots
            .iter()
            .filter(|l| l.remaining_minutes > 0 && l.expires_on > as_of && l.expires_on <= horizon)
            .cloned()
            .collect()
    }
}

/// Storage for employee time banks.
///
/// `save` is a conditional upsert: it must store `bank` only if the
/// currently stored version equals `expected_version` (0 when nothing
/// is stored yet) and report `false` otherwise.
pub trait LedgerStore: Send + Sync {
    fn load(&self, employee_id: &str) -> Result<Option<EmployeeTimeBank>>;
    fn save(&self, bank: &EmployeeTimeBank, expected_version: u64) -> Result<bool>;
}

/// In-memory ledger store.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    banks: Mutex<HashMap<String, EmployeeTimeBank>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self, employee_id: &str) -> Result<Option<EmployeeTimeBank>> {
        Ok(self.banks.lock().get(employee_id).cloned())
    }

    fn save(&self, bank: &EmployeeTimeBank, expected_version: u64) -> Result<bool> {
        let mut banks = self.banks.lock();
        let current = banks.get(&bank.employee_id).map_or(0, |b| b.version);
        if current != expected_version {
            return Ok(false);
        }
        banks.insert(bank.employee_id.clone(), bank.clone());
        Ok(true)
    }
}

/// Time bank service over a [`LedgerStore`].
#[derive(Clone)]
pub struct TimeBank {
    policy: TimeBankPolicy,
    store: Arc<dyn LedgerStore>,
}

impl TimeBank {
    pub fn new(policy: TimeBankPolicy, store: Arc<dyn LedgerStore>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &TimeBankPolicy {
        &self.policy
    }

    fn load_or_new(&self, employee_id: &str) -> Result<EmployeeTimeBank> {
        Ok(self
            .store
            .load(employee_id)
            .map_err(persistence)?
            .unwrap_or_else(|| EmployeeTimeBank::new(employee_id)))
    }

    /// Records `movement` for `(employee_id, month)` and returns the
    /// month's ledger entry.  Idempotent: recording the same movement
    /// again leaves the ledger untouched.
    pub fn record_month(
        &self,
        employee_id: &str,
        month: YearMonth,
        movement: MonthMovement,
    ) -> Result<TimeBankLedgerEntry> {
        let attempts = self.policy.max_upsert_retries.max(1);
        for attempt in 1..=attempts {
            let mut bank = self.load_or_new(employee_id)?;
            if bank.movements.get(&month) == Some(&movement) {
                if let Some(entry) = bank.entries.get(&month) {
                    debug!(employee_id, %month, "time bank month unchanged");
                    return Ok(entry.clone());
                }
            }

            let expected_version = bank.version;
            bank.movements.insert(month, movement);
            bank.replay(&self.policy);
            bank.version += 1;

            if self.store.save(&bank, expected_version).map_err(persistence)? {
                let entry = bank.entries.get(&month).cloned().ok_or_else(|| {
                    Error::Persistence(format!("entry for {month} missing after replay"))
                })?;
                if entry.rejected_minutes > 0 {
                    warn!(
                        employee_id,
                        %month,
                        rejected = entry.rejected_minutes,
                        "time bank cap reached, accrual truncated"
                    );
                }
                if entry.compensation_shortfall_minutes > 0 {
                    warn!(
                        employee_id,
                        %month,
                        shortfall = entry.compensation_shortfall_minutes,
                        "time off exceeds time bank balance"
                    );
                }
                return Ok(entry);
            }
            debug!(employee_id, %month, attempt, "time bank version conflict, retrying");
        }
        Err(Error::Persistence(format!(
            "time bank of {employee_id} kept changing during update of {month}"
        )))
    }

    pub fn entry(&self, employee_id: &str, month: YearMonth) -> Result<Option<TimeBankLedgerEntry>> {
        Ok(self
            .store
            .load(employee_id)
            .map_err(persistence)?
            .and_then(|bank| bank.entries.get(&month).cloned()))
    }

    /// All entries of an employee in month order.
    pub fn entries(&self, employee_id: &str) -> Result<Vec<TimeBankLedgerEntry>> {
        Ok(self
            .store
            .load(employee_id)
            .map_err(persistence)?
            .map(|bank| bank.entries.into_values().collect())
            .unwrap_or_default())
    }

    /// Lots expiring within the configured horizon after `as_of`.
    pub fn expiring_soon(&self, employee_id: &str, as_of: NaiveDate) -> Result<Vec<AccrualLot>> {
        Ok(self
            .store
            .load(employee_id)
            .map_err(persistence)?
            .map(|bank| bank.expiring_within(as_of, self.policy.expiring_soon_days))
            .unwrap_or_default())
    }
}

/// Store failures surface as persistence errors whatever their origin.
fn persistence(err: Error) -> Error {
    match err {
        Error::Persistence(_) => err,
        other => Error::Persistence(other.to_string()),
    }
}
