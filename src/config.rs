//! Policy configuration for the engine.
//!
//! All numeric and calendar policy choices (overtime cap, night window,
//! rest intervals, premiums, time bank cap and expiry, batch limits)
//! live in [`EngineConfig`], which is built once and handed to the
//! engine.  Defaults are the statutory values.

use crate::error::{Error, Result};
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub journey: JourneyPolicy,
    pub compliance: CompliancePolicy,
    pub pay: PayPolicy,
    pub time_bank: TimeBankPolicy,
    pub rollup: RollupPolicy,
}

/// Rules for turning a day of punches into minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JourneyPolicy {
    /// Daily excess paid at 50%; anything beyond is extraordinary overtime.
    pub overtime_daily_cap_minutes: u32,
    /// Weekly hours are spread over this many days.
    pub working_days_per_week: u32,
    pub night_start: NaiveTime,
    pub night_end: NaiveTime,
    /// Punches further than this from the open clock-in start a new day.
    pub max_shift_minutes: u32,
}

impl Default for JourneyPolicy {
    fn default() -> Self {
        Self {
            overtime_daily_cap_minutes: 120,
            working_days_per_week: 6,
            // literal times, cannot fail
            night_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            night_end: NaiveTime::from_hms_opt(5, 0, 0).unwrap(),
            max_shift_minutes: 24 * 60,
        }
    }
}

/// Thresholds used by the violation detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompliancePolicy {
    /// Minimum rest between two shifts (interjornada).
    pub rest_interval_min_hours: u32,
    /// Uninterrupted rest required inside every 7-day window.
    pub weekly_rest_min_hours: u32,
    pub long_shift_threshold_minutes: u32,
    pub long_shift_min_break_minutes: u32,
    pub short_shift_threshold_minutes: u32,
    pub short_shift_min_break_minutes: u32,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            rest_interval_min_hours: 11,
            weekly_rest_min_hours: 24,
            long_shift_threshold_minutes: 6 * 60,
            long_shift_min_break_minutes: 60,
            short_shift_threshold_minutes: 4 * 60,
            short_shift_min_break_minutes: 15,
        }
    }
}

/// Monetary conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayPolicy {
    pub weeks_per_month: Decimal,
    pub overtime50_multiplier: Decimal,
    pub overtime100_multiplier: Decimal,
    /// Additive premium on night minutes, on top of pay already counted.
    pub night_premium_rate: Decimal,
    /// Count each night hour as 52m30s ("hora noturna reduzida") when
    /// valuing the night premium.
    pub reduced_night_hour: bool,
}

impl Default for PayPolicy {
    fn default() -> Self {
        Self {
            weeks_per_month: dec!(4.3333),
            overtime50_multiplier: dec!(1.5),
            overtime100_multiplier: dec!(2.0),
            night_premium_rate: dec!(0.20),
            reduced_night_hour: false,
        }
    }
}

/// Compensatory time ledger limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeBankPolicy {
    pub cap_minutes: u32,
    pub expiration_months: u32,
    pub expiring_soon_days: u32,
    /// Attempts at the conditional upsert before giving up.
    pub max_upsert_retries: u32,
}

impl Default for TimeBankPolicy {
    fn default() -> Self {
        Self {
            cap_minutes: 120 * 60,
            expiration_months: 6,
            expiring_soon_days: 30,
            max_upsert_retries: 5,
        }
    }
}

/// Company batch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupPolicy {
    /// Upper bound on employees computed concurrently.
    pub max_workers: usize,
    pub batch_timeout_secs: u64,
}

impl Default for RollupPolicy {
    fn default() -> Self {
        Self {
            max_workers: 8,
            batch_timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file.  Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `JOURNEY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(v) = env_parse("JOURNEY_OVERTIME_DAILY_CAP_MINUTES")? {
            config.journey.overtime_daily_cap_minutes = v;
        }
        if let Some(v) = env_parse("JOURNEY_REST_INTERVAL_MIN_HOURS")? {
            config.compliance.rest_interval_min_hours = v;
        }
        if let Some(v) = env_parse("JOURNEY_NIGHT_PREMIUM_RATE")? {
            config.pay.night_premium_rate = v;
        }
        if let Some(v) = env_parse("JOURNEY_TIME_BANK_CAP_MINUTES")? {
            config.time_bank.cap_minutes = v;
        }
        if let Some(v) = env_parse("JOURNEY_TIME_BANK_EXPIRATION_MONTHS")? {
            config.time_bank.expiration_months = v;
        }
        if let Some(v) = env_parse("JOURNEY_ROLLUP_MAX_WORKERS")? {
            config.rollup.max_workers = v;
        }
        if let Some(v) = env_parse("JOURNEY_ROLLUP_TIMEOUT_SECS")? {
            config.rollup.batch_timeout_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.journey.working_days_per_week == 0 || self.journey.working_days_per_week > 7 {
            return Err(Error::Config("working_days_per_week must be 1..=7".into()));
        }
        if self.journey.night_start == self.journey.night_end {
            return Err(Error::Config("night window is empty".into()));
        }
        if self.pay.weeks_per_month <= Decimal::ZERO {
            return Err(Error::Config("weeks_per_month must be positive".into()));
        }
        if self.pay.night_premium_rate < Decimal::ZERO {
            return Err(Error::Config("night_premium_rate must not be negative".into()));
        }
        if self.time_bank.expiration_months == 0 {
            return Err(Error::Config("expiration_months must be at least 1".into()));
        }
        if self.rollup.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}"))),
        Err(_) => Ok(None),
    }
}
