// 🚗 Vehicle Records + Currency Rates
// Records are read-only once decoded from a batch. Field names follow the
// upstream JSON payload so the same struct works for both directions.

use crate::error::{AuditError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Power conversion used by the recycling fee rules (metric horsepower)
pub const HP_PER_KW: f64 = 1.36;

/// Average year length used for fractional ages
pub const DAYS_PER_YEAR: f64 = 365.25;

// ============================================================================
// VEHICLE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Listing identifier (numeric or string upstream, kept as text)
    #[serde(deserialize_with = "deserialize_lenient_id")]
    pub infoid: String,

    pub carname: String,

    /// Listing price in CNY
    pub price_cny: f64,

    pub recycling_fee_rub: f64,

    pub customs_fee_rub: f64,

    /// Import duty in EUR (converted at reconciliation time)
    pub import_duty: f64,

    pub excise_tax_rub: f64,

    /// Authoritative total reported by the API - the value under test
    pub total_price_rub: f64,

    /// Engine displacement in cc (ml), null for unknown / electric
    #[serde(default)]
    pub engine_volume_ml: Option<u32>,

    pub power_kw: f64,

    #[serde(deserialize_with = "deserialize_lenient_year")]
    pub firstregyear: i32,

    /// Exact first registration date (YYYY-MM-DD)
    pub firstregshortdate: NaiveDate,
}

impl VehicleRecord {
    /// Whole days between first registration and the run date
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.firstregshortdate).num_days()
    }

    /// Fractional age in years, days / 365.25
    pub fn age_years_exact(&self, today: NaiveDate) -> f64 {
        self.age_days(today) as f64 / DAYS_PER_YEAR
    }

    /// Calendar age used by the duty tables: current year minus registration year
    pub fn age_years(&self, today: NaiveDate) -> i32 {
        today.year() - self.firstregyear
    }

    pub fn horsepower(&self) -> f64 {
        self.power_kw * HP_PER_KW
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientId {
    Number(i64),
    Text(String),
}

fn deserialize_lenient_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientId::deserialize(deserializer)? {
        LenientId::Number(n) => n.to_string(),
        LenientId::Text(s) => s,
    })
}

// Upstream sends the year either as 2022 or "2022"
fn deserialize_lenient_year<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    match LenientId::deserialize(deserializer)? {
        LenientId::Number(n) => i32::try_from(n).map_err(serde::de::Error::custom),
        LenientId::Text(s) => s.trim().parse::<i32>().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// CURRENCY RATE TABLE
// ============================================================================

/// Exchange rates into RUB, fixed for a whole run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyRateTable {
    rates: BTreeMap<String, f64>,
    /// Zero, negative or non-finite entries; an error only once a formula asks for them
    #[serde(skip)]
    rejected: BTreeMap<String, f64>,
}

impl CurrencyRateTable {
    pub fn new(rates: BTreeMap<String, f64>) -> Self {
        let (rates, rejected): (BTreeMap<_, _>, BTreeMap<_, _>) = rates
            .into_iter()
            .partition(|(_, rate)| rate.is_finite() && *rate > 0.0);

        for (currency, rate) in &rejected {
            warn!(%currency, rate, "ignoring unusable exchange rate");
        }
        CurrencyRateTable { rates, rejected }
    }

    pub fn rate(&self, currency: &str) -> Result<f64> {
        if let Some(rate) = self.rates.get(currency) {
            return Ok(*rate);
        }
        match self.rejected.get(currency) {
            Some(rate) => Err(AuditError::InvalidRate {
                currency: currency.to_string(),
                rate: *rate,
            }),
            None => Err(AuditError::UnknownCurrency(currency.to_string())),
        }
    }

    /// Convert an amount denominated in `currency` into RUB
    pub fn to_rub(&self, amount: f64, currency: &str) -> Result<f64> {
        Ok(amount * self.rate(currency)?)
    }

    pub fn currencies(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(code, rate)| (code.as_str(), *rate))
    }
}

// ============================================================================
// TESTS
// ============================================================================
