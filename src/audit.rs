// 🔍 Single-Record Rate-Table Auditor
// Re-derives each government fee of one vehicle from the published tables and
// reports where the API's component values disagree. Component checks are
// diagnostic; only the totals check classifies match / mismatch.

use crate::error::{AuditError, Result};
use crate::rates::{AgeBand, DutyRate, FeeRateTables};
use crate::reconciliation::{PriceReconciliationEngine, ReconciliationResult};
use crate::vehicle::{CurrencyRateTable, VehicleRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::debug;

// ============================================================================
// DUTY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DutyAudit {
    /// Under three years: duty is price based and no per-cc table applies
    Unaudited { age_years: i32, band: AgeBand },

    /// Displacement unknown, nothing to multiply the rate by
    MissingDisplacement { age_years: i32, band: AgeBand },

    /// Raw difference only, no match / mismatch verdict
    Checked {
        age_years: i32,
        band: AgeBand,
        displacement_cc: u32,
        rate: DutyRate,
        expected_eur: f64,
        actual_eur: f64,
        difference_eur: f64,
    },
}

// ============================================================================
// CUSTOMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomsAudit {
    pub price_rub: f64,
    /// Price re-expressed in the duty currency, for context
    pub price_eur: f64,
    pub band_index: usize,
    pub band_up_to_rub: Option<f64>,
    pub expected_rub: f64,
    pub actual_rub: f64,
    /// Exact comparison; customs fees are flat amounts
    pub matches: bool,
    pub difference_rub: f64,
}

// ============================================================================
// RECYCLING FEE
// ============================================================================

/// Engine volume brackets of the recycling fee schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeCategory {
    UpTo1L,
    From1To2L,
    From2To3L,
    From3To3Point5L,
    Over3Point5L,
    Unknown,
}

impl VolumeCategory {
    pub fn from_ml(volume_ml: Option<u32>) -> Self {
        match volume_ml {
            None => VolumeCategory::Unknown,
            Some(ml) if ml < 1000 => VolumeCategory::UpTo1L,
            Some(ml) if ml < 2000 => VolumeCategory::From1To2L,
            Some(ml) if ml < 3000 => VolumeCategory::From2To3L,
            Some(ml) if ml < 3500 => VolumeCategory::From3To3Point5L,
            Some(_) => VolumeCategory::Over3Point5L,
        }
    }
}

impl fmt::Display for VolumeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VolumeCategory::UpTo1L => "up to 1.0 l",
            VolumeCategory::From1To2L => "1.0-2.0 l",
            VolumeCategory::From2To3L => "2.0-3.0 l",
            VolumeCategory::From3To3Point5L => "3.0-3.5 l",
            VolumeCategory::Over3Point5L => "over 3.5 l",
            VolumeCategory::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcessionOutcome {
    Matches,
    /// Fee equals the amount used for vehicles under three years
    AlternateNewVehicle,
    Differs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConcessionCheck {
    NotEligible,
    UnknownDisplacement,
    Eligible {
        expected_rub: f64,
        outcome: ConcessionOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecyclingAudit {
    pub horsepower: f64,
    pub volume_category: VolumeCategory,
    pub actual_rub: f64,
    /// actual fee / base rate
    pub coefficient: f64,
    pub concession: ConcessionCheck,
}

// ============================================================================
// RECORD AUDIT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordAudit {
    pub infoid: String,
    pub carname: String,
    pub run_date: NaiveDate,
    pub age_days: i64,
    pub age_years: i32,
    pub age_years_exact: f64,
    pub duty: DutyAudit,
    pub customs: CustomsAudit,
    pub recycling: RecyclingAudit,
    pub totals: ReconciliationResult,
}

/// Which record of a batch to audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSelector {
    First,
    Index(usize),
    Id(String),
}

pub fn select_record<'a>(
    records: &'a [VehicleRecord],
    selector: &RecordSelector,
) -> Result<&'a VehicleRecord> {
    let found = match selector {
        RecordSelector::First => records.first(),
        RecordSelector::Index(i) => records.get(*i),
        RecordSelector::Id(id) => records.iter().find(|r| &r.infoid == id),
    };

    found.ok_or_else(|| {
        AuditError::RecordNotFound(match selector {
            RecordSelector::First => "batch has no records".to_string(),
            RecordSelector::Index(i) => format!("index {} of {}", i, records.len()),
            RecordSelector::Id(id) => format!("infoid {}", id),
        })
    })
}

pub struct RecordAuditor {
    tables: FeeRateTables,
    engine: PriceReconciliationEngine,
}

impl RecordAuditor {
    /// Auditor with the audit tolerance for the totals check
    pub fn new(tables: FeeRateTables) -> Self {
        RecordAuditor {
            tables,
            engine: PriceReconciliationEngine::for_audit(),
        }
    }

    pub fn with_engine(mut self, engine: PriceReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Expected duty from calendar age and displacement
    pub fn audit_duty(
        &self,
        age_years: i32,
        displacement_cc: Option<u32>,
        actual_eur: f64,
    ) -> Result<DutyAudit> {
        let band = AgeBand::from_years(age_years);
        if band == AgeBand::UnderThree {
            return Ok(DutyAudit::Unaudited { age_years, band });
        }

        let displacement_cc = match displacement_cc {
            Some(cc) => cc,
            None => return Ok(DutyAudit::MissingDisplacement { age_years, band }),
        };

        let rate = match self.tables.duty.lookup(band, displacement_cc)? {
            Some(rate) => rate,
            None => return Ok(DutyAudit::Unaudited { age_years, band }),
        };

        let expected_eur = rate.eur_per_cc * displacement_cc as f64;
        Ok(DutyAudit::Checked {
            age_years,
            band,
            displacement_cc,
            rate,
            expected_eur,
            actual_eur,
            difference_eur: (expected_eur - actual_eur).abs(),
        })
    }

    pub fn audit_customs(&self, price_rub: f64, eur_rate: f64, actual_rub: f64) -> Result<CustomsAudit> {
        let (band_index, band) = self.tables.customs.lookup(price_rub)?;

        Ok(CustomsAudit {
            price_rub,
            price_eur: price_rub / eur_rate,
            band_index,
            band_up_to_rub: band.up_to_rub,
            expected_rub: band.fee_rub,
            actual_rub,
            matches: band.fee_rub == actual_rub,
            difference_rub: (band.fee_rub - actual_rub).abs(),
        })
    }

    pub fn audit_recycling(&self, record: &VehicleRecord) -> RecyclingAudit {
        let rules = &self.tables.recycling;
        let horsepower = record.horsepower();
        let actual_rub = record.recycling_fee_rub;

        let concession = match record.engine_volume_ml {
            None => ConcessionCheck::UnknownDisplacement,
            Some(cc) if rules.is_eligible(cc, horsepower) => {
                let outcome = if actual_rub == rules.concession_fee_rub {
                    ConcessionOutcome::Matches
                } else if actual_rub == rules.new_vehicle_fee_rub {
                    ConcessionOutcome::AlternateNewVehicle
                } else {
                    ConcessionOutcome::Differs
                };
                ConcessionCheck::Eligible {
                    expected_rub: rules.concession_fee_rub,
                    outcome,
                }
            }
            Some(_) => ConcessionCheck::NotEligible,
        };

        RecyclingAudit {
            horsepower,
            volume_category: VolumeCategory::from_ml(record.engine_volume_ml),
            actual_rub,
            coefficient: actual_rub / rules.base_rate_rub,
            concession,
        }
    }

    /// Full audit: three component checks plus the totals check
    pub fn audit(
        &self,
        record: &VehicleRecord,
        rates: &CurrencyRateTable,
        today: NaiveDate,
    ) -> Result<RecordAudit> {
        let age_years = record.age_years(today);

        let duty = self.audit_duty(age_years, record.engine_volume_ml, record.import_duty)?;

        let totals = self.engine.classify(record, rates)?;
        let eur_rate = rates.rate(&self.engine.duty_currency)?;
        let customs = self.audit_customs(
            totals.breakdown().price_rub,
            eur_rate,
            record.customs_fee_rub,
        )?;

        let recycling = self.audit_recycling(record);

        debug!(
            infoid = %record.infoid,
            customs_ok = customs.matches,
            totals_ok = totals.is_match(),
            "record audited"
        );

        Ok(RecordAudit {
            infoid: record.infoid.clone(),
            carname: record.carname.clone(),
            run_date: today,
            age_days: record.age_days(today),
            age_years,
            age_years_exact: record.age_years_exact(today),
            duty,
            customs,
            recycling,
            totals,
        })
    }
}

impl Default for RecordAuditor {
    fn default() -> Self {
        Self::new(FeeRateTables::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
