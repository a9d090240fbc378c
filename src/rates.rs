// 📐 Fee Rate Tables - Rates as Data
// Three published schedules used to re-derive government fees:
//   duty      : (age band x displacement tier) -> EUR per cc
//   customs   : price bracket                  -> flat RUB fee
//   recycling : concessional flat fee for small, low-power engines
//
// Defaults are the published tables; a JSON file can override them.

use crate::error::{AuditError, Result};
use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// AGE BANDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    /// No per-cc table applies (duty is price based), not audited
    UnderThree,
    ThreeToFive,
    OverFive,
}

impl AgeBand {
    pub fn from_years(age_years: i32) -> Self {
        if age_years < 3 {
            AgeBand::UnderThree
        } else if age_years < 5 {
            AgeBand::ThreeToFive
        } else {
            AgeBand::OverFive
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgeBand::UnderThree => write!(f, "under 3 years"),
            AgeBand::ThreeToFive => write!(f, "3 to 5 years"),
            AgeBand::OverFive => write!(f, "over 5 years"),
        }
    }
}

// ============================================================================
// DUTY TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacementTier {
    /// Exclusive upper bound in cc, None for the open top tier
    pub below_cc: Option<u32>,
    pub eur_per_cc: f64,
}

impl DisplacementTier {
    fn new(below_cc: Option<u32>, eur_per_cc: f64) -> Self {
        DisplacementTier {
            below_cc,
            eur_per_cc,
        }
    }

    fn contains(&self, cc: u32) -> bool {
        self.below_cc.map_or(true, |limit| cc < limit)
    }
}

/// Tier selected for a given displacement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DutyRate {
    pub tier_index: usize,
    pub lower_cc: u32,
    pub below_cc: Option<u32>,
    pub eur_per_cc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyTable {
    pub three_to_five: Vec<DisplacementTier>,
    pub over_five: Vec<DisplacementTier>,
}

impl Default for DutyTable {
    fn default() -> Self {
        let bounds = [Some(1000), Some(1500), Some(1800), Some(2300), Some(3000), None];
        let three_to_five = [1.5, 1.7, 2.5, 2.7, 3.0, 3.6];
        let over_five = [3.0, 3.2, 3.5, 4.8, 5.0, 5.7];

        DutyTable {
            three_to_five: bounds
                .iter()
                .zip(three_to_five)
                .map(|(b, r)| DisplacementTier::new(*b, r))
                .collect(),
            over_five: bounds
                .iter()
                .zip(over_five)
                .map(|(b, r)| DisplacementTier::new(*b, r))
                .collect(),
        }
    }
}

impl DutyTable {
    pub fn tiers(&self, band: AgeBand) -> Option<&[DisplacementTier]> {
        match band {
            AgeBand::UnderThree => None,
            AgeBand::ThreeToFive => Some(&self.three_to_five),
            AgeBand::OverFive => Some(&self.over_five),
        }
    }

    /// Rate for `cc` within `band`; `Ok(None)` for the unaudited under-3 band
    pub fn lookup(&self, band: AgeBand, cc: u32) -> Result<Option<DutyRate>> {
        let tiers = match self.tiers(band) {
            Some(tiers) => tiers,
            None => return Ok(None),
        };

        let mut lower_cc = 0;
        for (tier_index, tier) in tiers.iter().enumerate() {
            if tier.contains(cc) {
                return Ok(Some(DutyRate {
                    tier_index,
                    lower_cc,
                    below_cc: tier.below_cc,
                    eur_per_cc: tier.eur_per_cc,
                }));
            }
            lower_cc = tier.below_cc.unwrap_or(lower_cc);
        }

        Err(AuditError::InvalidRateTable {
            table: "duty",
            message: format!("no tier covers {} cc in band '{}'", cc, band),
        })
    }

    fn validate(&self) -> Result<()> {
        validate_tiers("3-5 years", &self.three_to_five)?;
        validate_tiers("over 5 years", &self.over_five)
    }
}

// NaN fails too
fn is_positive(value: f64) -> bool {
    value > 0.0
}

fn validate_tiers(label: &str, tiers: &[DisplacementTier]) -> Result<()> {
    let invalid = |message: String| AuditError::InvalidRateTable {
        table: "duty",
        message: format!("{}: {}", label, message),
    };

    if tiers.is_empty() {
        return Err(invalid("no tiers".to_string()));
    }

    let mut previous = 0;
    for (i, tier) in tiers.iter().enumerate() {
        if !is_positive(tier.eur_per_cc) {
            return Err(invalid(format!("tier {} has non-positive rate", i)));
        }
        let is_last = i + 1 == tiers.len();
        match (tier.below_cc, is_last) {
            (None, true) => {}
            (None, false) => return Err(invalid(format!("tier {} is unbounded but not last", i))),
            (Some(_), true) => return Err(invalid("top tier must be unbounded".to_string())),
            (Some(limit), false) => {
                if limit <= previous {
                    return Err(invalid(format!("tier {} bound {} is not ascending", i, limit)));
                }
                previous = limit;
            }
        }
    }
    Ok(())
}

// ============================================================================
// CUSTOMS TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomsBand {
    /// Inclusive upper price bound in RUB, None for the open top band
    pub up_to_rub: Option<f64>,
    pub fee_rub: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomsTable {
    pub bands: Vec<CustomsBand>,
}

impl Default for CustomsTable {
    fn default() -> Self {
        let bands = [
            (Some(200_000.0), 1231.0),
            (Some(450_000.0), 2462.0),
            (Some(1_200_000.0), 4924.0),
            (Some(2_700_000.0), 13541.0),
            (Some(4_200_000.0), 18465.0),
            (Some(5_500_000.0), 21344.0),
            (Some(10_000_000.0), 49240.0),
            (None, 73860.0),
        ];

        CustomsTable {
            bands: bands
                .iter()
                .map(|(up_to_rub, fee_rub)| CustomsBand {
                    up_to_rub: *up_to_rub,
                    fee_rub: *fee_rub,
                })
                .collect(),
        }
    }
}

impl CustomsTable {
    /// First band whose upper bound is >= price
    pub fn lookup(&self, price_rub: f64) -> Result<(usize, &CustomsBand)> {
        self.bands
            .iter()
            .enumerate()
            .find(|(_, band)| band.up_to_rub.map_or(true, |limit| price_rub <= limit))
            .ok_or_else(|| AuditError::InvalidRateTable {
                table: "customs",
                message: format!("no band covers price {:.2}", price_rub),
            })
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: String| AuditError::InvalidRateTable {
            table: "customs",
            message,
        };

        if self.bands.is_empty() {
            return Err(invalid("no bands".to_string()));
        }

        let mut previous_limit = f64::NEG_INFINITY;
        let mut previous_fee = 0.0;
        for (i, band) in self.bands.iter().enumerate() {
            let is_last = i + 1 == self.bands.len();
            match (band.up_to_rub, is_last) {
                (None, true) => {}
                (None, false) => return Err(invalid(format!("band {} is unbounded but not last", i))),
                (Some(_), true) => return Err(invalid("top band must be unbounded".to_string())),
                (Some(limit), false) => {
                    if limit <= previous_limit {
                        return Err(invalid(format!("band {} bound {} is not ascending", i, limit)));
                    }
                    previous_limit = limit;
                }
            }
            if band.fee_rub < previous_fee {
                return Err(invalid(format!("band {} fee decreases", i)));
            }
            previous_fee = band.fee_rub;
        }
        Ok(())
    }
}

// ============================================================================
// RECYCLING FEE CONCESSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecyclingConcession {
    pub max_displacement_cc: u32,
    pub max_horsepower: f64,
    /// Expected fee for an eligible private import
    pub concession_fee_rub: f64,
    /// Fee seen for eligible vehicles younger than three years
    pub new_vehicle_fee_rub: f64,
    /// Base rate for passenger cars; fee / base gives the applied coefficient
    pub base_rate_rub: f64,
}

impl Default for RecyclingConcession {
    fn default() -> Self {
        RecyclingConcession {
            max_displacement_cc: 3000,
            max_horsepower: 160.0,
            concession_fee_rub: 5200.0,
            new_vehicle_fee_rub: 3400.0,
            base_rate_rub: 20000.0,
        }
    }
}

impl RecyclingConcession {
    pub fn is_eligible(&self, displacement_cc: u32, horsepower: f64) -> bool {
        displacement_cc <= self.max_displacement_cc && horsepower <= self.max_horsepower
    }

    fn validate(&self) -> Result<()> {
        if !is_positive(self.base_rate_rub) || !is_positive(self.max_horsepower) {
            return Err(AuditError::InvalidRateTable {
                table: "recycling",
                message: "base rate and horsepower limit must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// FEE RATE TABLES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeRateTables {
    pub duty: DutyTable,
    pub customs: CustomsTable,
    pub recycling: RecyclingConcession,
}

impl FeeRateTables {
    /// Load tables from a JSON file; omitted sections keep the published defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rate tables file: {:?}", path.as_ref()))?;

        let tables: FeeRateTables =
            serde_json::from_str(&content).context("Failed to parse rate tables JSON")?;
        tables.validate()?;

        Ok(tables)
    }

    /// Bands must be ascending, non-overlapping and end in an open band
    pub fn validate(&self) -> Result<()> {
        self.duty.validate()?;
        self.customs.validate()?;
        self.recycling.validate()
    }
}

// ============================================================================
// TESTS
// ============================================================================
