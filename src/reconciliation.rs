// ⚖️ Price Reconciliation Engine - Validate API totals
// Recomputes the landed price of each vehicle and compares it with the
// total the API reported.
//
// Following the formula:
//   price_cny * rate[CNY] + recycling + customs + duty_eur * rate[EUR] + excise = total
//
// A mismatch is the output of this system, never an error.

use crate::vehicle::{CurrencyRateTable, VehicleRecord};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

/// Rounding tolerance for the batch run (RUB)
pub const BATCH_TOLERANCE_RUB: f64 = 1.0;

/// Tolerance used by the single-record auditor (RUB). Wider than the batch
/// tolerance; the two are kept separate on purpose.
pub const AUDIT_TOLERANCE_RUB: f64 = 50.0;

pub const DEFAULT_PRICE_CURRENCY: &str = "CNY";
pub const DEFAULT_DUTY_CURRENCY: &str = "EUR";

// ============================================================================
// PRICE BREAKDOWN
// ============================================================================

/// Every term of the total formula for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub price_foreign: f64,
    pub price_rub: f64,
    pub recycling_fee_rub: f64,
    pub customs_fee_rub: f64,
    pub import_duty_foreign: f64,
    pub import_duty_rub: f64,
    pub excise_tax_rub: f64,
    pub calculated_total: f64,
    pub api_total: f64,
    pub difference: f64,
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// Reported total within tolerance of the recomputed one
    Match { breakdown: PriceBreakdown },

    /// Reported total disagrees beyond tolerance
    Mismatch {
        breakdown: PriceBreakdown,
        tolerance: f64,
    },
}

impl ReconciliationResult {
    pub fn is_match(&self) -> bool {
        matches!(self, ReconciliationResult::Match { .. })
    }

    pub fn has_discrepancy(&self) -> bool {
        !self.is_match()
    }

    pub fn breakdown(&self) -> &PriceBreakdown {
        match self {
            ReconciliationResult::Match { breakdown } => breakdown,
            ReconciliationResult::Mismatch { breakdown, .. } => breakdown,
        }
    }

    pub fn difference(&self) -> f64 {
        self.breakdown().difference
    }
}

// ============================================================================
// DISCREPANCY RECORD
// ============================================================================

/// One mismatching vehicle, as written to the discrepancy artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub infoid: String,
    pub carname: String,
    #[serde(serialize_with = "as_reported")]
    pub price_cny: f64,
    pub price_rub: f64,
    #[serde(serialize_with = "as_reported")]
    pub recycling_fee_rub: f64,
    #[serde(serialize_with = "as_reported")]
    pub customs_fee_rub: f64,
    #[serde(serialize_with = "as_reported")]
    pub import_duty_eur: f64,
    pub import_duty_rub: f64,
    #[serde(serialize_with = "as_reported")]
    pub excise_tax_rub: f64,
    pub calculated_total: f64,
    #[serde(serialize_with = "as_reported")]
    pub api_total: f64,
    pub difference: f64,
    pub engine_volume: Option<u32>,
    #[serde(serialize_with = "as_reported")]
    pub power_kw: f64,
    pub year: i32,
    pub age_days: i64,
}

impl Discrepancy {
    /// Derived money values are rounded to kopecks, inputs are kept as reported
    pub fn new(record: &VehicleRecord, breakdown: &PriceBreakdown, today: NaiveDate) -> Self {
        Discrepancy {
            infoid: record.infoid.clone(),
            carname: record.carname.clone(),
            price_cny: record.price_cny,
            price_rub: round2(breakdown.price_rub),
            recycling_fee_rub: record.recycling_fee_rub,
            customs_fee_rub: record.customs_fee_rub,
            import_duty_eur: record.import_duty,
            import_duty_rub: round2(breakdown.import_duty_rub),
            excise_tax_rub: record.excise_tax_rub,
            calculated_total: round2(breakdown.calculated_total),
            api_total: record.total_price_rub,
            difference: round2(breakdown.difference),
            engine_volume: record.engine_volume_ml,
            power_kw: record.power_kw,
            year: record.firstregyear,
            age_days: record.age_days(today),
        }
    }
}

/// Pass-through amounts keep the API's integer form (`100000`, not `100000.0`)
fn as_reported<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

    if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub record_count: usize,
    pub matched: usize,
    /// Mismatches in input order
    pub discrepancies: Vec<Discrepancy>,
    pub tolerance: f64,
    pub run_date: NaiveDate,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn mismatched(&self) -> usize {
        self.discrepancies.len()
    }

    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} of {} records match, {} with discrepancies (tolerance {:.2} RUB)",
            self.matched,
            self.record_count,
            self.mismatched(),
            self.tolerance
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct PriceReconciliationEngine {
    /// Maximum accepted |calculated - reported| in RUB (inclusive)
    pub tolerance: f64,

    /// Currency the listing price is quoted in
    pub price_currency: String,

    /// Currency the import duty is quoted in
    pub duty_currency: String,
}

impl PriceReconciliationEngine {
    /// Engine for the batch run (1 RUB tolerance)
    pub fn new() -> Self {
        Self::with_tolerance(BATCH_TOLERANCE_RUB)
    }

    /// Engine for the single-record auditor (50 RUB tolerance)
    pub fn for_audit() -> Self {
        Self::with_tolerance(AUDIT_TOLERANCE_RUB)
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        PriceReconciliationEngine {
            tolerance,
            price_currency: DEFAULT_PRICE_CURRENCY.to_string(),
            duty_currency: DEFAULT_DUTY_CURRENCY.to_string(),
        }
    }

    pub fn with_currencies(mut self, price: impl Into<String>, duty: impl Into<String>) -> Self {
        self.price_currency = price.into();
        self.duty_currency = duty.into();
        self
    }

    /// Evaluate the total formula for one record
    pub fn compute(
        &self,
        record: &VehicleRecord,
        rates: &CurrencyRateTable,
    ) -> Result<PriceBreakdown> {
        let price_rub = rates.to_rub(record.price_cny, &self.price_currency)?;
        let import_duty_rub = rates.to_rub(record.import_duty, &self.duty_currency)?;

        let calculated_total = price_rub
            + record.recycling_fee_rub
            + record.customs_fee_rub
            + import_duty_rub
            + record.excise_tax_rub;

        let difference = (calculated_total - record.total_price_rub).abs();

        Ok(PriceBreakdown {
            price_foreign: record.price_cny,
            price_rub,
            recycling_fee_rub: record.recycling_fee_rub,
            customs_fee_rub: record.customs_fee_rub,
            import_duty_foreign: record.import_duty,
            import_duty_rub,
            excise_tax_rub: record.excise_tax_rub,
            calculated_total,
            api_total: record.total_price_rub,
            difference,
        })
    }

    /// Match when difference <= tolerance
    pub fn classify(
        &self,
        record: &VehicleRecord,
        rates: &CurrencyRateTable,
    ) -> Result<ReconciliationResult> {
        let breakdown = self.compute(record, rates)?;

        if breakdown.difference <= self.tolerance {
            Ok(ReconciliationResult::Match { breakdown })
        } else {
            Ok(ReconciliationResult::Mismatch {
                breakdown,
                tolerance: self.tolerance,
            })
        }
    }

    /// Reconcile every record; discrepancies keep input order
    pub fn reconcile(
        &self,
        records: &[VehicleRecord],
        rates: &CurrencyRateTable,
        today: NaiveDate,
    ) -> Result<ReconciliationReport> {
        let mut matched = 0;
        let mut discrepancies = Vec::new();

        for record in records {
            match self.classify(record, rates)? {
                ReconciliationResult::Match { .. } => matched += 1,
                ReconciliationResult::Mismatch { breakdown, .. } => {
                    debug!(
                        infoid = %record.infoid,
                        difference = breakdown.difference,
                        "total mismatch"
                    );
                    discrepancies.push(Discrepancy::new(record, &breakdown, today));
                }
            }
        }

        Ok(ReconciliationReport {
            record_count: records.len(),
            matched,
            discrepancies,
            tolerance: self.tolerance,
            run_date: today,
            reconciled_at: Utc::now(),
        })
    }
}

impl Default for PriceReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use std::collections::BTreeMap;

    fn rates() -> CurrencyRateTable {
        let mut rates = BTreeMap::new();
        rates.insert("EUR".to_string(), 90.0);
        rates.insert("CNY".to_string(), 12.5);
        CurrencyRateTable::new(rates)
    }

    fn create_test_record(infoid: &str, excise: f64, total: f64) -> VehicleRecord {
        VehicleRecord {
            infoid: infoid.to_string(),
            carname: format!("Test car {}", infoid),
            price_cny: 100000.0,
            recycling_fee_rub: 5200.0,
            customs_fee_rub: 1231.0,
            import_duty: 500.0,
            excise_tax_rub: excise,
            total_price_rub: total,
            engine_volume_ml: Some(2000),
            power_kw: 100.0,
            firstregyear: 2021,
            firstregshortdate: NaiveDate::from_ymd_opt(2021, 9, 1).unwrap(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    #[test]
    fn test_exact_total_matches() {
        let engine = PriceReconciliationEngine::new();
        // 100000*12.5 + 5200 + 1231 + 500*90 + 0
        let record = create_test_record("1", 0.0, 1_301_431.0);

        let result = engine.classify(&record, &rates()).unwrap();

        assert!(result.is_match());
        assert_eq!(result.difference(), 0.0);
        assert_eq!(result.breakdown().price_rub, 1_250_000.0);
        assert_eq!(result.breakdown().import_duty_rub, 45_000.0);
        assert_eq!(result.breakdown().calculated_total, 1_301_431.0);
    }

    #[test]
    fn test_understated_total_is_discrepancy() {
        let engine = PriceReconciliationEngine::new();
        // excise 500 brings the expected total to 1,301,931
        let record = create_test_record("2", 500.0, 1_300_000.0);

        let report = engine.reconcile(&[record], &rates(), today()).unwrap();

        assert_eq!(report.matched, 0);
        assert_eq!(report.mismatched(), 1);
        let d = &report.discrepancies[0];
        assert_eq!(d.infoid, "2");
        assert_eq!(d.calculated_total, 1_301_931.0);
        assert_eq!(d.api_total, 1_300_000.0);
        assert_eq!(d.difference, 1931.0);
        assert_eq!(d.engine_volume, Some(2000));
        assert_eq!(d.year, 2021);
        assert_eq!(d.age_days, 1461);
    }

    #[test]
    fn test_batch_tolerance_boundary() {
        let engine = PriceReconciliationEngine::new();

        let at_threshold = create_test_record("a", 0.0, 1_301_431.0 - 1.0);
        assert!(engine.classify(&at_threshold, &rates()).unwrap().is_match());

        let past_threshold = create_test_record("b", 0.0, 1_301_431.0 - 1.01);
        assert!(engine
            .classify(&past_threshold, &rates())
            .unwrap()
            .has_discrepancy());
    }

    #[test]
    fn test_audit_tolerance_boundary() {
        let engine = PriceReconciliationEngine::for_audit();

        let at_threshold = create_test_record("a", 0.0, 1_301_431.0 + 50.0);
        assert!(engine.classify(&at_threshold, &rates()).unwrap().is_match());

        let past_threshold = create_test_record("b", 0.0, 1_301_431.0 + 50.5);
        assert!(!engine.classify(&past_threshold, &rates()).unwrap().is_match());

        // Same record fails the batch tolerance
        assert!(!PriceReconciliationEngine::new()
            .classify(&at_threshold, &rates())
            .unwrap()
            .is_match());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let engine = PriceReconciliationEngine::new();
        let record = create_test_record("1", 0.0, 1_300_000.0);

        let first = engine.classify(&record, &rates()).unwrap();
        let second = engine.classify(&record, &rates()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.breakdown().calculated_total, second.breakdown().calculated_total);
    }

    #[test]
    fn test_report_preserves_input_order() {
        let engine = PriceReconciliationEngine::new();
        let records = vec![
            create_test_record("c", 0.0, 1.0),
            create_test_record("ok", 0.0, 1_301_431.0),
            create_test_record("a", 0.0, 2.0),
            create_test_record("b", 0.0, 3.0),
        ];

        let report = engine.reconcile(&records, &rates(), today()).unwrap();
        let ids: Vec<&str> = report.discrepancies.iter().map(|d| d.infoid.as_str()).collect();

        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(report.matched, 1);
        assert_eq!(report.record_count, 4);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_unknown_currency_surfaces() {
        let engine = PriceReconciliationEngine::new().with_currencies("USD", "EUR");
        let record = create_test_record("1", 0.0, 1_301_431.0);

        let err = engine.classify(&record, &rates()).unwrap_err();
        assert!(matches!(err, AuditError::UnknownCurrency(ref c) if c == "USD"));
    }

    #[test]
    fn test_discrepancy_keeps_reported_integers() {
        let mut record = create_test_record("7", 0.0, 1_300_000.0);
        record.power_kw = 110.5;
        let breakdown = PriceReconciliationEngine::new()
            .compute(&record, &rates())
            .unwrap();
        let discrepancy = Discrepancy::new(&record, &breakdown, today());

        let value = serde_json::to_value(&discrepancy).unwrap();
        assert!(value["price_cny"].is_u64());
        assert_eq!(value["price_cny"], serde_json::json!(100000));
        assert_eq!(value["recycling_fee_rub"], serde_json::json!(5200));
        assert_eq!(value["api_total"], serde_json::json!(1300000));
        assert!(value["power_kw"].is_f64());
        assert!(value["calculated_total"].is_f64());

        let text = serde_json::to_string(&discrepancy).unwrap();
        assert!(text.contains(r#""price_cny":100000,"#));

        let back: Discrepancy = serde_json::from_value(value).unwrap();
        assert_eq!(back, discrepancy);
    }

    #[test]
    fn test_discrepancy_rounding() {
        assert_eq!(round2(1234.5678), 1234.57);
        assert_eq!(round2(0.004), 0.0);
    }
}
