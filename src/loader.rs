// 📥 Batch Loader & Merger
// Best-effort merge of pre-fetched API responses:
//   missing / unsuccessful / unparseable batch  -> skipped, recorded in LoadReport
//   bad record inside a successful batch        -> fatal (MalformedRecord)
//   rate-source batch not loaded                -> fatal (UndefinedRateTable)

use crate::error::{AuditError, Result};
use crate::vehicle::{CurrencyRateTable, VehicleRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

const SUCCESS_STATUS: &str = "success";

// ============================================================================
// RAW INPUT
// ============================================================================

/// What a batch source produced before any parsing
#[derive(Debug, Clone, PartialEq)]
pub enum BatchContent {
    Missing,
    Unreadable(String),
    Json(String),
}

#[derive(Debug, Clone)]
pub struct RawBatch {
    pub id: String,
    pub content: BatchContent,
}

impl RawBatch {
    pub fn json(id: impl Into<String>, text: impl Into<String>) -> Self {
        RawBatch {
            id: id.into(),
            content: BatchContent::Json(text.into()),
        }
    }

    pub fn missing(id: impl Into<String>) -> Self {
        RawBatch {
            id: id.into(),
            content: BatchContent::Missing,
        }
    }

    /// Read `dir/name`; a file that does not exist becomes `Missing`
    pub fn read(dir: &Path, name: &str) -> Self {
        let path = dir.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(text) => BatchContent::Json(text),
            Err(e) if e.kind() == ErrorKind::NotFound => BatchContent::Missing,
            Err(e) => BatchContent::Unreadable(e.to_string()),
        };
        RawBatch {
            id: name.to_string(),
            content,
        }
    }
}

#[derive(Deserialize)]
struct BatchEnvelope {
    #[serde(default)]
    status: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BatchData {
    cars: Vec<serde_json::Value>,
    /// Only the rate-source batch's rates are decoded
    #[serde(default)]
    rates: Option<serde_json::Value>,
}

// ============================================================================
// LOAD REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingInput,
    UnsuccessfulBatch { status: String },
    UnparseableBatch { message: String },
    UnreadableBatch { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingInput => write!(f, "missing"),
            SkipReason::UnsuccessfulBatch { status } => write!(f, "status '{}'", status),
            SkipReason::UnparseableBatch { message } => write!(f, "unparseable: {}", message),
            SkipReason::UnreadableBatch { message } => write!(f, "unreadable: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedBatch {
    pub id: String,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBatch {
    pub id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<LoadedBatch>,
    pub skipped: Vec<SkippedBatch>,
}

/// Outcome of a merge: records in source order plus the single rate table
#[derive(Debug, Clone)]
pub struct MergedBatches {
    pub records: Vec<VehicleRecord>,
    pub rates: CurrencyRateTable,
    pub report: LoadReport,
}

// ============================================================================
// BATCH LOADER
// ============================================================================

pub struct BatchLoader {
    /// Batch whose `rates` are used for the whole run
    rate_source: String,
}

impl BatchLoader {
    pub fn new(rate_source: impl Into<String>) -> Self {
        BatchLoader {
            rate_source: rate_source.into(),
        }
    }

    /// Read every named batch from `dir` and merge them
    pub fn load_dir(&self, dir: &Path, names: &[String]) -> Result<MergedBatches> {
        let batches = names.iter().map(|name| RawBatch::read(dir, name));
        self.merge(batches)
    }

    /// Merge batches in order. See module header for which failures are fatal.
    pub fn merge<I>(&self, batches: I) -> Result<MergedBatches>
    where
        I: IntoIterator<Item = RawBatch>,
    {
        let mut records = Vec::new();
        let mut rates: Option<CurrencyRateTable> = None;
        let mut report = LoadReport::default();

        for batch in batches {
            let data = match self.accept(&batch) {
                Ok(data) => data,
                Err(reason) => {
                    warn!(batch = %batch.id, %reason, "skipping batch");
                    report.skipped.push(SkippedBatch {
                        id: batch.id,
                        reason,
                    });
                    continue;
                }
            };

            let data: BatchData = serde_json::from_value(data).map_err(|source| {
                AuditError::MalformedBatch {
                    batch: batch.id.clone(),
                    source,
                }
            })?;

            if batch.id == self.rate_source {
                let raw_rates = data.rates.ok_or_else(|| AuditError::UndefinedRateTable {
                    rate_source: self.rate_source.clone(),
                    reason: "batch carries no rates".to_string(),
                })?;
                let table = CurrencyRateTable::new(self.decode_rates(raw_rates)?);
                info!(batch = %batch.id, ?table, "captured currency rates");
                rates = Some(table);
            }

            let before = records.len();
            for (index, car) in data.cars.into_iter().enumerate() {
                let record: VehicleRecord =
                    serde_json::from_value(car).map_err(|source| AuditError::MalformedRecord {
                        batch: batch.id.clone(),
                        index,
                        source,
                    })?;
                records.push(record);
            }

            let record_count = records.len() - before;
            debug!(batch = %batch.id, record_count, "batch loaded");
            report.loaded.push(LoadedBatch {
                id: batch.id,
                record_count,
            });
        }

        let rates = rates.ok_or_else(|| AuditError::UndefinedRateTable {
            rate_source: self.rate_source.clone(),
            reason: self.rate_source_reason(&report),
        })?;

        info!(
            records = records.len(),
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "batches merged"
        );

        Ok(MergedBatches {
            records,
            rates,
            report,
        })
    }

    /// Envelope checks: returns the `data` payload or the reason to skip
    fn accept(&self, batch: &RawBatch) -> std::result::Result<serde_json::Value, SkipReason> {
        let text = match &batch.content {
            BatchContent::Missing => return Err(SkipReason::MissingInput),
            BatchContent::Unreadable(message) => {
                return Err(SkipReason::UnreadableBatch {
                    message: message.clone(),
                })
            }
            BatchContent::Json(text) => text,
        };

        let envelope: BatchEnvelope =
            serde_json::from_str(text).map_err(|e| SkipReason::UnparseableBatch {
                message: e.to_string(),
            })?;

        let status = match envelope.status {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "<none>".to_string(),
        };
        if status != SUCCESS_STATUS {
            return Err(SkipReason::UnsuccessfulBatch { status });
        }

        // A "success" without data is treated as a malformed batch downstream
        Ok(envelope.data.unwrap_or(serde_json::Value::Null))
    }

    /// Non-numeric entries become NaN so the rate table rejects them individually
    fn decode_rates(&self, raw: serde_json::Value) -> Result<BTreeMap<String, f64>> {
        let serde_json::Value::Object(entries) = raw else {
            return Err(AuditError::UndefinedRateTable {
                rate_source: self.rate_source.clone(),
                reason: "rates is not an object".to_string(),
            });
        };

        Ok(entries
            .into_iter()
            .map(|(code, rate)| (code, rate.as_f64().unwrap_or(f64::NAN)))
            .collect())
    }

    fn rate_source_reason(&self, report: &LoadReport) -> String {
        report
            .skipped
            .iter()
            .find(|s| s.id == self.rate_source)
            .map(|s| s.reason.to_string())
            .unwrap_or_else(|| "not among the batch sources".to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn car(infoid: i64, total: f64) -> serde_json::Value {
        json!({
            "infoid": infoid,
            "carname": format!("Car {}", infoid),
            "price_cny": 100000,
            "recycling_fee_rub": 5200,
            "customs_fee_rub": 1231,
            "import_duty": 500,
            "excise_tax_rub": 0,
            "total_price_rub": total,
            "engine_volume_ml": 2000,
            "power_kw": 100,
            "firstregyear": 2021,
            "firstregshortdate": "2021-09-01"
        })
    }

    fn batch(id: &str, status: &str, cars: Vec<serde_json::Value>, eur: f64) -> RawBatch {
        let body = json!({
            "status": status,
            "data": { "cars": cars, "rates": { "EUR": eur, "CNY": 12.5 } }
        });
        RawBatch::json(id, body.to_string())
    }

    #[test]
    fn test_merge_preserves_order_and_uses_rate_source() {
        let loader = BatchLoader::new("b0");
        let merged = loader
            .merge(vec![
                batch("b0", "success", vec![car(1, 1.0), car(2, 2.0)], 90.0),
                batch("b1", "success", vec![car(3, 3.0)], 95.0),
            ])
            .unwrap();

        let ids: Vec<&str> = merged.records.iter().map(|r| r.infoid.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        // b1's EUR rate must not leak in
        assert_eq!(merged.rates.rate("EUR").unwrap(), 90.0);
        assert_eq!(merged.report.loaded.len(), 2);
        assert!(merged.report.skipped.is_empty());
    }

    #[test]
    fn test_skips_missing_and_unsuccessful() {
        let loader = BatchLoader::new("b0");
        let merged = loader
            .merge(vec![
                batch("b0", "success", vec![car(1, 1.0)], 90.0),
                RawBatch::missing("b1"),
                batch("b2", "error", vec![car(2, 2.0)], 90.0),
                RawBatch::json("b3", "{ not json"),
                RawBatch {
                    id: "b4".to_string(),
                    content: BatchContent::Unreadable("permission denied".to_string()),
                },
            ])
            .unwrap();

        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.report.skipped.len(), 4);
        assert_eq!(merged.report.skipped[0].reason, SkipReason::MissingInput);
        assert_eq!(
            merged.report.skipped[1].reason,
            SkipReason::UnsuccessfulBatch {
                status: "error".to_string()
            }
        );
        assert!(matches!(
            merged.report.skipped[2].reason,
            SkipReason::UnparseableBatch { .. }
        ));
        assert_eq!(
            merged.report.skipped[3].reason,
            SkipReason::UnreadableBatch {
                message: "permission denied".to_string()
            }
        );
        assert_eq!(
            merged.report.skipped[3].reason.to_string(),
            "unreadable: permission denied"
        );
    }

    #[test]
    fn test_missing_rate_source_is_fatal() {
        let loader = BatchLoader::new("b0");
        let err = loader
            .merge(vec![
                RawBatch::missing("b0"),
                batch("b1", "success", vec![car(1, 1.0)], 90.0),
            ])
            .unwrap_err();

        match err {
            AuditError::UndefinedRateTable { rate_source, reason } => {
                assert_eq!(rate_source, "b0");
                assert_eq!(reason, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsuccessful_rate_source_is_fatal() {
        let loader = BatchLoader::new("b0");
        let err = loader
            .merge(vec![batch("b0", "fail", vec![car(1, 1.0)], 90.0)])
            .unwrap_err();
        assert!(matches!(err, AuditError::UndefinedRateTable { .. }));
    }

    #[test]
    fn test_rate_source_not_listed_is_fatal() {
        let loader = BatchLoader::new("elsewhere");
        let err = loader
            .merge(vec![batch("b0", "success", vec![car(1, 1.0)], 90.0)])
            .unwrap_err();

        assert!(err.to_string().contains("not among the batch sources"));
    }

    #[test]
    fn test_malformed_record_is_fatal() {
        let mut bad = car(2, 2.0);
        bad.as_object_mut().unwrap().remove("import_duty");

        let loader = BatchLoader::new("b0");
        let err = loader
            .merge(vec![batch("b0", "success", vec![car(1, 1.0), bad], 90.0)])
            .unwrap_err();

        match err {
            AuditError::MalformedRecord { batch, index, .. } => {
                assert_eq!(batch, "b0");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_success_without_data_is_malformed() {
        let loader = BatchLoader::new("b0");
        let err = loader
            .merge(vec![RawBatch::json("b0", r#"{"status":"success"}"#)])
            .unwrap_err();
        assert!(matches!(err, AuditError::MalformedBatch { .. }));
    }

    #[test]
    fn test_invalid_rate_in_rate_source_fails_on_use() {
        let loader = BatchLoader::new("b0");
        let merged = loader
            .merge(vec![batch("b0", "success", vec![car(1, 1.0)], -1.0)])
            .unwrap();

        assert_eq!(merged.rates.rate("CNY").unwrap(), 12.5);
        assert!(matches!(
            merged.rates.rate("EUR"),
            Err(AuditError::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_rates_outside_rate_source_are_not_decoded() {
        let odd = json!({
            "status": "success",
            "data": {
                "cars": [car(2, 2.0)],
                "rates": { "EUR": 90.0, "CNY": 12.5, "USD": null }
            }
        });
        let loader = BatchLoader::new("b0");
        let merged = loader
            .merge(vec![
                batch("b0", "success", vec![car(1, 1.0)], 90.0),
                RawBatch::json("b1", odd.to_string()),
                RawBatch::json(
                    "b2",
                    json!({ "status": "success", "data": { "cars": [car(3, 3.0)], "rates": "n/a" } })
                        .to_string(),
                ),
            ])
            .unwrap();

        assert_eq!(merged.records.len(), 3);
        assert!(merged.report.skipped.is_empty());
        assert_eq!(merged.rates.rate("EUR").unwrap(), 90.0);
    }

    #[test]
    fn test_non_numeric_rate_source_entry_is_rejected_alone() {
        let body = json!({
            "status": "success",
            "data": {
                "cars": [car(1, 1.0)],
                "rates": { "EUR": 90.0, "CNY": 12.5, "USD": null }
            }
        });
        let merged = BatchLoader::new("b0")
            .merge(vec![RawBatch::json("b0", body.to_string())])
            .unwrap();

        assert_eq!(merged.rates.rate("CNY").unwrap(), 12.5);
        assert!(matches!(
            merged.rates.rate("USD"),
            Err(AuditError::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_rate_source_rates_must_be_an_object() {
        let body = json!({
            "status": "success",
            "data": { "cars": [], "rates": [90.0, 12.5] }
        });
        let err = BatchLoader::new("b0")
            .merge(vec![RawBatch::json("b0", body.to_string())])
            .unwrap_err();

        assert!(err.to_string().contains("rates is not an object"));
    }
}
