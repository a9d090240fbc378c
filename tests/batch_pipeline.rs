use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::json;
use vehicle_price_audit::report::write_discrepancies_json;
use vehicle_price_audit::{
    select_record, AuditError, BatchLoader, Discrepancy, DutyAudit, FleetStatistics,
    PriceReconciliationEngine, RecordAuditor, RecordSelector, SkipReason,
};

fn car(infoid: i64, excise: f64, total: f64, volume: Option<u32>) -> serde_json::Value {
    json!({
        "infoid": infoid,
        "carname": format!("Haval Jolion {}", infoid),
        "price_cny": 100000,
        "recycling_fee_rub": 5200,
        "customs_fee_rub": 1231,
        "import_duty": 500,
        "excise_tax_rub": excise,
        "total_price_rub": total,
        "engine_volume_ml": volume,
        "power_kw": 100,
        "firstregyear": 2021,
        "firstregshortdate": "2021-09-01"
    })
}

fn write_batch(dir: &Path, name: &str, status: &str, cars: Vec<serde_json::Value>) {
    let body = json!({
        "status": status,
        "data": { "cars": cars, "rates": { "EUR": 90.0, "CNY": 12.5 } }
    });
    fs::write(dir.join(name), serde_json::to_string_pretty(&body).unwrap()).unwrap();
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
}

#[test]
fn batch_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_batch(
        dir.path(),
        "response_0.json",
        "success",
        vec![
            car(1, 0.0, 1_301_431.0, Some(2000)),
            car(2, 500.0, 1_300_000.0, Some(1500)),
        ],
    );
    write_batch(dir.path(), "response_100.json", "error", vec![car(3, 0.0, 0.0, None)]);
    write_batch(
        dir.path(),
        "response_300.json",
        "success",
        vec![car(4, 0.0, 1_301_431.5, None)],
    );

    let loader = BatchLoader::new("response_0.json");
    let merged = loader
        .load_dir(
            dir.path(),
            &names(&[
                "response_0.json",
                "response_100.json",
                "response_200.json",
                "response_300.json",
            ]),
        )
        .unwrap();

    assert_eq!(merged.records.len(), 3);
    assert_eq!(merged.report.loaded.len(), 2);
    assert_eq!(
        merged.report.skipped[0].reason,
        SkipReason::UnsuccessfulBatch {
            status: "error".to_string()
        }
    );
    assert_eq!(merged.report.skipped[1].reason, SkipReason::MissingInput);

    let report = PriceReconciliationEngine::new()
        .reconcile(&merged.records, &merged.rates, today())
        .unwrap();
    assert_eq!(report.matched, 2);
    assert_eq!(report.mismatched(), 1);
    assert_eq!(report.discrepancies[0].infoid, "2");
    assert_eq!(report.discrepancies[0].difference, 1931.0);

    let output = dir.path().join("pricing_errors.json");
    write_discrepancies_json(&output, &report.discrepancies).unwrap();
    let written: Vec<Discrepancy> =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].api_total, 1_300_000.0);

    let stats = FleetStatistics::collect(&merged.records, today());
    assert_eq!(stats.total(), 3);
    assert_eq!(stats.by_displacement.len(), 3);
    assert_eq!(stats.by_recycling_fee.len(), 1);
}

#[test]
fn missing_rate_source_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_batch(
        dir.path(),
        "response_100.json",
        "success",
        vec![car(1, 0.0, 1_301_431.0, Some(2000))],
    );

    let err = BatchLoader::new("response_0.json")
        .load_dir(dir.path(), &names(&["response_0.json", "response_100.json"]))
        .unwrap_err();

    assert!(matches!(err, AuditError::UndefinedRateTable { .. }));
}

#[test]
fn malformed_record_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut bad = car(2, 0.0, 0.0, Some(2000));
    bad.as_object_mut().unwrap().remove("customs_fee_rub");
    write_batch(
        dir.path(),
        "response_0.json",
        "success",
        vec![car(1, 0.0, 1_301_431.0, Some(2000)), bad],
    );

    let err = BatchLoader::new("response_0.json")
        .load_dir(dir.path(), &names(&["response_0.json"]))
        .unwrap_err();

    assert!(matches!(err, AuditError::MalformedRecord { index: 1, .. }));
}

#[test]
fn single_record_audit_from_file() {
    let dir = tempfile::tempdir().unwrap();
    // 4 years old, 1600 cc -> 2.5 EUR/cc -> 4000 EUR
    let mut record = car(9, 0.0, 0.0, Some(1600));
    record["import_duty"] = json!(4000);
    record["total_price_rub"] = json!(1_250_000.0 + 5200.0 + 1231.0 + 360_000.0);
    write_batch(dir.path(), "response_0.json", "success", vec![record]);

    let merged = BatchLoader::new("response_0.json")
        .load_dir(dir.path(), &names(&["response_0.json"]))
        .unwrap();
    let record = select_record(&merged.records, &RecordSelector::Id("9".to_string())).unwrap();

    let audit = RecordAuditor::default()
        .audit(record, &merged.rates, today())
        .unwrap();

    match audit.duty {
        DutyAudit::Checked {
            expected_eur,
            difference_eur,
            ..
        } => {
            assert_eq!(expected_eur, 4000.0);
            assert_eq!(difference_eur, 0.0);
        }
        other => panic!("unexpected duty audit: {:?}", other),
    }
    // 1,250,000 RUB belongs to the 13,541 band, the record says 1,231
    assert!(!audit.customs.matches);
    assert!(audit.totals.is_match());
}
