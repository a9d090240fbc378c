// 🔍 Single-record auditor
// Re-derives duty, customs fee and recycling fee of one vehicle from the
// published tables and checks its total with the wider audit tolerance.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

use vehicle_price_audit::logging::init_logging;
use vehicle_price_audit::{
    select_record, AuditConfig, BatchLoader, FeeRateTables, PriceReconciliationEngine,
    RecordAuditView, RecordAuditor, RecordSelector,
};

/// Audit one vehicle record component by component
#[derive(Parser)]
#[command(name = "record-audit", version)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the batch responses
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Batch to read the record and rates from (defaults to the rate source)
    #[arg(long)]
    batch: Option<String>,

    /// Position of the record in the batch
    #[arg(long, conflicts_with = "id")]
    index: Option<usize>,

    /// infoid of the record
    #[arg(long)]
    id: Option<String>,

    /// JSON file overriding the fee tables
    #[arg(long)]
    rate_tables: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };
    if let Some(dir) = args.input_dir {
        config.input_dir = dir;
    }
    if let Some(path) = &args.rate_tables {
        config.fee_tables = FeeRateTables::from_file(path)?;
    }

    let batch = args.batch.unwrap_or_else(|| config.rate_source.clone());
    let selector = match (args.index, args.id) {
        (Some(index), _) => RecordSelector::Index(index),
        (None, Some(id)) => RecordSelector::Id(id),
        (None, None) => RecordSelector::First,
    };

    // The audited batch supplies its own rates
    let merged = BatchLoader::new(batch.as_str()).load_dir(&config.input_dir, &[batch])?;
    let record = select_record(&merged.records, &selector)?;

    let engine = PriceReconciliationEngine::with_tolerance(config.audit_tolerance)
        .with_currencies(config.price_currency.as_str(), config.duty_currency.as_str());
    let auditor = RecordAuditor::new(config.fee_tables.clone()).with_engine(engine);

    let today = Local::now().date_naive();
    let audit = auditor.audit(record, &merged.rates, today)?;

    println!(
        "{}",
        RecordAuditView {
            record,
            rates: &merged.rates,
            audit: &audit,
            tolerance: config.audit_tolerance,
        }
    );

    Ok(())
}
