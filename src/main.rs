// 💰 Batch price reconciler
// Loads every batch response, recomputes each vehicle total and saves the
// vehicles whose API total is off by more than the batch tolerance.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

use vehicle_price_audit::logging::init_logging;
use vehicle_price_audit::report::{write_discrepancies_csv, write_discrepancies_json};
use vehicle_price_audit::{
    AuditConfig, BatchLoader, BatchReportView, FleetStatistics, PriceReconciliationEngine,
};

/// Batch reconciler: recompute every vehicle's total and list the ones the API got wrong
#[derive(Parser)]
#[command(name = "price-audit", version)]
struct Args {
    /// JSON config file (defaults reproduce response_*.json in the working directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the batch responses
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Where to write the discrepancy JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write the discrepancies as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Debug-level diagnostics on stderr
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
    if let Some(output) = args.output {
        config.output = output;
    }
    if args.csv.is_some() {
        config.csv_output = args.csv;
    }

    run(&config)
}

fn run(config: &AuditConfig) -> Result<()> {
    let today = Local::now().date_naive();

    // 1. Load + merge batches
    let loader = BatchLoader::new(config.rate_source.as_str());
    let merged = loader.load_dir(&config.input_dir, &config.batches)?;

    // 2. Reconcile totals
    let engine = PriceReconciliationEngine::with_tolerance(config.batch_tolerance)
        .with_currencies(config.price_currency.as_str(), config.duty_currency.as_str());
    let reconciliation = engine.reconcile(&merged.records, &merged.rates, today)?;

    // 3. Group
    let statistics = FleetStatistics::collect(&merged.records, today);

    println!(
        "{}",
        BatchReportView {
            load: &merged.report,
            rates: &merged.rates,
            reconciliation: &reconciliation,
            statistics: &statistics,
            preview_limit: config.preview_limit,
        }
    );

    // 4. Persist discrepancies
    if !reconciliation.is_clean() {
        write_discrepancies_json(&config.output, &reconciliation.discrepancies)?;
        println!(
            "\n💾 All {} vehicles with discrepancies saved to: {}",
            reconciliation.mismatched(),
            config.output.display()
        );

        if let Some(csv_path) = &config.csv_output {
            write_discrepancies_csv(csv_path, &reconciliation.discrepancies)?;
            println!("💾 CSV copy saved to: {}", csv_path.display());
        }
    }

    println!("\n✅ {}", reconciliation.summary());
    Ok(())
}
