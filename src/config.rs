// ⚙️ Run Configuration
// Every field has a default matching the standard batch layout:
// response_{0,100,200,300,400}.json in the working directory, rates taken
// from response_0.json, errors written to pricing_errors.json.

use crate::rates::FeeRateTables;
use crate::reconciliation::{
    AUDIT_TOLERANCE_RUB, BATCH_TOLERANCE_RUB, DEFAULT_DUTY_CURRENCY, DEFAULT_PRICE_CURRENCY,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of mismatches printed in the console report
pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory the batch files are read from
    pub input_dir: PathBuf,

    /// Batch file names, merged in this order
    pub batches: Vec<String>,

    /// Batch whose currency rates are used for the entire run
    pub rate_source: String,

    pub price_currency: String,
    pub duty_currency: String,

    /// Inclusive tolerance of the batch reconciler (RUB)
    pub batch_tolerance: f64,

    /// Inclusive tolerance of the single-record auditor (RUB)
    pub audit_tolerance: f64,

    pub preview_limit: usize,

    /// Discrepancy artifact, written only when mismatches exist
    pub output: PathBuf,

    /// Optional CSV copy of the discrepancy artifact
    pub csv_output: Option<PathBuf>,

    pub fee_tables: FeeRateTables,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            input_dir: PathBuf::from("."),
            batches: (0..5).map(|i| format!("response_{}.json", i * 100)).collect(),
            rate_source: "response_0.json".to_string(),
            price_currency: DEFAULT_PRICE_CURRENCY.to_string(),
            duty_currency: DEFAULT_DUTY_CURRENCY.to_string(),
            batch_tolerance: BATCH_TOLERANCE_RUB,
            audit_tolerance: AUDIT_TOLERANCE_RUB,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            output: PathBuf::from("pricing_errors.json"),
            csv_output: None,
            fee_tables: FeeRateTables::default(),
        }
    }
}

impl AuditConfig {
    /// Load config from a JSON file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AuditConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batches.is_empty() {
            anyhow::bail!("config lists no batches");
        }
        if !self.batches.iter().any(|b| b == &self.rate_source) {
            anyhow::bail!(
                "rate source '{}' is not one of the configured batches",
                self.rate_source
            );
        }
        if self.batch_tolerance < 0.0 || self.audit_tolerance < 0.0 {
            anyhow::bail!("tolerances must not be negative");
        }
        self.fee_tables.validate()?;
        Ok(())
    }
}
