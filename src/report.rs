// 🖨️ Reports - console views and discrepancy artifacts
// Views implement Display so binaries just print them and tests can inspect
// the text. Artifacts are JSON (always) and CSV (on request).

use crate::audit::{ConcessionCheck, ConcessionOutcome, DutyAudit, RecordAudit};
use crate::loader::LoadReport;
use crate::reconciliation::{Discrepancy, ReconciliationReport};
use crate::statistics::FleetStatistics;
use crate::vehicle::{CurrencyRateTable, VehicleRecord};
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

// ============================================================================
// ARTIFACTS
// ============================================================================

/// Write the discrepancy list as pretty JSON, preserving order
pub fn write_discrepancies_json(path: &Path, discrepancies: &[Discrepancy]) -> Result<()> {
    let json = serde_json::to_string_pretty(discrepancies)
        .context("Failed to serialize discrepancies")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write discrepancy file: {:?}", path))?;

    info!(path = %path.display(), count = discrepancies.len(), "discrepancies written");
    Ok(())
}

pub fn write_discrepancies_csv(path: &Path, discrepancies: &[Discrepancy]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;

    for discrepancy in discrepancies {
        writer
            .serialize(discrepancy)
            .context("Failed to serialize discrepancy row")?;
    }
    writer.flush().context("Failed to flush CSV file")?;

    info!(path = %path.display(), count = discrepancies.len(), "discrepancy CSV written");
    Ok(())
}

// ============================================================================
// NUMBER FORMATTING
// ============================================================================

/// `1301931.5` -> `1,301,931.50` with `decimals = 2`
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

fn money(value: f64) -> String {
    group_thousands(value, 2)
}

fn amount(value: f64) -> String {
    if value.fract() == 0.0 {
        group_thousands(value, 0)
    } else {
        group_thousands(value, 2)
    }
}

fn join<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_rates(f: &mut fmt::Formatter<'_>, rates: &CurrencyRateTable) -> fmt::Result {
    let listed = join(
        rates
            .currencies()
            .map(|(code, rate)| format!("{} = {} RUB", code, rate)),
    );
    writeln!(f, "Exchange rates: {}", listed)
}

// ============================================================================
// BATCH VIEW
// ============================================================================

pub struct BatchReportView<'a> {
    pub load: &'a LoadReport,
    pub rates: &'a CurrencyRateTable,
    pub reconciliation: &'a ReconciliationReport,
    pub statistics: &'a FleetStatistics,
    pub preview_limit: usize,
}

impl BatchReportView<'_> {
    fn write_load(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "📂 Loaded {} vehicles from {} batch(es)",
            self.reconciliation.record_count,
            self.load.loaded.len()
        )?;
        for batch in &self.load.loaded {
            writeln!(f, "   ✓ {}: {} vehicles", batch.id, batch.record_count)?;
        }
        for batch in &self.load.skipped {
            writeln!(f, "   ⚠️  {} skipped ({})", batch.id, batch.reason)?;
        }
        write_rates(f, self.rates)
    }

    fn write_discrepancies(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.reconciliation;
        writeln!(f)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "⚖️  PRICE RECONCILIATION")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "✓ Correct: {} of {}", report.matched, report.record_count)?;
        writeln!(
            f,
            "✗ With discrepancies: {} (tolerance {} RUB)",
            report.mismatched(),
            report.tolerance
        )?;

        if report.is_clean() {
            return Ok(());
        }

        let shown = report.discrepancies.len().min(self.preview_limit);
        writeln!(f)?;
        writeln!(f, "Vehicles with discrepancies (first {})", shown)?;

        for (i, d) in report.discrepancies.iter().take(self.preview_limit).enumerate() {
            let volume = d
                .engine_volume
                .map_or_else(|| "Unknown".to_string(), |v| v.to_string());
            writeln!(f)?;
            writeln!(f, "{}. ID: {} | {}", i + 1, d.infoid, d.carname)?;
            writeln!(
                f,
                "   Year: {} | Volume: {} ml | Power: {} kW | Age: {} days",
                d.year, volume, d.power_kw, d.age_days
            )?;
            writeln!(f, "   Price: {} CNY → {} RUB", amount(d.price_cny), money(d.price_rub))?;
            writeln!(f, "   Recycling fee: {} RUB", amount(d.recycling_fee_rub))?;
            writeln!(f, "   Customs fee: {} RUB", amount(d.customs_fee_rub))?;
            writeln!(
                f,
                "   Import duty: {} EUR → {} RUB",
                amount(d.import_duty_eur),
                money(d.import_duty_rub)
            )?;
            writeln!(f, "   Excise tax: {} RUB", amount(d.excise_tax_rub))?;
            writeln!(f, "   ---")?;
            writeln!(f, "   Calculated: {} RUB", money(d.calculated_total))?;
            writeln!(f, "   API total:  {} RUB", money(d.api_total))?;
            writeln!(f, "   DIFFERENCE: {} RUB", money(d.difference))?;
        }
        Ok(())
    }

    fn write_statistics(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.statistics;
        writeln!(f)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "📊 STATISTICS")?;
        writeln!(f, "{}", RULE)?;

        writeln!(f, "By registration year:")?;
        for (year, group) in &stats.by_year {
            writeln!(f, "  {}: {} vehicles", year, group.count)?;
        }

        writeln!(f, "By engine volume:")?;
        for (volume, group) in &stats.by_displacement {
            writeln!(f, "  {} ml: {} vehicles", volume, group.count)?;
        }

        writeln!(f, "Distinct recycling fees:")?;
        for group in stats.by_recycling_fee.values() {
            writeln!(
                f,
                "  {} RUB: {} vehicles | volumes: [{}] ml | power: [{}] kW",
                amount(group.fee_rub),
                group.count(),
                join(&group.displacements),
                join(group.powers_kw.iter().map(|p| p.into_inner())),
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for BatchReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_load(f)?;
        self.write_discrepancies(f)?;
        self.write_statistics(f)
    }
}

// ============================================================================
// SINGLE-RECORD VIEW
// ============================================================================

pub struct RecordAuditView<'a> {
    pub record: &'a VehicleRecord,
    pub rates: &'a CurrencyRateTable,
    pub audit: &'a RecordAudit,
    pub tolerance: f64,
}

impl RecordAuditView<'_> {
    fn write_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.record;
        let a = self.audit;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "🔍 SINGLE-RECORD AUDIT")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Vehicle: {}", r.carname)?;
        writeln!(f, "ID: {}", r.infoid)?;
        writeln!(f, "Year: {} ({})", r.firstregyear, r.firstregshortdate)?;
        match r.engine_volume_ml {
            Some(ml) => writeln!(f, "Engine volume: {} ml", ml)?,
            None => writeln!(f, "Engine volume: Unknown")?,
        }
        writeln!(f, "Power: {} kW ({:.1} hp)", r.power_kw, a.recycling.horsepower)?;
        writeln!(
            f,
            "Age: {} years by calendar, {:.2} years ({} days) since registration",
            a.age_years, a.age_years_exact, a.age_days
        )?;
        write_rates(f, self.rates)
    }

    fn write_duty(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "--- 1. IMPORT DUTY ---")?;
        match &self.audit.duty {
            DutyAudit::Unaudited { band, .. } => {
                writeln!(f, "Age band: {} (price-based duty, not audited)", band)
            }
            DutyAudit::MissingDisplacement { band, .. } => {
                writeln!(f, "Age band: {} (engine volume unknown, not audited)", band)
            }
            DutyAudit::Checked {
                band,
                displacement_cc,
                rate,
                expected_eur,
                actual_eur,
                difference_eur,
                ..
            } => {
                writeln!(f, "Age band: {}", band)?;
                writeln!(f, "Rate: {} EUR/cc", rate.eur_per_cc)?;
                writeln!(
                    f,
                    "Expected: {} × {} = {} EUR",
                    displacement_cc,
                    rate.eur_per_cc,
                    money(*expected_eur)
                )?;
                writeln!(f, "API: {} EUR", money(*actual_eur))?;
                writeln!(f, "DIFFERENCE: {} EUR", money(*difference_eur))
            }
        }
    }

    fn write_recycling(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recycling = &self.audit.recycling;
        writeln!(f)?;
        writeln!(f, "--- 2. RECYCLING FEE ---")?;
        writeln!(f, "Volume category: {}", recycling.volume_category)?;
        writeln!(f, "API: {} RUB", amount(recycling.actual_rub))?;
        writeln!(f, "Coefficient (fee / base rate): {:.2}", recycling.coefficient)?;

        match &recycling.concession {
            ConcessionCheck::NotEligible => {
                writeln!(f, "Concessional rate: not applicable")
            }
            ConcessionCheck::UnknownDisplacement => {
                writeln!(f, "Concessional rate: engine volume unknown")
            }
            ConcessionCheck::Eligible {
                expected_rub,
                outcome,
            } => {
                writeln!(f, "⚠️ CONCESSIONAL RATE: small engine and low power")?;
                writeln!(f, "   Expected fee for a private import: {} RUB", amount(*expected_rub))?;
                match outcome {
                    ConcessionOutcome::Matches => writeln!(f, "   ✓ MATCHES"),
                    ConcessionOutcome::AlternateNewVehicle => writeln!(
                        f,
                        "   ⚠️ API returned the under-3-years amount ({} RUB)",
                        amount(recycling.actual_rub)
                    ),
                    ConcessionOutcome::Differs => writeln!(f, "   ✗ DIFFERS"),
                }
            }
        }
    }

    fn write_customs(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let customs = &self.audit.customs;
        writeln!(f)?;
        writeln!(f, "--- 3. CUSTOMS FEE ---")?;
        writeln!(
            f,
            "Vehicle price: {} RUB ({} EUR)",
            money(customs.price_rub),
            money(customs.price_eur)
        )?;
        writeln!(f, "Expected: {} RUB", amount(customs.expected_rub))?;
        writeln!(f, "API: {} RUB", amount(customs.actual_rub))?;
        if customs.matches {
            writeln!(f, "✓ MATCHES")
        } else {
            writeln!(f, "✗ DOES NOT MATCH! Difference: {} RUB", amount(customs.difference_rub))
        }
    }

    fn write_totals(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.audit.totals.breakdown();
        writeln!(f)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "TOTAL")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Price: {} CNY → {} RUB", amount(b.price_foreign), money(b.price_rub))?;
        writeln!(f, "+ Recycling fee: {} RUB", amount(b.recycling_fee_rub))?;
        writeln!(f, "+ Customs fee: {} RUB", amount(b.customs_fee_rub))?;
        writeln!(
            f,
            "+ Import duty: {} EUR → {} RUB",
            amount(b.import_duty_foreign),
            money(b.import_duty_rub)
        )?;
        writeln!(f, "+ Excise tax: {} RUB", amount(b.excise_tax_rub))?;
        writeln!(f, "CALCULATED: {} RUB", money(b.calculated_total))?;
        writeln!(f, "API:        {} RUB", money(b.api_total))?;
        writeln!(f, "DIFFERENCE: {} RUB", money(b.difference))?;

        if self.audit.totals.is_match() {
            writeln!(f, "✓ Total is CORRECT (within {} RUB rounding)", self.tolerance)
        } else {
            writeln!(f, "✗ Total contains an ERROR")
        }
    }
}

impl fmt::Display for RecordAuditView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_header(f)?;
        self.write_duty(f)?;
        self.write_recycling(f)?;
        self.write_customs(f)?;
        self.write_totals(f)
    }
}

// ============================================================================
// TESTS
// ============================================================================
