// Vehicle Price Audit - Core Library
// Shared by the batch reconciler (price-audit) and the single-record
// auditor (record-audit), and by the tests.

pub mod error;
pub mod vehicle;        // Records + currency rates
pub mod loader;         // Best-effort batch merge
pub mod reconciliation; // Total price formula check
pub mod statistics;     // Grouping by year / volume / recycling fee
pub mod rates;          // Published fee tables
pub mod audit;          // Per-component rate-table audit
pub mod config;
pub mod report;         // Console views + discrepancy artifacts
pub mod logging;

// Re-export commonly used types
pub use error::{AuditError, Result};
pub use vehicle::{CurrencyRateTable, VehicleRecord, HP_PER_KW};
pub use loader::{
    BatchContent, BatchLoader, LoadReport, LoadedBatch, MergedBatches, RawBatch, SkipReason,
    SkippedBatch,
};
pub use reconciliation::{
    Discrepancy, PriceBreakdown, PriceReconciliationEngine, ReconciliationReport,
    ReconciliationResult, AUDIT_TOLERANCE_RUB, BATCH_TOLERANCE_RUB,
};
pub use statistics::{DisplacementKey, FleetStatistics, RecordGroup, RecyclingFeeGroup};
pub use rates::{
    AgeBand, CustomsBand, CustomsTable, DisplacementTier, DutyRate, DutyTable, FeeRateTables,
    RecyclingConcession,
};
pub use audit::{
    select_record, ConcessionCheck, ConcessionOutcome, CustomsAudit, DutyAudit, RecordAudit,
    RecordAuditor, RecordSelector, RecyclingAudit, VolumeCategory,
};
pub use config::AuditConfig;
pub use report::{BatchReportView, RecordAuditView};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
