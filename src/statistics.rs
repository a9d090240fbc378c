// 📊 Fleet Statistics - Descriptive grouping of the merged records
// Three independent groupings built in one fold:
//   by registration year, by engine displacement, by recycling fee amount.
// The recycling fee groups also collect the distinct displacement / power /
// age values seen for each fee, which is what the fee tiers are guessed from.

use crate::vehicle::VehicleRecord;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Displacement grouping key; unknown sorts after every known volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DisplacementKey {
    Known(u32),
    Unknown,
}

impl From<Option<u32>> for DisplacementKey {
    fn from(volume: Option<u32>) -> Self {
        volume.map_or(DisplacementKey::Unknown, DisplacementKey::Known)
    }
}

impl fmt::Display for DisplacementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplacementKey::Known(ml) => write!(f, "{}", ml),
            DisplacementKey::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordGroup {
    pub count: usize,
    /// Member infoids in input order
    pub members: Vec<String>,
}

impl RecordGroup {
    fn push(&mut self, record: &VehicleRecord) {
        self.count += 1;
        self.members.push(record.infoid.clone());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecyclingFeeGroup {
    pub fee_rub: f64,
    pub records: RecordGroup,
    pub displacements: BTreeSet<DisplacementKey>,
    pub powers_kw: BTreeSet<OrderedFloat<f64>>,
    pub ages_days: BTreeSet<i64>,
}

impl RecyclingFeeGroup {
    fn new(fee_rub: f64) -> Self {
        RecyclingFeeGroup {
            fee_rub,
            records: RecordGroup::default(),
            displacements: BTreeSet::new(),
            powers_kw: BTreeSet::new(),
            ages_days: BTreeSet::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.records.count
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetStatistics {
    pub by_year: BTreeMap<i32, RecordGroup>,
    pub by_displacement: BTreeMap<DisplacementKey, RecordGroup>,
    pub by_recycling_fee: BTreeMap<OrderedFloat<f64>, RecyclingFeeGroup>,
}

impl FleetStatistics {
    /// Group `records`; ages are measured against `today`
    pub fn collect(records: &[VehicleRecord], today: NaiveDate) -> Self {
        records
            .iter()
            .fold(FleetStatistics::default(), |stats, record| stats.with(record, today))
    }

    fn with(mut self, record: &VehicleRecord, today: NaiveDate) -> Self {
        self.by_year
            .entry(record.firstregyear)
            .or_default()
            .push(record);

        let displacement = DisplacementKey::from(record.engine_volume_ml);
        self.by_displacement
            .entry(displacement)
            .or_default()
            .push(record);

        let fee_group = self
            .by_recycling_fee
            .entry(OrderedFloat(record.recycling_fee_rub))
            .or_insert_with(|| RecyclingFeeGroup::new(record.recycling_fee_rub));
        fee_group.records.push(record);
        fee_group.displacements.insert(displacement);
        fee_group.powers_kw.insert(OrderedFloat(record.power_kw));
        fee_group.ages_days.insert(record.age_days(today));

        self
    }

    pub fn total(&self) -> usize {
        self.by_year.values().map(|g| g.count).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================
