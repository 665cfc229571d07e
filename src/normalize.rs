// 🔤 Schema Normalizer - reconcile column-name drift across eras
// Legacy headers are renamed to canonical ones before any projection or join

use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One legacy → canonical column mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub legacy: String,
    pub canonical: String,
}

impl ColumnRename {
    pub fn new(legacy: impl Into<String>, canonical: impl Into<String>) -> Self {
        ColumnRename {
            legacy: legacy.into(),
            canonical: canonical.into(),
        }
    }
}

/// SchemaNormalizer - applies an ordered set of renames to a raw table
///
/// Rules:
/// - a legacy column present while its canonical name is absent is renamed
/// - if the canonical column already exists the legacy one is left alone
/// - neither present: nothing happens, availability is the loader's problem
///
/// These rules make `normalize` idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaNormalizer {
    renames: Vec<ColumnRename>,
}

impl SchemaNormalizer {
    pub fn new() -> Self {
        SchemaNormalizer::default()
    }

    /// Builder: add a legacy → canonical mapping
    pub fn with_rename(mut self, legacy: &str, canonical: &str) -> Self {
        self.renames.push(ColumnRename::new(legacy, canonical));
        self
    }

    /// Builder: add several mappings (e.g. from configuration)
    pub fn with_renames(mut self, renames: impl IntoIterator<Item = ColumnRename>) -> Self {
        self.renames.extend(renames);
        self
    }

    /// Headers used by the reference CSV exports
    pub fn reference_exports() -> Self {
        SchemaNormalizer::new()
            .with_rename("raceId", "event_id")
            .with_rename("race_id", "event_id")
            .with_rename("date", "event_date")
            .with_rename("race_date", "event_date")
            .with_rename("constructorId", "entity_id")
            .with_rename("constructor_id", "entity_id")
            .with_rename("name", "entity_name")
            .with_rename("constructor_name", "entity_name")
            .with_rename("points", "metric")
    }

    /// Live-timing result columns, which changed names between eras
    pub fn season_results() -> Self {
        SchemaNormalizer::new()
            .with_rename("BroadcastName", "driver_name")
            .with_rename("FullName", "driver_name")
            .with_rename("ConstructorName", "constructor_name")
            .with_rename("TeamName", "constructor_name")
            .with_rename("GridPosition", "grid_position")
            .with_rename("Position", "position")
            .with_rename("Points", "points")
            .with_rename("Status", "status")
    }

    pub fn renames(&self) -> &[ColumnRename] {
        &self.renames
    }

    /// Rename legacy columns in place; returns how many columns were renamed
    pub fn normalize_in_place(&self, table: &mut RawTable) -> usize {
        let mut renamed = 0;
        for rule in &self.renames {
            if table.has_column(&rule.canonical) {
                continue;
            }
            if table.rename_column(&rule.legacy, &rule.canonical) {
                debug!(
                    source = %table.source_name,
                    legacy = %rule.legacy,
                    canonical = %rule.canonical,
                    "renamed legacy column"
                );
                renamed += 1;
            }
        }
        renamed
    }

    pub fn normalize(&self, mut table: RawTable) -> RawTable {
        self.normalize_in_place(&mut table);
        table
    }
}

// ============================================================================
// TESTS
// ============================================================================
