// 📐 Shape Layer - Declared Stage Schemas
// Each raw source declares the columns it needs; checking a table against
// that declaration yields a typed availability result instead of ad hoc
// `if column exists` branches.

use crate::error::{PipelineError, Result};
use crate::table::RawTable;

// ============================================================================
// CANONICAL COLUMN NAMES
// ============================================================================

pub const EVENT_ID: &str = "event_id";
pub const EVENT_DATE: &str = "event_date";
pub const ENTITY_ID: &str = "entity_id";
pub const ENTITY_NAME: &str = "entity_name";
pub const METRIC: &str = "metric";

/// Bronze column order, fixed so consumers can rely on position
pub const BRONZE_COLUMNS: [&str; 5] = [EVENT_ID, EVENT_DATE, ENTITY_ID, ENTITY_NAME, METRIC];

/// Gold column order
pub const GOLD_COLUMNS: [&str; 4] = ["month_start", ENTITY_ID, ENTITY_NAME, "metric_sum"];

// ============================================================================
// COLUMN TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Date,
    Float,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub type_: ColumnType,
}

// ============================================================================
// STAGE SCHEMA
// ============================================================================

/// StageSchema - the columns one raw source must provide, in canonical names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSchema {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl StageSchema {
    pub fn new(name: &'static str) -> Self {
        StageSchema {
            name,
            columns: Vec::new(),
        }
    }

    /// Builder: declare a required column
    pub fn with_column(mut self, name: &'static str, type_: ColumnType) -> Self {
        self.columns.push(ColumnSpec { name, type_ });
        self
    }

    /// Race calendar: event_id → event_date
    pub fn events() -> Self {
        StageSchema::new("events")
            .with_column(EVENT_ID, ColumnType::Integer)
            .with_column(EVENT_DATE, ColumnType::Date)
    }

    /// Constructor reference: entity_id → entity_name
    pub fn entities() -> Self {
        StageSchema::new("entities")
            .with_column(ENTITY_ID, ColumnType::Integer)
            .with_column(ENTITY_NAME, ColumnType::Text)
    }

    /// Per-race constructor results: (event_id, entity_id) → metric
    pub fn results() -> Self {
        StageSchema::new("results")
            .with_column(EVENT_ID, ColumnType::Integer)
            .with_column(ENTITY_ID, ColumnType::Integer)
            .with_column(METRIC, ColumnType::Float)
    }

    /// Harvested per-driver results, after era normalisation
    pub fn season_results() -> Self {
        StageSchema::new("season_results")
            .with_column("driver_name", ColumnType::Text)
            .with_column("constructor_name", ColumnType::Text)
            .with_column("grid_position", ColumnType::Integer)
            .with_column("position", ColumnType::Integer)
            .with_column("points", ColumnType::Float)
            .with_column("status", ColumnType::Text)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn type_of(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.type_)
    }

    /// Check which declared columns the table actually carries
    ///
    /// An empty intersection is a `SchemaMismatch`; a partial one is a
    /// degraded schema the caller proceeds with.
    pub fn check(&self, table: &RawTable) -> Result<ColumnAvailability> {
        let (present, missing): (Vec<&'static str>, Vec<&'static str>) = self
            .column_names()
            .into_iter()
            .partition(|c| table.has_column(c));

        if present.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                source_name: table.source_name.clone(),
                required: self.column_names().iter().map(|c| c.to_string()).collect(),
                present: table.headers.clone(),
            });
        }

        if missing.is_empty() {
            Ok(ColumnAvailability::Complete)
        } else {
            Ok(ColumnAvailability::Degraded { present, missing })
        }
    }
}

// ============================================================================
// COLUMN AVAILABILITY
// ============================================================================

/// Outcome of checking a raw table against its declared schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnAvailability {
    /// Every declared column is present
    Complete,
    /// Some declared columns are missing; they load as all-null
    Degraded {
        present: Vec<&'static str>,
        missing: Vec<&'static str>,
    },
}

impl ColumnAvailability {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ColumnAvailability::Degraded { .. })
    }

    pub fn missing(&self) -> &[&'static str] {
        match self {
            ColumnAvailability::Complete => &[],
            ColumnAvailability::Degraded { missing, .. } => missing,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
