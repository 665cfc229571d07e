// 🚨 Error Taxonomy
// Every failure the pipeline can surface, tagged with the stage it came from

use std::fmt;
use thiserror::Error;

// ============================================================================
// STAGES & INVARIANTS
// ============================================================================

/// Pipeline stage a failure escaped from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RawLoad,
    Bronze,
    Gold,
    Query,
    Harvest,
    Sink,
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::RawLoad => "raw load",
            Stage::Bronze => "bronze",
            Stage::Gold => "gold",
            Stage::Query => "query",
            Stage::Harvest => "harvest",
            Stage::Sink => "sink",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bronze invariants checked after the joins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// event_id and entity_id are present on every row
    RequiredKeyPresent,
    /// (event_id, entity_id) is unique across the table
    UniqueEventEntity,
    /// every non-null event_date parsed as a calendar date
    EventDateIsDate,
    /// (month_start, entity_id) is unique across gold
    UniqueMonthEntity,
}

impl Invariant {
    pub fn name(&self) -> &str {
        match self {
            Invariant::RequiredKeyPresent => "event_id and entity_id must be present",
            Invariant::UniqueEventEntity => "(event_id, entity_id) must be unique in bronze",
            Invariant::EventDateIsDate => "event_date must be a date",
            Invariant::UniqueMonthEntity => "(month_start, entity_id) must be unique in gold",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse classification of a `PipelineError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaMismatch,
    InvariantViolation,
    FetchFailure,
    NoDataForPeriod,
    InvalidInput,
    Storage,
}

// ============================================================================
// PIPELINE ERROR
// ============================================================================

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema mismatch in {source_name}: none of the required columns [{}] are present (found [{}])", .required.join(", "), .present.join(", "))]
    SchemaMismatch {
        source_name: String,
        required: Vec<String>,
        present: Vec<String>,
    },

    #[error("invariant violated: {invariant} ({total} offending rows, e.g. {})", .offending_keys.join("; "))]
    InvariantViolation {
        invariant: Invariant,
        offending_keys: Vec<String>,
        total: usize,
    },

    #[error("fetch failed for season {season} round {round}: {reason}")]
    FetchFailure {
        season: i32,
        round: u32,
        reason: String,
    },

    #[error("no data for month {month}{}", available_hint(.available))]
    NoDataForPeriod {
        month: String,
        available: Vec<String>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt stored data in {table}: {detail}")]
    CorruptStore { table: String, detail: String },
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        "; gold is empty, run a build first".to_string()
    } else {
        format!("; try one of: {}", available.join(", "))
    }
}

impl PipelineError {
    /// Classify the error, looking through stage wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            PipelineError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            PipelineError::FetchFailure { .. } => ErrorKind::FetchFailure,
            PipelineError::NoDataForPeriod { .. } => ErrorKind::NoDataForPeriod,
            PipelineError::InvalidArgument(_) | PipelineError::Config(_) => ErrorKind::InvalidInput,
            PipelineError::Stage { source, .. } => source.kind(),
            PipelineError::Io(_)
            | PipelineError::Csv(_)
            | PipelineError::Sqlite(_)
            | PipelineError::Json(_)
            | PipelineError::CorruptStore { .. } => ErrorKind::Storage,
        }
    }

    /// Tag the error with the stage it escaped from; the first tag sticks
    pub fn at(self, stage: Stage) -> Self {
        match self {
            PipelineError::Stage { .. } => self,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage this error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_stage_wrapper() {
        let err = PipelineError::InvariantViolation {
            invariant: Invariant::UniqueEventEntity,
            offending_keys: vec!["(1, 2)".to_string()],
            total: 2,
        }
        .at(Stage::Bronze);

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(err.stage(), Some(Stage::Bronze));
    }

    #[test]
    fn test_message_names_stage_and_invariant() {
        let err = PipelineError::InvariantViolation {
            invariant: Invariant::UniqueEventEntity,
            offending_keys: vec!["(18, 1)".to_string()],
            total: 2,
        }
        .at(Stage::Bronze);

        let msg = err.to_string();
        assert!(msg.starts_with("bronze stage failed"));
        assert!(msg.contains("(event_id, entity_id) must be unique"));
        assert!(msg.contains("(18, 1)"));
    }

    #[test]
    fn test_first_stage_tag_sticks() {
        let err = PipelineError::InvalidArgument("k".into())
            .at(Stage::Query)
            .at(Stage::Sink);
        assert_eq!(err.stage(), Some(Stage::Query));
    }

    #[test]
    fn test_no_data_message_names_month() {
        let err = PipelineError::NoDataForPeriod {
            month: "2012-08".to_string(),
            available: vec!["2012-07".to_string(), "2012-09".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2012-08"));
        assert!(msg.contains("2012-07, 2012-09"));
    }
}
