// Race Ledger - Core Library
// Raw reference exports → bronze facts → monthly gold → top-K queries

pub mod error;
pub mod table;
pub mod schema;       // Shape Layer - declared stage schemas
pub mod normalize;    // Era column drift
pub mod temporal;     // Month buckets
pub mod loader;
pub mod bronze;
pub mod data_quality; // Bronze null checks
pub mod gold;
pub mod query;
pub mod harvest;      // Live-timing season loop
pub mod layers;
pub mod sink;
pub mod pipeline;
pub mod report;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{ErrorKind, Invariant, PipelineError, Result, Stage};
pub use table::RawTable;
pub use schema::{ColumnAvailability, ColumnType, StageSchema, BRONZE_COLUMNS, GOLD_COLUMNS};
pub use normalize::{ColumnRename, SchemaNormalizer};
pub use loader::{
    DateValue, EntityNameRow, EventDateRow, LoadReport, Loaded, RawEventRecord, RawLoader,
};
pub use bronze::{BronzeBuilder, BronzeFact, BronzeTable};
pub use data_quality::{DataQualityEngine, QualityIssue, QualityReport, Severity};
pub use gold::{GoldAggregator, GoldMonthlyFact, GoldReport, GoldTable};
pub use query::{top_k, RankedEntity};
pub use harvest::{
    harvest_season, harvest_season_with, harvest_seasons, harvest_seasons_with, season_loader,
    DirectoryHarvester, EventOutcome, FailureReason, FetchFailure, HarvestSummary, Harvester,
    ScheduledRound, SeasonOutcome, SeasonRaceResult,
};
pub use sink::{PipelineRun, SqliteSink};
pub use pipeline::{run_build, run_harvest, PipelineReport};
pub use config::PipelineConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
