// 🛰️ Season Harvest - per-round results from the live-timing collaborator
// Every round is fetched independently; a failed round is recorded and
// skipped, it never aborts the season or the run.

use crate::error::PipelineError;
use crate::loader::{coerce_float, coerce_integer, RawLoader};
use crate::normalize::SchemaNormalizer;
use crate::schema::StageSchema;
use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// BOUNDARY TYPES
// ============================================================================

/// One scheduled round of a season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRound {
    pub round: u32,
    pub event_name: String,
}

/// SeasonRaceResult - one row per (season, round, driver) from the harvester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRaceResult {
    pub season: i32,
    pub round: u32,
    pub race_name: String,
    pub driver_name: Option<String>,
    pub constructor_name: Option<String>,
    pub grid_position: Option<i64>,
    pub position: Option<i64>,
    pub points: Option<f64>,
    pub status: Option<String>,
}

/// Column order of the `race_results` sink table
pub const SEASON_RESULT_COLUMNS: [&str; 9] = [
    "season",
    "round",
    "race_name",
    "driver_name",
    "constructor_name",
    "grid_position",
    "position",
    "points",
    "status",
];

// ============================================================================
// FETCH FAILURES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The source has nothing for this round (cancelled race, missing file)
    Unavailable(String),
    /// The source answered but the payload could not be read
    Unreadable(String),
    /// The payload carried none of the expected result columns
    NoResultColumns,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Unavailable(msg) => write!(f, "unavailable: {}", msg),
            FailureReason::Unreadable(msg) => write!(f, "unreadable: {}", msg),
            FailureReason::NoResultColumns => write!(f, "no result columns"),
        }
    }
}

/// FetchFailure - one round the harvester could not deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub season: i32,
    /// 0 when the season schedule itself could not be fetched
    pub round: u32,
    pub reason: FailureReason,
}

impl From<FetchFailure> for PipelineError {
    fn from(f: FetchFailure) -> Self {
        PipelineError::FetchFailure {
            season: f.season,
            round: f.round,
            reason: f.reason.to_string(),
        }
    }
}

// ============================================================================
// HARVESTER COLLABORATOR
// ============================================================================

/// Harvester - "given a season and round, return a row set or a fetch failure"
///
/// Implementations own retries, timeouts and any internal parallelism.
pub trait Harvester {
    fn schedule(&self, season: i32) -> Result<Vec<ScheduledRound>, FetchFailure>;

    fn fetch_round(&self, season: i32, round: u32) -> Result<RawTable, FetchFailure>;

    /// Label used in logs
    fn name(&self) -> &str {
        "harvester"
    }
}

// ============================================================================
// SEASON OUTCOME
// ============================================================================

/// Per-round result of the season loop
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Fetched { round: u32, rows: usize },
    Failed(FetchFailure),
}

/// Everything one season produced, plus failure accounting
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeasonOutcome {
    pub season: i32,
    pub results: Vec<SeasonRaceResult>,
    pub events: Vec<EventOutcome>,
}

impl SeasonOutcome {
    pub fn succeeded(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, EventOutcome::Fetched { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.events.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchFailure> {
        self.events.iter().filter_map(|e| match e {
            EventOutcome::Failed(f) => Some(f),
            EventOutcome::Fetched { .. } => None,
        })
    }
}

/// Outcome of a multi-season harvest
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HarvestSummary {
    pub seasons: Vec<SeasonOutcome>,
}

impl HarvestSummary {
    pub fn results(&self) -> impl Iterator<Item = &SeasonRaceResult> {
        self.seasons.iter().flat_map(|s| s.results.iter())
    }

    pub fn into_results(self) -> Vec<SeasonRaceResult> {
        self.seasons.into_iter().flat_map(|s| s.results).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.seasons.iter().map(SeasonOutcome::succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.seasons.iter().map(SeasonOutcome::failed).sum()
    }
}

// ============================================================================
// SEASON LOOP
// ============================================================================

/// Loader that normalizes live-timing columns; chain `with_null_tokens` to
/// apply configured null tokens
pub fn season_loader() -> RawLoader {
    RawLoader::new().with_normalizer(SchemaNormalizer::season_results())
}

/// Fetch every race round (> 0) of a season, absorbing per-round failures
pub fn harvest_season(harvester: &dyn Harvester, season: i32) -> SeasonOutcome {
    harvest_season_with(harvester, season, &season_loader())
}

pub fn harvest_season_with(harvester: &dyn Harvester, season: i32, loader: &RawLoader) -> SeasonOutcome {
    let mut outcome = SeasonOutcome {
        season,
        ..Default::default()
    };

    let schedule = match harvester.schedule(season) {
        Ok(s) => s,
        Err(failure) => {
            warn!(season, reason = %failure.reason, "season schedule unavailable");
            outcome.events.push(EventOutcome::Failed(failure));
            return outcome;
        }
    };

    let schema = StageSchema::season_results();

    // round 0 is pre-season testing
    for scheduled in schedule.into_iter().filter(|r| r.round > 0) {
        let fetched = harvester
            .fetch_round(season, scheduled.round)
            .and_then(|table| {
                to_results(loader, &schema, table, season, &scheduled).map_err(|reason| FetchFailure {
                    season,
                    round: scheduled.round,
                    reason,
                })
            });

        match fetched {
            Ok(rows) => {
                info!(season, round = scheduled.round, race = %scheduled.event_name, rows = rows.len(), "fetched round");
                outcome.events.push(EventOutcome::Fetched {
                    round: scheduled.round,
                    rows: rows.len(),
                });
                outcome.results.extend(rows);
            }
            Err(failure) => {
                warn!(season, round = failure.round, race = %scheduled.event_name, reason = %failure.reason, "skipping round");
                outcome.events.push(EventOutcome::Failed(failure));
            }
        }
    }

    info!(
        season,
        harvester = harvester.name(),
        succeeded = outcome.succeeded(),
        failed = outcome.failed(),
        "season harvested"
    );
    outcome
}

/// Harvest several seasons in order
pub fn harvest_seasons(harvester: &dyn Harvester, seasons: impl IntoIterator<Item = i32>) -> HarvestSummary {
    harvest_seasons_with(harvester, seasons, &season_loader())
}

pub fn harvest_seasons_with(
    harvester: &dyn Harvester,
    seasons: impl IntoIterator<Item = i32>,
    loader: &RawLoader,
) -> HarvestSummary {
    HarvestSummary {
        seasons: seasons
            .into_iter()
            .map(|season| harvest_season_with(harvester, season, loader))
            .collect(),
    }
}

fn to_results(
    loader: &RawLoader,
    schema: &StageSchema,
    table: RawTable,
    season: i32,
    scheduled: &ScheduledRound,
) -> Result<Vec<SeasonRaceResult>, FailureReason> {
    let (table, availability) = loader
        .prepare(table, schema)
        .map_err(|_| FailureReason::NoResultColumns)?;

    if availability.is_degraded() {
        warn!(season, round = scheduled.round, missing = ?availability.missing(), "round results use a reduced schema");
    }

    let text = |row: usize, col: &str| table.cell(row, col).map(str::to_string);
    Ok((0..table.len())
        .map(|i| SeasonRaceResult {
            season,
            round: scheduled.round,
            race_name: scheduled.event_name.clone(),
            driver_name: text(i, "driver_name"),
            constructor_name: text(i, "constructor_name"),
            grid_position: table.cell(i, "grid_position").and_then(coerce_integer),
            position: table.cell(i, "position").and_then(coerce_integer),
            points: table.cell(i, "points").and_then(coerce_float),
            status: text(i, "status"),
        })
        .collect())
}

// ============================================================================
// DIRECTORY HARVESTER
// ============================================================================

/// DirectoryHarvester - replays cached live-timing exports from disk
///
/// Layout: `<root>/<season>/schedule.csv` (`RoundNumber`, `EventName`) and
/// `<root>/<season>/round_<NN>.csv` with the per-driver results.
pub struct DirectoryHarvester {
    root: PathBuf,
    loader: RawLoader,
}

impl DirectoryHarvester {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryHarvester {
            root: root.into(),
            loader: RawLoader::new(),
        }
    }

    /// Builder: null tokens applied to every file read
    pub fn with_null_tokens(mut self, tokens: Vec<String>) -> Self {
        self.loader = self.loader.with_null_tokens(tokens);
        self
    }

    fn season_dir(&self, season: i32) -> PathBuf {
        self.root.join(season.to_string())
    }

    pub fn round_path(&self, season: i32, round: u32) -> PathBuf {
        self.season_dir(season).join(format!("round_{:02}.csv", round))
    }

    fn read_table(&self, path: &Path) -> Result<RawTable, FailureReason> {
        let file = File::open(path).map_err(|e| FailureReason::Unavailable(format!("{}: {}", path.display(), e)))?;
        self.loader
            .read_all(file, &path.display().to_string())
            .map_err(|e| FailureReason::Unreadable(format!("{}: {}", path.display(), e)))
    }
}

impl Harvester for DirectoryHarvester {
    fn schedule(&self, season: i32) -> Result<Vec<ScheduledRound>, FetchFailure> {
        let table = self
            .read_table(&self.season_dir(season).join("schedule.csv"))
            .map_err(|reason| FetchFailure { season, round: 0, reason })?;

        let mut rounds = Vec::new();
        for i in 0..table.len() {
            let round = table
                .cell(i, "RoundNumber")
                .and_then(coerce_integer)
                .and_then(|r| u32::try_from(r).ok());
            let name = table.cell(i, "EventName").unwrap_or("").to_string();
            match round {
                Some(round) => rounds.push(ScheduledRound { round, event_name: name }),
                None => warn!(season, row = i + 1, event = %name, "schedule row has no RoundNumber, skipping"),
            }
        }
        Ok(rounds)
    }

    fn fetch_round(&self, season: i32, round: u32) -> Result<RawTable, FetchFailure> {
        self.read_table(&self.round_path(season, round))
            .map_err(|reason| FetchFailure { season, round, reason })
    }

    fn name(&self) -> &str {
        "directory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
