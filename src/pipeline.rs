// 🏗️ Pipeline - raw → bronze → gold, one fully materialized stage at a time
// Every error leaving a stage is tagged with that stage so a failed run says
// where it stopped.

use crate::bronze::{BronzeBuilder, BronzeTable};
use crate::config::PipelineConfig;
use crate::data_quality::{DataQualityEngine, QualityIssue, QualityReport};
use crate::error::{Result, Stage};
use crate::gold::{GoldAggregator, GoldTable};
use crate::harvest::{harvest_seasons_with, season_loader, HarvestSummary, Harvester};
use crate::layers;
use crate::loader::{LoadReport, RawLoader};
use crate::sink::{PipelineRun, SqliteSink};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

/// What a successful build produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub loads: Vec<LoadReport>,
    pub bronze_rows: usize,
    pub gold_rows: usize,
    pub unbucketed: usize,
    pub fingerprint: String,
    pub quality: QualityReport,
    pub load_issues: Vec<QualityIssue>,
    pub bronze_path: PathBuf,
    pub gold_path: PathBuf,
    pub sink_run_id: Option<String>,
}

impl PipelineReport {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "sources": self.loads.iter().map(|l| json!({
                "source": l.source_name,
                "rows": l.rows,
                "missing_columns": l.availability.missing(),
                "coerced_to_null": l.total_coerced(),
            })).collect::<Vec<_>>(),
            "bronze_rows": self.bronze_rows,
            "gold_rows": self.gold_rows,
            "unbucketed": self.unbucketed,
            "bronze_fingerprint": self.fingerprint,
        })
    }
}

fn loader_for(config: &PipelineConfig) -> RawLoader {
    RawLoader::new()
        .with_normalizer(config.normalizer())
        .with_null_tokens(config.null_tokens.clone())
}

/// Load the three reference exports and build the bronze table
pub fn build_bronze(config: &PipelineConfig) -> Result<(BronzeTable, Vec<LoadReport>)> {
    let loader = loader_for(config);

    let results = loader.load_results(&config.results_path()).map_err(|e| e.at(Stage::RawLoad))?;
    let events = loader.load_events(&config.races_path()).map_err(|e| e.at(Stage::RawLoad))?;
    let entities = loader
        .load_entities(&config.constructors_path())
        .map_err(|e| e.at(Stage::RawLoad))?;

    let bronze = BronzeBuilder::new()
        .build(&results.rows, &events.rows, &entities.rows)
        .map_err(|e| e.at(Stage::Bronze))?;

    // raw rows go out of scope here; only the reports survive
    Ok((bronze, vec![results.report, events.report, entities.report]))
}

/// Full rebuild: load, bronze, gold, layer files, then the optional sink
pub fn run_build(config: &PipelineConfig, sink: Option<&mut SqliteSink>) -> Result<PipelineReport> {
    info!(data_dir = %config.data_dir.display(), "build started");

    let (bronze, loads) = build_bronze(config)?;
    let bronze_path = config.bronze_path();
    layers::write_bronze(&bronze_path, &bronze).map_err(|e| e.at(Stage::Bronze))?;

    let engine = DataQualityEngine::new();
    let quality = engine.check_bronze(&bronze);
    let load_issues = engine.check_loads(&loads.iter().collect::<Vec<_>>());
    if quality.has_warnings() {
        warn!(summary = %quality.summary(), "bronze null checks");
    }

    let gold = GoldAggregator::new().aggregate(&bronze);
    let gold_path = config.gold_path();
    layers::write_gold(&gold_path, &gold.table).map_err(|e| e.at(Stage::Gold))?;

    let mut report = PipelineReport {
        bronze_rows: bronze.len(),
        gold_rows: gold.table.len(),
        unbucketed: gold.unbucketed,
        fingerprint: bronze.fingerprint(),
        loads,
        quality,
        load_issues,
        bronze_path,
        gold_path,
        sink_run_id: None,
    };

    if let Some(sink) = sink {
        let run = PipelineRun::new("build", report.to_json());
        sink.write_build(&bronze, &gold.table, &run).map_err(|e| e.at(Stage::Sink))?;
        report.sink_run_id = Some(run.run_id);
    }

    info!(
        bronze_rows = report.bronze_rows,
        gold_rows = report.gold_rows,
        fingerprint = %report.fingerprint,
        "build finished"
    );
    Ok(report)
}

/// Gold as persisted by the last build
pub fn load_gold(config: &PipelineConfig) -> Result<GoldTable> {
    layers::read_gold(&config.gold_path()).map_err(|e| e.at(Stage::Query))
}

/// Harvest seasons and, when a sink is given, replace `race_results`
///
/// Per-round failures are inside the returned summary; only sink errors fail.
pub fn run_harvest(
    config: &PipelineConfig,
    harvester: &dyn Harvester,
    seasons: impl IntoIterator<Item = i32>,
    sink: Option<&mut SqliteSink>,
) -> Result<HarvestSummary> {
    let loader = season_loader().with_null_tokens(config.null_tokens.clone());
    let summary = harvest_seasons_with(harvester, seasons, &loader);
    info!(
        seasons = summary.seasons.len(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "harvest finished"
    );

    if let Some(sink) = sink {
        let rows: Vec<_> = summary.results().cloned().collect();
        let run = PipelineRun::new(
            "harvest",
            json!({
                "seasons": summary.seasons.iter().map(|s| s.season).collect::<Vec<_>>(),
                "rows": rows.len(),
                "succeeded": summary.succeeded(),
                "failed": summary.failed(),
            }),
        );
        sink.write_race_results(&rows)
            .and_then(|_| sink.record_run(&run))
            .map_err(|e| e.at(Stage::Sink))?;
    }

    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
