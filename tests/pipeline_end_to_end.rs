// End-to-end: raw CSV exports on disk → bronze/gold layers → top-K → sink

use race_ledger::pipeline::load_gold;
use race_ledger::temporal::parse_month;
use race_ledger::{run_build, top_k, ErrorKind, PipelineConfig, SchemaNormalizer, SqliteSink, StageSchema};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fixture(dir: &Path) -> PipelineConfig {
    let raw = dir.join("raw");
    fs::create_dir_all(&raw).unwrap();
    fs::write(
        raw.join("races.csv"),
        "raceId,year,round,circuitId,name,date,time\n\
         860,2012,11,11,Hungarian Grand Prix,2012-07-29,\\N\n\
         861,2012,12,13,Belgian Grand Prix,2012-09-02,\\N\n",
    )
    .unwrap();
    fs::write(
        raw.join("constructors.csv"),
        "constructorId,constructorRef,name,nationality\n\
         1,mclaren,McLaren,British\n\
         6,ferrari,Ferrari,Italian\n",
    )
    .unwrap();
    fs::write(
        raw.join("constructor_results.csv"),
        "constructorResultsId,raceId,constructorId,points,status\n\
         1,860,1,25,\\N\n\
         2,860,6,18,\\N\n\
         3,861,1,abc,\\N\n\
         4,861,6,25,\\N\n",
    )
    .unwrap();

    PipelineConfig {
        data_dir: dir.to_path_buf(),
        reports_dir: dir.join("reports"),
        ..PipelineConfig::default()
    }
}

#[test]
fn two_events_two_entities_top_one() {
    let dir = TempDir::new().unwrap();
    let config = fixture(dir.path());

    let report = run_build(&config, None).unwrap();
    assert_eq!(report.bronze_rows, 4);
    assert_eq!(report.gold_rows, 4);
    // "abc" points became null, not a dropped row
    assert_eq!(report.quality.null_metric, 1);
    assert_eq!(report.loads[0].total_coerced(), 1);

    let gold = load_gold(&config).unwrap();
    let july = top_k(&gold, parse_month("2012-07").unwrap(), 1).unwrap();
    assert_eq!(july.len(), 1);
    assert_eq!(july[0].entity_name.as_deref(), Some("McLaren"));
    assert_eq!(july[0].metric_sum, 25.0);

    let september = top_k(&gold, parse_month("2012-09").unwrap(), 5).unwrap();
    assert_eq!(september.len(), 2);
    assert_eq!(september[0].entity_name.as_deref(), Some("Ferrari"));
    assert_eq!(september[1].metric_sum, 0.0);
}

#[test]
fn empty_month_names_the_month() {
    let dir = TempDir::new().unwrap();
    let config = fixture(dir.path());
    run_build(&config, None).unwrap();

    let gold = load_gold(&config).unwrap();
    let err = top_k(&gold, parse_month("2012-08").unwrap(), 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDataForPeriod);
    assert!(err.to_string().contains("2012-08"));
}

#[test]
fn rebuild_is_idempotent_and_replaces_sink() {
    let dir = TempDir::new().unwrap();
    let config = fixture(dir.path());
    let mut sink = SqliteSink::open(&dir.path().join("ledger.db")).unwrap();

    let first = run_build(&config, Some(&mut sink)).unwrap();
    let second = run_build(&config, Some(&mut sink)).unwrap();

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(sink.count("bronze_facts").unwrap(), 4);
    assert_eq!(sink.count("gold_monthly").unwrap(), 4);
    assert_eq!(sink.recent_runs(10).unwrap().len(), 2);
}

#[test]
fn legacy_headers_normalize_idempotently() {
    let table = race_ledger::RawTable::new(
        "legacy",
        vec!["raceId".to_string(), "constructor_name".to_string(), "constructorId".to_string()],
    )
    .with_row([Some("860"), Some("McLaren"), Some("1")]);

    let normalizer = SchemaNormalizer::reference_exports();
    let once = normalizer.normalize(table);
    let twice = normalizer.normalize(once.clone());
    assert_eq!(once, twice);
    assert!(StageSchema::entities().check(&once).unwrap() == race_ledger::ColumnAvailability::Complete);
}
