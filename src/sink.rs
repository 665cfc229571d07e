// 🗄️ SQLite Sink - wholesale table replacement plus a run log
// Each write replaces its tables inside a single transaction, so readers see
// either the previous tables or the new ones, never a half-written mix.

use crate::bronze::BronzeTable;
use crate::error::{PipelineError, Result};
use crate::gold::GoldTable;
use crate::harvest::SeasonRaceResult;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const RACE_RESULTS_TABLE: &str = "race_results";
pub const BRONZE_TABLE: &str = "bronze_facts";
pub const GOLD_TABLE: &str = "gold_monthly";

const RACE_RESULTS_DDL: &str = "CREATE TABLE race_results (
    season INTEGER NOT NULL,
    round INTEGER NOT NULL,
    race_name TEXT NOT NULL,
    driver_name TEXT,
    constructor_name TEXT,
    grid_position INTEGER,
    position INTEGER,
    points REAL,
    status TEXT
)";

const BRONZE_DDL: &str = "CREATE TABLE bronze_facts (
    event_id INTEGER NOT NULL,
    event_date TEXT,
    entity_id INTEGER NOT NULL,
    entity_name TEXT,
    metric REAL,
    PRIMARY KEY (event_id, entity_id)
)";

const GOLD_DDL: &str = "CREATE TABLE gold_monthly (
    month_start TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    entity_name TEXT,
    metric_sum REAL NOT NULL,
    PRIMARY KEY (month_start, entity_id)
)";

// ============================================================================
// RUN LOG
// ============================================================================

/// PipelineRun - one row of the `pipeline_runs` audit table
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PipelineRun {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub data: serde_json::Value,
}

impl PipelineRun {
    pub fn new(command: &str, data: serde_json::Value) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            command: command.to_string(),
            data,
        }
    }
}

// ============================================================================
// SINK HANDLE
// ============================================================================

/// SqliteSink - explicit handle passed to whichever stage writes tables
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::setup(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pipeline_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                command TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;
        Ok(SqliteSink { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Drop and recreate `table`, then let `fill` insert rows, all in one transaction
    ///
    /// Any error from `fill` rolls the transaction back and leaves the previous
    /// table untouched.
    pub fn replace_table<F>(&mut self, table: &str, ddl: &str, fill: F) -> Result<usize>
    where
        F: FnOnce(&Transaction<'_>) -> Result<usize>,
    {
        let tx = self.conn.transaction()?;
        recreate(&tx, table, ddl)?;
        // dropping `tx` on the error path rolls back
        let rows = fill(&tx)?;
        tx.commit()?;
        info!(table, rows, "sink table replaced");
        Ok(rows)
    }

    pub fn write_race_results(&mut self, results: &[SeasonRaceResult]) -> Result<usize> {
        self.replace_table(RACE_RESULTS_TABLE, RACE_RESULTS_DDL, |tx| insert_race_results(tx, results))
    }

    pub fn write_bronze(&mut self, bronze: &BronzeTable) -> Result<usize> {
        self.replace_table(BRONZE_TABLE, BRONZE_DDL, |tx| insert_bronze(tx, bronze))
    }

    pub fn write_gold(&mut self, gold: &GoldTable) -> Result<usize> {
        self.replace_table(GOLD_TABLE, GOLD_DDL, |tx| insert_gold(tx, gold))
    }

    /// Replace bronze and gold and log the run in a single transaction, so the
    /// sink never pairs a new bronze with an old gold
    pub fn write_build(&mut self, bronze: &BronzeTable, gold: &GoldTable, run: &PipelineRun) -> Result<()> {
        let tx = self.conn.transaction()?;
        recreate(&tx, BRONZE_TABLE, BRONZE_DDL)?;
        let bronze_rows = insert_bronze(&tx, bronze)?;
        recreate(&tx, GOLD_TABLE, GOLD_DDL)?;
        let gold_rows = insert_gold(&tx, gold)?;
        insert_run(&tx, run)?;
        tx.commit()?;
        info!(bronze_rows, gold_rows, run_id = %run.run_id, "sink build tables replaced");
        Ok(())
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Month keys present in the sink's gold table, ascending
    pub fn gold_months(&self) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT month_start FROM gold_monthly ORDER BY month_start")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| PipelineError::CorruptStore {
                        table: GOLD_TABLE.to_string(),
                        detail: format!("bad month_start '{}': {}", s, e),
                    })
            })
            .collect()
    }

    // ========================================================================
    // RUN LOG
    // ========================================================================

    pub fn record_run(&self, run: &PipelineRun) -> Result<()> {
        insert_run(&self.conn, run)
    }

    /// Most recent runs first
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, timestamp, command, data FROM pipeline_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let raw = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(run_id, ts, command, data)| {
                let timestamp = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| PipelineError::CorruptStore {
                        table: "pipeline_runs".to_string(),
                        detail: format!("bad run timestamp '{}': {}", ts, e),
                    })?
                    .with_timezone(&Utc);
                Ok(PipelineRun {
                    run_id,
                    timestamp,
                    command,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }
}

// ============================================================================
// STATEMENTS
// ============================================================================

fn recreate(conn: &Connection, table: &str, ddl: &str) -> Result<()> {
    conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
    conn.execute(ddl, [])?;
    Ok(())
}

fn insert_race_results(conn: &Connection, results: &[SeasonRaceResult]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO race_results (
            season, round, race_name, driver_name, constructor_name,
            grid_position, position, points, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for r in results {
        stmt.execute(params![
            r.season,
            r.round,
            r.race_name,
            r.driver_name,
            r.constructor_name,
            r.grid_position,
            r.position,
            r.points,
            r.status,
        ])?;
    }
    Ok(results.len())
}

fn insert_bronze(conn: &Connection, bronze: &BronzeTable) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO bronze_facts (event_id, event_date, entity_id, entity_name, metric)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for f in bronze.facts() {
        stmt.execute(params![
            f.event_id,
            f.event_date.map(|d| d.to_string()),
            f.entity_id,
            f.entity_name,
            f.metric,
        ])?;
    }
    Ok(bronze.len())
}

fn insert_gold(conn: &Connection, gold: &GoldTable) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO gold_monthly (month_start, entity_id, entity_name, metric_sum)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for r in gold.rows() {
        stmt.execute(params![r.month_start.to_string(), r.entity_id, r.entity_name, r.metric_sum])?;
    }
    Ok(gold.len())
}

fn insert_run(conn: &Connection, run: &PipelineRun) -> Result<()> {
    let data_json = serde_json::to_string(&run.data)?;
    conn.execute(
        "INSERT INTO pipeline_runs (run_id, timestamp, command, data) VALUES (?1, ?2, ?3, ?4)",
        params![run.run_id, run.timestamp.to_rfc3339(), run.command, data_json],
    )?;
    debug!(run_id = %run.run_id, command = %run.command, "run recorded");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bronze::BronzeFact;
    use crate::gold::GoldAggregator;
    use crate::error::ErrorKind;

    fn bronze() -> BronzeTable {
        BronzeTable::from_facts(vec![
            BronzeFact {
                event_id: 1,
                event_date: NaiveDate::from_ymd_opt(2012, 8, 5),
                entity_id: 6,
                entity_name: Some("Ferrari".to_string()),
                metric: Some(18.0),
            },
            BronzeFact {
                event_id: 2,
                event_date: None,
                entity_id: 6,
                entity_name: None,
                metric: None,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_write_bronze_and_gold() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let bronze = bronze();
        let gold = GoldAggregator::new().aggregate(&bronze).table;

        assert_eq!(sink.write_bronze(&bronze).unwrap(), 2);
        assert_eq!(sink.write_gold(&gold).unwrap(), 1);
        assert_eq!(sink.count(BRONZE_TABLE).unwrap(), 2);
        assert_eq!(sink.gold_months().unwrap(), vec![NaiveDate::from_ymd_opt(2012, 8, 1).unwrap()]);

        println!("✅ Bronze and gold written to sink");
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.write_bronze(&bronze()).unwrap();
        sink.write_bronze(&BronzeTable::from_facts(vec![]).unwrap()).unwrap();
        assert_eq!(sink.count(BRONZE_TABLE).unwrap(), 0);
    }

    #[test]
    fn test_failed_replace_keeps_previous_table() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.write_bronze(&bronze()).unwrap();

        let result = sink.replace_table(BRONZE_TABLE, BRONZE_DDL, |_tx| {
            Err(PipelineError::InvalidArgument("boom".to_string()))
        });

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(sink.count(BRONZE_TABLE).unwrap(), 2);
        println!("✅ Rolled back replace left old rows in place");
    }

    #[test]
    fn test_race_results_written() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let rows = vec![SeasonRaceResult {
            season: 2023,
            round: 1,
            race_name: "Bahrain Grand Prix".to_string(),
            driver_name: Some("M VERSTAPPEN".to_string()),
            constructor_name: Some("Red Bull Racing".to_string()),
            grid_position: Some(1),
            position: Some(1),
            points: Some(25.0),
            status: Some("Finished".to_string()),
        }];
        assert_eq!(sink.write_race_results(&rows).unwrap(), 1);

        let name: String = sink
            .connection()
            .query_row("SELECT race_name FROM race_results WHERE round = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Bahrain Grand Prix");
    }

    #[test]
    fn test_run_log_round_trip() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.record_run(&PipelineRun::new("build", serde_json::json!({"bronze_rows": 2}))).unwrap();
        sink.record_run(&PipelineRun::new("harvest", serde_json::json!({"failed": 1}))).unwrap();

        let runs = sink.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].command, "harvest");
        assert_eq!(runs[1].data["bronze_rows"], 2);
    }

    #[test]
    fn test_failed_build_keeps_bronze_and_gold_together() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let bronze = bronze();
        let gold = GoldAggregator::new().aggregate(&bronze).table;
        let run = PipelineRun::new("build", serde_json::json!({"bronze_rows": 2}));
        sink.write_build(&bronze, &gold, &run).unwrap();

        // same run_id again trips the UNIQUE run log after both tables were recreated
        let empty = BronzeTable::from_facts(vec![]).unwrap();
        let empty_gold = GoldAggregator::new().aggregate(&empty).table;
        let err = sink.write_build(&empty, &empty_gold, &run).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(sink.count(BRONZE_TABLE).unwrap(), 2);
        assert_eq!(sink.count(GOLD_TABLE).unwrap(), 1);
        assert_eq!(sink.recent_runs(10).unwrap().len(), 1);
        println!("✅ Failed build left bronze, gold and run log as they were");
    }

    #[test]
    fn test_corrupt_month_start_is_a_storage_error() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let bronze = bronze();
        sink.write_gold(&GoldAggregator::new().aggregate(&bronze).table).unwrap();
        sink.connection()
            .execute(
                "INSERT INTO gold_monthly (month_start, entity_id, entity_name, metric_sum)
                 VALUES ('2012-13', 7, NULL, 1.0)",
                [],
            )
            .unwrap();

        let err = sink.gold_months().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("gold_monthly"));
    }

    #[test]
    fn test_corrupt_run_timestamp_is_a_storage_error() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.connection()
            .execute(
                "INSERT INTO pipeline_runs (run_id, timestamp, command, data)
                 VALUES ('r1', 'yesterday', 'build', '{}')",
                [],
            )
            .unwrap();

        assert_eq!(sink.recent_runs(1).unwrap_err().kind(), ErrorKind::Storage);
    }
}
