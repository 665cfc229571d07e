// 📁 Layer Files - bronze and gold persisted as fixed-schema CSV
// Writes go to a sibling temp file first and are renamed into place, so a
// crashed run never leaves a truncated layer behind.

use crate::bronze::{BronzeFact, BronzeTable};
use crate::error::{PipelineError, Result};
use crate::gold::{GoldMonthlyFact, GoldTable};
use crate::schema::{BRONZE_COLUMNS, GOLD_COLUMNS};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// BRONZE
// ============================================================================

pub fn write_bronze(path: &Path, bronze: &BronzeTable) -> Result<()> {
    write_layer(path, &BRONZE_COLUMNS, bronze.facts())?;
    info!(path = %path.display(), rows = bronze.len(), "bronze layer written");
    Ok(())
}

/// Read a bronze layer back, re-checking the uniqueness invariant
pub fn read_bronze(path: &Path) -> Result<BronzeTable> {
    let facts: Vec<BronzeFact> = read_layer(path, &BRONZE_COLUMNS)?;
    BronzeTable::from_facts(facts)
}

// ============================================================================
// GOLD
// ============================================================================

pub fn write_gold(path: &Path, gold: &GoldTable) -> Result<()> {
    write_layer(path, &GOLD_COLUMNS, gold.rows())?;
    info!(path = %path.display(), rows = gold.len(), "gold layer written");
    Ok(())
}

pub fn read_gold(path: &Path) -> Result<GoldTable> {
    let rows: Vec<GoldMonthlyFact> = read_layer(path, &GOLD_COLUMNS)?;
    GoldTable::from_rows(rows)
}

// ============================================================================
// SHARED
// ============================================================================

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_layer<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut writer = WriterBuilder::new().has_headers(false).from_path(&tmp)?;
        // header written explicitly so an empty layer still carries its schema
        writer.write_record(columns)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_layer<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new().from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers != columns {
        return Err(PipelineError::SchemaMismatch {
            source_name: path.display().to_string(),
            required: columns.iter().map(|c| c.to_string()).collect(),
            present: headers,
        });
    }

    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gold::GoldAggregator;
    use chrono::NaiveDate;

    fn bronze() -> BronzeTable {
        BronzeTable::from_facts(vec![
            BronzeFact {
                event_id: 860,
                event_date: NaiveDate::from_ymd_opt(2012, 8, 5),
                entity_id: 1,
                entity_name: Some("McLaren".to_string()),
                metric: Some(25.0),
            },
            BronzeFact {
                event_id: 861,
                event_date: None,
                entity_id: 1,
                entity_name: None,
                metric: None,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_bronze_layer_keeps_nulls_and_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bronze").join("facts.csv");
        write_bronze(&path, &bronze()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("event_id,event_date,entity_id,entity_name,metric\n"));

        let back = read_bronze(&path).unwrap();
        assert_eq!(back, bronze());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_gold_layer_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.csv");
        let gold = GoldAggregator::new().aggregate(&bronze()).table;

        write_gold(&path, &gold).unwrap();
        write_gold(&path, &GoldTable::default()).unwrap();

        let back = read_gold(&path).unwrap();
        assert!(back.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "month_start,entity_id,entity_name,metric_sum\n");
    }

    #[test]
    fn test_wrong_header_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.csv");
        fs::write(&path, "month,entity,points\n2012-08-01,1,25\n").unwrap();

        let err = read_gold(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_duplicate_rows_rejected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bronze.csv");
        fs::write(
            &path,
            "event_id,event_date,entity_id,entity_name,metric\n1,2012-08-05,1,McLaren,1\n1,2012-08-05,1,McLaren,2\n",
        )
        .unwrap();

        assert_eq!(read_bronze(&path).unwrap_err().kind(), ErrorKind::InvariantViolation);
    }
}
