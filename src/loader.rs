// 📥 Raw Loader - CSV reference exports → typed raw records
// Reads only the declared columns, coerces dates and numbers, and turns
// malformed values into nulls instead of failing the read.

use crate::error::Result;
use crate::normalize::SchemaNormalizer;
use crate::schema::{ColumnAvailability, StageSchema, ENTITY_ID, ENTITY_NAME, EVENT_DATE, EVENT_ID, METRIC};
use crate::table::RawTable;
use crate::temporal::parse_date;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// TYPED RAW RECORDS
// ============================================================================

/// A date cell after coercion
///
/// Values that do not parse are kept as text so the bronze build can report
/// them; they are never silently turned into dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DateValue {
    Date(NaiveDate),
    Unparsed(String),
}

/// Race calendar row: event_id → event_date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDateRow {
    pub event_id: Option<i64>,
    pub event_date: Option<DateValue>,
}

/// Constructor reference row: entity_id → entity_name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityNameRow {
    pub entity_id: Option<i64>,
    pub entity_name: Option<String>,
}

/// One (event, entity) result row before joining
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEventRecord {
    pub event_id: Option<i64>,
    pub entity_id: Option<i64>,
    pub metric: Option<f64>,
}

// ============================================================================
// LOAD REPORT
// ============================================================================

/// What happened while loading one source
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub source_name: String,
    pub rows: usize,
    pub availability: ColumnAvailability,
    /// Non-null cells per column that failed coercion and became null
    pub coerced_to_null: BTreeMap<&'static str, usize>,
}

impl LoadReport {
    pub fn total_coerced(&self) -> usize {
        self.coerced_to_null.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub report: LoadReport,
}

// ============================================================================
// RAW LOADER
// ============================================================================

pub struct RawLoader {
    normalizer: SchemaNormalizer,
    null_tokens: Vec<String>,
}

impl RawLoader {
    /// Loader for the reference CSV exports (`\N` and empty cells are null)
    pub fn new() -> Self {
        RawLoader {
            normalizer: SchemaNormalizer::reference_exports(),
            null_tokens: vec!["\\N".to_string(), String::new()],
        }
    }

    /// Builder: replace the normalizer
    pub fn with_normalizer(mut self, normalizer: SchemaNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Builder: replace the null tokens
    pub fn with_null_tokens(mut self, tokens: Vec<String>) -> Self {
        self.null_tokens = tokens;
        self
    }

    fn is_null(&self, cell: &str) -> bool {
        self.null_tokens.iter().any(|t| t == cell.trim())
    }

    /// Read a CSV file, materializing only `schema`'s columns
    ///
    /// Headers are normalized before the availability check, so legacy names
    /// count as present.
    pub fn read_csv(&self, path: &Path, schema: &StageSchema) -> Result<(RawTable, ColumnAvailability)> {
        let file = File::open(path)?;
        let source_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();
        self.read_reader(file, &source_name, schema)
    }

    /// Same as `read_csv` over any reader (used by tests and harvesters)
    pub fn read_reader<R: Read>(
        &self,
        input: R,
        source_name: &str,
        schema: &StageSchema,
    ) -> Result<(RawTable, ColumnAvailability)> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();
        let header_table = self.normalizer.normalize(RawTable::new(source_name, headers));
        let availability = schema.check(&header_table)?;

        let wanted: Vec<&'static str> = schema
            .column_names()
            .into_iter()
            .filter(|c| header_table.has_column(c))
            .collect();
        let indices: Vec<usize> = wanted
            .iter()
            .filter_map(|c| header_table.column_index(c))
            .collect();

        let mut table = RawTable::new(source_name, wanted.iter().map(|c| c.to_string()).collect());
        // only projected cells are decoded; bytes in other columns are never inspected
        for record in reader.byte_records() {
            let record = record?;
            let cells = indices
                .iter()
                .map(|&i| record.get(i).and_then(|c| self.decode_cell(c)))
                .collect();
            table.push_row(cells);
        }

        Ok((table, availability))
    }

    /// Read every column of a CSV, applying only the null tokens
    pub fn read_all<R: Read>(&self, input: R, source_name: &str) -> Result<RawTable> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);

        let headers = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();

        let mut table = RawTable::new(source_name, headers);
        for record in reader.byte_records() {
            let record = record?;
            table.push_row(record.iter().map(|c| self.decode_cell(c)).collect());
        }
        Ok(table)
    }

    /// Invalid UTF-8 becomes U+FFFD: text keeps the row, and numeric or date
    /// cells then fail coercion and are counted like any malformed value
    fn decode_cell(&self, raw: &[u8]) -> Option<String> {
        let cell = String::from_utf8_lossy(raw);
        let cell = cell.trim();
        (!self.is_null(cell)).then(|| cell.to_string())
    }

    /// Normalize and project an in-memory table against `schema`
    pub fn prepare(&self, table: RawTable, schema: &StageSchema) -> Result<(RawTable, ColumnAvailability)> {
        let mut table = self.normalizer.normalize(table);
        let availability = schema.check(&table)?;

        for row in &mut table.rows {
            for cell in row.iter_mut() {
                if cell.as_deref().map_or(false, |c| self.is_null(c)) {
                    *cell = None;
                }
            }
        }

        let columns = schema.column_names();
        Ok((table.project(&columns), availability))
    }

    // ========================================================================
    // TYPED LOADS
    // ========================================================================

    pub fn load_events(&self, path: &Path) -> Result<Loaded<EventDateRow>> {
        let schema = StageSchema::events();
        let (table, availability) = self.read_csv(path, &schema)?;
        Ok(self.type_events(table, availability))
    }

    pub fn load_entities(&self, path: &Path) -> Result<Loaded<EntityNameRow>> {
        let schema = StageSchema::entities();
        let (table, availability) = self.read_csv(path, &schema)?;
        Ok(self.type_entities(table, availability))
    }

    pub fn load_results(&self, path: &Path) -> Result<Loaded<RawEventRecord>> {
        let schema = StageSchema::results();
        let (table, availability) = self.read_csv(path, &schema)?;
        Ok(self.type_results(table, availability))
    }

    pub fn type_events(&self, table: RawTable, availability: ColumnAvailability) -> Loaded<EventDateRow> {
        let mut coercer = Coercer::new(&table);
        let rows = (0..table.len())
            .map(|i| EventDateRow {
                event_id: coercer.integer(i, EVENT_ID),
                event_date: coercer.date(i, EVENT_DATE),
            })
            .collect();
        coercer.finish(rows, availability)
    }

    pub fn type_entities(&self, table: RawTable, availability: ColumnAvailability) -> Loaded<EntityNameRow> {
        let mut coercer = Coercer::new(&table);
        let rows = (0..table.len())
            .map(|i| EntityNameRow {
                entity_id: coercer.integer(i, ENTITY_ID),
                entity_name: coercer.text(i, ENTITY_NAME),
            })
            .collect();
        coercer.finish(rows, availability)
    }

    pub fn type_results(&self, table: RawTable, availability: ColumnAvailability) -> Loaded<RawEventRecord> {
        let mut coercer = Coercer::new(&table);
        let rows = (0..table.len())
            .map(|i| RawEventRecord {
                event_id: coercer.integer(i, EVENT_ID),
                entity_id: coercer.integer(i, ENTITY_ID),
                metric: coercer.float(i, METRIC),
            })
            .collect();
        coercer.finish(rows, availability)
    }
}

impl Default for RawLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a numeric cell; non-numeric and non-finite values are null
pub fn coerce_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode an integer id; integral floats like `3.0` are accepted
pub fn coerce_integer(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    coerce_float(s)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

/// Cell-by-cell coercion that counts values turned into nulls
struct Coercer<'a> {
    table: &'a RawTable,
    coerced: BTreeMap<&'static str, usize>,
}

impl<'a> Coercer<'a> {
    fn new(table: &'a RawTable) -> Self {
        Coercer {
            table,
            coerced: BTreeMap::new(),
        }
    }

    fn convert<T>(&mut self, row: usize, column: &'static str, f: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.table.cell(row, column)?;
        let value = f(raw);
        if value.is_none() {
            *self.coerced.entry(column).or_insert(0) += 1;
        }
        value
    }

    fn integer(&mut self, row: usize, column: &'static str) -> Option<i64> {
        self.convert(row, column, coerce_integer)
    }

    fn float(&mut self, row: usize, column: &'static str) -> Option<f64> {
        self.convert(row, column, coerce_float)
    }

    fn date(&mut self, row: usize, column: &'static str) -> Option<DateValue> {
        let raw = self.table.cell(row, column)?;
        Some(match parse_date(raw) {
            Some(d) => DateValue::Date(d),
            None => DateValue::Unparsed(raw.to_string()),
        })
    }

    fn text(&mut self, row: usize, column: &'static str) -> Option<String> {
        self.table.cell(row, column).map(str::to_string)
    }

    fn finish<T>(self, rows: Vec<T>, availability: ColumnAvailability) -> Loaded<T> {
        let report = LoadReport {
            source_name: self.table.source_name.clone(),
            rows: rows.len(),
            availability,
            coerced_to_null: self.coerced,
        };

        if let ColumnAvailability::Degraded { missing, .. } = &report.availability {
            warn!(
                source = %report.source_name,
                missing = ?missing,
                "degraded schema, missing columns load as null"
            );
        }
        if report.total_coerced() > 0 {
            warn!(
                source = %report.source_name,
                coerced = ?report.coerced_to_null,
                "malformed values coerced to null"
            );
        }
        info!(source = %report.source_name, rows = report.rows, "loaded raw source");

        Loaded { rows, report }
    }
}

// ============================================================================
// TESTS
// ============================================================================
