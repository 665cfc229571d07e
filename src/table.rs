// 🧾 Raw Table - the record set every raw source is read into
// Headers plus rows of nullable text cells; typing happens in the loader

use serde::{Deserialize, Serialize};

/// RawTable - untyped tabular data as read from a source
///
/// Cells are `None` when the source used a null token. Column order is the
/// order the source declared, renames never reorder columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTable {
    /// Where the rows came from (file name or harvester label), used in errors
    pub source_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(source_name: impl Into<String>, headers: Vec<String>) -> Self {
        RawTable {
            source_name: source_name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Builder: append a row of cells (short rows are padded with nulls)
    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.push_row(cells.into_iter().map(|c| c.map(Into::into)).collect());
        self
    }

    pub fn push_row(&mut self, mut cells: Vec<Option<String>>) {
        cells.resize(self.headers.len(), None);
        self.rows.push(cells);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell by row number and column name; `None` if either is absent or the cell is null
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Rename a column in place; returns false if `from` is absent
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.headers[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Keep only the named columns (in the given order), dropping the rest
    ///
    /// Names not present in the table are skipped, so callers must check
    /// availability first.
    pub fn project(self, columns: &[&str]) -> RawTable {
        let indices: Vec<(usize, String)> = columns
            .iter()
            .filter_map(|c| self.column_index(c).map(|i| (i, c.to_string())))
            .collect();

        let headers = indices.iter().map(|(_, name)| name.clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                indices
                    .iter()
                    .map(|(i, _)| row.get_mut(*i).and_then(Option::take))
                    .collect()
            })
            .collect();

        RawTable {
            source_name: self.source_name,
            headers,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawTable {
        RawTable::new("sample.csv", vec!["a".into(), "b".into(), "c".into()])
            .with_row([Some("1"), Some("x"), None])
            .with_row([Some("2"), None, Some("z")])
    }

    #[test]
    fn test_project_keeps_requested_order_and_drops_rest() {
        let projected = sample().project(&["c", "a"]);
        assert_eq!(projected.headers, vec!["c", "a"]);
        assert_eq!(projected.rows[0], vec![None, Some("1".to_string())]);
        assert_eq!(projected.rows[1], vec![Some("z".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn test_rename_missing_column_is_noop() {
        let mut t = sample();
        assert!(!t.rename_column("missing", "other"));
        assert_eq!(t, sample());
    }

    #[test]
    fn test_short_rows_are_padded() {
        let t = RawTable::new("t", vec!["a".into(), "b".into()]).with_row([Some("1")]);
        assert_eq!(t.rows[0].len(), 2);
        assert_eq!(t.cell(0, "b"), None);
    }
}
