//! Query results: projected column names plus ordered rows.

use super::Value;
use crate::error::{CellFreqError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A single result row; values follow the owning [`RowSet`]'s column order.
pub type Row = Vec<Value>;

/// An ordered, column-projected result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    /// Tables the rows were read from; more than one for a join.
    pub sources: Vec<String>,
    /// Projected column names.
    pub columns: Vec<String>,
    /// Rows in stable store order.
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Create an empty result set for the given columns.
    pub fn new(table: &str, columns: Vec<String>) -> Self {
        Self::from_sources(vec![table.to_string()], columns)
    }

    /// Create an empty result set read from several tables.
    pub fn from_sources(sources: Vec<String>, columns: Vec<String>) -> Self {
        Self {
            sources,
            columns,
            rows: Vec::new(),
        }
    }

    /// Source tables joined for display, e.g. `overview+samples`.
    pub fn source_name(&self) -> String {
        self.sources.join("+")
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column in the projection.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                CellFreqError::schema(
                    &self.source_name(),
                    format!(
                        "column '{}' not in result set. Available: {:?}",
                        column, self.columns
                    ),
                )
            })
    }

    /// Value at a row and column name.
    pub fn get(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(idx))
            .ok_or_else(|| CellFreqError::InvalidParameter(format!("row {} out of range", row)))
    }

    /// All values of one column.
    pub fn column(&self, column: &str) -> Result<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Numeric values of one column, skipping nulls.
    pub fn f64_column(&self, column: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(column)?;
        let mut out = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            match &row[idx] {
                Value::Null => {}
                v => out.push(v.as_f64().ok_or_else(|| CellFreqError::InvalidValue {
                    value: v.to_string(),
                    row: i,
                    column: column.to_string(),
                })?),
            }
        }
        Ok(out)
    }

    /// Keep only rows for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(|r| keep(r));
    }

    /// Write as TSV with a header row.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_tsv(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write as TSV to any writer.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", fields.join("\t"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> RowSet {
        let mut set = RowSet::new("t", vec!["id".into(), "freq".into()]);
        set.rows.push(vec![Value::from("a"), Value::Real(0.25)]);
        set.rows.push(vec![Value::from("b"), Value::Null]);
        set.rows.push(vec![Value::from("c"), Value::Integer(1)]);
        set
    }

    #[test]
    fn test_f64_column_skips_nulls() {
        let set = sample_set();
        assert_eq!(set.f64_column("freq").unwrap(), vec![0.25, 1.0]);
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let set = sample_set();
        assert!(matches!(
            set.column("missing"),
            Err(CellFreqError::Schema { .. })
        ));
    }

    #[test]
    fn test_write_tsv() {
        let set = sample_set();
        let mut buf = Vec::new();
        set.write_tsv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "id\tfreq\na\t0.25\nb\tNA\nc\t1\n");
    }
}
