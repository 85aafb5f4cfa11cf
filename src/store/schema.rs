//! Table schemas registered in the store.

use crate::data::{CellType, Value};
use crate::error::{CellFreqError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// SQL type name used in `CREATE TABLE`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Map a declared SQL type back to a column type (SQLite affinity rules).
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Text
        }
    }

    /// Convert a criterion operand to this storage type.
    pub fn coerce(&self, column: &str, value: &Value) -> Result<Value> {
        let not_numeric = |v: &Value| {
            CellFreqError::invalid_criterion(
                column,
                format!("'{}' is not a number but the column is {}", v, self.sql_name()),
            )
        };
        match (self, value) {
            (_, Value::Null) => Err(CellFreqError::invalid_criterion(
                column,
                "null is not a comparable value",
            )),
            (Self::Text, Value::Text(_)) => Ok(value.clone()),
            (Self::Text, v) => Ok(Value::Text(v.to_string())),
            (Self::Integer, Value::Integer(_)) | (Self::Real, Value::Real(_)) => Ok(value.clone()),
            (Self::Integer, Value::Real(_)) => Ok(value.clone()),
            (Self::Real, Value::Integer(i)) => Ok(Value::Real(*i as f64)),
            (Self::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| s.trim().parse::<f64>().map(Value::Real))
                .map_err(|_| not_numeric(value)),
            (Self::Real, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| not_numeric(value)),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// Schema of one logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Create a schema, validating table and column names as SQL identifiers.
    pub fn new(name: &str, columns: Vec<ColumnDef>) -> Result<Self> {
        check_identifier(name, name)?;
        if columns.is_empty() {
            return Err(CellFreqError::schema(name, "table must have at least one column"));
        }
        for col in &columns {
            check_identifier(name, &col.name)?;
        }
        Ok(Self {
            name: name.to_string(),
            columns,
        })
    }

    /// Wide schema of the raw samples table: one row per sample.
    pub fn samples(name: &str) -> Result<Self> {
        use ColumnType::*;
        let mut columns = vec![
            ColumnDef::new("sample_id", Text),
            ColumnDef::new("project", Text),
            ColumnDef::new("subject_id", Text),
            ColumnDef::new("condition", Text),
            ColumnDef::new("age", Integer),
            ColumnDef::new("sex", Text),
            ColumnDef::new("treatment", Text),
            ColumnDef::new("response", Text),
            ColumnDef::new("sample_type", Text),
            ColumnDef::new("time_from_treatment_start", Integer),
        ];
        for cell_type in CellType::ALL {
            columns.push(ColumnDef::new(cell_type.column(), Integer));
        }
        columns.push(ColumnDef::new("total_count", Integer));
        Self::new(name, columns)
    }

    /// Long schema of the overview table: one row per sample and cell type.
    pub fn overview(name: &str) -> Result<Self> {
        use ColumnType::*;
        Self::new(
            name,
            vec![
                ColumnDef::new("sample_id", Text),
                ColumnDef::new("cell_type", Text),
                ColumnDef::new("count", Integer),
                ColumnDef::new("total_count", Integer),
                ColumnDef::new("relative_frequency", Real),
            ],
        )
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a column, failing with a schema error that names the table.
    pub fn column(&self, name: &str) -> Result<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name).ok_or_else(|| {
            CellFreqError::schema(
                &self.name,
                format!(
                    "unknown column '{}'. Available: {:?}",
                    name,
                    self.column_names()
                ),
            )
        })
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// `CREATE TABLE` statement for this schema.
    pub fn create_sql(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.column_type.sql_name()))
            .collect();
        format!("CREATE TABLE {} ({})", quote(&self.name), cols.join(", "))
    }

    /// Parameterized `INSERT` statement for this schema.
    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| quote(&c.name)).collect();
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&self.name),
            names.join(", "),
            placeholders
        )
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Reject names that cannot be safely interpolated into SQL.
pub fn check_identifier(table: &str, name: &str) -> Result<()> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CellFreqError::schema(
            table,
            format!("'{}' is not a valid identifier", name),
        ))
    }
}

/// Quote an identifier that has passed [`check_identifier`].
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}
