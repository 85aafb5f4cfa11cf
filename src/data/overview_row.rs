//! Long-format summary rows: one per (sample, cell type).

use super::{CellType, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One derived (sample, cell type) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewRow {
    /// Sample this row was derived from.
    pub sample_id: String,
    /// Cell population.
    pub cell_type: CellType,
    /// Count of this population in the sample.
    pub count: u64,
    /// Total cell count of the sample.
    pub total_count: u64,
    /// `count / total_count`; `None` means undefined (total_count is 0).
    pub relative_frequency: Option<f64>,
}

impl OverviewRow {
    /// Relative frequency as a percentage, if defined.
    pub fn percentage(&self) -> Option<f64> {
        self.relative_frequency.map(|f| f * 100.0)
    }

    /// Values in the column order of the overview table.
    ///
    /// Fails with `InvalidValue` when a count does not fit a store integer.
    pub fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::from(self.sample_id.as_str()),
            Value::from(self.cell_type.column()),
            Value::count(self.count, "count")?,
            Value::count(self.total_count, "total_count")?,
            Value::from(self.relative_frequency),
        ])
    }
}

impl fmt::Display for OverviewRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t",
            self.sample_id, self.cell_type, self.count, self.total_count
        )?;
        match self.relative_frequency {
            Some(freq) => write!(f, "{:.6}", freq),
            None => write!(f, "undefined"),
        }
    }
}
