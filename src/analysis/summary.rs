//! Grouped counts over a filtered subset of a table.

use crate::error::Result;
use crate::filter::Criteria;
use crate::store::TabularStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row counts per distinct value of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub column: String,
    /// `(value, rows)` pairs ordered by value; nulls appear as `NA`.
    pub counts: Vec<(String, usize)>,
}

impl Breakdown {
    /// Rows with the given value, zero if absent.
    pub fn count(&self, value: &str) -> usize {
        self.counts
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Size of a subset plus its breakdown by several columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetSummary {
    pub table: String,
    pub total: usize,
    pub breakdowns: Vec<Breakdown>,
}

impl SubsetSummary {
    /// Breakdown for one column.
    pub fn breakdown(&self, column: &str) -> Option<&Breakdown> {
        self.breakdowns.iter().find(|b| b.column == column)
    }
}

impl fmt::Display for SubsetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} rows", self.table, self.total)?;
        for breakdown in &self.breakdowns {
            writeln!(f, "by {}:", breakdown.column)?;
            for (value, n) in &breakdown.counts {
                writeln!(f, "  {}\t{}", value, n)?;
            }
        }
        Ok(())
    }
}

/// Count the rows of `table` matching `criteria`, overall and per value of
/// each of `columns`.
pub fn subset_summary(
    store: &TabularStore,
    table: &str,
    criteria: &Criteria,
    columns: &[&str],
) -> Result<SubsetSummary> {
    let total = store.count_matching(table, criteria)?;
    let breakdowns = columns
        .iter()
        .map(|column| {
            let counts = store
                .count_by(table, criteria, column)?
                .into_iter()
                .map(|(value, n)| (value.to_string(), n))
                .collect();
            Ok(Breakdown {
                column: column.to_string(),
                counts,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SubsetSummary {
        table: table.to_string(),
        total,
        breakdowns,
    })
}
