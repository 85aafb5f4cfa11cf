//! Responder vs non-responder comparison of cell-type frequencies.

use crate::compare::{compare_groups, ComparisonResult, Group, TestKind};
use crate::correct::{correct_bh_comparisons, BhCorrected};
use crate::data::{CellType, RowSet};
use crate::error::Result;
use crate::filter::{Criteria, FilterEngine};
use crate::store::TabularStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

const JOIN_KEY: &str = "sample_id";
const CELL_TYPE_COLUMN: &str = "cell_type";
const FREQUENCY_COLUMN: &str = "relative_frequency";

/// Compare relative frequencies of every cell type between two groups of
/// samples.
///
/// Overview rows are joined to their sample's metadata, restricted by
/// `filters` and by `group_column` taking one of the two group values, then
/// split per cell type. Undefined frequencies are left out.
#[derive(Debug, Clone)]
pub struct ResponderAnalysis {
    pub samples_table: String,
    pub overview_table: String,
    pub filters: Criteria,
    pub group_column: String,
    pub group_a: String,
    pub group_b: String,
    pub test_kind: TestKind,
}

impl ResponderAnalysis {
    /// Compare `group_a` against `group_b` on `group_column`, using the
    /// default table names and the rank-based test.
    pub fn new(group_column: &str, group_a: &str, group_b: &str) -> Self {
        Self {
            samples_table: "samples".to_string(),
            overview_table: "overview".to_string(),
            filters: Criteria::new(),
            group_column: group_column.to_string(),
            group_a: group_a.to_string(),
            group_b: group_b.to_string(),
            test_kind: TestKind::RankBased,
        }
    }

    /// Restrict the samples entering the comparison.
    pub fn filters(mut self, filters: Criteria) -> Self {
        self.filters = filters;
        self
    }

    pub fn test_kind(mut self, test_kind: TestKind) -> Self {
        self.test_kind = test_kind;
        self
    }

    pub fn tables(mut self, samples: &str, overview: &str) -> Self {
        self.samples_table = samples.to_string();
        self.overview_table = overview.to_string();
        self
    }

    /// Fetch the rows entering the comparison: cell type, frequency and group
    /// value of every matching overview row.
    pub fn select(&self, store: &TabularStore) -> Result<RowSet> {
        let criteria = self
            .filters
            .clone()
            .one_of(&self.group_column, [self.group_a.as_str(), self.group_b.as_str()])?;
        FilterEngine::new(store).filter_joined(
            &self.overview_table,
            &self.samples_table,
            JOIN_KEY,
            &criteria,
            Some(&[CELL_TYPE_COLUMN, FREQUENCY_COLUMN, self.group_column.as_str()]),
        )
    }

    /// Run one comparison per cell type and adjust across them.
    ///
    /// # Errors
    /// * `InsufficientData` if a group has fewer than two defined frequencies
    ///   for some cell type.
    pub fn run(&self, store: &TabularStore) -> Result<ResponderReport> {
        let rows = self.select(store)?;
        let by_cell_type = FilterEngine::partition(&rows, CELL_TYPE_COLUMN)?;
        debug!(
            rows = rows.len(),
            cell_types = by_cell_type.len(),
            "responder selection"
        );

        let mut comparisons = Vec::with_capacity(CellType::ALL.len());
        for cell_type in CellType::ALL {
            let column = cell_type.column();
            let (values_a, values_b) = match by_cell_type.get(column) {
                Some(subset) => self.group_values(subset)?,
                None => (Vec::new(), Vec::new()),
            };
            comparisons.push(compare_groups(
                Group::new(&self.group_a, &values_a),
                Group::new(&self.group_b, &values_b),
                column,
                self.test_kind,
            )?);
        }

        let correction = correct_bh_comparisons(&comparisons);
        info!(
            test = %self.test_kind,
            group_column = %self.group_column,
            significant = correction.n_significant(0.05),
            "responder analysis complete"
        );
        Ok(ResponderReport {
            group_column: self.group_column.clone(),
            comparisons,
            correction,
        })
    }

    fn group_values(&self, subset: &RowSet) -> Result<(Vec<f64>, Vec<f64>)> {
        let groups = FilterEngine::partition(subset, &self.group_column)?;
        let values = |label: &str| -> Result<Vec<f64>> {
            match groups.get(label) {
                Some(rows) => rows.f64_column(FREQUENCY_COLUMN),
                None => Ok(Vec::new()),
            }
        };
        Ok((values(&self.group_a)?, values(&self.group_b)?))
    }
}

/// Per-cell-type comparisons plus their BH adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderReport {
    pub group_column: String,
    /// One result per cell type, in [`CellType::ALL`] order.
    pub comparisons: Vec<ComparisonResult>,
    /// Adjusted p-values labelled by cell type.
    pub correction: BhCorrected,
}

impl ResponderReport {
    /// Result for one cell type.
    pub fn get(&self, cell_type: CellType) -> Option<&ComparisonResult> {
        self.comparisons
            .iter()
            .find(|c| c.metric_column == cell_type.column())
    }

    /// Adjusted p-value for one cell type.
    pub fn q_value(&self, cell_type: CellType) -> Option<f64> {
        self.correction.get_qvalue(cell_type.column())
    }

    /// Cell types whose adjusted p-value is below `alpha`.
    pub fn significant(&self, alpha: f64) -> Vec<&ComparisonResult> {
        self.comparisons
            .iter()
            .zip(&self.correction.q_values)
            .filter(|(_, q)| **q < alpha)
            .map(|(c, _)| c)
            .collect()
    }
}

impl fmt::Display for ResponderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cell_type\t{a}_n\t{a}_mean\t{b}_n\t{b}_mean\ttest\tstatistic\tp_value\tq_value",
            a = self
                .comparisons
                .first()
                .map(|c| c.group_a_label.as_str())
                .unwrap_or("a"),
            b = self
                .comparisons
                .first()
                .map(|c| c.group_b_label.as_str())
                .unwrap_or("b"),
        )?;
        for (c, q) in self.comparisons.iter().zip(&self.correction.q_values) {
            writeln!(
                f,
                "{}\t{}\t{:.4}\t{}\t{:.4}\t{}\t{:.4}\t{:.4e}\t{:.4e}",
                c.metric_column,
                c.n_a,
                c.mean_a,
                c.n_b,
                c.mean_b,
                c.test_kind,
                c.statistic,
                c.p_value,
                q
            )?;
        }
        Ok(())
    }
}

/// Compare `value_column` between two values of `group_column` among the rows
/// of `table` matching `criteria`. Null values are left out.
#[allow(clippy::too_many_arguments)]
pub fn compare_filtered(
    store: &TabularStore,
    table: &str,
    criteria: &Criteria,
    group_column: &str,
    group_a: &str,
    group_b: &str,
    value_column: &str,
    test_kind: TestKind,
) -> Result<ComparisonResult> {
    let criteria = criteria
        .clone()
        .one_of(group_column, [group_a, group_b])?;
    let rows = FilterEngine::new(store).filter_columns(
        table,
        &criteria,
        &[group_column, value_column],
    )?;
    let mut groups: BTreeMap<String, RowSet> = FilterEngine::partition(&rows, group_column)?;
    let mut values = |label: &str| -> Result<Vec<f64>> {
        match groups.remove(label) {
            Some(rows) => rows.f64_column(value_column),
            None => Ok(Vec::new()),
        }
    };
    let values_a = values(group_a)?;
    let values_b = values(group_b)?;
    compare_groups(
        Group::new(group_a, &values_a),
        Group::new(group_b, &values_b),
        value_column,
        test_kind,
    )
}
