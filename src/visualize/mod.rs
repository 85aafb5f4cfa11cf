//! Per-group distribution summaries handed to charting front ends.
//!
//! Nothing here renders; a box plot of relative frequencies by response
//! needs only the five-number summary of each group.

use crate::data::RowSet;
use crate::error::Result;
use crate::filter::FilterEngine;
use serde::{Deserialize, Serialize};

/// Five-number summary of one group's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDistribution {
    pub group: String,
    pub n: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl GroupDistribution {
    /// Summarize `values`; `None` when there are none.
    pub fn from_values(group: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            group: group.to_string(),
            n: sorted.len(),
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }

    /// Interquartile range.
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Quantile of sorted data with linear interpolation between order statistics.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Summaries of `value_column` for each distinct value of `group_column`,
/// ordered by group. Nulls in either column are skipped.
pub fn distributions(
    rows: &RowSet,
    group_column: &str,
    value_column: &str,
) -> Result<Vec<GroupDistribution>> {
    let groups = FilterEngine::partition(rows, group_column)?;
    let mut out = Vec::with_capacity(groups.len());
    for (group, subset) in &groups {
        let values = subset.f64_column(value_column)?;
        if let Some(dist) = GroupDistribution::from_values(group, &values) {
            out.push(dist);
        }
    }
    Ok(out)
}
