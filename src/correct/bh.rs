//! Benjamini-Hochberg false discovery rate correction.

use crate::compare::ComparisonResult;
use serde::{Deserialize, Serialize};

/// Result of BH correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BhCorrected {
    /// Labels in original order.
    pub labels: Vec<String>,
    /// Original p-values.
    pub p_values: Vec<f64>,
    /// Adjusted p-values (q-values).
    pub q_values: Vec<f64>,
    /// Number of tests.
    pub n_tests: usize,
}

impl BhCorrected {
    /// Get q-value for a specific label.
    pub fn get_qvalue(&self, label: &str) -> Option<f64> {
        let idx = self.labels.iter().position(|l| l == label)?;
        self.q_values.get(idx).copied()
    }

    /// Count significant results at a threshold.
    pub fn n_significant(&self, alpha: f64) -> usize {
        self.q_values.iter().filter(|&&q| q < alpha).count()
    }

    /// Step-up threshold `rank / n * alpha` for each test, in original order.
    ///
    /// A test is a discovery when its p-value is at or below the threshold of
    /// the largest rank that passes.
    pub fn thresholds(&self, alpha: f64) -> Vec<f64> {
        let ranks = sorted_indices(&self.p_values);
        let mut thresholds = vec![0.0; self.n_tests];
        for (rank, &idx) in ranks.iter().enumerate() {
            thresholds[idx] = (rank + 1) as f64 / self.n_tests as f64 * alpha;
        }
        thresholds
    }
}

fn sorted_indices(p_values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..p_values.len()).collect();
    indices.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices
}

/// Apply Benjamini-Hochberg FDR correction.
///
/// For each p-value, the adjusted p-value (q-value) is calculated as:
/// q[i] = min(p[i] * n / rank[i], q[i+1])
///
/// # Arguments
/// * `p_values` - Raw p-values
/// * `labels` - Test labels (same order as p_values)
pub fn correct_bh(p_values: &[f64], labels: &[String]) -> BhCorrected {
    let n = p_values.len();
    if n == 0 {
        return BhCorrected {
            labels: vec![],
            p_values: vec![],
            q_values: vec![],
            n_tests: 0,
        };
    }

    let indices = sorted_indices(p_values);

    let mut q_sorted = vec![0.0; n];
    let n_f64 = n as f64;

    // Start from largest p-value
    q_sorted[n - 1] = p_values[indices[n - 1]].min(1.0);

    for i in (0..n - 1).rev() {
        let rank = i + 1;
        let adjusted = p_values[indices[i]] * n_f64 / rank as f64;
        q_sorted[i] = adjusted.min(q_sorted[i + 1]).min(1.0);
    }

    // Restore original order
    let mut q_values = vec![0.0; n];
    for (i, &orig_idx) in indices.iter().enumerate() {
        q_values[orig_idx] = q_sorted[i];
    }

    BhCorrected {
        labels: labels.to_vec(),
        p_values: p_values.to_vec(),
        q_values,
        n_tests: n,
    }
}

/// Apply BH correction across a family of comparisons, labelled by metric.
pub fn correct_bh_comparisons(results: &[ComparisonResult]) -> BhCorrected {
    let p_values: Vec<f64> = results.iter().map(|r| r.p_value).collect();
    let labels: Vec<String> = results.iter().map(|r| r.metric_column.clone()).collect();
    correct_bh(&p_values, &labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cell_{}", i)).collect()
    }

    #[test]
    fn test_bh_ordering() {
        let p_values = vec![0.04, 0.01, 0.03, 0.005];
        let corrected = correct_bh(&p_values, &labels(4));

        // q = 0.005 * 4 / 1 = 0.02
        assert_relative_eq!(corrected.q_values[3], 0.02, epsilon = 1e-10);
        // q = min(0.01 * 4 / 2, q[next]) = 0.02
        assert_relative_eq!(corrected.q_values[1], 0.02, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_bounded_and_monotone() {
        let p_values = vec![0.001, 0.01, 0.02, 0.05, 0.1, 0.5, 0.9];
        let corrected = correct_bh(&p_values, &labels(7));
        let mut prev = 0.0;
        for q in &corrected.q_values {
            assert!(*q <= 1.0);
            assert!(*q >= prev - 1e-12);
            prev = *q;
        }
    }

    #[test]
    fn test_bh_known_values() {
        let p_values = vec![0.005, 0.01, 0.02, 0.04, 0.1];
        let corrected = correct_bh(&p_values, &labels(5));

        assert_relative_eq!(corrected.q_values[0], 0.025, epsilon = 1e-10);
        assert_relative_eq!(corrected.q_values[1], 0.025, epsilon = 1e-10);
        assert_relative_eq!(corrected.q_values[2], 1.0 / 30.0, epsilon = 1e-10);
        assert_relative_eq!(corrected.q_values[3], 0.05, epsilon = 1e-10);
        assert_relative_eq!(corrected.q_values[4], 0.1, epsilon = 1e-10);
        assert_eq!(corrected.get_qvalue("cell_4"), Some(0.1));
        assert_eq!(corrected.n_significant(0.05), 3);
    }

    #[test]
    fn test_thresholds() {
        let p_values = vec![0.3, 0.001, 0.02];
        let corrected = correct_bh(&p_values, &labels(3));
        let thresholds = corrected.thresholds(0.05);
        assert_relative_eq!(thresholds[1], 0.05 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(thresholds[2], 0.1 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(thresholds[0], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_bh_empty() {
        let corrected = correct_bh(&[], &[]);
        assert_eq!(corrected.n_tests, 0);
        assert!(corrected.q_values.is_empty());
    }
}
