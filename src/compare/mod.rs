//! Two-sample comparison of a metric between experimental groups.
//!
//! Two interchangeable strategies share one contract:
//!
//! - [`WelchTest`] (parametric): difference in means without assuming equal
//!   variances.
//! - [`MannWhitneyTest`] (rank-based): no distributional assumption.
//!
//! The engine reports a statistic and a two-sided p-value and leaves the
//! significance decision to the caller. Running both is the intended way to
//! check whether a conclusion depends on the normality assumption.

pub mod mann_whitney;
pub mod welch;

pub use mann_whitney::MannWhitneyTest;
pub use welch::WelchTest;

use crate::error::{CellFreqError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Minimum number of observations per group.
pub const MIN_GROUP_SIZE: usize = 2;

/// Which test strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Welch two-sample t-test.
    Parametric,
    /// Mann-Whitney U test.
    RankBased,
}

impl TestKind {
    /// The strategy implementing this kind.
    pub fn strategy(&self) -> Box<dyn TwoSampleTest> {
        match self {
            TestKind::Parametric => Box::new(WelchTest),
            TestKind::RankBased => Box::new(MannWhitneyTest),
        }
    }

    /// Descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            TestKind::Parametric => "parametric",
            TestKind::RankBased => "rank_based",
        }
    }

    /// Human-readable name of the underlying test.
    pub fn test_name(&self) -> &'static str {
        match self {
            TestKind::Parametric => "Welch's t-test",
            TestKind::RankBased => "Mann-Whitney U",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestKind {
    type Err = CellFreqError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "parametric" | "welch" | "t-test" => Ok(TestKind::Parametric),
            "rank_based" | "rank-based" | "mann-whitney" | "mwu" => Ok(TestKind::RankBased),
            other => Err(CellFreqError::InvalidParameter(format!(
                "Unknown test kind '{}'. Use 'parametric' or 'rank_based'",
                other
            ))),
        }
    }
}

/// Raw output of a test strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    /// Test statistic (t for Welch, U of the first group for Mann-Whitney).
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Degrees of freedom, where the test has them.
    pub df: Option<f64>,
}

/// A two-sample test strategy.
///
/// Implementations may assume both groups have passed the size and
/// finiteness checks done by [`compare`].
pub trait TwoSampleTest {
    /// Which kind of test this is.
    fn kind(&self) -> TestKind;

    /// Run the test on two groups.
    fn run(&self, a: &[f64], b: &[f64]) -> Result<TestOutcome>;
}

/// A labelled group of observations.
#[derive(Debug, Clone, Copy)]
pub struct Group<'a> {
    pub label: &'a str,
    pub values: &'a [f64],
}

impl<'a> Group<'a> {
    pub fn new(label: &'a str, values: &'a [f64]) -> Self {
        Self { label, values }
    }

    fn check(&self) -> Result<()> {
        if self.values.len() < MIN_GROUP_SIZE {
            return Err(CellFreqError::InsufficientData {
                group: self.label.to_string(),
                size: self.values.len(),
                required: MIN_GROUP_SIZE,
            });
        }
        if let Some(bad) = self.values.iter().find(|v| !v.is_finite()) {
            return Err(CellFreqError::InvalidParameter(format!(
                "Group '{}' contains non-finite value {}",
                self.label, bad
            )));
        }
        Ok(())
    }
}

/// Outcome of comparing one metric between two groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub group_a_label: String,
    pub group_b_label: String,
    /// Metric that was compared (e.g. `relative_frequency` of one cell type).
    pub metric_column: String,
    /// Which assumption the numbers rest on.
    pub test_kind: TestKind,
    pub statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: Option<f64>,
    pub n_a: usize,
    pub n_b: usize,
    pub mean_a: f64,
    pub mean_b: f64,
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} (n={}, mean={:.4}) vs {} (n={}, mean={:.4}): statistic={:.4}, p={:.4}",
            self.metric_column,
            self.test_kind.test_name(),
            self.group_a_label,
            self.n_a,
            self.mean_a,
            self.group_b_label,
            self.n_b,
            self.mean_b,
            self.statistic,
            self.p_value
        )
    }
}

/// Compare two unlabelled groups ("a" and "b").
///
/// # Errors
/// * `InsufficientData` if either group has fewer than two observations.
pub fn compare(values_a: &[f64], values_b: &[f64], test_kind: TestKind) -> Result<ComparisonResult> {
    compare_groups(
        Group::new("a", values_a),
        Group::new("b", values_b),
        "value",
        test_kind,
    )
}

/// Compare a metric between two labelled groups.
pub fn compare_groups(
    a: Group<'_>,
    b: Group<'_>,
    metric_column: &str,
    test_kind: TestKind,
) -> Result<ComparisonResult> {
    a.check()?;
    b.check()?;

    let outcome = test_kind.strategy().run(a.values, b.values)?;
    debug!(
        metric = metric_column,
        test = %test_kind,
        n_a = a.values.len(),
        n_b = b.values.len(),
        statistic = outcome.statistic,
        p_value = outcome.p_value,
        "comparison"
    );

    Ok(ComparisonResult {
        group_a_label: a.label.to_string(),
        group_b_label: b.label.to_string(),
        metric_column: metric_column.to_string(),
        test_kind,
        statistic: outcome.statistic,
        p_value: outcome.p_value,
        degrees_of_freedom: outcome.df,
        n_a: a.values.len(),
        n_b: b.values.len(),
        mean_a: mean(a.values),
        mean_b: mean(b.values),
    })
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (n - 1 denominator).
pub(crate) fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LOW: [f64; 4] = [0.1, 0.2, 0.15, 0.18];
    const HIGH: [f64; 4] = [0.3, 0.35, 0.28, 0.31];

    #[test]
    fn test_both_tests_agree_on_separated_groups() {
        for kind in [TestKind::Parametric, TestKind::RankBased] {
            let result = compare(&LOW, &HIGH, kind).unwrap();
            assert!(result.p_value < 0.05, "{}: p = {}", kind, result.p_value);
            assert_eq!(result.test_kind, kind);
            assert_eq!((result.n_a, result.n_b), (4, 4));
        }
    }

    #[test]
    fn test_swapping_groups() {
        let ab = compare(&LOW, &HIGH, TestKind::Parametric).unwrap();
        let ba = compare(&HIGH, &LOW, TestKind::Parametric).unwrap();
        assert_relative_eq!(ab.statistic, -ba.statistic, epsilon = 1e-12);
        assert_relative_eq!(ab.p_value, ba.p_value, epsilon = 1e-12);

        let ab = compare(&LOW, &HIGH, TestKind::RankBased).unwrap();
        let ba = compare(&HIGH, &LOW, TestKind::RankBased).unwrap();
        assert_relative_eq!(ab.statistic + ba.statistic, 16.0, epsilon = 1e-12);
        assert_relative_eq!(ab.p_value, ba.p_value, epsilon = 1e-12);
    }

    #[test]
    fn test_group_of_one_is_insufficient() {
        for kind in [TestKind::Parametric, TestKind::RankBased] {
            match compare(&[0.4], &[0.6], kind) {
                Err(CellFreqError::InsufficientData { group, size, required }) => {
                    assert_eq!(group, "a");
                    assert_eq!(size, 1);
                    assert_eq!(required, 2);
                }
                other => panic!("expected InsufficientData, got {:?}", other),
            }
        }
        assert!(matches!(
            compare_groups(
                Group::new("yes", &LOW),
                Group::new("no", &[]),
                "cd4_t_cell",
                TestKind::RankBased
            ),
            Err(CellFreqError::InsufficientData { ref group, .. }) if group == "no"
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            compare(&[0.1, f64::NAN], &HIGH, TestKind::Parametric),
            Err(CellFreqError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let first = compare(&LOW, &HIGH, TestKind::RankBased).unwrap();
        let second = compare(&LOW, &HIGH, TestKind::RankBased).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_means_reported() {
        let result = compare(&LOW, &HIGH, TestKind::Parametric).unwrap();
        assert_relative_eq!(result.mean_a, 0.1575, epsilon = 1e-12);
        assert_relative_eq!(result.mean_b, 0.31, epsilon = 1e-12);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("welch".parse::<TestKind>().unwrap(), TestKind::Parametric);
        assert_eq!("rank_based".parse::<TestKind>().unwrap(), TestKind::RankBased);
        assert!("bayes".parse::<TestKind>().is_err());
    }
}
