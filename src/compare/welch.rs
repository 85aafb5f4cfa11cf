//! Welch's unequal-variance t-test.

use super::{mean, variance, TestKind, TestOutcome, TwoSampleTest};
use crate::error::{CellFreqError, Result};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Welch two-sample t-test.
///
/// t = (mean_a - mean_b) / sqrt(var_a/n_a + var_b/n_b), compared to a
/// t-distribution with Welch-Satterthwaite degrees of freedom.
#[derive(Debug, Clone, Copy, Default)]
pub struct WelchTest;

impl TwoSampleTest for WelchTest {
    fn kind(&self) -> TestKind {
        TestKind::Parametric
    }

    fn run(&self, a: &[f64], b: &[f64]) -> Result<TestOutcome> {
        let (n_a, n_b) = (a.len() as f64, b.len() as f64);
        let se_a = variance(a) / n_a;
        let se_b = variance(b) / n_b;
        let se2 = se_a + se_b;

        if se2 <= 0.0 {
            return Err(CellFreqError::Numerical(
                "Welch t-test undefined: both groups have zero variance".to_string(),
            ));
        }

        let statistic = (mean(a) - mean(b)) / se2.sqrt();
        let df = se2.powi(2) / (se_a.powi(2) / (n_a - 1.0) + se_b.powi(2) / (n_b - 1.0));

        let t_dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| CellFreqError::Numerical(format!("t-distribution with df={}: {}", df, e)))?;
        let p_value = (2.0 * t_dist.sf(statistic.abs())).min(1.0);

        Ok(TestOutcome {
            statistic,
            p_value,
            df: Some(df),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_values() {
        // Equal sizes and variances: df = 2n - 2 and t is the pooled t.
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [3.0, 4.0, 5.0, 6.0, 7.0];
        let out = WelchTest.run(&a, &b).unwrap();
        assert_relative_eq!(out.statistic, -2.0, epsilon = 1e-12);
        assert_relative_eq!(out.df.unwrap(), 8.0, epsilon = 1e-12);
        // Two-sided p for t = 2 on 8 df.
        assert_relative_eq!(out.p_value, 0.08051623795726275, epsilon = 1e-8);
    }

    #[test]
    fn test_unequal_variances_reduce_df() {
        let a = [1.0, 1.1, 0.9, 1.05];
        let b = [0.0, 5.0, 10.0, 2.0, 8.0, 3.0];
        let out = WelchTest.run(&a, &b).unwrap();
        let df = out.df.unwrap();
        assert!(df < (a.len() + b.len() - 2) as f64);
        assert!(df > 1.0);
    }

    #[test]
    fn test_identical_groups() {
        let a = [0.2, 0.4, 0.6];
        let out = WelchTest.run(&a, &a).unwrap();
        assert_relative_eq!(out.statistic, 0.0, epsilon = 1e-12);
        assert_relative_eq!(out.p_value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_variance_is_numerical_error() {
        assert!(matches!(
            WelchTest.run(&[0.5, 0.5], &[0.5, 0.5, 0.5]),
            Err(CellFreqError::Numerical(_))
        ));
    }

    #[test]
    fn test_one_constant_group_is_fine() {
        let out = WelchTest.run(&[0.5, 0.5, 0.5], &[0.1, 0.2, 0.3]).unwrap();
        assert!(out.statistic > 0.0);
        assert_relative_eq!(out.df.unwrap(), 2.0, epsilon = 1e-12);
    }
}
