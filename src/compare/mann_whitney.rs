//! Mann-Whitney U (Wilcoxon rank-sum) test.
//!
//! # Algorithm
//!
//! 1. Rank the pooled observations, averaging ranks over ties
//! 2. U_a = R_a - n_a (n_a + 1) / 2, where R_a is the rank sum of group a
//! 3. Two-sided p-value:
//!    - exact null distribution when the smaller group has at most
//!      [`EXACT_MAX_SIZE`] observations, there are no ties and the number of
//!      arrangements C(n_a + n_b, n_a) fits an `i128`
//!    - otherwise the normal approximation with tie and continuity correction

use super::{TestKind, TestOutcome, TwoSampleTest};
use crate::error::{CellFreqError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Largest size of the smaller group for which the exact distribution is used.
pub const EXACT_MAX_SIZE: usize = 8;

/// Mann-Whitney U test. The reported statistic is U of the first group.
#[derive(Debug, Clone, Copy, Default)]
pub struct MannWhitneyTest;

impl TwoSampleTest for MannWhitneyTest {
    fn kind(&self) -> TestKind {
        TestKind::RankBased
    }

    fn run(&self, a: &[f64], b: &[f64]) -> Result<TestOutcome> {
        let (n_a, n_b) = (a.len(), b.len());
        let ranked = rank_pooled(a, b);
        let rank_sum_a: f64 = ranked.ranks[..n_a].iter().sum();
        let u_a = rank_sum_a - (n_a * (n_a + 1)) as f64 / 2.0;
        let u_b = (n_a * n_b) as f64 - u_a;
        let u_max = u_a.max(u_b);

        let p_value = if !ranked.has_ties && exact_is_feasible(n_a, n_b) {
            exact_p_value(n_a, n_b, u_max)
        } else {
            asymptotic_p_value(n_a, n_b, u_max, ranked.tie_term)?
        };

        Ok(TestOutcome {
            statistic: u_a,
            p_value,
            df: None,
        })
    }
}

struct Ranked {
    /// Ranks in input order: group a first, then group b.
    ranks: Vec<f64>,
    has_ties: bool,
    /// Sum of t^3 - t over tie groups of size t.
    tie_term: f64,
}

fn rank_pooled(a: &[f64], b: &[f64]) -> Ranked {
    let pooled: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    let n = pooled.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| pooled[i].total_cmp(&pooled[j]));

    let mut ranks = vec![0.0; n];
    let mut has_ties = false;
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && pooled[order[end]] == pooled[order[start]] {
            end += 1;
        }
        // Positions start..end share the average of ranks start+1..=end.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        let t = (end - start) as f64;
        if t > 1.0 {
            has_ties = true;
            tie_term += t * t * t - t;
        }
        start = end;
    }

    Ranked {
        ranks,
        has_ties,
        tie_term,
    }
}

/// Binomial coefficient C(n, k), or `None` if a step overflows `u128`.
fn binomial(n: usize, k: usize) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // Exact at every step: result * (n - i) is divisible by i + 1.
        result = result.checked_mul((n - i) as u128)? / (i as u128 + 1);
    }
    Some(result)
}

/// Whether the exact distribution applies and its counts stay in range.
///
/// The Gaussian binomial coefficients never exceed C(m + n, m), so that bound
/// is enough to keep [`u_frequencies`] free of overflow.
fn exact_is_feasible(n_a: usize, n_b: usize) -> bool {
    n_a.min(n_b) <= EXACT_MAX_SIZE
        && binomial(n_a + n_b, n_a.min(n_b)).map_or(false, |c| c <= i128::MAX as u128)
}

/// Number of orderings giving each value of U, for group sizes m and n.
///
/// These are the coefficients of the Gaussian binomial [m + n choose m]_q,
/// built up as the product over i of (1 - q^(n+i)) / (1 - q^i).
fn u_frequencies(m: usize, n: usize) -> Vec<u128> {
    let (m, n) = if m <= n { (m, n) } else { (n, m) };
    let max_u = m * n;
    let mut coeffs: Vec<i128> = vec![0; max_u + 1];
    coeffs[0] = 1;

    for i in 1..=m {
        // Multiply by (1 - q^(n+i)).
        let shift = n + i;
        for k in (shift..=max_u).rev() {
            coeffs[k] -= coeffs[k - shift];
        }
        // Divide by (1 - q^i).
        for k in i..=max_u {
            coeffs[k] += coeffs[k - i];
        }
    }

    coeffs.into_iter().map(|c| c.max(0) as u128).collect()
}

fn exact_p_value(n_a: usize, n_b: usize, u_max: f64) -> f64 {
    let freqs = u_frequencies(n_a, n_b);
    let total: u128 = freqs.iter().sum();
    // Without ties U is an integer.
    let threshold = u_max.round() as usize;
    let upper: u128 = freqs.iter().skip(threshold).sum();
    (2.0 * upper as f64 / total as f64).min(1.0)
}

fn asymptotic_p_value(n_a: usize, n_b: usize, u_max: f64, tie_term: f64) -> Result<f64> {
    let (m, n) = (n_a as f64, n_b as f64);
    let total = m + n;
    let mu = m * n / 2.0;
    let sigma2 = m * n / 12.0 * ((total + 1.0) - tie_term / (total * (total - 1.0)));
    if sigma2 <= 0.0 {
        return Err(CellFreqError::Numerical(
            "Mann-Whitney U undefined: all observations are tied".to_string(),
        ));
    }
    let z = (u_max - mu - 0.5) / sigma2.sqrt();
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| CellFreqError::Numerical(format!("standard normal: {}", e)))?;
    Ok((2.0 * normal.sf(z)).min(1.0))
}
