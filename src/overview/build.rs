//! Wide-to-long unpivot of per-population counts.
//!
//! For each sample j and population i the relative frequency is
//! `count_ij / total_j`. A sample with a zero total still yields one row per
//! population, with the frequency left undefined.

use crate::data::{CellType, OverviewRow, Sample};
use crate::error::{CellFreqError, Result};
use tracing::{debug, warn};

/// Derive the long-format overview from raw samples.
///
/// Emits exactly one row per (sample, cell type), ordered by sample_id then
/// cell type, both ascending, independent of input order.
///
/// # Errors
/// * `MissingColumn` if a sample lacks a count for one of the populations.
pub fn build_overview(samples: &[Sample]) -> Result<Vec<OverviewRow>> {
    let mut ordered: Vec<&Sample> = samples.iter().collect();
    ordered.sort_by(|a, b| a.sample_id.cmp(&b.sample_id));

    let mut rows = Vec::with_capacity(samples.len() * CellType::ALL.len());
    let mut n_undefined = 0usize;

    for sample in ordered {
        let total = sample.total_count;
        if total == 0 {
            n_undefined += 1;
        }
        for cell_type in CellType::ALL {
            let count = sample
                .get_count(cell_type)
                .ok_or_else(|| CellFreqError::MissingColumn {
                    sample_id: sample.sample_id.clone(),
                    column: cell_type.column().to_string(),
                })?;
            let relative_frequency = if total > 0 {
                Some(count as f64 / total as f64)
            } else {
                None
            };
            rows.push(OverviewRow {
                sample_id: sample.sample_id.clone(),
                cell_type,
                count,
                total_count: total,
                relative_frequency,
            });
        }
    }

    if n_undefined > 0 {
        warn!(
            samples = n_undefined,
            "samples with zero total count; relative frequency undefined"
        );
    }
    debug!(samples = samples.len(), rows = rows.len(), "overview built");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new("sample002", "sbj2").counts([120, 320, 180, 280, 160]),
            Sample::new("sample001", "sbj1").counts([100, 300, 200, 250, 150]),
        ]
    }

    #[test]
    fn test_one_row_per_cell_type() {
        let rows = build_overview(&samples()).unwrap();
        assert_eq!(rows.len(), 10);
        for chunk in rows.chunks(5) {
            let types: Vec<CellType> = chunk.iter().map(|r| r.cell_type).collect();
            assert_eq!(types, CellType::ALL.to_vec());
        }
    }

    #[test]
    fn test_ordering_is_input_independent() {
        let forward = build_overview(&samples()).unwrap();
        let mut reversed_input = samples();
        reversed_input.reverse();
        let reversed = build_overview(&reversed_input).unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(forward[0].sample_id, "sample001");
    }

    #[test]
    fn test_frequencies_sum_to_one() {
        let rows = build_overview(&samples()).unwrap();
        for chunk in rows.chunks(5) {
            let sum: f64 = chunk.iter().map(|r| r.relative_frequency.unwrap()).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_count_and_total_copied() {
        let rows = build_overview(&samples()).unwrap();
        let b_cell = &rows[0];
        assert_eq!(b_cell.cell_type, CellType::BCell);
        assert_eq!(b_cell.count, 100);
        assert_eq!(b_cell.total_count, 1000);
        assert_relative_eq!(b_cell.percentage().unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_total_is_undefined() {
        let rows = build_overview(&[Sample::new("empty", "sbj").counts([0; 5])]).unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.relative_frequency.is_none()));
    }

    #[test]
    fn test_missing_column() {
        let incomplete = Sample::new("s1", "sbj1")
            .count(CellType::BCell, 10)
            .count(CellType::Cd4TCell, 10);
        match build_overview(&[incomplete]) {
            Err(CellFreqError::MissingColumn { sample_id, column }) => {
                assert_eq!(sample_id, "s1");
                assert_eq!(column, "cd8_t_cell");
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }
}
