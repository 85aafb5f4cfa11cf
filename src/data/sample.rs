//! Raw sample records: one row of per-population cell counts.

use super::{CellType, Value};
use crate::error::{CellFreqError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A raw measurement record for one subject at one point in time.
///
/// Counts are keyed by [`CellType`] so an incomplete record can be represented
/// and rejected downstream rather than silently defaulting to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unique sample identifier.
    pub sample_id: String,
    /// Project the sample belongs to.
    pub project: Option<String>,
    /// Subject the sample was taken from.
    pub subject_id: String,
    /// Disease condition (e.g. "melanoma").
    pub condition: String,
    /// Subject age in years.
    pub age: Option<i64>,
    /// Subject sex.
    pub sex: Option<String>,
    /// Treatment, if any.
    pub treatment: Option<String>,
    /// Treatment response, only meaningful when a treatment applies.
    pub response: Option<String>,
    /// Sample material (e.g. "PBMC").
    pub sample_type: String,
    /// Days since treatment start.
    pub time_from_treatment_start: Option<i64>,
    /// Per-population cell counts.
    pub counts: BTreeMap<CellType, u64>,
    /// Total cell count across populations.
    pub total_count: u64,
}

impl Sample {
    /// Create a sample with no counts and empty categorical fields.
    pub fn new(sample_id: &str, subject_id: &str) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            project: None,
            subject_id: subject_id.to_string(),
            condition: String::new(),
            age: None,
            sex: None,
            treatment: None,
            response: None,
            sample_type: String::new(),
            time_from_treatment_start: None,
            counts: BTreeMap::new(),
            total_count: 0,
        }
    }

    pub fn project(mut self, project: &str) -> Self {
        self.project = Some(project.to_string());
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.condition = condition.to_string();
        self
    }

    pub fn age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn sex(mut self, sex: &str) -> Self {
        self.sex = Some(sex.to_string());
        self
    }

    pub fn treatment(mut self, treatment: &str) -> Self {
        self.treatment = Some(treatment.to_string());
        self
    }

    pub fn response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    pub fn sample_type(mut self, sample_type: &str) -> Self {
        self.sample_type = sample_type.to_string();
        self
    }

    pub fn time_from_treatment_start(mut self, days: i64) -> Self {
        self.time_from_treatment_start = Some(days);
        self
    }

    /// Set the count for one population and keep `total_count` equal to the sum.
    pub fn count(mut self, cell_type: CellType, count: u64) -> Self {
        self.counts.insert(cell_type, count);
        self.total_count = self.counts.values().fold(0u64, |acc, c| acc.saturating_add(*c));
        self
    }

    /// Set every population at once, in [`CellType::ALL`] order.
    pub fn counts(mut self, counts: [u64; 5]) -> Self {
        for (cell_type, count) in CellType::ALL.iter().zip(counts) {
            self.counts.insert(*cell_type, count);
        }
        self.total_count = self.counts.values().fold(0u64, |acc, c| acc.saturating_add(*c));
        self
    }

    /// Count for a population, if present.
    pub fn get_count(&self, cell_type: CellType) -> Option<u64> {
        self.counts.get(&cell_type).copied()
    }

    /// Check that every population is present and sums to `total_count`.
    pub fn validate(&self) -> Result<()> {
        if self.sample_id.is_empty() {
            return Err(CellFreqError::InvalidParameter(
                "Sample with empty sample_id".to_string(),
            ));
        }
        let mut sum = 0u64;
        for cell_type in CellType::ALL {
            let count = self
                .get_count(cell_type)
                .ok_or_else(|| CellFreqError::MissingColumn {
                    sample_id: self.sample_id.clone(),
                    column: cell_type.column().to_string(),
                })?;
            sum = sum.checked_add(count).ok_or_else(|| CellFreqError::InvalidValue {
                value: count.to_string(),
                row: 0,
                column: cell_type.column().to_string(),
            })?;
        }
        if sum != self.total_count {
            return Err(CellFreqError::InconsistentTotal {
                sample_id: self.sample_id.clone(),
                sum,
                total: self.total_count,
            });
        }
        Ok(())
    }

    /// Values in the column order of the samples table.
    ///
    /// Fails with `InvalidValue` when a count does not fit a store integer.
    pub fn to_values(&self) -> Result<Vec<Value>> {
        let mut values = vec![
            Value::from(self.sample_id.as_str()),
            Value::from(self.project.clone()),
            Value::from(self.subject_id.as_str()),
            Value::from(self.condition.as_str()),
            Value::from(self.age),
            Value::from(self.sex.clone()),
            Value::from(self.treatment.clone()),
            Value::from(self.response.clone()),
            Value::from(self.sample_type.as_str()),
            Value::from(self.time_from_treatment_start),
        ];
        for cell_type in CellType::ALL {
            values.push(match self.get_count(cell_type) {
                Some(count) => Value::count(count, cell_type.column())?,
                None => Value::Null,
            });
        }
        values.push(Value::count(self.total_count, "total_count")?);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_keeps_total_in_sync() {
        let sample = Sample::new("s1", "sbj1")
            .count(CellType::BCell, 10)
            .count(CellType::Cd4TCell, 30);
        assert_eq!(sample.total_count, 40);
    }

    #[test]
    fn test_validate_complete_sample() {
        let sample = Sample::new("s1", "sbj1").counts([1, 2, 3, 4, 5]);
        assert!(sample.validate().is_ok());
        assert_eq!(sample.total_count, 15);
    }

    #[test]
    fn test_validate_missing_population() {
        let sample = Sample::new("s1", "sbj1").count(CellType::BCell, 10);
        match sample.validate() {
            Err(CellFreqError::MissingColumn { sample_id, column }) => {
                assert_eq!(sample_id, "s1");
                assert_eq!(column, "cd4_t_cell");
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_inconsistent_total() {
        let mut sample = Sample::new("s1", "sbj1").counts([1, 1, 1, 1, 1]);
        sample.total_count = 4;
        assert!(matches!(
            sample.validate(),
            Err(CellFreqError::InconsistentTotal { sum: 5, total: 4, .. })
        ));
    }

    #[test]
    fn test_oversized_count_is_rejected() {
        let sample = Sample::new("s1", "sbj1").counts([u64::MAX, 0, 0, 0, 0]);
        assert!(matches!(
            sample.to_values(),
            Err(CellFreqError::InvalidValue { column, .. }) if column == "b_cell"
        ));
        // The sum of counts saturates instead of wrapping.
        let sample = Sample::new("s2", "sbj2").counts([u64::MAX, 1, 0, 0, 0]);
        assert_eq!(sample.total_count, u64::MAX);
        assert!(matches!(
            sample.validate(),
            Err(CellFreqError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_to_values_layout() {
        let sample = Sample::new("s1", "sbj1")
            .condition("melanoma")
            .sample_type("PBMC")
            .counts([1, 2, 3, 4, 5]);
        let values = sample.to_values().unwrap();
        assert_eq!(values.len(), 16);
        assert_eq!(values[0], Value::Text("s1".into()));
        assert_eq!(values[1], Value::Null);
        assert_eq!(values[10], Value::Integer(1));
        assert_eq!(values[15], Value::Integer(15));
    }
}
