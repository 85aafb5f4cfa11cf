//! CSV ingestion of raw sample records.
//!
//! The expected layout is one header row followed by one row per sample:
//!
//! ```text
//! project,subject,condition,age,sex,treatment,response,sample,sample_type,
//! time_from_treatment_start,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte
//! ```
//!
//! `sample_id` and `subject_id` are accepted as aliases of `sample` and
//! `subject`. Column order does not matter. Empty fields become nulls. An
//! optional `total_count` column is checked against the cell counts when the
//! samples are validated; without it the total is the sum of the counts.

use crate::data::{CellType, Sample};
use crate::error::{CellFreqError, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RawRecord {
    project: Option<String>,
    #[serde(alias = "subject_id")]
    subject: Option<String>,
    condition: Option<String>,
    age: Option<String>,
    sex: Option<String>,
    treatment: Option<String>,
    response: Option<String>,
    #[serde(alias = "sample_id")]
    sample: Option<String>,
    sample_type: Option<String>,
    time_from_treatment_start: Option<String>,
    b_cell: Option<String>,
    cd8_t_cell: Option<String>,
    cd4_t_cell: Option<String>,
    nk_cell: Option<String>,
    monocyte: Option<String>,
    total_count: Option<String>,
}

impl RawRecord {
    fn count_field(&self, cell_type: CellType) -> Option<&str> {
        let field = match cell_type {
            CellType::BCell => &self.b_cell,
            CellType::Cd4TCell => &self.cd4_t_cell,
            CellType::Cd8TCell => &self.cd8_t_cell,
            CellType::Monocyte => &self.monocyte,
            CellType::NkCell => &self.nk_cell,
        };
        non_empty(field)
    }

    fn into_sample(self, row: usize) -> Result<Sample> {
        let sample_id = non_empty(&self.sample).ok_or_else(|| CellFreqError::InvalidValue {
            value: String::new(),
            row,
            column: "sample".to_string(),
        })?;
        let subject_id = non_empty(&self.subject).unwrap_or_default();

        let mut sample = Sample::new(sample_id, subject_id);
        sample.project = non_empty(&self.project).map(str::to_string);
        sample.condition = non_empty(&self.condition).unwrap_or_default().to_string();
        sample.age = parse_field(&self.age, row, "age")?;
        sample.sex = non_empty(&self.sex).map(str::to_string);
        sample.treatment = non_empty(&self.treatment).map(str::to_string);
        sample.response = non_empty(&self.response).map(str::to_string);
        sample.sample_type = non_empty(&self.sample_type).unwrap_or_default().to_string();
        sample.time_from_treatment_start = parse_field(
            &self.time_from_treatment_start,
            row,
            "time_from_treatment_start",
        )?;

        for cell_type in CellType::ALL {
            if let Some(raw) = self.count_field(cell_type) {
                let n = parse_count(raw, row, cell_type.column())?;
                sample = sample.count(cell_type, n);
            }
        }
        if let Some(raw) = non_empty(&self.total_count) {
            sample.total_count = parse_count(raw, row, "total_count")?;
        }
        Ok(sample)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_field(field: &Option<String>, row: usize, column: &str) -> Result<Option<i64>> {
    non_empty(field)
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| CellFreqError::InvalidValue {
                value: raw.to_string(),
                row,
                column: column.to_string(),
            })
        })
        .transpose()
}

/// Counts are non-negative and must fit a signed 64-bit store integer.
fn parse_count(raw: &str, row: usize, column: &str) -> Result<u64> {
    raw.parse::<i64>()
        .ok()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| CellFreqError::InvalidValue {
            value: raw.to_string(),
            row,
            column: column.to_string(),
        })
}

/// Read samples from a CSV file.
pub fn read_samples<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>> {
    let file = File::open(path.as_ref())?;
    let samples = read_samples_from(file)?;
    info!(path = %path.as_ref().display(), samples = samples.len(), "samples read");
    Ok(samples)
}

/// Read samples from any CSV source.
///
/// Rows are numbered from 1 (the first data row) in error messages.
/// Records are not validated here; see [`Sample::validate`].
pub fn read_samples_from<R: Read>(reader: R) -> Result<Vec<Sample>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    for (i, record) in csv_reader.deserialize::<RawRecord>().enumerate() {
        samples.push(record?.into_sample(i + 1)?);
    }
    Ok(samples)
}
