//! YAML analysis configuration.
//!
//! ```yaml
//! name: miraclib-response
//! store: cell-count.db
//! filters:
//!   melanoma_pbmc:
//!     condition: melanoma
//!     treatment: miraclib
//!     sample_type: PBMC
//! steps:
//!   - step: load
//!     input: cell-count.csv
//!   - step: responder
//!     name: response
//!     filter: melanoma_pbmc
//!     group_column: response
//!     group_a: "yes"
//!     group_b: "no"
//!     test: rank_based
//! ```
//!
//! Filter values follow [`Criterion::from_json`](crate::filter::Criterion::from_json):
//! a scalar selects equality, a list set membership and `{min, max}` an
//! inclusive range.

use crate::compare::TestKind;
use crate::error::{CellFreqError, Result};
use crate::filter::Criteria;
use crate::pipeline::PipelineStep;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Column -> criterion value, as written in a config file.
pub type FilterSpec = BTreeMap<String, serde_json::Value>;

/// Names of the two store tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub samples: String,
    pub overview: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            samples: "samples".to_string(),
            overview: "overview".to_string(),
        }
    }
}

/// A complete analysis run: where the store lives and what to do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Name of the analysis.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Store file.
    pub store: PathBuf,
    #[serde(default)]
    pub tables: TableNames,
    /// Named filters that steps refer to.
    #[serde(default)]
    pub filters: BTreeMap<String, FilterSpec>,
    /// Steps to execute, in order.
    pub steps: Vec<PipelineStep>,
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(CellFreqError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CellFreqError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Resolve every named filter into criteria.
    ///
    /// # Errors
    /// * `InvalidCriterion` for the first malformed filter value.
    pub fn criteria(&self) -> Result<BTreeMap<String, Criteria>> {
        self.filters
            .iter()
            .map(|(name, spec)| Ok((name.clone(), Criteria::from_map(spec)?)))
            .collect()
    }

    /// The responder analysis of melanoma patients on miraclib, as a
    /// starting point for new configs.
    pub fn example() -> Self {
        let mut melanoma = FilterSpec::new();
        melanoma.insert("condition".into(), "melanoma".into());
        melanoma.insert("treatment".into(), "miraclib".into());
        melanoma.insert("sample_type".into(), "PBMC".into());

        let mut baseline = melanoma.clone();
        baseline.insert("time_from_treatment_start".into(), 0.into());

        let mut filters = BTreeMap::new();
        filters.insert("melanoma_miraclib_pbmc".to_string(), melanoma);
        filters.insert("baseline".to_string(), baseline);

        Self {
            name: "miraclib-response".to_string(),
            description: Some(
                "Cell population frequencies of responders vs non-responders".to_string(),
            ),
            store: PathBuf::from("cell-count.db"),
            tables: TableNames::default(),
            filters,
            steps: vec![
                PipelineStep::Load {
                    input: PathBuf::from("cell-count.csv"),
                },
                PipelineStep::Responder {
                    name: "response_rank_based".to_string(),
                    filter: Some("melanoma_miraclib_pbmc".to_string()),
                    group_column: "response".to_string(),
                    group_a: "yes".to_string(),
                    group_b: "no".to_string(),
                    test: TestKind::RankBased,
                },
                PipelineStep::Responder {
                    name: "response_parametric".to_string(),
                    filter: Some("melanoma_miraclib_pbmc".to_string()),
                    group_column: "response".to_string(),
                    group_a: "yes".to_string(),
                    group_b: "no".to_string(),
                    test: TestKind::Parametric,
                },
                PipelineStep::Summary {
                    name: "baseline".to_string(),
                    table: None,
                    filter: Some("baseline".to_string()),
                    columns: vec![
                        "project".to_string(),
                        "response".to_string(),
                        "sex".to_string(),
                    ],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_round_trips_through_yaml() {
        let config = AnalysisConfig::example();
        let yaml = config.to_yaml().unwrap();
        let parsed = AnalysisConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.name, config.name);
        assert_eq!(parsed.steps.len(), 4);
        assert_eq!(parsed.filters, config.filters);
        assert_eq!(parsed.criteria().unwrap()["baseline"].len(), 4);
    }

    #[test]
    fn test_defaults_and_filter_shapes() {
        let yaml = r#"
name: ages
store: cells.db
filters:
  older:
    age: { min: 60, max: 90 }
    condition: [melanoma, carcinoma]
steps:
  - step: compare
    name: cd4_by_sex
    filter: older
    group_column: sex
    group_a: M
    group_b: F
    value_column: cd4_t_cell
    test: parametric
"#;
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tables, TableNames::default());
        assert!(config.description.is_none());
        let criteria = config.criteria().unwrap();
        assert_eq!(criteria["older"].len(), 2);
        match &config.steps[0] {
            PipelineStep::Compare { test, table, .. } => {
                assert_eq!(*test, TestKind::Parametric);
                assert!(table.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_malformed_filter_is_invalid_criterion() {
        let yaml = r#"
name: bad
store: cells.db
filters:
  broken:
    age: { min: 90, max: 60 }
steps: []
"#;
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.criteria(),
            Err(CellFreqError::InvalidCriterion { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), AnalysisConfig::example().to_yaml().unwrap()).unwrap();
        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store, PathBuf::from("cell-count.db"));
        assert!(AnalysisConfig::from_file("/nonexistent/config.yaml").is_err());
    }
}
