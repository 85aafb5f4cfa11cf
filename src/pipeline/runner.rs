//! Pipeline runner: load, derive the overview, then run analyses.

use crate::analysis::{compare_filtered, subset_summary, ResponderAnalysis, ResponderReport, SubsetSummary};
use crate::compare::{ComparisonResult, TestKind};
use crate::config::{AnalysisConfig, TableNames};
use crate::error::{CellFreqError, Result};
use crate::filter::Criteria;
use crate::ingest::read_samples;
use crate::overview::build_overview;
use crate::store::TabularStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A step in the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PipelineStep {
    /// Read samples from CSV, replace the samples table and rebuild the
    /// overview table from it.
    Load { input: PathBuf },
    /// Per-cell-type frequency comparison between two groups of samples.
    Responder {
        name: String,
        #[serde(default)]
        filter: Option<String>,
        group_column: String,
        group_a: String,
        group_b: String,
        test: TestKind,
    },
    /// Comparison of one column between two groups within a single table.
    Compare {
        name: String,
        /// Defaults to the samples table.
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        filter: Option<String>,
        group_column: String,
        group_a: String,
        group_b: String,
        value_column: String,
        test: TestKind,
    },
    /// Grouped counts of a filtered subset.
    Summary {
        name: String,
        /// Defaults to the samples table.
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        filter: Option<String>,
        columns: Vec<String>,
    },
}

impl PipelineStep {
    fn label(&self) -> &str {
        match self {
            PipelineStep::Load { .. } => "load",
            PipelineStep::Responder { name, .. }
            | PipelineStep::Compare { name, .. }
            | PipelineStep::Summary { name, .. } => name,
        }
    }
}

/// What one step produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    Loaded { samples: usize, overview_rows: usize },
    Responder { name: String, report: ResponderReport },
    Comparison { name: String, result: ComparisonResult },
    Summary { name: String, summary: SubsetSummary },
}

/// Outputs of every step, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub name: String,
    pub outputs: Vec<StepOutput>,
}

impl PipelineReport {
    /// Responder report of the named step.
    pub fn responder(&self, name: &str) -> Option<&ResponderReport> {
        self.outputs.iter().find_map(|o| match o {
            StepOutput::Responder { name: n, report } if n == name => Some(report),
            _ => None,
        })
    }

    /// Comparison result of the named step.
    pub fn comparison(&self, name: &str) -> Option<&ComparisonResult> {
        self.outputs.iter().find_map(|o| match o {
            StepOutput::Comparison { name: n, result } if n == name => Some(result),
            _ => None,
        })
    }

    /// Summary of the named step.
    pub fn summary(&self, name: &str) -> Option<&SubsetSummary> {
        self.outputs.iter().find_map(|o| match o {
            StepOutput::Summary { name: n, summary } if n == name => Some(summary),
            _ => None,
        })
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}", self.name)?;
        for output in &self.outputs {
            match output {
                StepOutput::Loaded {
                    samples,
                    overview_rows,
                } => writeln!(
                    f,
                    "\n## load\n{} samples, {} overview rows",
                    samples, overview_rows
                )?,
                StepOutput::Responder { name, report } => {
                    writeln!(f, "\n## {}", name)?;
                    write!(f, "{}", report)?;
                }
                StepOutput::Comparison { name, result } => {
                    writeln!(f, "\n## {}\n{}", name, result)?;
                }
                StepOutput::Summary { name, summary } => {
                    writeln!(f, "\n## {}", name)?;
                    write!(f, "{}", summary)?;
                }
            }
        }
        Ok(())
    }
}

/// Builder for constructing and running analysis pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    store: PathBuf,
    tables: TableNames,
    filters: BTreeMap<String, Criteria>,
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Create an empty pipeline working on the store at `store`.
    pub fn new<P: AsRef<Path>>(store: P) -> Self {
        Self {
            name: "unnamed".to_string(),
            store: store.as_ref().to_path_buf(),
            tables: TableNames::default(),
            filters: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    /// Create from a config, resolving its named filters.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            store: config.store.clone(),
            tables: config.tables.clone(),
            filters: config.criteria()?,
            steps: config.steps.clone(),
        })
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Use non-default table names.
    pub fn tables(mut self, samples: &str, overview: &str) -> Self {
        self.tables = TableNames {
            samples: samples.to_string(),
            overview: overview.to_string(),
        };
        self
    }

    /// Register a named filter for later steps.
    pub fn filter(mut self, name: &str, criteria: Criteria) -> Self {
        self.filters.insert(name.to_string(), criteria);
        self
    }

    /// Add a load step.
    pub fn load<P: AsRef<Path>>(mut self, input: P) -> Self {
        self.steps.push(PipelineStep::Load {
            input: input.as_ref().to_path_buf(),
        });
        self
    }

    /// Add a responder analysis step.
    pub fn responder(
        mut self,
        name: &str,
        filter: Option<&str>,
        group_column: &str,
        group_a: &str,
        group_b: &str,
        test: TestKind,
    ) -> Self {
        self.steps.push(PipelineStep::Responder {
            name: name.to_string(),
            filter: filter.map(String::from),
            group_column: group_column.to_string(),
            group_a: group_a.to_string(),
            group_b: group_b.to_string(),
            test,
        });
        self
    }

    /// Add a subset summary step over the samples table.
    pub fn summary(mut self, name: &str, filter: Option<&str>, columns: &[&str]) -> Self {
        self.steps.push(PipelineStep::Summary {
            name: name.to_string(),
            table: None,
            filter: filter.map(String::from),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Add an arbitrary step.
    pub fn step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Get the steps.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Run every step against the store, which is opened once and closed
    /// whether or not a step fails.
    pub fn run(&self) -> Result<PipelineReport> {
        info!(pipeline = %self.name, store = %self.store.display(), steps = self.steps.len(), "pipeline start");
        let outputs = TabularStore::with(&self.store, |store| {
            let mut outputs = Vec::with_capacity(self.steps.len());
            for (i, step) in self.steps.iter().enumerate() {
                let output = self.apply(store, step).map_err(|e| {
                    warn!(step = i + 1, label = step.label(), error = %e, "pipeline step failed");
                    e
                })?;
                outputs.push(output);
            }
            Ok(outputs)
        })?;
        Ok(PipelineReport {
            name: self.name.clone(),
            outputs,
        })
    }

    fn criteria(&self, filter: &Option<String>) -> Result<Criteria> {
        match filter {
            None => Ok(Criteria::new()),
            Some(name) => self.filters.get(name).cloned().ok_or_else(|| {
                CellFreqError::InvalidParameter(format!(
                    "Unknown filter '{}'. Defined: {:?}",
                    name,
                    self.filters.keys().collect::<Vec<_>>()
                ))
            }),
        }
    }

    fn apply(&self, store: &mut TabularStore, step: &PipelineStep) -> Result<StepOutput> {
        match step {
            PipelineStep::Load { input } => {
                let samples = read_samples(input)?;
                let overview = build_overview(&samples)?;
                let (n_samples, overview_rows) = store.load_dataset(
                    &self.tables.samples,
                    &self.tables.overview,
                    &samples,
                    &overview,
                )?;
                Ok(StepOutput::Loaded {
                    samples: n_samples,
                    overview_rows,
                })
            }
            PipelineStep::Responder {
                name,
                filter,
                group_column,
                group_a,
                group_b,
                test,
            } => {
                let report = ResponderAnalysis::new(group_column, group_a, group_b)
                    .tables(&self.tables.samples, &self.tables.overview)
                    .filters(self.criteria(filter)?)
                    .test_kind(*test)
                    .run(store)?;
                Ok(StepOutput::Responder {
                    name: name.clone(),
                    report,
                })
            }
            PipelineStep::Compare {
                name,
                table,
                filter,
                group_column,
                group_a,
                group_b,
                value_column,
                test,
            } => {
                let result = compare_filtered(
                    store,
                    table.as_deref().unwrap_or(&self.tables.samples),
                    &self.criteria(filter)?,
                    group_column,
                    group_a,
                    group_b,
                    value_column,
                    *test,
                )?;
                Ok(StepOutput::Comparison {
                    name: name.clone(),
                    result,
                })
            }
            PipelineStep::Summary {
                name,
                table,
                filter,
                columns,
            } => {
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                let summary = subset_summary(
                    store,
                    table.as_deref().unwrap_or(&self.tables.samples),
                    &self.criteria(filter)?,
                    &columns,
                )?;
                Ok(StepOutput::Summary {
                    name: name.clone(),
                    summary,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use std::fs;
    use tempfile::TempDir;

    const CSV: &str = "\
project,subject,condition,age,sex,treatment,response,sample,sample_type,time_from_treatment_start,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte
prj1,sbj1,melanoma,57,M,miraclib,yes,s1,PBMC,0,10,20,40,15,15
prj1,sbj2,melanoma,61,F,miraclib,yes,s2,PBMC,0,12,18,44,14,12
prj2,sbj3,melanoma,48,F,miraclib,no,s3,PBMC,0,20,30,20,10,20
prj2,sbj4,melanoma,70,M,miraclib,no,s4,PBMC,0,22,28,18,12,20
prj1,sbj5,lung,66,M,none,,s5,PBMC,0,20,20,20,20,20
";

    fn write_csv(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("cell-count.csv");
        fs::write(&path, CSV).unwrap();
        path
    }

    #[test]
    fn test_builder_run() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir);
        let melanoma = Criteria::new().eq("condition", "melanoma").unwrap();

        let report = Pipeline::new(dir.path().join("cells.db"))
            .name("test")
            .filter("melanoma", melanoma)
            .load(&csv)
            .responder("resp", Some("melanoma"), "response", "yes", "no", TestKind::Parametric)
            .summary("projects", Some("melanoma"), &["project"])
            .run()
            .unwrap();

        assert_eq!(report.outputs.len(), 3);
        match &report.outputs[0] {
            StepOutput::Loaded {
                samples,
                overview_rows,
            } => {
                assert_eq!(*samples, 5);
                assert_eq!(*overview_rows, 25);
            }
            other => panic!("unexpected output {:?}", other),
        }
        let resp = report.responder("resp").unwrap();
        assert_eq!(resp.comparisons.len(), 5);
        assert_eq!(report.summary("projects").unwrap().total, 4);
        assert!(report.to_string().contains("## resp"));
    }

    #[test]
    fn test_unknown_filter_name() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir);
        let result = Pipeline::new(dir.path().join("cells.db"))
            .load(&csv)
            .summary("s", Some("nope"), &["project"])
            .run();
        assert!(matches!(result, Err(CellFreqError::InvalidParameter(_))));
    }

    #[test]
    fn test_failed_load_keeps_both_tables() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cells.db");
        Pipeline::new(&db).load(write_csv(&dir)).run().unwrap();

        let replacement = dir.path().join("replacement.csv");
        fs::write(
            &replacement,
            "sample,subject,condition,sample_type,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte\n\
             s9,sbj9,melanoma,PBMC,1,2,3,4,5\n",
        )
        .unwrap();
        let result = Pipeline::new(&db)
            .tables("samples", "bad name")
            .load(&replacement)
            .run();
        assert!(matches!(result, Err(CellFreqError::Schema { .. })));

        let (samples, overview) = TabularStore::with(&db, |store| {
            Ok((
                store.distinct("samples", "sample_id")?,
                store.distinct("overview", "sample_id")?,
            ))
        })
        .unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples, overview);
        assert!(!samples.contains(&Value::from("s9")));
    }

    #[test]
    fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir);
        let mut config = AnalysisConfig::example();
        config.store = dir.path().join("cells.db");
        config.steps[0] = PipelineStep::Load { input: csv };

        let report = Pipeline::from_config(&config).unwrap().run().unwrap();
        let rank = report.responder("response_rank_based").unwrap();
        let cd4 = rank.get(crate::data::CellType::Cd4TCell).unwrap();
        assert_eq!((cd4.n_a, cd4.n_b), (2, 2));
        assert_eq!(report.summary("baseline").unwrap().total, 4);
    }
}
