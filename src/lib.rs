//! Immune-cell frequency analysis library.
//!
//! Raw per-sample cell counts are stored in a local SQLite file, unpivoted
//! into per-population relative frequencies, selected through generic
//! filters and compared between groups of samples.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core records (`Sample`, `OverviewRow`, `CellType`) and query results
//! - **ingest**: CSV reader for sample records
//! - **store**: Durable tabular store with registered table schemas
//! - **filter**: Conjunctive criteria and the filter engine
//! - **overview**: Wide-to-long transform into relative frequencies
//! - **compare**: Two-sample tests (Welch t-test, Mann-Whitney U)
//! - **correct**: Multiple testing correction (Benjamini-Hochberg)
//! - **analysis**: Responder comparisons and subset summaries
//! - **visualize**: Five-number summaries for charting
//! - **config** / **pipeline**: YAML-driven end-to-end runs
//!
//! # Example
//!
//! ```no_run
//! use cellfreq::prelude::*;
//!
//! let samples = read_samples("cell-count.csv").unwrap();
//! let report = TabularStore::with("cell-count.db", |store| {
//!     store.load_dataset("samples", "overview", &samples, &build_overview(&samples)?)?;
//!
//!     let filters = Criteria::new()
//!         .eq("condition", "melanoma")?
//!         .eq("treatment", "miraclib")?
//!         .eq("sample_type", "PBMC")?;
//!     ResponderAnalysis::new("response", "yes", "no")
//!         .filters(filters)
//!         .test_kind(TestKind::RankBased)
//!         .run(store)
//! })
//! .unwrap();
//! println!("{}", report);
//! ```

pub mod analysis;
pub mod compare;
pub mod config;
pub mod correct;
pub mod data;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod overview;
pub mod pipeline;
pub mod store;
pub mod visualize;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::analysis::{
        compare_filtered, subset_summary, Breakdown, ResponderAnalysis, ResponderReport,
        SubsetSummary,
    };
    pub use crate::compare::{
        compare, compare_groups, ComparisonResult, Group, MannWhitneyTest, TestKind,
        TestOutcome, TwoSampleTest, WelchTest,
    };
    pub use crate::config::{AnalysisConfig, FilterSpec, TableNames};
    pub use crate::correct::{correct_bh, correct_bh_comparisons, BhCorrected};
    pub use crate::data::{CellType, OverviewRow, Row, RowSet, Sample, Value};
    pub use crate::error::{CellFreqError, Result};
    pub use crate::filter::{Criteria, Criterion, FilterEngine, Predicate};
    pub use crate::ingest::{read_samples, read_samples_from};
    pub use crate::overview::build_overview;
    pub use crate::pipeline::{Pipeline, PipelineReport, PipelineStep, StepOutput};
    pub use crate::store::{ColumnDef, ColumnType, TableSchema, TabularStore};
    pub use crate::visualize::{distributions, GroupDistribution};
}
