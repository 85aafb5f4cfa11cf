//! Higher-level analyses composed from the store, filter and comparison
//! engines.
//!
//! - [`ResponderAnalysis`]: per-cell-type comparison of relative frequencies
//!   between two groups of samples, BH-adjusted across cell types.
//! - [`compare_filtered`]: the same selection and test on any single table.
//! - [`subset_summary`]: grouped sample counts for a filtered subset.

pub mod responder;
pub mod summary;

pub use responder::{compare_filtered, ResponderAnalysis, ResponderReport};
pub use summary::{subset_summary, Breakdown, SubsetSummary};
