//! Overview transformer: per-sample relative frequencies in long format.

mod build;

pub use build::build_overview;
