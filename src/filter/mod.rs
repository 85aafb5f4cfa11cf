//! Filter engine: conjunctive column predicates over store tables.

pub mod criterion;
pub mod engine;

pub use criterion::{Criteria, Criterion, Predicate};
pub use engine::FilterEngine;
