//! Generic selection and projection over store tables.
//!
//! The engine knows nothing about what columns mean: any table registered in
//! the store can be filtered by any combination of its columns.

use super::criterion::Criteria;
use crate::data::{RowSet, Value};
use crate::error::Result;
use crate::store::TabularStore;
use std::collections::BTreeMap;
use tracing::debug;

/// Query builder over a [`TabularStore`].
pub struct FilterEngine<'a> {
    store: &'a TabularStore,
}

impl<'a> FilterEngine<'a> {
    /// Create an engine reading from `store`.
    pub fn new(store: &'a TabularStore) -> Self {
        Self { store }
    }

    /// All columns of the rows of `table` matching every criterion.
    ///
    /// Empty criteria return the whole table in stable order.
    pub fn filter(&self, table: &str, criteria: &Criteria) -> Result<RowSet> {
        let rows = self.store.query(table, criteria, None)?;
        debug!(table, n_criteria = criteria.len(), n_rows = rows.len(), "filter");
        Ok(rows)
    }

    /// Like [`filter`](Self::filter), projected to `columns`.
    pub fn filter_columns(
        &self,
        table: &str,
        criteria: &Criteria,
        columns: &[&str],
    ) -> Result<RowSet> {
        let rows = self.store.query(table, criteria, Some(columns))?;
        debug!(table, n_criteria = criteria.len(), n_rows = rows.len(), "filter");
        Ok(rows)
    }

    /// Rows of `left` joined to `right` on `key`, matching every criterion.
    ///
    /// Criteria may name columns of either table; see
    /// [`TabularStore::query_joined`] for how names resolve.
    pub fn filter_joined(
        &self,
        left: &str,
        right: &str,
        key: &str,
        criteria: &Criteria,
        columns: Option<&[&str]>,
    ) -> Result<RowSet> {
        let rows = self
            .store
            .query_joined(left, right, key, criteria, columns)?;
        debug!(left, right, key, n_criteria = criteria.len(), n_rows = rows.len(), "filter joined");
        Ok(rows)
    }

    /// Narrow an already fetched result set in memory.
    ///
    /// Criteria are resolved against the schemas of the tables the rows came
    /// from, so operands are coerced the same way as in a store query. Every
    /// criterion column must be part of the projection.
    pub fn apply(&self, rows: &RowSet, criteria: &Criteria) -> Result<RowSet> {
        let mut resolved = Vec::with_capacity(criteria.len());
        for criterion in criteria.iter() {
            let column = self.store.resolve_column(&rows.sources, &criterion.column)?;
            let predicate = criterion
                .predicate
                .coerce(&column.name, column.column_type)?;
            resolved.push((rows.column_index(&column.name)?, predicate));
        }

        let mut out = rows.clone();
        out.retain(|row| resolved.iter().all(|(idx, p)| p.matches(&row[*idx])));
        Ok(out)
    }

    /// Split a result set by the distinct values of `column`.
    ///
    /// Rows whose value is NULL are dropped. Groups are keyed by the value's
    /// text form and keep the original row order.
    pub fn partition(rows: &RowSet, column: &str) -> Result<BTreeMap<String, RowSet>> {
        let idx = rows.column_index(column)?;
        let mut groups: BTreeMap<String, RowSet> = BTreeMap::new();
        for row in &rows.rows {
            if let Value::Null = row[idx] {
                continue;
            }
            groups
                .entry(row[idx].to_string())
                .or_insert_with(|| RowSet::from_sources(rows.sources.clone(), rows.columns.clone()))
                .rows
                .push(row.clone());
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;
    use crate::error::CellFreqError;
    use crate::overview::build_overview;

    fn store() -> TabularStore {
        let mut store = TabularStore::open_in_memory().unwrap();
        let samples = vec![
            Sample::new("s1", "p1").condition("melanoma").response("yes").counts([1, 1, 1, 1, 1]),
            Sample::new("s2", "p2").condition("lung").response("no").counts([2, 2, 2, 2, 2]),
            Sample::new("s3", "p3").condition("healthy").counts([3, 3, 3, 3, 3]),
            Sample::new("s4", "p4").condition("melanoma").response("no").counts([4, 4, 4, 4, 4]),
        ];
        store.load_samples("samples", &samples).unwrap();
        store
    }

    #[test]
    fn test_empty_criteria_returns_everything() {
        let store = store();
        let engine = FilterEngine::new(&store);
        let rows = engine.filter("samples", &Criteria::new()).unwrap();
        let ids: Vec<String> = rows
            .column("sample_id")
            .unwrap()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(ids, vec!["s1", "s2", "s3", "s4"]);
    }

    #[test]
    fn test_set_membership_narrows() {
        let store = store();
        let engine = FilterEngine::new(&store);
        let all = engine.filter("samples", &Criteria::new()).unwrap();
        let criteria = Criteria::new()
            .one_of("condition", ["melanoma", "lung"])
            .unwrap();
        let some = engine.filter("samples", &criteria).unwrap();
        assert_eq!(some.len(), 3);
        for row in &some.rows {
            assert!(all.rows.contains(row));
        }

        let narrower = engine
            .filter("samples", &criteria.clone().eq("response", "no").unwrap())
            .unwrap();
        assert!(narrower.len() <= some.len());
        assert_eq!(narrower.len(), 2);
    }

    #[test]
    fn test_apply_matches_store_query() {
        let store = store();
        let engine = FilterEngine::new(&store);
        let all = engine.filter("samples", &Criteria::new()).unwrap();
        let criteria = Criteria::new()
            .eq("condition", "melanoma")
            .unwrap()
            .between("total_count", 0.0, 10.0)
            .unwrap();
        let in_memory = engine.apply(&all, &criteria).unwrap();
        let queried = engine.filter("samples", &criteria).unwrap();
        assert_eq!(in_memory.rows, queried.rows);
        assert_eq!(in_memory.len(), 1);
    }

    #[test]
    fn test_partition_skips_nulls() {
        let store = store();
        let engine = FilterEngine::new(&store);
        let rows = engine
            .filter_columns("samples", &Criteria::new(), &["sample_id", "response"])
            .unwrap();
        let groups = FilterEngine::partition(&rows, "response").unwrap();
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["no", "yes"]);
        assert_eq!(groups["no"].len(), 2);
        assert_eq!(groups["yes"].len(), 1);
    }

    /// Three samples: A and B melanoma on miraclib, C lung untreated.
    fn cd4_store() -> TabularStore {
        let mut store = TabularStore::open_in_memory().unwrap();
        let samples = vec![
            Sample::new("A", "pA")
                .condition("melanoma")
                .treatment("miraclib")
                .counts([10, 40, 20, 15, 15]),
            Sample::new("B", "pB")
                .condition("melanoma")
                .treatment("miraclib")
                .counts([10, 60, 10, 10, 10]),
            Sample::new("C", "pC")
                .condition("lung")
                .treatment("none")
                .counts([20, 30, 20, 15, 15]),
        ];
        store.load_samples("samples", &samples).unwrap();
        let overview = build_overview(&samples).unwrap();
        store.load_overview("overview", &overview).unwrap();
        store
    }

    #[test]
    fn test_joined_filter_by_sample_metadata() {
        let store = cd4_store();
        let engine = FilterEngine::new(&store);
        let criteria = Criteria::new()
            .eq("condition", "melanoma")
            .unwrap()
            .eq("treatment", "miraclib")
            .unwrap()
            .eq("cell_type", "cd4_t_cell")
            .unwrap();
        let rows = engine
            .filter_joined(
                "overview",
                "samples",
                "sample_id",
                &criteria,
                Some(&["sample_id", "relative_frequency"]),
            )
            .unwrap();
        assert_eq!(rows.sources, vec!["overview", "samples"]);
        assert_eq!(
            rows.rows,
            vec![
                vec![Value::from("A"), Value::Real(0.4)],
                vec![Value::from("B"), Value::Real(0.6)],
            ]
        );
    }

    #[test]
    fn test_joined_default_projection_and_apply() {
        let store = cd4_store();
        let engine = FilterEngine::new(&store);
        let all = engine
            .filter_joined("overview", "samples", "sample_id", &Criteria::new(), None)
            .unwrap();
        assert_eq!(all.len(), 15);
        // Overview columns first, then sample columns minus the shared key.
        assert_eq!(all.columns[0], "sample_id");
        assert_eq!(all.columns[4], "relative_frequency");
        assert_eq!(all.columns[5], "project");
        assert_eq!(all.columns.len(), 5 + 15);

        let lung = Criteria::new().eq("condition", "lung").unwrap();
        let narrowed = engine.apply(&all, &lung).unwrap();
        assert_eq!(narrowed.len(), 5);
        for value in narrowed.column("sample_id").unwrap() {
            assert_eq!(value, &Value::from("C"));
        }
    }

    #[test]
    fn test_joined_unknown_column() {
        let store = cd4_store();
        let engine = FilterEngine::new(&store);
        let criteria = Criteria::new().eq("diagnosis", "x").unwrap();
        assert!(matches!(
            engine.filter_joined("overview", "samples", "sample_id", &criteria, None),
            Err(CellFreqError::Schema { .. })
        ));
        assert!(matches!(
            engine.filter_joined("overview", "samples", "cell_type", &Criteria::new(), None),
            Err(CellFreqError::Schema { .. })
        ));
    }

    #[test]
    fn test_unknown_column_propagates_schema_error() {
        let store = store();
        let engine = FilterEngine::new(&store);
        let criteria = Criteria::new().eq("diagnosis", "x").unwrap();
        assert!(matches!(
            engine.filter("samples", &criteria),
            Err(CellFreqError::Schema { .. })
        ));
    }
}
