//! SQLite-backed tabular store.

use super::schema::{quote, ColumnDef, ColumnType, TableSchema};
use crate::data::{OverviewRow, RowSet, Sample, Value};
use crate::error::{CellFreqError, Result};
use crate::filter::Criteria;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Durable store holding named tables in a single SQLite file.
///
/// The connection is owned by the store and released when the store is
/// dropped or explicitly [`closed`](TabularStore::close).
pub struct TabularStore {
    conn: Connection,
    location: String,
}

impl TabularStore {
    /// Open (or create) a store file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).map_err(|e| CellFreqError::StoreUnavailable {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        // Connection::open is lazy about the file; touch the schema so a bad
        // path fails here rather than on first query.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| CellFreqError::StoreUnavailable {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %location, "store opened");
        Ok(Self { conn, location })
    }

    /// Open a transient in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| CellFreqError::StoreUnavailable {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn,
            location: ":memory:".to_string(),
        })
    }

    /// Open a store, run `f` against it and close it on every exit path.
    pub fn with<P, F, T>(path: P, f: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut TabularStore) -> Result<T>,
    {
        let mut store = Self::open(path)?;
        match f(&mut store) {
            Ok(value) => {
                store.close()?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the store releases the connection; the original
                // error takes precedence over any close failure.
                drop(store);
                Err(e)
            }
        }
    }

    /// Close the connection, surfacing any error from SQLite.
    pub fn close(self) -> Result<()> {
        let location = self.location;
        self.conn
            .close()
            .map_err(|(_, e)| CellFreqError::StoreUnavailable {
                path: location.clone(),
                reason: e.to_string(),
            })?;
        debug!(path = %location, "store closed");
        Ok(())
    }

    /// Where the store lives.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn unavailable(&self, e: rusqlite::Error) -> CellFreqError {
        unavailable_at(&self.location, e)
    }

    /// Replace the named samples table.
    pub fn load_samples(&mut self, table: &str, samples: &[Sample]) -> Result<usize> {
        let schema = TableSchema::samples(table)?;
        check_samples(samples)?;
        self.replace_table(&schema, samples.iter().map(Sample::to_values))
    }

    /// Replace the named overview table.
    pub fn load_overview(&mut self, table: &str, rows: &[OverviewRow]) -> Result<usize> {
        let schema = TableSchema::overview(table)?;
        self.replace_table(&schema, rows.iter().map(OverviewRow::to_values))
    }

    /// Replace a table's content with `rows`, atomically.
    ///
    /// The table is dropped and recreated inside one transaction, so re-running
    /// a load never accumulates duplicates and a failed load leaves the previous
    /// content in place.
    fn replace_table<I>(&mut self, schema: &TableSchema, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<Vec<Value>>>,
    {
        let location = self.location.clone();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| unavailable_at(&location, e))?;
        let n_rows = write_table(&tx, &location, schema, rows)?;
        tx.commit().map_err(|e| unavailable_at(&location, e))?;

        info!(table = %schema.name, rows = n_rows, "table loaded");
        Ok(n_rows)
    }

    /// Replace the samples and overview tables together.
    ///
    /// Both tables are written in one transaction: either both hold the new
    /// content afterwards or neither changed. Returns the row counts of the
    /// samples and overview tables.
    pub fn load_dataset(
        &mut self,
        samples_table: &str,
        overview_table: &str,
        samples: &[Sample],
        overview: &[OverviewRow],
    ) -> Result<(usize, usize)> {
        let samples_schema = TableSchema::samples(samples_table)?;
        let overview_schema = TableSchema::overview(overview_table)?;
        if samples_table.eq_ignore_ascii_case(overview_table) {
            return Err(CellFreqError::schema(
                overview_table,
                "samples and overview tables must differ",
            ));
        }
        check_samples(samples)?;

        let location = self.location.clone();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| unavailable_at(&location, e))?;
        let n_samples = write_table(
            &tx,
            &location,
            &samples_schema,
            samples.iter().map(Sample::to_values),
        )?;
        let n_overview = write_table(
            &tx,
            &location,
            &overview_schema,
            overview.iter().map(OverviewRow::to_values),
        )?;
        tx.commit().map_err(|e| unavailable_at(&location, e))?;

        info!(
            samples_table,
            overview_table,
            samples = n_samples,
            overview_rows = n_overview,
            "dataset loaded"
        );
        Ok((n_samples, n_overview))
    }

    /// Names of the tables present in the store, sorted.
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Schema of a table as recorded in the store.
    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        super::schema::check_identifier(table, table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))
            .map_err(|e| self.unavailable(e))?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok(ColumnDef::new(&name, ColumnType::from_declared(&declared)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Err(CellFreqError::schema(table, "table does not exist"));
        }
        TableSchema::new(table, columns)
    }

    /// Build the `WHERE` clause for `criteria`; `resolve` maps a column name
    /// to its qualified SQL reference and definition.
    fn where_clause<F>(criteria: &Criteria, resolve: F) -> Result<(String, Vec<Value>)>
    where
        F: Fn(&str) -> Result<(String, ColumnDef)>,
    {
        if criteria.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let mut fragments = Vec::with_capacity(criteria.len());
        let mut params = Vec::new();
        for criterion in criteria.iter() {
            let (reference, column) = resolve(&criterion.column)?;
            let predicate = criterion
                .predicate
                .coerce(&column.name, column.column_type)?;
            let (fragment, values) = predicate.to_sql(&reference);
            fragments.push(fragment);
            params.extend(values);
        }
        Ok((format!(" WHERE {}", fragments.join(" AND ")), params))
    }

    fn run_select(&self, sql: &str, params: &[Value], n_cols: usize) -> Result<Vec<Vec<Value>>> {
        debug!(%sql, n_params = params.len(), "query");
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..n_cols)
                    .map(|i| row.get_ref(i).map(Value::from))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rows of `table` satisfying every criterion, projected to `columns`
    /// (all columns when `None`), in insertion order.
    pub fn query(
        &self,
        table: &str,
        criteria: &Criteria,
        columns: Option<&[&str]>,
    ) -> Result<RowSet> {
        let schema = self.schema(table)?;
        let projection: Vec<String> = match columns {
            Some(cols) => cols
                .iter()
                .map(|c| schema.column(c).map(|def| def.name.clone()))
                .collect::<Result<_>>()?,
            None => schema.column_names(),
        };
        if projection.is_empty() {
            return Err(CellFreqError::schema(table, "empty column projection"));
        }
        let (where_sql, params) = Self::where_clause(criteria, |name| {
            let def = schema.column(name)?;
            Ok((quote(&def.name), def.clone()))
        })?;

        let quoted: Vec<String> = projection.iter().map(|c| quote(c)).collect();
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY rowid",
            quoted.join(", "),
            quote(table),
            where_sql
        );

        let mut result = RowSet::new(table, projection);
        result.rows = self.run_select(&sql, &params, result.columns.len())?;
        Ok(result)
    }

    /// Rows of `left` joined to `right` on equal `key` values.
    ///
    /// Column names resolve against `left` first, then `right`; the default
    /// projection is every column of `left` followed by the columns of `right`
    /// that `left` does not have. Rows keep the order of `left`.
    pub fn query_joined(
        &self,
        left: &str,
        right: &str,
        key: &str,
        criteria: &Criteria,
        columns: Option<&[&str]>,
    ) -> Result<RowSet> {
        let left_schema = self.schema(left)?;
        let right_schema = self.schema(right)?;
        left_schema.column(key)?;
        right_schema.column(key)?;

        let resolve = |name: &str| -> Result<(String, ColumnDef)> {
            if let Ok(def) = left_schema.column(name) {
                return Ok((format!("l.{}", quote(&def.name)), def.clone()));
            }
            match right_schema.column(name) {
                Ok(def) => Ok((format!("r.{}", quote(&def.name)), def.clone())),
                Err(_) => Err(CellFreqError::schema(
                    &format!("{}+{}", left, right),
                    format!("unknown column '{}'", name),
                )),
            }
        };

        let projection: Vec<String> = match columns {
            Some(cols) => cols.iter().map(|c| c.to_string()).collect(),
            None => left_schema
                .column_names()
                .into_iter()
                .chain(
                    right_schema
                        .column_names()
                        .into_iter()
                        .filter(|c| !left_schema.has_column(c)),
                )
                .collect(),
        };
        if projection.is_empty() {
            return Err(CellFreqError::schema(left, "empty column projection"));
        }
        let references = projection
            .iter()
            .map(|c| resolve(c).map(|(reference, _)| reference))
            .collect::<Result<Vec<_>>>()?;
        let (where_sql, params) = Self::where_clause(criteria, resolve)?;

        let sql = format!(
            "SELECT {} FROM {} AS l JOIN {} AS r ON l.{key} = r.{key}{} ORDER BY l.rowid, r.rowid",
            references.join(", "),
            quote(left),
            quote(right),
            where_sql,
            key = quote(key)
        );

        let mut result =
            RowSet::from_sources(vec![left.to_string(), right.to_string()], projection);
        result.rows = self.run_select(&sql, &params, result.columns.len())?;
        Ok(result)
    }

    /// Definition of `column` in the first of `sources` that has it.
    pub fn resolve_column(&self, sources: &[String], column: &str) -> Result<ColumnDef> {
        for table in sources {
            let schema = self.schema(table)?;
            if let Ok(def) = schema.column(column) {
                return Ok(def.clone());
            }
        }
        Err(CellFreqError::schema(
            &sources.join("+"),
            format!("unknown column '{}'", column),
        ))
    }

    /// Number of rows of `table` matching `criteria`.
    pub fn count_matching(&self, table: &str, criteria: &Criteria) -> Result<usize> {
        let schema = self.schema(table)?;
        let (where_sql, params) = Self::where_clause(criteria, |name| {
            let def = schema.column(name)?;
            Ok((quote(&def.name), def.clone()))
        })?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", quote(table), where_sql);
        let n: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Row counts per distinct value of `column` among rows matching `criteria`,
    /// ordered by value.
    pub fn count_by(
        &self,
        table: &str,
        criteria: &Criteria,
        column: &str,
    ) -> Result<Vec<(Value, usize)>> {
        let schema = self.schema(table)?;
        let col = quote(&schema.column(column)?.name);
        let (where_sql, params) = Self::where_clause(criteria, |name| {
            let def = schema.column(name)?;
            Ok((quote(&def.name), def.clone()))
        })?;
        let sql = format!(
            "SELECT {col}, COUNT(*) FROM {}{} GROUP BY {col} ORDER BY {col}",
            quote(table),
            where_sql,
            col = col
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let counts = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((Value::from(row.get_ref(0)?), row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Sorted distinct non-null values of a column.
    pub fn distinct(&self, table: &str, column: &str) -> Result<Vec<Value>> {
        let schema = self.schema(table)?;
        let col = quote(&schema.column(column)?.name);
        let sql = format!(
            "SELECT DISTINCT {col} FROM {} WHERE {col} IS NOT NULL ORDER BY {col}",
            quote(table),
            col = col
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map(params![], |row| Ok(Value::from(row.get_ref(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let schema = self.schema(table)?;
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(&schema.name)),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn unavailable_at(location: &str, e: rusqlite::Error) -> CellFreqError {
    CellFreqError::StoreUnavailable {
        path: location.to_string(),
        reason: e.to_string(),
    }
}

/// Drop, recreate and fill one table inside an open transaction.
///
/// Rows are converted lazily; an `InvalidValue` from a row is reported with
/// that row's 1-based position.
fn write_table<I>(
    tx: &Transaction<'_>,
    location: &str,
    schema: &TableSchema,
    rows: I,
) -> Result<usize>
where
    I: IntoIterator<Item = Result<Vec<Value>>>,
{
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(&schema.name)))
        .map_err(|e| unavailable_at(location, e))?;
    tx.execute_batch(&schema.create_sql())
        .map_err(|e| unavailable_at(location, e))?;

    let mut stmt = tx
        .prepare(&schema.insert_sql())
        .map_err(|e| unavailable_at(location, e))?;
    let mut n_rows = 0;
    for (i, row) in rows.into_iter().enumerate() {
        let row = row.map_err(|e| match e {
            CellFreqError::InvalidValue { value, column, .. } => CellFreqError::InvalidValue {
                value,
                row: i + 1,
                column,
            },
            other => other,
        })?;
        if row.len() != schema.columns.len() {
            return Err(CellFreqError::schema(
                &schema.name,
                format!(
                    "row {} has {} values, table has {} columns",
                    i,
                    row.len(),
                    schema.columns.len()
                ),
            ));
        }
        stmt.execute(params_from_iter(row.iter()))
            .map_err(|e| unavailable_at(location, e))?;
        n_rows += 1;
    }
    Ok(n_rows)
}

/// Validate every sample and reject duplicate ids.
fn check_samples(samples: &[Sample]) -> Result<()> {
    let mut seen = HashSet::new();
    for sample in samples {
        sample.validate()?;
        if !seen.insert(sample.sample_id.as_str()) {
            return Err(CellFreqError::InvalidParameter(format!(
                "Duplicate sample_id '{}'",
                sample.sample_id
            )));
        }
    }
    Ok(())
}
