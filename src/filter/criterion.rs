//! Column predicates and their conjunctive composition.
//!
//! A criterion pairs a column name with a [`Predicate`]. The predicate shape is
//! resolved once, when the criterion is built, from whatever loosely shaped
//! input the caller has (a JSON/YAML value from a config file, or a
//! `column=value` string from the command line). Everything downstream works
//! with the tagged variant only.

use crate::data::Value;
use crate::error::{CellFreqError, Result};
use crate::store::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accepted predicate shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Column equals a scalar.
    Equals(Value),
    /// Column is one of a set of scalars.
    InSet(Vec<Value>),
    /// Column lies in an inclusive numeric range.
    InRange { low: f64, high: f64 },
}

impl Predicate {
    /// Check a predicate's own shape.
    fn validate(&self, column: &str) -> Result<()> {
        match self {
            Predicate::Equals(v) => check_scalar(column, v),
            Predicate::InSet(values) => {
                if values.is_empty() {
                    return Err(CellFreqError::invalid_criterion(column, "empty set of values"));
                }
                values.iter().try_for_each(|v| check_scalar(column, v))
            }
            Predicate::InRange { low, high } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(CellFreqError::invalid_criterion(
                        column,
                        "range bounds must be finite numbers",
                    ));
                }
                if low > high {
                    return Err(CellFreqError::invalid_criterion(
                        column,
                        format!("inverted range [{}, {}]", low, high),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Convert scalar operands to the column's storage type.
    pub fn coerce(&self, column: &str, column_type: ColumnType) -> Result<Predicate> {
        Ok(match self {
            Predicate::Equals(v) => Predicate::Equals(column_type.coerce(column, v)?),
            Predicate::InSet(values) => Predicate::InSet(
                values
                    .iter()
                    .map(|v| column_type.coerce(column, v))
                    .collect::<Result<_>>()?,
            ),
            Predicate::InRange { low, high } => {
                if column_type == ColumnType::Text {
                    return Err(CellFreqError::invalid_criterion(
                        column,
                        "numeric range on a text column",
                    ));
                }
                Predicate::InRange {
                    low: *low,
                    high: *high,
                }
            }
        })
    }

    /// SQL fragment for an already quoted column, with its bound parameters.
    pub fn to_sql(&self, quoted_column: &str) -> (String, Vec<Value>) {
        match self {
            Predicate::Equals(v) => (format!("{} = ?", quoted_column), vec![v.clone()]),
            Predicate::InSet(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                (
                    format!("{} IN ({})", quoted_column, placeholders),
                    values.clone(),
                )
            }
            Predicate::InRange { low, high } => (
                format!("{} BETWEEN ? AND ?", quoted_column),
                vec![Value::Real(*low), Value::Real(*high)],
            ),
        }
    }

    /// Evaluate against a single value, with the same semantics as the SQL form.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Equals(v) => value.sql_eq(v),
            Predicate::InSet(values) => values.iter().any(|v| value.sql_eq(v)),
            Predicate::InRange { low, high } => value
                .as_f64()
                .map(|x| *low <= x && x <= *high)
                .unwrap_or(false),
        }
    }
}

fn check_scalar(column: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => Err(CellFreqError::invalid_criterion(
            column,
            "null is not a comparable value",
        )),
        Value::Real(v) if !v.is_finite() => Err(CellFreqError::invalid_criterion(
            column,
            "non-finite number",
        )),
        _ => Ok(()),
    }
}

/// A single column-scoped predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub column: String,
    pub predicate: Predicate,
}

impl Criterion {
    /// Build a criterion, rejecting malformed predicate shapes.
    pub fn new(column: &str, predicate: Predicate) -> Result<Self> {
        if column.is_empty() {
            return Err(CellFreqError::invalid_criterion(column, "empty column name"));
        }
        predicate.validate(column)?;
        Ok(Self {
            column: column.to_string(),
            predicate,
        })
    }

    /// Resolve a loosely typed value into a predicate.
    ///
    /// * scalar (string or number) -> [`Predicate::Equals`]
    /// * array of scalars -> [`Predicate::InSet`]
    /// * `{ "min": lo, "max": hi }` or `{ "range": [lo, hi] }` -> [`Predicate::InRange`]
    pub fn from_json(column: &str, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value as J;

        let predicate = match value {
            J::Array(items) => Predicate::InSet(
                items
                    .iter()
                    .map(|item| json_scalar(column, item))
                    .collect::<Result<_>>()?,
            ),
            J::Object(map) => {
                let bounds = match (map.get("range"), map.get("min"), map.get("max")) {
                    (Some(J::Array(pair)), None, None) if map.len() == 1 && pair.len() == 2 => {
                        (json_number(column, &pair[0])?, json_number(column, &pair[1])?)
                    }
                    (None, Some(lo), Some(hi)) if map.len() == 2 => {
                        (json_number(column, lo)?, json_number(column, hi)?)
                    }
                    _ => {
                        return Err(CellFreqError::invalid_criterion(
                            column,
                            format!(
                                "object must be {{min, max}} or {{range: [low, high]}}, got keys {:?}",
                                map.keys().collect::<Vec<_>>()
                            ),
                        ))
                    }
                };
                Predicate::InRange {
                    low: bounds.0,
                    high: bounds.1,
                }
            }
            scalar => Predicate::Equals(json_scalar(column, scalar)?),
        };
        Self::new(column, predicate)
    }

    /// Parse `column=value`, `column=a,b,c` or `column=low..high`.
    pub fn parse(expr: &str) -> Result<Self> {
        let (column, rhs) = expr.split_once('=').ok_or_else(|| {
            CellFreqError::invalid_criterion(expr, "expected 'column=value'")
        })?;
        let column = column.trim();
        let rhs = rhs.trim();

        let predicate = if let Some((lo, hi)) = rhs.split_once("..") {
            let parse = |s: &str| {
                s.trim().parse::<f64>().map_err(|_| {
                    CellFreqError::invalid_criterion(
                        column,
                        format!("range bound '{}' is not a number", s.trim()),
                    )
                })
            };
            Predicate::InRange {
                low: parse(lo)?,
                high: parse(hi)?,
            }
        } else if rhs.contains(',') {
            Predicate::InSet(
                rhs.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(Value::from)
                    .collect(),
            )
        } else if rhs.is_empty() {
            return Err(CellFreqError::invalid_criterion(column, "empty value"));
        } else {
            Predicate::Equals(Value::from(rhs))
        };
        Self::new(column, predicate)
    }
}

fn json_scalar(column: &str, value: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as J;
    match value {
        J::String(s) => Ok(Value::Text(s.clone())),
        J::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        }),
        other => Err(CellFreqError::invalid_criterion(
            column,
            format!("unsupported value shape: {}", json_shape(other)),
        )),
    }
}

fn json_number(column: &str, value: &serde_json::Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        CellFreqError::invalid_criterion(
            column,
            format!("range bound must be a number, got {}", json_shape(value)),
        )
    })
}

fn json_shape(value: &serde_json::Value) -> &'static str {
    use serde_json::Value as J;
    match value {
        J::Null => "null",
        J::Bool(_) => "boolean",
        J::Number(_) => "number",
        J::String(_) => "string",
        J::Array(_) => "array",
        J::Object(_) => "object",
    }
}

/// A conjunction of criteria. Empty criteria select every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    criteria: Vec<Criterion>,
}

impl Criteria {
    /// Create empty criteria.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a column -> loosely typed value map.
    pub fn from_map(map: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        let criteria = map
            .iter()
            .map(|(column, value)| Criterion::from_json(column, value))
            .collect::<Result<_>>()?;
        Ok(Self { criteria })
    }

    /// Build from `column=value` expressions.
    pub fn parse_all<S: AsRef<str>>(exprs: &[S]) -> Result<Self> {
        let criteria = exprs
            .iter()
            .map(|e| Criterion::parse(e.as_ref()))
            .collect::<Result<_>>()?;
        Ok(Self { criteria })
    }

    /// Add an already built criterion.
    pub fn with(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Require `column == value`.
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(self.with(Criterion::new(column, Predicate::Equals(value.into()))?))
    }

    /// Require `column` to be one of `values`.
    pub fn one_of<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        let values = values.into_iter().map(Into::into).collect();
        Ok(self.with(Criterion::new(column, Predicate::InSet(values))?))
    }

    /// Require `low <= column <= high`.
    pub fn between(self, column: &str, low: f64, high: f64) -> Result<Self> {
        Ok(self.with(Criterion::new(column, Predicate::InRange { low, high })?))
    }

    /// Conjunction of two sets of criteria.
    pub fn and(mut self, other: &Criteria) -> Self {
        self.criteria.extend(other.criteria.iter().cloned());
        self
    }

    /// Number of criteria.
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Iterate over criteria.
    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_shapes() {
        let eq = Criterion::from_json("condition", &json!("melanoma")).unwrap();
        assert_eq!(eq.predicate, Predicate::Equals(Value::from("melanoma")));

        let set = Criterion::from_json("condition", &json!(["melanoma", "lung"])).unwrap();
        assert_eq!(
            set.predicate,
            Predicate::InSet(vec![Value::from("melanoma"), Value::from("lung")])
        );

        let range = Criterion::from_json("age", &json!({"min": 18, "max": 65.5})).unwrap();
        assert_eq!(range.predicate, Predicate::InRange { low: 18.0, high: 65.5 });

        let range = Criterion::from_json("age", &json!({"range": [0, 7]})).unwrap();
        assert_eq!(range.predicate, Predicate::InRange { low: 0.0, high: 7.0 });
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        let bad = [
            json!(null),
            json!(true),
            json!([]),
            json!([["nested"]]),
            json!({"min": 1}),
            json!({"min": "a", "max": 2}),
            json!({"min": 5, "max": 1}),
            json!({"range": [1, 2, 3]}),
            json!({"other": 1}),
        ];
        for value in bad {
            let err = Criterion::from_json("age", &value).unwrap_err();
            assert!(
                matches!(err, CellFreqError::InvalidCriterion { ref column, .. } if column == "age"),
                "{} should be rejected, got {:?}",
                value,
                err
            );
        }
    }

    #[test]
    fn test_parse_expressions() {
        let c = Criterion::parse("condition=melanoma").unwrap();
        assert_eq!(c.column, "condition");
        assert_eq!(c.predicate, Predicate::Equals(Value::from("melanoma")));

        let c = Criterion::parse("condition = melanoma, lung").unwrap();
        assert_eq!(
            c.predicate,
            Predicate::InSet(vec![Value::from("melanoma"), Value::from("lung")])
        );

        let c = Criterion::parse("time_from_treatment_start=0..7").unwrap();
        assert_eq!(c.predicate, Predicate::InRange { low: 0.0, high: 7.0 });

        assert!(Criterion::parse("condition").is_err());
        assert!(Criterion::parse("age=a..b").is_err());
        assert!(Criterion::parse("age=").is_err());
    }

    #[test]
    fn test_coerce_to_column_type() {
        let p = Predicate::Equals(Value::from("57"));
        assert_eq!(
            p.coerce("age", ColumnType::Integer).unwrap(),
            Predicate::Equals(Value::Integer(57))
        );
        assert!(p.coerce("age", ColumnType::Text).is_ok());
        assert!(Predicate::Equals(Value::from("old"))
            .coerce("age", ColumnType::Integer)
            .is_err());
        assert!(Predicate::InRange { low: 0.0, high: 1.0 }
            .coerce("condition", ColumnType::Text)
            .is_err());
    }

    #[test]
    fn test_matches_in_memory() {
        let range = Predicate::InRange { low: 0.0, high: 7.0 };
        assert!(range.matches(&Value::Integer(0)));
        assert!(range.matches(&Value::Integer(7)));
        assert!(!range.matches(&Value::Integer(14)));
        assert!(!range.matches(&Value::Null));

        let set = Predicate::InSet(vec![Value::from("yes"), Value::from("no")]);
        assert!(set.matches(&Value::from("no")));
        assert!(!set.matches(&Value::Null));
    }

    #[test]
    fn test_to_sql() {
        let (sql, params) = Predicate::InSet(vec![Value::from("a"), Value::from("b")])
            .to_sql("\"condition\"");
        assert_eq!(sql, "\"condition\" IN (?, ?)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_criteria_builder() {
        let criteria = Criteria::new()
            .eq("condition", "melanoma")
            .unwrap()
            .one_of("response", ["yes", "no"])
            .unwrap()
            .between("time_from_treatment_start", 0.0, 0.0)
            .unwrap();
        assert_eq!(criteria.len(), 3);
        assert!(Criteria::new().one_of("x", Vec::<&str>::new()).is_err());
    }
}
