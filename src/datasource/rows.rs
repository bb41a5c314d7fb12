//! Query result rows with lenient scalar accessors.

use serde_json::Value;

/// Rows returned by a [`super::QueryExecutor`].
///
/// Values keep their JSON shape from the worker. Drivers disagree on how
/// aggregates come back (numbers, numeric strings, decimals), so accessors
/// normalise instead of assuming a type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Single-row helper for aggregate results.
    pub fn single(columns: &[&str], values: Vec<Value>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![values],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Integer value of a named column in the first row.
    pub fn first_i64(&self, column: &str) -> Option<i64> {
        let idx = self.column_index(column)?;
        self.rows.first()?.get(idx).and_then(value_as_i64)
    }

    /// First column of every row rendered as text, NULLs skipped.
    pub fn first_column_strings(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first())
            .filter_map(value_as_string)
            .collect()
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
