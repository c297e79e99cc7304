//! Read-only query execution against the analytics database.

pub mod postgres;

use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

pub use postgres::PgExecutor;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// Result of executing a query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            columns,
            row_count: rows.len(),
            rows,
        }
    }
}

/// Runs positional-parameter SQL. Implementations must never splice values into the text.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;
}

static FORBIDDEN_KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|GRANT|REVOKE)\b").unwrap()
});

static QUALIFIED_FUNCTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static SQL_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*( [a-z][a-z0-9_]*)*(\[\])?$").unwrap());

/// Rejects anything but a single read statement.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let sql_upper = sql.trim_start().to_uppercase();
    if !(sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH")) {
        return Err(AppError::ValidationError(
            "Only SELECT queries are allowed".to_string(),
        ));
    }

    if let Some(keyword) = FORBIDDEN_KEYWORD_PATTERN.find(sql) {
        return Err(AppError::ValidationError(format!(
            "Query contains forbidden keyword: {}",
            keyword.as_str().to_uppercase()
        )));
    }

    Ok(())
}

/// `schema.function`, plain identifiers only.
pub fn ensure_qualified_function(name: &str) -> Result<()> {
    if QUALIFIED_FUNCTION_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Invalid function name: {}",
            name
        )))
    }
}

/// Type names are spliced into casts, so only plain (optionally array) names pass.
pub fn ensure_sql_type(name: &str) -> Result<()> {
    if SQL_TYPE_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!("Invalid parameter type: {}", name)))
    }
}

/// Lenient integer read: numbers are truncated, numeric strings parsed.
pub fn value_as_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

pub fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn value_as_strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| value_as_string(Some(item)))
            .collect(),
        _ => Vec::new(),
    }
}
