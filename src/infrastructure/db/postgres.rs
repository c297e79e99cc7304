//! Postgres executor
//!
//! Owns the process-wide connection pool. Each query acquires one pooled
//! connection, runs under a timeout and hands the connection back when the
//! guard drops, on success and on failure alike.

use super::{ensure_read_only, QueryExecutor, QueryResult, Row};
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Pool, Postgres, Row as _};
use std::time::Duration;
use tracing::{debug, error, info};

/// Configuration for the connection pool
#[derive(Debug, Clone)]
pub struct PgExecutorConfig {
    pub max_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for PgExecutorConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 300,
            query_timeout_secs: 30,
        }
    }
}

pub struct PgExecutor {
    pool: Pool<Postgres>,
    config: PgExecutorConfig,
}

impl PgExecutor {
    /// Builds the pool lazily; no connection is opened until the first query.
    pub fn connect_lazy(url: &str, config: PgExecutorConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_lazy(url)
            .map_err(|e| {
                error!("Invalid PostgreSQL connection settings: {}", e);
                AppError::DatabaseError(format!("Failed to configure PostgreSQL pool: {}", e))
            })?;

        info!(
            max_connections = config.max_connections,
            "Created PostgreSQL connection pool"
        );

        Ok(Self { pool, config })
    }

    pub async fn close(&self) {
        info!("Closing PostgreSQL connection pool");
        self.pool.close().await;
    }

    fn bind_value<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &Value,
    ) -> Query<'q, Postgres, PgArguments> {
        match value {
            Value::String(s) => query.bind(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    query.bind(n.to_string())
                }
            }
            Value::Bool(b) => query.bind(*b),
            Value::Null => query.bind(Option::<String>::None),
            Value::Array(items) => {
                if let Some(strings) = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<String>>>()
                {
                    query.bind(strings)
                } else if let Some(ints) = items
                    .iter()
                    .map(Value::as_i64)
                    .collect::<Option<Vec<i64>>>()
                {
                    query.bind(ints)
                } else {
                    query.bind(value.to_string())
                }
            }
            Value::Object(_) => query.bind(value.to_string()),
        }
    }

    /// Extract a column value from a row as serde_json::Value
    fn extract_column_value(row: &PgRow, index: usize) -> Value {
        // Try different types in order of likelihood
        if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(index) {
            return v.map(Self::decimal_to_json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
            return v
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
            return v
                .map(|dt| Value::String(dt.to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
            return v
                .map(|d| Value::String(d.to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(index) {
            return v
                .map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<i64>>, _>(index) {
            return v
                .map(|items| Value::Array(items.into_iter().map(Value::from).collect()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<i32>>, _>(index) {
            return v
                .map(|items| Value::Array(items.into_iter().map(Value::from).collect()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Value>, _>(index) {
            return v.unwrap_or(Value::Null);
        }

        // Default to null for unsupported types
        Value::Null
    }

    fn decimal_to_json(decimal: BigDecimal) -> Value {
        decimal
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(decimal.to_string()))
    }

    fn row_to_json(row: &PgRow) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name().to_string(), Self::extract_column_value(row, i)))
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        ensure_read_only(sql)?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = Self::bind_value(query, param);
        }

        debug!(sql, param_count = params.len(), "executing query");

        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire PostgreSQL connection: {}", e);
            AppError::DatabaseError(format!("Failed to acquire connection: {}", e))
        })?;

        // Execute with timeout
        let rows = tokio::time::timeout(
            Duration::from_secs(self.config.query_timeout_secs),
            query.fetch_all(&mut *conn),
        )
        .await
        .map_err(|_| {
            AppError::DatabaseError(format!(
                "Query timed out after {} seconds",
                self.config.query_timeout_secs
            ))
        })??;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows: Vec<Row> = rows.iter().map(Self::row_to_json).collect();

        debug!(row_count = rows.len(), "query returned");

        Ok(QueryResult {
            columns,
            row_count: rows.len(),
            rows,
        })
    }
}
