//! Query Dispatcher
//!
//! Natural-language question in, rows out:
//! - Ask each matcher in turn; a transient failure hands over to the next one
//! - Resolve the matched template for the role
//! - Bind the template's parameters positionally (absent ones as NULL)
//! - Run `SELECT * FROM function($1::type, ...)` through the executor

use super::clause_builder::{ClauseBuilder, CompiledQuery};
use super::matcher::Matcher;
use super::template_registry::TemplateRegistry;
use crate::domain::error::{AppError, Result};
use crate::domain::match_result::{MatchResult, ParamMap, RequestContext};
use crate::domain::query_template::QueryTemplate;
use crate::infrastructure::db::{ensure_qualified_function, ensure_sql_type, QueryExecutor, Row};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const NO_MATCH_MESSAGE: &str = "Could not determine query type from your question.";

/// Matches below this are still executed, but flagged in the logs.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    pub query_type: String,
    pub description: String,
    pub param_values: Vec<Value>,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub data: Vec<Row>,
    pub meta: QueryMeta,
}

pub struct QueryDispatcher {
    matchers: Vec<Arc<dyn Matcher>>,
    registry: Arc<TemplateRegistry>,
    executor: Arc<dyn QueryExecutor>,
}

impl QueryDispatcher {
    /// `matchers` are tried in order.
    pub fn new(
        matchers: Vec<Arc<dyn Matcher>>,
        registry: Arc<TemplateRegistry>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            matchers,
            registry,
            executor,
        }
    }

    pub async fn handle(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<QueryOutcome> {
        let request_id = Uuid::new_v4();
        let span = info_span!("dispatch", %request_id, role);
        self.dispatch(query, role, ctx).instrument(span).await
    }

    async fn dispatch(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<QueryOutcome> {
        let matched = self.classify(query, role, ctx).await?;
        let template = self.registry.lookup(role, &matched.query_type)?;

        if matched.confidence < LOW_CONFIDENCE_THRESHOLD {
            warn!(
                query_type = %matched.query_type,
                confidence = matched.confidence,
                "executing low-confidence match"
            );
        }

        let param_values = bind_params(template, &matched.params);
        let compiled = call_query(template, &param_values)?;

        info!(
            query_type = %matched.query_type,
            function = template.function,
            param_count = compiled.params.len(),
            "executing template"
        );
        let result = self.executor.execute(&compiled.sql, &compiled.params).await?;
        info!(row_count = result.row_count, "template executed");

        Ok(QueryOutcome {
            data: result.rows,
            meta: QueryMeta {
                query_type: matched.query_type,
                description: template.description.to_string(),
                param_values,
                confidence: matched.confidence,
                reasoning: matched.reasoning,
            },
        })
    }

    /// First usable match across the matcher chain.
    pub async fn classify(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<MatchResult> {
        for matcher in &self.matchers {
            match matcher.try_match(query, role, ctx).await {
                Ok(Some(matched)) => {
                    info!(
                        matcher = matcher.name(),
                        query_type = %matched.query_type,
                        confidence = matched.confidence,
                        "query matched"
                    );
                    return Ok(matched);
                }
                Ok(None) => {
                    info!(matcher = matcher.name(), "matcher had no result");
                }
                Err(e) if e.is_transient_matcher_failure() => {
                    warn!(matcher = matcher.name(), error = %e, "matcher failed, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::ClassificationFailure(NO_MATCH_MESSAGE.to_string()))
    }
}

/// Values in the template's parameter order; absent names bind as NULL.
///
/// A scalar given for an array parameter is wrapped in a one-element array.
pub fn bind_params(template: &QueryTemplate, params: &ParamMap) -> Vec<Value> {
    template
        .params
        .iter()
        .map(|param| match params.get(param.name) {
            None => Value::Null,
            Some(value) if param.is_array() && !(value.is_array() || value.is_null()) => {
                Value::Array(vec![value.clone()])
            }
            Some(value) => value.clone(),
        })
        .collect()
}

/// `SELECT * FROM function($1::type, ...)`. Every placeholder carries its
/// declared cast, NULLs included.
pub fn call_query(template: &QueryTemplate, values: &[Value]) -> Result<CompiledQuery> {
    ensure_qualified_function(template.function)?;
    if values.len() != template.params.len() {
        return Err(AppError::Internal(format!(
            "{} takes {} parameters, got {}",
            template.function,
            template.params.len(),
            values.len()
        )));
    }

    let mut q = ClauseBuilder::with_sql("SELECT * FROM ");
    q.sql(template.function).sql("(");
    for (i, (param, value)) in template.params.iter().zip(values).enumerate() {
        ensure_sql_type(param.sql_type)?;
        if i > 0 {
            q.sql(", ");
        }
        q.push_bind(value.clone()).sql("::").sql(param.sql_type);
    }
    q.sql(")");
    Ok(q.build())
}
