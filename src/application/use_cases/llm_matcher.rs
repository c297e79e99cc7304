//! LLM Matcher
//!
//! Asks a chat model to pick the query type and extract parameters. The
//! reply is untrusted: it is parsed tolerantly, checked against the role's
//! templates, and completed with context defaults and a date window.

use super::matcher::Matcher;
use super::param_extractors::extract_date_range;
use super::template_registry::TemplateRegistry;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::match_result::{MatchResult, ParamMap, RequestContext};
use crate::domain::query_template::TemplateEntry;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::parse_json_object;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const CLASSIFIER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that matches natural language queries to database functions.";

pub struct LlmMatcher {
    llm_client: Arc<dyn LLMClient>,
    config: LLMConfig,
    registry: Arc<TemplateRegistry>,
}

impl LlmMatcher {
    pub fn new(
        llm_client: Arc<dyn LLMClient>,
        config: LLMConfig,
        registry: Arc<TemplateRegistry>,
    ) -> Self {
        let config = LLMConfig {
            temperature: Some(
                config
                    .temperature
                    .unwrap_or(LLMConfig::CLASSIFICATION_TEMPERATURE),
            ),
            ..config
        };
        Self {
            llm_client,
            config,
            registry,
        }
    }

    /// Validates a model reply and turns it into a match for `role`.
    pub fn interpret_reply(
        &self,
        reply: &str,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<MatchResult> {
        let payload = ModelMatch::parse(reply)?;

        let template = self
            .registry
            .get(role, &payload.query_type)
            .ok_or_else(|| {
                AppError::ParseError(format!(
                    "Query type {} not found for user type {}",
                    payload.query_type, role
                ))
            })?;

        let mut params = payload.params;
        ctx.fill_defaults(&mut params);
        if template.takes_date_range() {
            extract_date_range(query).fill_missing(&mut params);
        }

        Ok(MatchResult::new(
            payload.query_type,
            params,
            payload.confidence,
            payload.reasoning,
        ))
    }
}

#[async_trait]
impl Matcher for LlmMatcher {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn try_match(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<Option<MatchResult>> {
        let entries = self.registry.templates_for(role);
        if entries.is_empty() {
            debug!(role, "no templates for role, skipping model call");
            return Ok(None);
        }

        let prompt = build_prompt(query, role, entries);
        info!(
            role,
            provider = ?self.config.provider,
            model = %self.config.model,
            "classifying query with LLM"
        );

        let reply = self
            .llm_client
            .generate(&self.config, CLASSIFIER_SYSTEM_PROMPT, &prompt)
            .await?;

        self.interpret_reply(&reply, query, role, ctx).map(Some)
    }
}

/// The fields a model reply must carry, after schema checks.
#[derive(Debug, Clone, PartialEq)]
struct ModelMatch {
    query_type: String,
    params: ParamMap,
    confidence: f64,
    reasoning: String,
}

impl ModelMatch {
    fn parse(reply: &str) -> Result<Self> {
        let mut object = parse_json_object(reply)?;

        let query_type = match object.remove("queryType") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                return Err(AppError::ParseError(
                    "Model response has no queryType".to_string(),
                ))
            }
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => ParamMap::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AppError::ParseError(
                    "Model response params is not an object".to_string(),
                ))
            }
        };

        let confidence = match object.remove("confidence") {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            // Some models quote numbers.
            Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
            Some(_) => {
                return Err(AppError::ParseError(
                    "Model response confidence is not a number".to_string(),
                ))
            }
        };

        let reasoning = match object.remove("reasoning") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };

        Ok(Self {
            query_type,
            params,
            confidence,
            reasoning,
        })
    }
}

/// Role-scoped catalog followed by the question and the required reply shape.
pub fn build_prompt(query: &str, role: &str, entries: &[TemplateEntry]) -> String {
    let catalog = entries
        .iter()
        .map(|entry| {
            let examples = entry
                .template
                .examples
                .iter()
                .map(|example| format!("- \"{}\"", example))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Function: {}\nDescription: {}\nParameters: {}\nQuery Type: {}\nExample Queries:\n{}\n",
                entry.template.function,
                entry.template.description,
                entry
                    .template
                    .params
                    .iter()
                    .map(|param| format!("{} ({})", param.name, param.sql_type))
                    .collect::<Vec<_>>()
                    .join(", "),
                entry.query_type,
                examples
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        r#"You are an AI assistant for the Poverty Stoplight analytics system. Your task is to analyze a natural language query and match it to the most appropriate database function based on the user's role and intent.

USER TYPE: {role}

AVAILABLE FUNCTIONS:
{catalog}
USER QUERY: "{query}"

Analyze the user's query and determine:
1. Which function best matches the user's intent
2. What parameter values should be extracted from the query
3. Your confidence level (0-100) in this match
4. Your reasoning for this selection

Respond with a single JSON object in the following format:
{{
  "queryType": "string",
  "params": {{ "parameter_name": "value" }},
  "confidence": 0,
  "reasoning": "string"
}}
Use the Query Type values listed above for "queryType". Dates use YYYY-MM-DD format. Omit parameters you cannot infer.
"#
    )
}
