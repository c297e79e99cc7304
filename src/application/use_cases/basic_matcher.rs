//! Rule-based Matcher
//!
//! Lexical fallback used when no model is available or the model's answer
//! cannot be used. Three tiers, strongest signal first:
//!
//! 1. significant-word overlap with a template's example questions (60)
//! 2. description words found in the question (40)
//! 3. the role's first template (20)
//!
//! Deterministic: the same question, role and context always produce the
//! same result.

use super::matcher::Matcher;
use super::param_extractors::{
    extract_date_range, extract_dimensions, extract_family_reference, FamilyDirectory,
    StaticFamilyDirectory, DIMENSIONS_PARAM, FAMILY_ID_PARAM,
};
use super::template_registry::TemplateRegistry;
use crate::domain::error::Result;
use crate::domain::match_result::{MatchResult, ParamMap, RequestContext};
use crate::domain::query_template::{QueryTemplate, TemplateEntry};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub const EXAMPLE_OVERLAP_CONFIDENCE: f64 = 60.0;
pub const DESCRIPTION_OVERLAP_CONFIDENCE: f64 = 40.0;
pub const FALLBACK_CONFIDENCE: f64 = 20.0;

const EXAMPLE_OVERLAP_REASONING: &str = "keyword overlap with example queries";
const DESCRIPTION_OVERLAP_REASONING: &str = "matched based on description keywords";
const FALLBACK_REASONING: &str = "no clear match found, using default function";

/// Words shorter than this (inclusive) carry no signal in example overlap.
const MIN_EXAMPLE_WORD_LEN: usize = 4;
const MIN_DESCRIPTION_WORD_LEN: usize = 5;
const MIN_SHARED_EXAMPLE_WORDS: usize = 3;
const MIN_DESCRIPTION_HITS: usize = 2;

pub struct BasicMatcher {
    registry: Arc<TemplateRegistry>,
    families: Arc<dyn FamilyDirectory>,
}

impl BasicMatcher {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self::with_directory(registry, Arc::new(StaticFamilyDirectory::default()))
    }

    pub fn with_directory(
        registry: Arc<TemplateRegistry>,
        families: Arc<dyn FamilyDirectory>,
    ) -> Self {
        Self { registry, families }
    }

    /// Synchronous core of [`Matcher::try_match`].
    pub fn match_query(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Option<MatchResult> {
        let entries = self.registry.templates_for(role);
        let first = entries.first()?;

        let (entry, confidence, reasoning) =
            if let Some(entry) = best_example_overlap(query, entries) {
                (entry, EXAMPLE_OVERLAP_CONFIDENCE, EXAMPLE_OVERLAP_REASONING)
            } else if let Some(entry) = first_description_overlap(query, entries) {
                (entry, DESCRIPTION_OVERLAP_CONFIDENCE, DESCRIPTION_OVERLAP_REASONING)
            } else {
                (first, FALLBACK_CONFIDENCE, FALLBACK_REASONING)
            };

        debug!(
            role,
            query_type = entry.query_type,
            confidence,
            "basic matcher selected template"
        );

        Some(MatchResult::new(
            entry.query_type,
            self.seed_params(query, &entry.template, ctx),
            confidence,
            reasoning,
        ))
    }

    /// Context defaults and the date window, plus family and dimensions when
    /// the template takes them.
    fn seed_params(&self, query: &str, template: &QueryTemplate, ctx: &RequestContext) -> ParamMap {
        let mut params = ctx.default_params();
        extract_date_range(query).write_into(&mut params);

        if template.takes_param(FAMILY_ID_PARAM) {
            let family_id = extract_family_reference(query, self.families.as_ref());
            params.insert(FAMILY_ID_PARAM.to_string(), family_id.into());
        }
        if template.takes_param(DIMENSIONS_PARAM) {
            let dimensions = extract_dimensions(query)
                .into_iter()
                .map(Value::String)
                .collect();
            params.insert(DIMENSIONS_PARAM.to_string(), Value::Array(dimensions));
        }

        params
    }
}

#[async_trait]
impl Matcher for BasicMatcher {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn try_match(
        &self,
        query: &str,
        role: &str,
        ctx: &RequestContext,
    ) -> Result<Option<MatchResult>> {
        Ok(self.match_query(query, role, ctx))
    }
}

/// Lowercased whitespace tokens with punctuation trimmed from both ends.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn significant_words(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|word| word.chars().count() >= MIN_EXAMPLE_WORD_LEN)
        .collect()
}

/// Example with the highest Jaccard overlap among those sharing enough words.
/// The first declared wins ties.
fn best_example_overlap<'a>(
    query: &str,
    entries: &'a [TemplateEntry],
) -> Option<&'a TemplateEntry> {
    let query_words = significant_words(query);
    if query_words.len() < MIN_SHARED_EXAMPLE_WORDS {
        return None;
    }

    // (entry, shared, union)
    let mut best: Option<(&TemplateEntry, usize, usize)> = None;
    for entry in entries {
        for example in entry.template.examples {
            let example_words = significant_words(example);
            let shared = query_words.intersection(&example_words).count();
            if shared < MIN_SHARED_EXAMPLE_WORDS {
                continue;
            }
            let union = query_words.len() + example_words.len() - shared;
            let better = match best {
                None => true,
                Some((_, best_shared, best_union)) => shared * best_union > best_shared * union,
            };
            if better {
                best = Some((entry, shared, union));
            }
        }
    }

    best.map(|(entry, _, _)| entry)
}

fn first_description_overlap<'a>(
    query: &str,
    entries: &'a [TemplateEntry],
) -> Option<&'a TemplateEntry> {
    let query = query.to_lowercase();
    entries.iter().find(|entry| {
        let hits = tokenize(entry.template.description)
            .iter()
            .filter(|word| word.chars().count() >= MIN_DESCRIPTION_WORD_LEN)
            .filter(|word| query.contains(word.as_str()))
            .count();
        hits >= MIN_DESCRIPTION_HITS
    })
}
