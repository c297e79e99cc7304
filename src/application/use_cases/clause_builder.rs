//! Clause Builder
//!
//! Assembles parameterized SQL from fragments and bound values. Placeholders
//! are numbered only in [`ClauseBuilder::build`], in order of first
//! appearance, so optional filters can be appended in any combination
//! without tracking a `$n` counter by hand. A value bound once may be
//! referenced several times and keeps a single placeholder.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Compiled SQL query with parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// The parameterized SQL query
    pub sql: String,
    /// Parameter values in placeholder order
    pub params: Vec<Value>,
}

/// Handle to a value bound in a [`ClauseBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param(usize);

#[derive(Debug, Clone)]
enum Segment {
    Sql(String),
    Param(usize),
}

#[derive(Debug, Clone, Default)]
pub struct ClauseBuilder {
    segments: Vec<Segment>,
    values: Vec<Value>,
}

impl ClauseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(sql: &str) -> Self {
        let mut builder = Self::new();
        builder.sql(sql);
        builder
    }

    /// Appends literal SQL. Never pass user input here.
    pub fn sql(&mut self, fragment: &str) -> &mut Self {
        self.segments.push(Segment::Sql(fragment.to_string()));
        self
    }

    /// Registers a value without placing it; place it with [`param`](Self::param).
    pub fn bind(&mut self, value: impl Into<Value>) -> Param {
        self.values.push(value.into());
        Param(self.values.len() - 1)
    }

    /// Places the placeholder of a bound value.
    pub fn param(&mut self, param: Param) -> &mut Self {
        self.segments.push(Segment::Param(param.0));
        self
    }

    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        let param = self.bind(value);
        self.param(param)
    }

    /// `fragment` followed by a fresh placeholder, e.g. `" AND s.country = "`.
    pub fn push_filter(&mut self, fragment: &str, value: impl Into<Value>) -> &mut Self {
        self.sql(fragment).push_bind(value)
    }

    /// Appends `fragment` + placeholder only when `value` is present.
    pub fn push_optional<T: Into<Value>>(&mut self, fragment: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.push_filter(fragment, value);
        }
        self
    }

    pub fn build(self) -> CompiledQuery {
        let mut sql = String::new();
        // values index -> placeholder number
        let mut numbering: Vec<Option<usize>> = vec![None; self.values.len()];
        let mut order: Vec<usize> = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Sql(fragment) => sql.push_str(fragment),
                Segment::Param(index) => {
                    let number = match numbering[*index] {
                        Some(number) => number,
                        None => {
                            order.push(*index);
                            numbering[*index] = Some(order.len());
                            order.len()
                        }
                    };
                    sql.push('$');
                    sql.push_str(&number.to_string());
                }
            }
        }

        let mut values: Vec<Option<Value>> = self.values.into_iter().map(Some).collect();
        let params = order
            .into_iter()
            .filter_map(|index| values[index].take())
            .collect::<Vec<_>>();

        debug!("Compiled SQL: {} with {} params", sql, params.len());

        CompiledQuery { sql, params }
    }
}

/// Distinct `$n` placeholders in `sql`.
pub fn placeholder_numbers(sql: &str) -> Vec<usize> {
    let mut numbers: Vec<usize> = Vec::new();
    for (i, ch) in sql.char_indices() {
        if ch != '$' {
            continue;
        }
        let digits: String = sql[i + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(number) = digits.parse::<usize>() {
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    numbers.sort_unstable();
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filtered(country: Option<&str>, org: Option<i64>) -> CompiledQuery {
        let mut builder = ClauseBuilder::with_sql("SELECT * FROM t WHERE a = ");
        builder.push_bind("x");
        builder.push_optional(" AND country = ", country);
        builder.push_optional(" AND org = ", org);
        builder.sql(" AND b = ").push_bind(7);
        builder.build()
    }

    #[test]
    fn test_placeholders_match_values_for_every_filter_combination() {
        for country in [None, Some("PY")] {
            for org in [None, Some(4)] {
                let query = filtered(country, org);
                let numbers = placeholder_numbers(&query.sql);
                assert_eq!(numbers.len(), query.params.len(), "{}", query.sql);
                assert_eq!(numbers, (1..=query.params.len()).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_numbering_follows_appearance() {
        let query = filtered(None, Some(4));
        assert_eq!(
            query.sql,
            "SELECT * FROM t WHERE a = $1 AND org = $2 AND b = $3"
        );
        assert_eq!(query.params, vec![json!("x"), json!(4), json!(7)]);
    }

    #[test]
    fn test_reused_param_keeps_one_placeholder() {
        let mut builder = ClauseBuilder::new();
        let since = builder.bind(6);
        builder
            .sql("SELECT 1 WHERE a > ")
            .param(since)
            .sql(" AND b > ")
            .param(since);
        let query = builder.build();
        assert_eq!(query.sql, "SELECT 1 WHERE a > $1 AND b > $1");
        assert_eq!(query.params, vec![json!(6)]);
    }

    #[test]
    fn test_bound_before_placed_is_numbered_by_placement() {
        let mut builder = ClauseBuilder::new();
        let late = builder.bind("late");
        builder.bind("unused");
        builder.sql("SELECT ").push_bind("early").sql(", ").param(late);
        let query = builder.build();
        assert_eq!(query.sql, "SELECT $1, $2");
        assert_eq!(query.params, vec![json!("early"), json!("late")]);
    }

    #[test]
    fn test_placeholder_numbers() {
        assert_eq!(placeholder_numbers("a = $2 OR b = $10 OR c = $2"), vec![2, 10]);
        assert!(placeholder_numbers("SELECT '$'").is_empty());
    }
}
