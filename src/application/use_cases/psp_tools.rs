//! PSP Analytics Tools
//!
//! Fixed-shape analytical queries behind the `/api/psp/*` endpoints. Each
//! query has optional filters that are appended through [`ClauseBuilder`],
//! so placeholders and bound values never drift apart.

use super::clause_builder::{ClauseBuilder, CompiledQuery};
use crate::domain::error::Result;
use crate::domain::psp::{
    AvailableData, CommonRedIndicator, CompareCountriesRequest, ComparisonMetric, CountryValue,
    DiscoverAvailableDataRequest, DiscoveredItem, DiscoveryType, FamilyProgress,
    FindCommonRedIndicatorsRequest, FindResistantIndicatorsRequest, FindSimilarFamiliesRequest,
    ImprovementLevel, IndicatorImprovement, ResistantIndicator, SimilarFamily, TimeToImprove,
    TrackIndicatorImprovementRequest, TrackMentorFamilyProgressRequest, GREEN, RED, YELLOW,
};
use crate::infrastructure::db::{
    value_as_f64, value_as_i64, value_as_string, value_as_strings, QueryExecutor, Row,
};
use std::sync::Arc;
use tracing::info;

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn track_indicator_improvement_query(req: &TrackIndicatorImprovementRequest) -> CompiledQuery {
    let mut q = ClauseBuilder::new();
    let code = q.bind(req.indicator_code_name.clone());
    let country = non_blank(&req.country_filter).map(|c| q.bind(c));
    let organization = req.organization_id_filter.map(|id| q.bind(id));
    let start_color = q.bind(req.start_color);
    let target_color = q.bind(req.target_color);
    let months = q.bind(req.time_period_months);

    // Same filters for both snapshot sets; shared handles keep one placeholder each.
    let snapshot_filters = |q: &mut ClauseBuilder| {
        q.sql("ss.code_name = ").param(code);
        if let Some(country) = country {
            q.sql(" AND f.country = ").param(country);
        }
        if let Some(organization) = organization {
            q.sql(" AND s.organization_id = ").param(organization);
        }
    };

    q.sql(
        "WITH previous_snapshots AS (\
         SELECT s.family_id, s.snapshot_date, ss.value \
         FROM stoplight_analytics.snapshot s \
         JOIN stoplight_analytics.snapshot_stoplight ss ON s.id = ss.snapshot_id \
         JOIN stoplight_analytics.family f ON s.family_id = f.family_id \
         WHERE ",
    );
    snapshot_filters(&mut q);
    q.sql(" AND ss.value = ")
        .param(start_color)
        .sql(" AND NOT s.is_last), ");

    q.sql(
        "current_snapshots AS (\
         SELECT s.family_id, s.snapshot_date, ss.value \
         FROM stoplight_analytics.snapshot s \
         JOIN stoplight_analytics.snapshot_stoplight ss ON s.id = ss.snapshot_id \
         JOIN stoplight_analytics.family f ON s.family_id = f.family_id \
         WHERE ",
    );
    snapshot_filters(&mut q);
    q.sql(" AND s.is_last = true), ");

    q.sql(
        "target_families AS (\
         SELECT p.family_id, c.snapshot_date - p.snapshot_date AS date_diff \
         FROM previous_snapshots p \
         JOIN current_snapshots c ON p.family_id = c.family_id \
         WHERE c.value = ",
    )
    .param(target_color)
    .sql(
        " AND c.snapshot_date > p.snapshot_date \
         AND c.snapshot_date <= p.snapshot_date + make_interval(months => ",
    )
    .param(months)
    .sql(
        "::int)) \
         SELECT COUNT(DISTINCT family_id) AS improved_count, \
         MIN(date_diff) AS min_days, MAX(date_diff) AS max_days, AVG(date_diff) AS avg_days \
         FROM target_families",
    );

    q.build()
}

pub fn compare_countries_query(req: &CompareCountriesRequest) -> CompiledQuery {
    let mut q = ClauseBuilder::with_sql(
        "WITH country_indicator_stats AS (\
         SELECT def.country_code AS country, \
         COUNT(sl.id) AS total_indicators_in_dimension, \
         COUNT(CASE WHEN sl.value = ",
    );
    q.push_bind(req.target_color)
        .sql(
            " THEN 1 END) AS matching_color_indicators \
             FROM data_collect.snapshot s \
             JOIN data_collect.survey_definition def ON s.survey_definition_id = def.id \
             JOIN data_collect.snapshot_stoplight sl ON s.id = sl.snapshot_id \
             JOIN data_collect.survey_stoplight ss ON (\
             ss.survey_definition_id = s.survey_definition_id AND sl.code_name = ss.code_name) \
             WHERE s.is_last = true AND ss.survey_dimension_id = ",
        )
        .push_bind(req.indicator_dimension_id)
        .sql(" GROUP BY def.country_code HAVING COUNT(sl.id) > 0) ");

    match req.metric {
        ComparisonMetric::Percentage => q.sql(
            "SELECT country, \
             CASE WHEN total_indicators_in_dimension > 0 \
             THEN (matching_color_indicators::decimal / total_indicators_in_dimension * 100) \
             ELSE 0 END AS value \
             FROM country_indicator_stats ORDER BY value DESC",
        ),
        ComparisonMetric::Count => q.sql(
            "SELECT country, matching_color_indicators AS value \
             FROM country_indicator_stats ORDER BY value DESC",
        ),
    };

    q.build()
}

pub fn resistant_indicators_query(req: &FindResistantIndicatorsRequest) -> CompiledQuery {
    let mut q = ClauseBuilder::with_sql(
        "WITH indicator_progression AS (\
         SELECT s.family_id, f.name AS family_name, \
         sl.code_name AS indicator_code_name, ss.short_name AS indicator_short_name, \
         s.snapshot_number, s.snapshot_date, sl.value, s.organization_id \
         FROM data_collect.snapshot s \
         JOIN data_collect.snapshot_stoplight sl ON s.id = sl.snapshot_id \
         JOIN data_collect.survey_stoplight ss ON (\
         ss.survey_definition_id = s.survey_definition_id AND sl.code_name = ss.code_name) \
         JOIN ps_families.family f ON s.family_id = f.family_id \
         WHERE sl.value = ",
    );
    q.push_bind(req.resistant_color)
        .sql(" AND f.is_active = true")
        .push_optional(" AND s.organization_id = ", req.organization_id_filter)
        .sql(
            ") SELECT family_id, family_name, indicator_code_name, indicator_short_name, \
             COUNT(*) AS times_resistant_color, \
             MIN(to_char(to_timestamp(snapshot_date), 'YYYY-MM-DD')) AS first_resistant_date, \
             MAX(to_char(to_timestamp(snapshot_date), 'YYYY-MM-DD')) AS last_resistant_date \
             FROM indicator_progression \
             GROUP BY family_id, family_name, indicator_code_name, indicator_short_name \
             HAVING COUNT(*) >= ",
        )
        // Baseline survey plus the requested number of follow-ups.
        .push_bind(req.min_follow_ups + 1)
        .sql(" ORDER BY times_resistant_color DESC, family_id, indicator_code_name");

    q.build()
}

/// Step one: the reference family's indicators in the target color on its latest snapshot.
pub fn reference_family_indicators_query(req: &FindSimilarFamiliesRequest) -> CompiledQuery {
    let mut q = ClauseBuilder::with_sql(
        "SELECT st.code_name \
         FROM data_collect.snapshot_stoplight st \
         JOIN data_collect.snapshot s ON st.snapshot_id = s.id \
         WHERE s.family_id = ",
    );
    q.push_bind(req.reference_family_id)
        .sql(" AND s.is_last = true AND st.value = ")
        .push_bind(req.target_similarity_color);
    if let Some(focus) = req.indicator_focus() {
        q.sql(" AND st.code_name = ANY(").push_bind(focus).sql("::text[])");
    }
    q.build()
}

/// Step two: the mentor's other families sharing those indicators in the same color.
pub fn similar_families_query(
    req: &FindSimilarFamiliesRequest,
    reference_codes: &[String],
) -> CompiledQuery {
    let mut q = ClauseBuilder::with_sql(
        "SELECT f.family_id, f.code AS family_code, f.name AS family_name, \
         COUNT(st.code_name) AS similarity_score, \
         array_agg(st.code_name) AS common_indicator_codes \
         FROM data_collect.snapshot_stoplight st \
         JOIN data_collect.snapshot s ON st.snapshot_id = s.id \
         JOIN ps_families.family f ON s.family_id = f.family_id \
         WHERE s.is_last = true AND s.survey_user_id = ",
    );
    q.push_bind(req.requesting_mentor_user_id)
        .sql(" AND f.family_id != ")
        .push_bind(req.reference_family_id)
        .sql(" AND st.value = ")
        .push_bind(req.target_similarity_color)
        .sql(" AND st.code_name = ANY(")
        .push_bind(reference_codes.to_vec())
        .sql("::text[])")
        .sql(
            " GROUP BY f.family_id, f.code, f.name \
             HAVING COUNT(st.code_name) > 0 \
             ORDER BY similarity_score DESC, f.family_id \
             LIMIT ",
        )
        .push_bind(req.limit);
    q.build()
}

pub fn mentor_family_progress_query(req: &TrackMentorFamilyProgressRequest) -> CompiledQuery {
    let mut q = ClauseBuilder::with_sql(
        "WITH ranked_snapshots AS (\
         SELECT s.family_id, \
         sl.code_name AS indicator_code_name, ss.short_name AS indicator_short_name, \
         sl.value AS previous_value, \
         LEAD(sl.value) OVER w AS current_value, \
         LEAD(s.snapshot_date) OVER w AS achievement_date \
         FROM data_collect.snapshot s \
         JOIN data_collect.snapshot_stoplight sl ON s.id = sl.snapshot_id \
         JOIN data_collect.survey_stoplight ss ON (\
         ss.survey_definition_id = s.survey_definition_id AND sl.code_name = ss.code_name) \
         WHERE s.survey_user_id = ",
    );
    q.push_bind(req.requesting_mentor_user_id)
        .sql(
            " WINDOW w AS (PARTITION BY s.family_id, sl.code_name ORDER BY s.snapshot_date)) \
             SELECT DISTINCT rs.family_id, f.code AS family_code, f.name AS family_name, \
             rs.indicator_code_name, rs.indicator_short_name, \
             rs.previous_value, rs.current_value, rs.achievement_date \
             FROM ranked_snapshots rs \
             JOIN ps_families.family f ON rs.family_id = f.family_id \
             WHERE rs.current_value IS NOT NULL \
             AND to_timestamp(rs.achievement_date) >= NOW() - make_interval(months => ",
        )
        .push_bind(req.time_period_months)
        .sql("::int)");

    q.sql(&improvement_clause(&req.min_improvement_level));
    q.sql(" ORDER BY f.name, rs.indicator_code_name, rs.achievement_date");

    q.build()
}

fn color_step(from: i64, to: i64) -> String {
    format!("rs.previous_value = {} AND rs.current_value = {}", from, to)
}

fn improvement_clause(level: &ImprovementLevel) -> String {
    match level {
        ImprovementLevel::RedToYellow => format!(" AND {}", color_step(RED, YELLOW)),
        ImprovementLevel::YellowToGreen => format!(" AND {}", color_step(YELLOW, GREEN)),
        ImprovementLevel::RedToGreen => format!(" AND {}", color_step(RED, GREEN)),
        ImprovementLevel::Any => format!(
            " AND ((rs.previous_value = {} AND rs.current_value IN ({}, {})) OR ({}))",
            RED,
            YELLOW,
            GREEN,
            color_step(YELLOW, GREEN)
        ),
    }
}

pub fn common_red_indicators_query(req: &FindCommonRedIndicatorsRequest) -> CompiledQuery {
    let mut q = ClauseBuilder::with_sql(
        "WITH latest_snapshots_for_org AS (\
         SELECT s.id AS snapshot_id, s.family_id, s.survey_definition_id \
         FROM data_collect.snapshot s \
         WHERE s.organization_id = ",
    );
    q.push_bind(req.requesting_organization_id)
        .sql(" AND s.is_last = true")
        .push_optional(" AND s.application_id = ", req.hub_filter_id)
        .push_optional(" AND s.project_id = ", req.project_filter_id)
        .sql(
            "), total_families_in_scope AS (\
             SELECT COUNT(DISTINCT ls.family_id) AS count FROM latest_snapshots_for_org ls), \
             red_indicator_counts AS (\
             SELECT st.code_name, COUNT(DISTINCT ls.family_id) AS red_family_count \
             FROM data_collect.snapshot_stoplight st \
             JOIN latest_snapshots_for_org ls ON st.snapshot_id = ls.snapshot_id \
             WHERE st.value = 1 GROUP BY st.code_name) \
             SELECT ric.code_name AS indicator_code_name, \
             ss.short_name AS indicator_short_name, ric.red_family_count, \
             CASE WHEN (SELECT count FROM total_families_in_scope) > 0 \
             THEN (ric.red_family_count::decimal * 100 / (SELECT count FROM total_families_in_scope)) \
             ELSE 0 END AS red_family_percentage \
             FROM red_indicator_counts ric \
             LEFT JOIN data_collect.survey_stoplight ss ON ric.code_name = ss.code_name \
             AND ss.survey_definition_id = (SELECT survey_definition_id FROM latest_snapshots_for_org LIMIT 1) \
             ORDER BY ric.red_family_count DESC \
             LIMIT ",
        )
        .push_bind(req.limit);
    q.build()
}

pub fn discover_available_data_query(req: &DiscoverAvailableDataRequest) -> CompiledQuery {
    match (req.discovery_type, non_blank(&req.country_code_filter)) {
        // A country filter means nothing when listing countries.
        (DiscoveryType::Countries, _) => ClauseBuilder::with_sql(
            "SELECT DISTINCT country AS country_code \
             FROM ps_families.family WHERE country IS NOT NULL ORDER BY country_code",
        )
        .build(),
        (DiscoveryType::Indicators, Some(country)) => {
            let mut q = ClauseBuilder::with_sql(
                "SELECT DISTINCT sst.code_name, sst.dimension \
                 FROM data_collect.survey_stoplight sst \
                 JOIN data_collect.snapshot sn ON sst.survey_definition_id = sn.survey_definition_id \
                 JOIN ps_families.family f ON sn.family_id = f.family_id \
                 WHERE f.country = ",
            );
            q.push_bind(country).sql(" ORDER BY sst.code_name");
            q.build()
        }
        (DiscoveryType::Indicators, None) => ClauseBuilder::with_sql(
            "SELECT DISTINCT code_name, dimension \
             FROM data_collect.survey_stoplight \
             WHERE code_name IS NOT NULL AND dimension IS NOT NULL ORDER BY code_name",
        )
        .build(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Runs the PSP analytics queries and shapes their rows.
pub struct PspToolService {
    executor: Arc<dyn QueryExecutor>,
}

impl PspToolService {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    async fn run(&self, tool: &str, query: CompiledQuery) -> Result<Vec<Row>> {
        info!(
            tool,
            sql = %query.sql,
            param_count = query.params.len(),
            "executing PSP tool query"
        );
        let result = self.executor.execute(&query.sql, &query.params).await?;
        info!(tool, row_count = result.row_count, "PSP tool query returned");
        Ok(result.rows)
    }

    pub async fn track_indicator_improvement(
        &self,
        req: &TrackIndicatorImprovementRequest,
    ) -> Result<IndicatorImprovement> {
        let rows = self
            .run("track-indicator-improvement", track_indicator_improvement_query(req))
            .await?;
        let Some(row) = rows.first() else {
            return Ok(IndicatorImprovement::default());
        };
        let read = |column: &str| value_as_i64(row.get(column)).unwrap_or(0);
        Ok(IndicatorImprovement {
            improved_count: read("improved_count"),
            time_to_improve: TimeToImprove {
                min_days: read("min_days"),
                max_days: read("max_days"),
                avg_days: read("avg_days"),
            },
        })
    }

    pub async fn compare_countries(
        &self,
        req: &CompareCountriesRequest,
    ) -> Result<Vec<CountryValue>> {
        let rows = self
            .run("compare-indicator-status-by-country", compare_countries_query(req))
            .await?;
        Ok(rows
            .iter()
            .map(|row| CountryValue {
                country_code: value_as_string(row.get("country")),
                value: value_as_f64(row.get("value")).unwrap_or(0.0),
            })
            .collect())
    }

    pub async fn find_resistant_indicators(
        &self,
        req: &FindResistantIndicatorsRequest,
    ) -> Result<Vec<ResistantIndicator>> {
        let rows = self
            .run("find-resistant-indicators", resistant_indicators_query(req))
            .await?;
        Ok(rows
            .iter()
            .map(|row| ResistantIndicator {
                family_id: value_as_i64(row.get("family_id")),
                family_name: value_as_string(row.get("family_name")),
                indicator_code_name: value_as_string(row.get("indicator_code_name")),
                indicator_short_name: value_as_string(row.get("indicator_short_name")),
                times_resistant_color: value_as_i64(row.get("times_resistant_color")).unwrap_or(0),
                first_resistant_date: value_as_string(row.get("first_resistant_date")),
                last_resistant_date: value_as_string(row.get("last_resistant_date")),
            })
            .collect())
    }

    pub async fn find_similar_families(
        &self,
        req: &FindSimilarFamiliesRequest,
    ) -> Result<Vec<SimilarFamily>> {
        let reference = self
            .run(
                "find-similar-families-by-needs:reference",
                reference_family_indicators_query(req),
            )
            .await?;
        let codes: Vec<String> = reference
            .iter()
            .filter_map(|row| value_as_string(row.get("code_name")))
            .collect();
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .run(
                "find-similar-families-by-needs",
                similar_families_query(req, &codes),
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| SimilarFamily {
                family_id: value_as_i64(row.get("family_id")),
                family_code: value_as_string(row.get("family_code")),
                family_name: value_as_string(row.get("family_name")),
                similarity_score: value_as_i64(row.get("similarity_score")).unwrap_or(0),
                common_indicator_codes: value_as_strings(row.get("common_indicator_codes")),
            })
            .collect())
    }

    pub async fn track_mentor_family_progress(
        &self,
        req: &TrackMentorFamilyProgressRequest,
    ) -> Result<Vec<FamilyProgress>> {
        let rows = self
            .run("track-mentor-family-progress", mentor_family_progress_query(req))
            .await?;
        Ok(rows
            .iter()
            .map(|row| FamilyProgress {
                family_id: value_as_i64(row.get("family_id")),
                family_code: value_as_string(row.get("family_code")),
                family_name: value_as_string(row.get("family_name")),
                indicator_code_name: value_as_string(row.get("indicator_code_name")),
                indicator_short_name: value_as_string(row.get("indicator_short_name")),
                previous_color: value_as_i64(row.get("previous_value")),
                current_color: value_as_i64(row.get("current_value")),
                achievement_date: value_as_i64(row.get("achievement_date")),
            })
            .collect())
    }

    pub async fn find_common_red_indicators(
        &self,
        req: &FindCommonRedIndicatorsRequest,
    ) -> Result<Vec<CommonRedIndicator>> {
        let rows = self
            .run("find-common-red-indicators", common_red_indicators_query(req))
            .await?;
        Ok(rows
            .iter()
            .map(|row| CommonRedIndicator {
                indicator_code_name: value_as_string(row.get("indicator_code_name")),
                indicator_short_name: value_as_string(row.get("indicator_short_name")),
                red_family_count: value_as_i64(row.get("red_family_count")).unwrap_or(0),
                red_family_percentage: round2(
                    value_as_f64(row.get("red_family_percentage")).unwrap_or(0.0),
                ),
            })
            .collect())
    }

    pub async fn discover_available_data(
        &self,
        req: &DiscoverAvailableDataRequest,
    ) -> Result<AvailableData> {
        let country_filter = non_blank(&req.country_code_filter);
        let rows = self
            .run("discover-available-data", discover_available_data_query(req))
            .await?;

        let data: Vec<DiscoveredItem> = rows
            .iter()
            .map(|row| match req.discovery_type {
                DiscoveryType::Countries => DiscoveredItem::Country {
                    country_code: value_as_string(row.get("country_code")),
                },
                DiscoveryType::Indicators => DiscoveredItem::Indicator {
                    indicator_code_name: value_as_string(row.get("code_name")),
                    dimension: value_as_string(row.get("dimension")),
                },
            })
            .collect();

        Ok(AvailableData {
            discovery_type: req.discovery_type,
            country_filter_applied: country_filter,
            count: data.len(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::clause_builder::placeholder_numbers;
    use crate::domain::error::AppError;
    use crate::infrastructure::db::QueryResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn string_array(values: &[&str]) -> Value {
        Value::Array(values.iter().map(|v| Value::String(v.to_string())).collect())
    }

    fn assert_in_lockstep(query: &CompiledQuery) {
        let numbers = placeholder_numbers(&query.sql);
        assert_eq!(
            numbers,
            (1..=query.params.len()).collect::<Vec<_>>(),
            "{}",
            query.sql
        );
    }

    /// Returns scripted rows per call and records what it was asked to run.
    struct RecordingExecutor {
        responses: Mutex<Vec<Result<Vec<Row>>>>,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl RecordingExecutor {
        fn new(responses: Vec<Result<Vec<Row>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            };
            next.map(QueryResult::from_rows)
        }
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    fn improvement_request(
        country: Option<&str>,
        org: Option<i64>,
    ) -> TrackIndicatorImprovementRequest {
        TrackIndicatorImprovementRequest {
            indicator_code_name: "income".into(),
            start_color: 1,
            target_color: 3,
            time_period_months: 12,
            country_filter: country.map(str::to_string),
            organization_id_filter: org,
        }
    }

    #[test]
    fn test_improvement_filters_in_every_combination() {
        for country in [None, Some("PY")] {
            for org in [None, Some(8)] {
                let query = track_indicator_improvement_query(&improvement_request(country, org));
                assert_in_lockstep(&query);
                let expected = 4 + country.is_some() as usize + org.is_some() as usize;
                assert_eq!(query.params.len(), expected);
                // Each filter appears in both snapshot sets.
                let country_clauses = query.sql.matches("f.country = $").count();
                assert_eq!(country_clauses, if country.is_some() { 2 } else { 0 });
            }
        }
    }

    #[test]
    fn test_improvement_binds_values_in_placeholder_order() {
        let query = track_indicator_improvement_query(&improvement_request(None, Some(8)));
        assert_eq!(query.params, vec![json!("income"), json!(8), json!(1), json!(3), json!(12)]);
        assert!(query.sql.contains("s.organization_id = $2"));
        assert!(query.sql.contains("make_interval(months => $5::int)"));
    }

    #[test]
    fn test_blank_country_is_not_a_filter() {
        let query = track_indicator_improvement_query(&improvement_request(Some("  "), None));
        assert!(!query.sql.contains("f.country"));
        assert_in_lockstep(&query);
    }

    #[test]
    fn test_resistant_threshold_counts_baseline() {
        let query = resistant_indicators_query(&FindResistantIndicatorsRequest {
            resistant_color: 1,
            min_follow_ups: 2,
            organization_id_filter: None,
        });
        assert_eq!(query.params, vec![json!(1), json!(3)]);
        assert!(query.sql.contains("HAVING COUNT(*) >= $2"));

        let filtered = resistant_indicators_query(&FindResistantIndicatorsRequest {
            resistant_color: 2,
            min_follow_ups: 1,
            organization_id_filter: Some(5),
        });
        assert_eq!(filtered.params, vec![json!(2), json!(5), json!(2)]);
        assert_in_lockstep(&filtered);
    }

    #[test]
    fn test_common_red_filters_in_every_combination() {
        for hub in [None, Some(3)] {
            for project in [None, Some(9)] {
                let query = common_red_indicators_query(&FindCommonRedIndicatorsRequest {
                    requesting_organization_id: 1,
                    limit: 5,
                    hub_filter_id: hub,
                    project_filter_id: project,
                });
                assert_in_lockstep(&query);
                assert_eq!(query.params.last(), Some(&json!(5)));
            }
        }
    }

    #[test]
    fn test_compare_countries_metric() {
        let mut req = CompareCountriesRequest {
            indicator_dimension_id: 4,
            target_color: 3,
            metric: ComparisonMetric::Percentage,
        };
        let percentage = compare_countries_query(&req);
        assert!(percentage.sql.contains("::decimal"));
        assert_eq!(percentage.params, vec![json!(3), json!(4)]);

        req.metric = ComparisonMetric::Count;
        let count = compare_countries_query(&req);
        assert!(count.sql.contains("matching_color_indicators AS value"));
        assert_in_lockstep(&count);
    }

    #[test]
    fn test_progress_level_clause() {
        let mut req = TrackMentorFamilyProgressRequest {
            requesting_mentor_user_id: 4,
            time_period_months: 3,
            min_improvement_level: ImprovementLevel::RedToGreen,
        };
        let query = mentor_family_progress_query(&req);
        assert!(query.sql.contains("rs.previous_value = 1 AND rs.current_value = 3"));
        assert_eq!(query.params, vec![json!(4), json!(3)]);

        req.min_improvement_level = ImprovementLevel::Any;
        assert!(mentor_family_progress_query(&req)
            .sql
            .contains("rs.current_value IN (2, 3)"));
    }

    #[test]
    fn test_improvement_clauses_follow_color_codes() {
        assert_eq!(
            improvement_clause(&ImprovementLevel::RedToYellow),
            " AND rs.previous_value = 1 AND rs.current_value = 2"
        );
        assert_eq!(
            improvement_clause(&ImprovementLevel::YellowToGreen),
            " AND rs.previous_value = 2 AND rs.current_value = 3"
        );
        assert_eq!(
            improvement_clause(&ImprovementLevel::Any),
            " AND ((rs.previous_value = 1 AND rs.current_value IN (2, 3)) \
             OR (rs.previous_value = 2 AND rs.current_value = 3))"
        );
    }

    #[test]
    fn test_discover_queries() {
        let countries = discover_available_data_query(&DiscoverAvailableDataRequest {
            discovery_type: DiscoveryType::Countries,
            country_code_filter: Some("PY".into()),
        });
        assert!(countries.params.is_empty());

        let indicators = discover_available_data_query(&DiscoverAvailableDataRequest {
            discovery_type: DiscoveryType::Indicators,
            country_code_filter: Some("PY".into()),
        });
        assert_eq!(indicators.params, vec![json!("PY")]);
        assert_in_lockstep(&indicators);
    }

    #[tokio::test]
    async fn test_similar_families_two_steps() {
        let executor = RecordingExecutor::new(vec![
            Ok(vec![
                row(json!({"code_name": "income"})),
                row(json!({"code_name": "housing"})),
            ]),
            Ok(vec![row(json!({
                "family_id": 12,
                "family_code": "F-12",
                "family_name": "Rivera",
                "similarity_score": 2,
                "common_indicator_codes": ["income", "housing"]
            }))]),
        ]);
        let service = PspToolService::new(executor.clone());
        let req = FindSimilarFamiliesRequest {
            requesting_mentor_user_id: 7,
            reference_family_id: 3,
            indicator_code_names: None,
            target_similarity_color: 1,
            limit: 5,
        };

        let families = service.find_similar_families(&req).await.unwrap();

        assert_eq!(families.len(), 1);
        assert_eq!(families[0].family_id, Some(12));
        assert_eq!(families[0].common_indicator_codes, vec!["income", "housing"]);

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, vec![json!(3), json!(1)]);
        assert_eq!(
            calls[1].1,
            vec![json!(7), json!(3), json!(1), string_array(&["income", "housing"]), json!(5)]
        );
    }

    #[tokio::test]
    async fn test_similar_families_without_reference_indicators_is_empty() {
        let executor = RecordingExecutor::new(vec![Ok(vec![])]);
        let service = PspToolService::new(executor.clone());
        let req = FindSimilarFamiliesRequest {
            requesting_mentor_user_id: 7,
            reference_family_id: 3,
            indicator_code_names: Some(vec!["income".into()]),
            target_similarity_color: 1,
            limit: 5,
        };

        assert!(service.find_similar_families(&req).await.unwrap().is_empty());
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1[2], string_array(&["income"]));
    }

    #[tokio::test]
    async fn test_improvement_parses_numeric_strings() {
        let executor = RecordingExecutor::new(vec![Ok(vec![row(json!({
            "improved_count": 14,
            "min_days": 30,
            "max_days": "200",
            "avg_days": 96.7
        }))])]);
        let service = PspToolService::new(executor);
        let result = service
            .track_indicator_improvement(&improvement_request(None, None))
            .await
            .unwrap();
        assert_eq!(result.improved_count, 14);
        assert_eq!(result.time_to_improve.max_days, 200);
        assert_eq!(result.time_to_improve.avg_days, 96);
    }

    #[tokio::test]
    async fn test_common_red_percentage_is_rounded() {
        let executor = RecordingExecutor::new(vec![Ok(vec![row(json!({
            "indicator_code_name": "income",
            "indicator_short_name": null,
            "red_family_count": 3,
            "red_family_percentage": 33.33333
        }))])]);
        let service = PspToolService::new(executor);
        let rows = service
            .find_common_red_indicators(&FindCommonRedIndicatorsRequest {
                requesting_organization_id: 1,
                limit: 5,
                hub_filter_id: None,
                project_filter_id: None,
            })
            .await
            .unwrap();
        assert_eq!(rows[0].red_family_percentage, 33.33);
        assert_eq!(rows[0].indicator_short_name, None);
    }

    #[tokio::test]
    async fn test_discover_response_shape() {
        let executor = RecordingExecutor::new(vec![Ok(vec![
            row(json!({"code_name": "income", "dimension": "Income & Employment"})),
        ])]);
        let service = PspToolService::new(executor);
        let data = service
            .discover_available_data(&DiscoverAvailableDataRequest {
                discovery_type: DiscoveryType::Indicators,
                country_code_filter: None,
            })
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({
                "discovery_type": "indicators",
                "country_filter_applied": null,
                "count": 1,
                "data": [{"indicator_code_name": "income", "dimension": "Income & Employment"}]
            })
        );
    }

    #[tokio::test]
    async fn test_database_errors_propagate() {
        let executor = RecordingExecutor::new(vec![Err(AppError::DatabaseError(
            "relation does not exist".into(),
        ))]);
        let service = PspToolService::new(executor);
        let err = service
            .compare_countries(&CompareCountriesRequest {
                indicator_dimension_id: 1,
                target_color: 1,
                metric: ComparisonMetric::Count,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Database error: relation does not exist");
    }
}
