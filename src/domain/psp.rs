//! Request and response shapes of the PSP analytics tool endpoints.
//!
//! Stoplight colors are coded 1 = red, 2 = yellow, 3 = green throughout.

use serde::{Deserialize, Serialize};
use validator::Validate;

pub const RED: i64 = 1;
pub const YELLOW: i64 = 2;
pub const GREEN: i64 = 3;

fn default_red() -> i64 {
    RED
}

fn default_one() -> i64 {
    1
}

fn default_limit() -> i64 {
    5
}

fn default_lookback_months() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TrackIndicatorImprovementRequest {
    #[validate(length(min = 1))]
    pub indicator_code_name: String,
    #[validate(range(min = 1, max = 3))]
    pub start_color: i64,
    #[validate(range(min = 1, max = 3))]
    pub target_color: i64,
    #[validate(range(min = 1))]
    pub time_period_months: i64,
    #[serde(default)]
    pub country_filter: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub organization_id_filter: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeToImprove {
    pub min_days: i64,
    pub max_days: i64,
    pub avg_days: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorImprovement {
    pub improved_count: i64,
    pub time_to_improve: TimeToImprove,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMetric {
    #[default]
    Percentage,
    Count,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CompareCountriesRequest {
    #[validate(range(min = 1))]
    pub indicator_dimension_id: i64,
    #[validate(range(min = 1, max = 3))]
    pub target_color: i64,
    #[serde(default)]
    pub metric: ComparisonMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryValue {
    pub country_code: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FindResistantIndicatorsRequest {
    /// Only red or yellow can be "resistant".
    #[serde(default = "default_red")]
    #[validate(range(min = 1, max = 2))]
    pub resistant_color: i64,
    #[serde(default = "default_one")]
    #[validate(range(min = 1))]
    pub min_follow_ups: i64,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub organization_id_filter: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResistantIndicator {
    pub family_id: Option<i64>,
    pub family_name: Option<String>,
    pub indicator_code_name: Option<String>,
    pub indicator_short_name: Option<String>,
    pub times_resistant_color: i64,
    pub first_resistant_date: Option<String>,
    pub last_resistant_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FindSimilarFamiliesRequest {
    #[validate(range(min = 1))]
    pub requesting_mentor_user_id: i64,
    #[validate(range(min = 1))]
    pub reference_family_id: i64,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub indicator_code_names: Option<Vec<String>>,
    #[serde(default = "default_red")]
    #[validate(range(min = 1, max = 3))]
    pub target_similarity_color: i64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub limit: i64,
}

impl FindSimilarFamiliesRequest {
    /// Requested indicator focus with blank names dropped; `None` when nothing usable remains.
    pub fn indicator_focus(&self) -> Option<Vec<String>> {
        let names: Vec<String> = self
            .indicator_code_names
            .iter()
            .flatten()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarFamily {
    pub family_id: Option<i64>,
    pub family_code: Option<String>,
    pub family_name: Option<String>,
    pub similarity_score: i64,
    pub common_indicator_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementLevel {
    #[default]
    Any,
    RedToYellow,
    YellowToGreen,
    RedToGreen,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TrackMentorFamilyProgressRequest {
    #[validate(range(min = 1))]
    pub requesting_mentor_user_id: i64,
    #[serde(default = "default_lookback_months")]
    #[validate(range(min = 1))]
    pub time_period_months: i64,
    #[serde(default)]
    pub min_improvement_level: ImprovementLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyProgress {
    pub family_id: Option<i64>,
    pub family_code: Option<String>,
    pub family_name: Option<String>,
    pub indicator_code_name: Option<String>,
    pub indicator_short_name: Option<String>,
    pub previous_color: Option<i64>,
    pub current_color: Option<i64>,
    /// Unix timestamp of the snapshot that recorded the improvement.
    pub achievement_date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FindCommonRedIndicatorsRequest {
    #[validate(range(min = 1))]
    pub requesting_organization_id: i64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub limit: i64,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub hub_filter_id: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub project_filter_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonRedIndicator {
    pub indicator_code_name: Option<String>,
    pub indicator_short_name: Option<String>,
    pub red_family_count: i64,
    pub red_family_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryType {
    Countries,
    Indicators,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DiscoverAvailableDataRequest {
    pub discovery_type: DiscoveryType,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub country_code_filter: Option<String>,
}

/// One discovered item; the shape depends on the discovery type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiscoveredItem {
    Indicator {
        indicator_code_name: Option<String>,
        dimension: Option<String>,
    },
    Country {
        country_code: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableData {
    pub discovery_type: DiscoveryType,
    pub country_filter_applied: Option<String>,
    pub count: usize,
    pub data: Vec<DiscoveredItem>,
}
