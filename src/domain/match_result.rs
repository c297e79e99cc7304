use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter name to value, as extracted for one match.
pub type ParamMap = Map<String, Value>;

pub const ORGANIZATION_ID_PARAM: &str = "organization_id";
pub const MENTOR_ID_PARAM: &str = "mentor_id";

/// Output of a single matching attempt. Lives for one request only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub query_type: String,
    pub params: ParamMap,
    /// 0..=100
    pub confidence: f64,
    pub reasoning: String,
}

impl MatchResult {
    pub fn new(
        query_type: impl Into<String>,
        params: ParamMap,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            query_type: query_type.into(),
            params,
            confidence: confidence.clamp(0.0, 100.0),
            reasoning: reasoning.into(),
        }
    }
}

/// Caller identity used to fill in default parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub organization_id: i64,
    pub user_id: i64,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            organization_id: 1,
            user_id: 1,
        }
    }
}

impl RequestContext {
    pub fn new(organization_id: i64, user_id: i64) -> Self {
        Self {
            organization_id,
            user_id,
        }
    }

    pub fn default_params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert(ORGANIZATION_ID_PARAM.to_string(), self.organization_id.into());
        params.insert(MENTOR_ID_PARAM.to_string(), self.user_id.into());
        params
    }

    /// Adds the context defaults for keys the params do not already carry.
    pub fn fill_defaults(&self, params: &mut ParamMap) {
        for (key, value) in self.default_params() {
            params.entry(key).or_insert(value);
        }
    }
}
