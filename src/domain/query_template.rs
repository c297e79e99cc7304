use serde::{Serialize, Serializer};

/// A positional argument of a template's backing function.
///
/// `sql_type` is the declared Postgres type; the bound value is cast to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateParam {
    pub name: &'static str,
    pub sql_type: &'static str,
}

impl TemplateParam {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type }
    }

    pub fn is_array(&self) -> bool {
        self.sql_type.ends_with("[]")
    }
}

/// One invocable analytical query backed by a database function.
///
/// `params` order is the positional argument order of `function`. Serialized
/// templates list parameter names only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryTemplate {
    pub function: &'static str,
    #[serde(serialize_with = "serialize_param_names")]
    pub params: &'static [TemplateParam],
    pub description: &'static str,
    pub examples: &'static [&'static str],
}

impl QueryTemplate {
    pub fn takes_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn takes_date_range(&self) -> bool {
        self.takes_param("start_date") || self.takes_param("end_date")
    }
}

fn serialize_param_names<S: Serializer>(
    params: &&'static [TemplateParam],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(params.iter().map(|p| p.name))
}

/// A query type paired with its template, as enumerated for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEntry {
    pub query_type: &'static str,
    #[serde(flatten)]
    pub template: QueryTemplate,
}

/// All templates visible to one role, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTemplates {
    pub role: &'static str,
    pub entries: Vec<TemplateEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARAMS: &[TemplateParam] = &[
        TemplateParam::new("organization_id", "integer"),
        TemplateParam::new("dimensions", "text[]"),
    ];

    #[test]
    fn test_entry_serializes_param_names_in_order() {
        let entry = TemplateEntry {
            query_type: "q",
            template: QueryTemplate {
                function: "stoplight_analytics.f",
                params: PARAMS,
                description: "d",
                examples: &["e"],
            },
        };
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            json!({
                "queryType": "q",
                "function": "stoplight_analytics.f",
                "params": ["organization_id", "dimensions"],
                "description": "d",
                "examples": ["e"]
            })
        );
        assert!(PARAMS[1].is_array());
        assert!(!PARAMS[0].is_array());
    }
}
