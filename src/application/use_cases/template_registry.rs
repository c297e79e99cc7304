//! Query Template Registry
//!
//! Static catalog of the analytical queries each role may run, keyed by
//! role and then by query type. Built once and only read afterwards.

use crate::domain::error::{AppError, Result};
use crate::domain::query_template::{QueryTemplate, RoleTemplates, TemplateEntry, TemplateParam};
use once_cell::sync::Lazy;

pub const ROLE_MENTOR: &str = "mentor";
pub const ROLE_ORGANIZATION_HEAD: &str = "organization_head";
pub const ROLE_PSP_HEAD: &str = "psp_head";

const ORGANIZATION_ID: TemplateParam = TemplateParam::new("organization_id", "integer");
const MENTOR_ID: TemplateParam = TemplateParam::new("mentor_id", "integer");
const FAMILY_ID: TemplateParam = TemplateParam::new("family_id", "integer");
const DIMENSIONS: TemplateParam = TemplateParam::new("dimensions", "text[]");
const FROM_STATUS: TemplateParam = TemplateParam::new("from_status", "text");
const TO_STATUS: TemplateParam = TemplateParam::new("to_status", "text");
const TRACK_PROGRESS: TemplateParam = TemplateParam::new("track_progress", "boolean");
const ANALYSIS_TYPE: TemplateParam = TemplateParam::new("analysis_type", "text");
const START_DATE: TemplateParam = TemplateParam::new("start_date", "date");
const END_DATE: TemplateParam = TemplateParam::new("end_date", "date");
const PROGRAM_TYPE: TemplateParam = TemplateParam::new("program_type", "text");
const INDICATOR_IDS: TemplateParam = TemplateParam::new("indicator_ids", "integer[]");
const STATUS_FILTER: TemplateParam = TemplateParam::new("status_filter", "text");
const COUNTRY_FILTER: TemplateParam = TemplateParam::new("country_filter", "text");
const FILTER_TYPE: TemplateParam = TemplateParam::new("filter_type", "text");
const PROGRAM_TYPES: TemplateParam = TemplateParam::new("program_types", "text[]");

static STOPLIGHT_TEMPLATES: Lazy<TemplateRegistry> = Lazy::new(TemplateRegistry::stoplight);

/// Role -> query type -> template, with declaration order preserved at both levels.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    roles: Vec<RoleTemplates>,
}

impl TemplateRegistry {
    /// Build a registry from role groups. Later duplicates of a role or query type are dropped.
    pub fn new(roles: Vec<RoleTemplates>) -> Self {
        let mut deduped: Vec<RoleTemplates> = Vec::with_capacity(roles.len());
        for group in roles {
            if deduped.iter().any(|r| r.role == group.role) {
                continue;
            }
            let mut entries: Vec<TemplateEntry> = Vec::with_capacity(group.entries.len());
            for entry in group.entries {
                if !entries.iter().any(|e| e.query_type == entry.query_type) {
                    entries.push(entry);
                }
            }
            deduped.push(RoleTemplates {
                role: group.role,
                entries,
            });
        }
        Self { roles: deduped }
    }

    /// The process-wide Poverty Stoplight catalog.
    pub fn shared() -> &'static TemplateRegistry {
        &STOPLIGHT_TEMPLATES
    }

    pub fn roles(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.roles.iter().map(|r| r.role)
    }

    /// Templates visible to `role`, in declaration order. Unknown roles have none.
    pub fn templates_for(&self, role: &str) -> &[TemplateEntry] {
        self.roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, role: &str, query_type: &str) -> Option<&QueryTemplate> {
        self.templates_for(role)
            .iter()
            .find(|e| e.query_type == query_type)
            .map(|e| &e.template)
    }

    /// Like [`get`](Self::get) but reports a missing template as a user-facing error.
    pub fn lookup(&self, role: &str, query_type: &str) -> Result<&QueryTemplate> {
        self.get(role, query_type).ok_or_else(|| {
            tracing::warn!(role, query_type, "no template registered for query type");
            AppError::UnknownTemplate("Query template not found".to_string())
        })
    }

    fn stoplight() -> Self {
        Self::new(vec![
            RoleTemplates {
                role: ROLE_MENTOR,
                entries: vec![
                    TemplateEntry {
                        query_type: "similar_families",
                        template: QueryTemplate {
                            function: "stoplight_analytics.find_similar_families",
                            params: &[ORGANIZATION_ID, MENTOR_ID, FAMILY_ID, DIMENSIONS],
                            description: "Find families with similar needs to a specified family",
                            examples: &[
                                "Find me families with similar needs to the Gonzalez family, especially regarding income and housing",
                                "Which families have similar red indicators to family #2?",
                                "Show families with needs like the Garcia family",
                            ],
                        },
                    },
                    TemplateEntry {
                        query_type: "family_red_indicators",
                        template: QueryTemplate {
                            function: "stoplight_analytics.get_family_red_indicators",
                            params: &[
                                ORGANIZATION_ID,
                                FAMILY_ID,
                                FROM_STATUS,
                                TO_STATUS,
                                TRACK_PROGRESS,
                                ANALYSIS_TYPE,
                            ],
                            description: "Find all red indicators for a specific family or track progress",
                            examples: &[
                                "Show me all red indicators for Family 2",
                                "Show me all my families who have improved at least one indicator from red to yellow in the last 3 months",
                                "Which indicators are taking my families the longest time to complete in surveys?",
                            ],
                        },
                    },
                    TemplateEntry {
                        query_type: "intervention_recommender",
                        template: QueryTemplate {
                            function: "stoplight_analytics.recommend_interventions",
                            params: &[ORGANIZATION_ID, FAMILY_ID, DIMENSIONS],
                            description: "Recommend interventions based on similar family profiles and success patterns",
                            examples: &[
                                "What interventions have worked best for families like the Garcias who have red indicators in income and transportation?",
                                "Recommend interventions for the Smith family's housing issues",
                                "What programs should I suggest to families with transportation problems?",
                            ],
                        },
                    },
                ],
            },
            RoleTemplates {
                role: ROLE_ORGANIZATION_HEAD,
                entries: vec![
                    TemplateEntry {
                        query_type: "mentor_performance",
                        template: QueryTemplate {
                            function: "stoplight_analytics.get_mentor_performance",
                            params: &[ORGANIZATION_ID, START_DATE, END_DATE],
                            description: "View performance metrics for mentors",
                            examples: &[
                                "Which mentors completed the most surveys last month and what was their average survey time?",
                                "Show me mentor performance over the last 6 months",
                                "Which social workers have improved the most families in the past quarter?",
                            ],
                        },
                    },
                    TemplateEntry {
                        query_type: "org_improvement_trends",
                        template: QueryTemplate {
                            function: "stoplight_analytics.get_organization_improvement_trends",
                            params: &[
                                ORGANIZATION_ID,
                                START_DATE,
                                END_DATE,
                                PROGRAM_TYPE,
                                ANALYSIS_TYPE,
                                DIMENSIONS,
                            ],
                            description: "Analyze improvement trends across the organization",
                            examples: &[
                                "Show me which families have improved the most after receiving our financial literacy program",
                                "Where should we focus our resources next month based on the most common red indicators?",
                                "How does our organization compare to others in improving education indicators?",
                            ],
                        },
                    },
                    TemplateEntry {
                        query_type: "resource_allocation",
                        template: QueryTemplate {
                            function: "stoplight_analytics.optimize_resource_allocation",
                            params: &[ORGANIZATION_ID, START_DATE, END_DATE, DIMENSIONS],
                            description: "Suggests resource allocation based on red indicator patterns",
                            examples: &[
                                "Where should we focus our resources next month?",
                                "Which programs need more funding based on current results?",
                                "What areas should we prioritize for the next quarter?",
                            ],
                        },
                    },
                ],
            },
            RoleTemplates {
                role: ROLE_PSP_HEAD,
                entries: vec![
                    TemplateEntry {
                        query_type: "country_comparison",
                        template: QueryTemplate {
                            function: "stoplight_analytics.compare_countries",
                            params: &[
                                INDICATOR_IDS,
                                START_DATE,
                                END_DATE,
                                DIMENSIONS,
                                STATUS_FILTER,
                                ANALYSIS_TYPE,
                            ],
                            description: "Compare indicators across different countries",
                            examples: &[
                                "Which countries have the highest percentage of green indicators in the Health dimension?",
                                "Compare the Housing and Income dimensions across all countries to see which has more red indicators",
                                "Show me a comparison of education indicators between Paraguay and Colombia",
                            ],
                        },
                    },
                    TemplateEntry {
                        query_type: "global_red_distribution",
                        template: QueryTemplate {
                            function: "stoplight_analytics.get_global_red_distribution",
                            params: &[
                                START_DATE,
                                END_DATE,
                                DIMENSIONS,
                                COUNTRY_FILTER,
                                FILTER_TYPE,
                            ],
                            description: "View distribution of red indicators globally",
                            examples: &[
                                "Show me how many families have improved from red to green on income indicators across all countries in the last 6 months",
                                "What are the most resistant indicators that stay red even after follow-up surveys?",
                                "What are the most common red indicators globally?",
                            ],
                        },
                    },
                    TemplateEntry {
                        query_type: "program_effectiveness",
                        template: QueryTemplate {
                            function: "stoplight_analytics.analyze_program_effectiveness",
                            params: &[START_DATE, END_DATE, PROGRAM_TYPES, DIMENSIONS],
                            description: "Analyzes effectiveness of different program types across regions",
                            examples: &[
                                "Which intervention programs are most effective at improving housing indicators?",
                                "Compare effectiveness of financial literacy programs across different regions",
                                "What program types show the highest success rates globally?",
                            ],
                        },
                    },
                ],
            },
        ])
    }
}
