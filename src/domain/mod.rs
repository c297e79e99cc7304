pub mod error;
pub mod llm_config;
pub mod match_result;
pub mod psp;
pub mod query_template;
