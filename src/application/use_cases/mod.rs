pub mod basic_matcher;
pub mod clause_builder;
pub mod llm_matcher;
pub mod matcher;
pub mod param_extractors;
pub mod psp_tools;
pub mod query_dispatcher;
pub mod template_registry;
