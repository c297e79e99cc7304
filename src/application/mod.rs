pub mod use_cases;

pub use use_cases::basic_matcher::BasicMatcher;
pub use use_cases::llm_matcher::LlmMatcher;
pub use use_cases::matcher::Matcher;
pub use use_cases::psp_tools::PspToolService;
pub use use_cases::query_dispatcher::{QueryDispatcher, QueryOutcome};
pub use use_cases::template_registry::TemplateRegistry;
