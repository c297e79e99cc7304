use std::sync::{Arc, Mutex};

use crate::application::use_cases::basic_matcher::BasicMatcher;
use crate::application::use_cases::llm_matcher::LlmMatcher;
use crate::application::use_cases::matcher::Matcher;
use crate::application::use_cases::psp_tools::PspToolService;
use crate::application::use_cases::query_dispatcher::QueryDispatcher;
use crate::application::use_cases::template_registry::TemplateRegistry;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::{PgExecutor, QueryExecutor};
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};
use crate::interfaces::http::{add_log, start_server, HttpState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Matchers in the order the dispatcher asks them: model first, rules as fallback.
pub fn build_matchers(
    config: &AppConfig,
    llm_client: Arc<dyn LLMClient>,
    registry: Arc<TemplateRegistry>,
) -> Vec<Arc<dyn Matcher>> {
    vec![
        Arc::new(LlmMatcher::new(
            llm_client,
            config.llm.clone(),
            registry.clone(),
        )),
        Arc::new(BasicMatcher::new(registry)),
    ]
}

pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = AppConfig::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let registry = Arc::new(TemplateRegistry::shared().clone());
    let pg = Arc::new(PgExecutor::connect_lazy(
        &config.database.url,
        config.database.pool_config(),
    )?);
    let executor: Arc<dyn QueryExecutor> = pg.clone();
    let llm_client: Arc<dyn LLMClient> = Arc::new(RouterClient::new());

    let dispatcher = QueryDispatcher::new(
        build_matchers(&config, llm_client, registry.clone()),
        registry.clone(),
        executor.clone(),
    );

    let logs = Arc::new(Mutex::new(Vec::new()));
    let state = HttpState {
        dispatcher: Arc::new(dispatcher),
        psp: Arc::new(PspToolService::new(executor)),
        registry,
        defaults: config.defaults,
        psp_api_key: config.auth.psp_api_key.clone(),
        logs: logs.clone(),
    };

    let (host, port) = config.bind_address();
    let server = start_server(state, &host, port).map_err(|e| {
        error!("Failed to bind {}:{}: {}", host, port, e);
        AppError::from(e)
    })?;

    add_log(
        &logs,
        "INFO",
        "System",
        &format!("HTTP server started on {}:{}", host, port),
    );
    info!(
        host = %host,
        port,
        provider = ?config.llm.provider,
        "stoplight query service listening"
    );

    let served = server.await;
    pg.close().await;
    served.map_err(AppError::from)
}
