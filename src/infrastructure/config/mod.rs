//! Layered service configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `stoplight.toml` (or the file named by `$STOPLIGHT_CONFIG`), when present
//! 3. `STOPLIGHT_` environment variables, `__` separating nested keys
//!    (`STOPLIGHT_SERVER__PORT=8080`)
//! 4. the conventional `DATABASE_URL`, `OPENAI_API_KEY` and `PSP_API_KEY`

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::match_result::RequestContext;
use crate::infrastructure::db::postgres::PgExecutorConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_VAR: &str = "STOPLIGHT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "stoplight.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub auth: AuthConfig,
    /// Caller identity used when a request does not name one.
    pub defaults: RequestContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let pool = PgExecutorConfig::default();
        Self {
            url: "postgres://postgres@localhost:5432/stoplight".to_string(),
            max_connections: pool.max_connections,
            acquire_timeout_secs: pool.acquire_timeout_secs,
            idle_timeout_secs: pool.idle_timeout_secs,
            query_timeout_secs: pool.query_timeout_secs,
        }
    }
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> PgExecutorConfig {
        PgExecutorConfig {
            max_connections: self.max_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
            query_timeout_secs: self.query_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected value of the `x-psp-api-key` header on `/api/psp/*`.
    pub psp_api_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            psp_api_key: "psp-development-key".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(path)
    }

    /// Load configuration with `path` as the file layer.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: AppConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STOPLIGHT_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "llm.api_key".into()))
            .merge(Env::raw().only(&["PSP_API_KEY"]).map(|_| "auth.psp_api_key".into()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::ConfigError("database.url must be set".to_string()));
        }
        if self.server.port == 0 {
            return Err(AppError::ConfigError("server.port must be non-zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(AppError::ConfigError(format!(
                    "llm.temperature must be within 0.0..=2.0, got {}",
                    temperature
                )));
            }
        }
        if self.auth.psp_api_key.is_empty() {
            return Err(AppError::ConfigError("auth.psp_api_key must be set".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
