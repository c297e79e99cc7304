pub mod auth;
pub mod psp;

use crate::application::use_cases::psp_tools::PspToolService;
use crate::application::use_cases::query_dispatcher::QueryDispatcher;
use crate::application::use_cases::template_registry::TemplateRegistry;
use crate::domain::error::AppError;
use crate::domain::match_result::RequestContext;
use actix_cors::Cors;
use actix_web::{
    dev::Server, error::InternalError, get, http::StatusCode, post, web, App, HttpResponse,
    HttpServer, Responder,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

pub const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub dispatcher: Arc<QueryDispatcher>,
    pub psp: Arc<PspToolService>,
    pub registry: Arc<TemplateRegistry>,
    /// Used when a query request names no organization or user.
    pub defaults: RequestContext,
    pub psp_api_key: String,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub user_type: String,
    #[serde(default)]
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl QueryRequest {
    fn context(&self, defaults: RequestContext) -> RequestContext {
        RequestContext::new(
            self.organization_id.unwrap_or(defaults.organization_id),
            self.user_id.unwrap_or(defaults.user_id),
        )
    }
}

/// HTTP status for an error that reached a handler.
pub fn error_status(err: &AppError) -> StatusCode {
    match err {
        AppError::ClassificationFailure(_)
        | AppError::UnknownTemplate(_)
        | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[post("/query")]
async fn query(data: web::Data<HttpState>, req: web::Json<QueryRequest>) -> impl Responder {
    let req = req.into_inner();
    if req.query.trim().is_empty() || req.user_type.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Both query and userType are required"
        }));
    }

    add_log(
        &data.logs,
        "INFO",
        "QueryApi",
        &format!("Dispatching query for {}: {}", req.user_type, req.query),
    );

    let ctx = req.context(data.defaults);
    match data.dispatcher.handle(&req.query, &req.user_type, &ctx).await {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "QueryApi",
                &format!("Query failed: {}", e),
            );
            HttpResponse::build(error_status(&e)).json(json!({ "error": e.to_string() }))
        }
    }
}

#[get("/templates/{user_type}")]
async fn list_templates(data: web::Data<HttpState>, path: web::Path<String>) -> impl Responder {
    let user_type = path.into_inner();
    HttpResponse::Ok().json(data.registry.templates_for(&user_type))
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    let logs = data.logs.lock().unwrap_or_else(|e| e.into_inner());
    HttpResponse::Ok().json(&*logs)
}

pub fn add_log_entry(
    logs: &Mutex<Vec<LogEntry>>,
    level: &str,
    source: &str,
    message: &str,
) -> LogEntry {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = logs.lock().unwrap_or_else(|e| e.into_inner());
    logs.push(entry.clone());
    if logs.len() > MAX_LOG_ENTRIES {
        logs.remove(0);
    }
    entry
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    add_log_entry(logs, level, source, message);
}

/// Rejected JSON bodies get the same `{ "error": ... }` envelope as handler errors.
fn json_error_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(json!({ "error": message })),
        )
        .into()
    })
}

/// Routes under `/api`; shared by the server and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_error_config()).service(
        web::scope("/api")
            .service(query)
            .service(list_templates)
            .service(get_logs)
            .service(
                web::scope("/psp")
                    .service(psp::track_indicator_improvement)
                    .service(psp::compare_indicator_status_by_country)
                    .service(psp::find_resistant_indicators)
                    .service(psp::find_similar_families_by_needs)
                    .service(psp::track_mentor_family_progress)
                    .service(psp::find_common_red_indicators)
                    .service(psp::discover_available_data),
            ),
    );
}

pub fn start_server(state: HttpState, host: &str, port: u16) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_buffer_is_capped() {
        let logs = Mutex::new(Vec::new());
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            add_log(&logs, "INFO", "Test", &format!("entry {}", i));
        }
        let logs = logs.lock().unwrap();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(logs[0].message, "entry 5");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&AppError::ClassificationFailure("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&AppError::UnknownTemplate("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&AppError::DatabaseError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&AppError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_request_overrides_context_defaults() {
        let req = QueryRequest {
            query: "q".into(),
            user_type: "mentor".into(),
            organization_id: Some(40),
            user_id: None,
        };
        assert_eq!(
            req.context(RequestContext::new(1, 7)),
            RequestContext::new(40, 7)
        );
    }
}
