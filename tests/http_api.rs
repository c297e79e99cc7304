use actix_web::{test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use stoplight_query_lib::application::use_cases::basic_matcher::BasicMatcher;
use stoplight_query_lib::application::use_cases::llm_matcher::LlmMatcher;
use stoplight_query_lib::application::use_cases::matcher::Matcher;
use stoplight_query_lib::application::use_cases::psp_tools::PspToolService;
use stoplight_query_lib::application::use_cases::query_dispatcher::QueryDispatcher;
use stoplight_query_lib::application::use_cases::template_registry::TemplateRegistry;
use stoplight_query_lib::domain::error::{AppError, Result};
use stoplight_query_lib::domain::llm_config::LLMConfig;
use stoplight_query_lib::domain::match_result::RequestContext;
use stoplight_query_lib::infrastructure::db::{QueryExecutor, QueryResult, Row};
use stoplight_query_lib::infrastructure::llm_clients::LLMClient;
use stoplight_query_lib::interfaces::http::{configure, HttpState};

const API_KEY: &str = "test-key";

struct ScriptedLlm {
    reply: Result<String>,
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    async fn generate(&self, _config: &LLMConfig, _system: &str, _user: &str) -> Result<String> {
        self.reply.clone()
    }
}

#[derive(Default)]
struct RecordingExecutor {
    rows: Vec<Row>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    fail_with: Option<AppError>,
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(QueryResult::from_rows(self.rows.clone())),
        }
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn state(llm_reply: Result<String>, executor: Arc<RecordingExecutor>) -> web::Data<HttpState> {
    let registry = Arc::new(TemplateRegistry::shared().clone());
    let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLlm { reply: llm_reply });
    let matchers: Vec<Arc<dyn Matcher>> = vec![
        Arc::new(LlmMatcher::new(llm, LLMConfig::default(), registry.clone())),
        Arc::new(BasicMatcher::new(registry.clone())),
    ];
    let executor: Arc<dyn QueryExecutor> = executor;
    web::Data::new(HttpState {
        dispatcher: Arc::new(QueryDispatcher::new(matchers, registry.clone(), executor.clone())),
        psp: Arc::new(PspToolService::new(executor)),
        registry,
        defaults: RequestContext::new(1, 1),
        psp_api_key: API_KEY.to_string(),
        logs: Arc::new(Mutex::new(Vec::new())),
    })
}

#[actix_web::test]
async fn test_query_uses_model_match() {
    let executor = Arc::new(RecordingExecutor {
        rows: vec![row(json!({"mentor": "Ana", "surveys": 12}))],
        ..Default::default()
    });
    let reply = r#"Sure! {"queryType": "mentor_performance",
        "params": {"start_date": "2024-01-01", "end_date": "2024-01-31"},
        "confidence": 92, "reasoning": "asks about mentors"}"#;
    let app = test::init_service(
        App::new()
            .app_data(state(Ok(reply.to_string()), executor.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/query")
        .set_json(json!({
            "query": "How did mentors do in January?",
            "userType": "organization_head",
            "organizationId": 7
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["meta"]["queryType"], "mentor_performance");
    assert_eq!(body["meta"]["confidence"], 92.0);
    assert_eq!(
        body["meta"]["paramValues"],
        json!([7, "2024-01-01", "2024-01-31"])
    );
    assert_eq!(body["data"][0]["surveys"], 12);

    let calls = executor.calls.lock().unwrap();
    assert_eq!(
        calls[0].0,
        "SELECT * FROM stoplight_analytics.get_mentor_performance(\
         $1::integer, $2::date, $3::date)"
    );
}

#[actix_web::test]
async fn test_query_falls_back_when_model_fails() {
    let executor = Arc::new(RecordingExecutor::default());
    let app = test::init_service(
        App::new()
            .app_data(state(
                Err(AppError::LLMError("connection refused".into())),
                executor,
            ))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/query")
        .set_json(json!({
            "query": "Which mentors completed the most surveys last month?",
            "userType": "organization_head"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["meta"]["queryType"], "mentor_performance");
    assert_eq!(body["meta"]["confidence"], 60.0);
}

#[actix_web::test]
async fn test_unknown_role_is_bad_request() {
    let app = test::init_service(
        App::new()
            .app_data(state(
                Err(AppError::LLMError("unused".into())),
                Arc::new(RecordingExecutor::default()),
            ))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/query")
        .set_json(json!({"query": "anything at all", "userType": "visitor"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["error"],
        "Could not determine query type from your question."
    );
}

#[actix_web::test]
async fn test_execution_failure_is_server_error() {
    let executor = Arc::new(RecordingExecutor {
        fail_with: Some(AppError::DatabaseError("connection reset".into())),
        ..Default::default()
    });
    let app = test::init_service(
        App::new()
            .app_data(state(Err(AppError::LLMError("down".into())), executor))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/query")
        .set_json(json!({"query": "show families", "userType": "mentor"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let logs = test::TestRequest::get().uri("/api/logs").to_request();
    let logs: Value = test::call_and_read_body_json(&app, logs).await;
    assert!(logs
        .as_array()
        .unwrap()
        .iter()
        .any(|entry| entry["level"] == "ERROR"));
}

#[actix_web::test]
async fn test_rejected_query_body_uses_error_envelope() {
    let executor = Arc::new(RecordingExecutor::default());
    let app = test::init_service(
        App::new()
            .app_data(state(Err(AppError::LLMError("unused".into())), executor.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/query")
        .set_json(json!({"query": "Which mentors did best?"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("userType"));

    let req = test::TestRequest::post()
        .uri("/api/query")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());

    assert!(executor.calls.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_templates_endpoint() {
    let app = test::init_service(
        App::new()
            .app_data(state(
                Err(AppError::LLMError("unused".into())),
                Arc::new(RecordingExecutor::default()),
            ))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/templates/mentor")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let first = &body.as_array().unwrap()[0];
    assert_eq!(first["queryType"], "similar_families");
    assert_eq!(first["function"], "stoplight_analytics.find_similar_families");
    assert_eq!(
        first["params"],
        json!(["organization_id", "mentor_id", "family_id", "dimensions"])
    );

    let req = test::TestRequest::get()
        .uri("/api/templates/visitor")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!([]));
}

#[actix_web::test]
async fn test_psp_requires_api_key() {
    let executor = Arc::new(RecordingExecutor::default());
    let app = test::init_service(
        App::new()
            .app_data(state(Err(AppError::LLMError("unused".into())), executor.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/psp/discover-available-data")
        .set_json(json!({"discovery_type": "countries"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({"error": true, "message": "Unauthorized: Authentication required"})
    );
    assert!(executor.calls.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_psp_validation_error() {
    let app = test::init_service(
        App::new()
            .app_data(state(
                Err(AppError::LLMError("unused".into())),
                Arc::new(RecordingExecutor::default()),
            ))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/psp/track-indicator-improvement")
        .insert_header(("x-psp-api-key", API_KEY))
        .set_json(json!({
            "indicator_code_name": "income",
            "start_color": 5,
            "target_color": 3,
            "time_period_months": 12
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Validation error");
    assert!(body["details"].get("start_color").is_some());
}

#[actix_web::test]
async fn test_psp_compare_countries() {
    let executor = Arc::new(RecordingExecutor {
        rows: vec![
            row(json!({"country": "PY", "value": "41.5"})),
            row(json!({"country": "MX", "value": 12})),
        ],
        ..Default::default()
    });
    let app = test::init_service(
        App::new()
            .app_data(state(Err(AppError::LLMError("unused".into())), executor.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/psp/compare-indicator-status-by-country")
        .insert_header(("x-psp-api-key", API_KEY))
        .set_json(json!({"indicator_dimension_id": 2, "target_color": 1}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(
        body,
        json!([
            {"countryCode": "PY", "value": 41.5},
            {"countryCode": "MX", "value": 12.0}
        ])
    );
    assert_eq!(executor.calls.lock().unwrap()[0].1, vec![json!(1), json!(2)]);
}

#[actix_web::test]
async fn test_psp_database_error_envelope() {
    let executor = Arc::new(RecordingExecutor {
        fail_with: Some(AppError::DatabaseError("relation does not exist".into())),
        ..Default::default()
    });
    let app = test::init_service(
        App::new()
            .app_data(state(Err(AppError::LLMError("unused".into())), executor))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/psp/find-common-red-indicators")
        .insert_header(("x-psp-api-key", API_KEY))
        .set_json(json!({"requesting_organization_id": 3}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({"error": true, "message": "Database error: relation does not exist"})
    );
}
