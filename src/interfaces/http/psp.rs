//! `/api/psp/*` tool endpoints.
//!
//! Every endpoint runs the same steps: API-key gate, body parse, field
//! validation, then one [`PspToolService`] call. Bodies are read raw so the
//! gate runs before any parsing.

use super::auth::require_psp_api_key;
use super::{add_log, error_status, HttpState};
use crate::application::use_cases::psp_tools::PspToolService;
use crate::domain::error::Result;
use crate::domain::psp::{
    CompareCountriesRequest, DiscoverAvailableDataRequest, FindCommonRedIndicatorsRequest,
    FindResistantIndicatorsRequest, FindSimilarFamiliesRequest, TrackIndicatorImprovementRequest,
    TrackMentorFamilyProgressRequest,
};
use actix_web::{http::StatusCode, post, web, HttpRequest, HttpResponse, Responder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use validator::Validate;

fn error_response(status: StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "error": true, "message": message }))
}

fn validation_failure(details: Value) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "error": true,
        "message": "Validation error",
        "details": details
    }))
}

async fn run_tool<Req, Out, F, Fut>(
    data: &HttpState,
    http_req: &HttpRequest,
    body: &[u8],
    tool: &str,
    call: F,
) -> HttpResponse
where
    Req: DeserializeOwned + Validate,
    Out: Serialize,
    F: FnOnce(Arc<PspToolService>, Req) -> Fut,
    Fut: Future<Output = Result<Out>>,
{
    if let Err(e) = require_psp_api_key(http_req, &data.psp_api_key) {
        add_log(
            &data.logs,
            "WARN",
            "PspApi",
            &format!("Rejected {}: missing or invalid API key", tool),
        );
        return error_response(error_status(&e), e.to_string());
    }

    let request: Req = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return validation_failure(json!([{ "message": e.to_string() }])),
    };
    if let Err(errors) = request.validate() {
        return validation_failure(serde_json::to_value(&errors).unwrap_or(Value::Null));
    }

    add_log(&data.logs, "INFO", "PspApi", &format!("Running {}", tool));

    match call(data.psp.clone(), request).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "PspApi",
                &format!("{} failed: {}", tool, e),
            );
            error_response(error_status(&e), e.to_string())
        }
    }
}

#[post("/track-indicator-improvement")]
pub async fn track_indicator_improvement(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "track-indicator-improvement",
        |psp, r: TrackIndicatorImprovementRequest| async move {
            psp.track_indicator_improvement(&r).await
        },
    )
    .await
}

#[post("/compare-indicator-status-by-country")]
pub async fn compare_indicator_status_by_country(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "compare-indicator-status-by-country",
        |psp, r: CompareCountriesRequest| async move { psp.compare_countries(&r).await },
    )
    .await
}

#[post("/find-resistant-indicators")]
pub async fn find_resistant_indicators(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "find-resistant-indicators",
        |psp, r: FindResistantIndicatorsRequest| async move {
            psp.find_resistant_indicators(&r).await
        },
    )
    .await
}

#[post("/find-similar-families-by-needs")]
pub async fn find_similar_families_by_needs(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "find-similar-families-by-needs",
        |psp, r: FindSimilarFamiliesRequest| async move { psp.find_similar_families(&r).await },
    )
    .await
}

#[post("/track-mentor-family-progress")]
pub async fn track_mentor_family_progress(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "track-mentor-family-progress",
        |psp, r: TrackMentorFamilyProgressRequest| async move {
            psp.track_mentor_family_progress(&r).await
        },
    )
    .await
}

#[post("/find-common-red-indicators")]
pub async fn find_common_red_indicators(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "find-common-red-indicators",
        |psp, r: FindCommonRedIndicatorsRequest| async move {
            psp.find_common_red_indicators(&r).await
        },
    )
    .await
}

#[post("/discover-available-data")]
pub async fn discover_available_data(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    run_tool(
        &data,
        &req,
        &body,
        "discover-available-data",
        |psp, r: DiscoverAvailableDataRequest| async move {
            psp.discover_available_data(&r).await
        },
    )
    .await
}
