use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use serde_json::json;

use crate::AppState;

/// Health probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    operation_id = "healthz_doc",
    description = "Service readiness probe including the dispatch agent state.",
    responses(
        (status = 200, description = "Service healthy", body = crate::openapi::HealthOk)
    )
)]
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"ok": true, "agent": state.agent().state().as_str()}))
}

/// OpenAPI document generated from in-code annotations.
#[utoipa::path(
    get,
    path = "/spec/openapi.json",
    tag = "Specs",
    operation_id = "openapi_json_doc",
    responses((status = 200, content_type = "application/json"))
)]
pub async fn openapi_spec() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/json")],
        crate::openapi::spec_json_pretty(),
    )
}
