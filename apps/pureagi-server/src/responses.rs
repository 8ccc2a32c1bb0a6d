use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// RFC 7807 style problem document.
pub fn problem(status: StatusCode, detail: impl Into<String>) -> axum::response::Response {
    let title = status.canonical_reason().unwrap_or("Error");
    (
        status,
        Json(json!({
            "type": "about:blank",
            "title": title,
            "status": status.as_u16(),
            "detail": detail.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(detail: impl Into<String>) -> axum::response::Response {
    problem(StatusCode::BAD_REQUEST, detail)
}
