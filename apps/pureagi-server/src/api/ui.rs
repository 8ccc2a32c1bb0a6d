use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use base64::Engine as _;
use pureagi_core::{ChatResponse, UploadedFile};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::responses::{bad_request, problem};
use crate::ui_history::{ChatTurn, UiHistory};
use crate::AppState;

const CHAT_HTML: &str = include_str!("../../assets/chat.html");

fn common_headers() -> [(axum::http::HeaderName, &'static str); 3] {
    [
        (X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (REFERRER_POLICY, "no-referrer"),
        (CACHE_CONTROL, "no-store"),
    ]
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UiFile {
    pub name: String,
    /// Standard base64 of the file contents.
    pub data: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UiSendRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub files: Vec<UiFile>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UiHistoryResponse {
    pub history: Vec<ChatTurn>,
}

pub(crate) async fn ui_index() -> impl IntoResponse {
    (common_headers(), Html(CHAT_HTML))
}

/// Send one message from the browser widget.
#[utoipa::path(
    post,
    path = "/ui/send",
    tag = "UI",
    operation_id = "ui_send_doc",
    request_body = UiSendRequest,
    responses(
        (status = 200, description = "Updated conversation", body = UiHistoryResponse),
        (status = 400, description = "Invalid request body", body = crate::openapi::ProblemDetails),
    )
)]
pub async fn ui_send(
    State(state): State<AppState>,
    body: Result<Json<UiSendRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return problem(rejection.status(), rejection.body_text()),
    };
    let history = state.history();
    if req.message.trim().is_empty() && req.files.is_empty() {
        return history_response(history).await;
    }

    let mut files = Vec::with_capacity(req.files.len());
    for file in req.files {
        let data = match base64::engine::general_purpose::STANDARD.decode(file.data.trim()) {
            Ok(data) => data,
            Err(err) => return bad_request(format!("invalid base64 for {}: {err}", file.name)),
        };
        files.push(UploadedFile::new(file.name, data));
    }

    let outcome = state.agent().process(req.message.clone(), files).await;
    let turn = ChatTurn {
        user: req.message,
        assistant: ChatResponse::from(outcome).text,
    };
    Json(UiHistoryResponse {
        history: history.push(turn).await,
    })
    .into_response()
}

/// Conversation shown by the browser widget.
#[utoipa::path(
    get,
    path = "/ui/history",
    tag = "UI",
    operation_id = "ui_history_doc",
    responses((status = 200, description = "Current conversation", body = UiHistoryResponse))
)]
pub async fn ui_history(State(state): State<AppState>) -> Response {
    history_response(state.history()).await
}

/// Clear the widget conversation. The interaction log is untouched.
#[utoipa::path(
    post,
    path = "/ui/clear",
    tag = "UI",
    operation_id = "ui_clear_doc",
    responses((status = 200, description = "Empty conversation", body = UiHistoryResponse))
)]
pub async fn ui_clear(State(state): State<AppState>) -> Response {
    state.history().clear().await;
    history_response(state.history()).await
}

async fn history_response(history: &UiHistory) -> Response {
    Json(UiHistoryResponse {
        history: history.snapshot().await,
    })
    .into_response()
}
