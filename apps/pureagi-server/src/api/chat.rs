use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pureagi_core::{ChatResponse, UploadedFile};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::responses::problem;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatReply {
    pub response: String,
}

/// Form contents after the multipart body has been drained.
#[derive(Debug, Default)]
pub(crate) struct ChatForm {
    pub message: Option<String>,
    pub files: Vec<UploadedFile>,
}

/// Chat with the assistant, optionally attaching images.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "Chat",
    operation_id = "chat_doc",
    params(("message" = Option<String>, Query, description = "Message text when not sent as a form field")),
    request_body(content = crate::openapi::ChatForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Assistant reply (model failures are reported as reply text)", body = ChatReply),
        (status = 400, description = "Malformed multipart body", body = crate::openapi::ProblemDetails),
    )
)]
pub async fn chat_endpoint(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match multipart {
        Ok(multipart) => match read_form(multipart).await {
            Ok(form) => form,
            Err(resp) => return resp,
        },
        Err(rejection) if is_multipart(&headers) => {
            return problem(rejection.status(), rejection.body_text());
        }
        // No form at all: the message can only come from the query string.
        Err(_) => ChatForm::default(),
    };

    let message = form.message.or(query.message).unwrap_or_default();
    tracing::debug!(
        target: "pureagi::chat",
        chars = message.chars().count(),
        files = form.files.len(),
        "chat request"
    );
    let outcome = state.agent().process(message, form.files).await;
    Json(ChatReply {
        response: ChatResponse::from(outcome).text,
    })
    .into_response()
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false)
}

async fn read_form(mut multipart: Multipart) -> Result<ChatForm, Response> {
    let mut form = ChatForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(problem(err.status(), err.body_text())),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| problem(err.status(), err.body_text()))?;
                form.message = Some(text);
            }
            "files" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| problem(err.status(), err.body_text()))?;
                // Browsers send an empty unnamed part when nothing was picked.
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                form.files.push(UploadedFile::new(file_name, data.to_vec()));
            }
            other => {
                tracing::debug!(target: "pureagi::chat", field = other, "ignoring form field");
            }
        }
    }
    Ok(form)
}
