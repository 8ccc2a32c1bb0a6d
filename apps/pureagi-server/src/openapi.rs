use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HealthOk {
    pub ok: bool,
    #[schema(example = "running")]
    pub agent: String,
}

#[allow(dead_code)]
#[derive(Serialize, ToSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

/// Multipart body accepted by `POST /api/chat`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct ChatForm {
    pub message: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub files: Vec<Vec<u8>>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::chat::chat_endpoint,
        crate::api::meta::healthz,
        crate::api::meta::openapi_spec,
        crate::api::ui::ui_send,
        crate::api::ui::ui_history,
        crate::api::ui::ui_clear,
    ),
    components(
        schemas(
            HealthOk,
            ProblemDetails,
            ChatForm,
            crate::api::chat::ChatReply,
            crate::api::ui::UiSendRequest,
            crate::api::ui::UiFile,
            crate::api::ui::UiHistoryResponse,
            crate::ui_history::ChatTurn,
        )
    ),
    tags(
        (name = "Chat", description = "Conversational endpoint backed by the dispatch agent"),
        (name = "UI", description = "Browser chat widget transport"),
        (name = "Meta", description = "Service metadata and health"),
        (name = "Specs", description = "Generated API documents")
    )
)]
pub struct ApiDoc;

pub fn spec_json_pretty() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".into())
}
