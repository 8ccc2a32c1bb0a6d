use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine};
use serde::{Deserialize, Serialize};

use crate::Config;

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const ERROR_PREFIX: &str = "Error generating response: ";

const FALLBACK_MIME: &str = "image/jpeg";

/// Binary attachment handed to the model, tagged with its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read an attachment from disk, deriving the mime type from the extension.
    pub async fn load(path: &Path) -> Result<Self, GenerateError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| GenerateError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(mime_for_path(path), data))
    }
}

/// Uploads are treated as images; anything unrecognised is sent as JPEG.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        _ => FALLBACK_MIME,
    }
}

/// Failure of a single model call. Every variant renders with the
/// `Error generating response: ` prefix so transports can show it verbatim.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Error generating response: failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error generating response: {0}")]
    Transport(String),
    #[error("Error generating response: model returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("Error generating response: prompt blocked ({0})")]
    Blocked(String),
    #[error("Error generating response: {0}")]
    Decode(String),
    #[error("Error generating response: model call panicked: {0}")]
    Panicked(String),
}

/// A single synchronous (non-streaming) call to a generative model.
#[async_trait::async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, text: &str, attachments: &[Attachment])
        -> Result<String, GenerateError>;
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

fn user_agent() -> String {
    format!("pureagi/{}", env!("CARGO_PKG_VERSION"))
}

impl GeminiGenerator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .connect_timeout(Duration::from_secs(10).min(timeout.max(Duration::from_secs(1))))
            .timeout(timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| GenerateError::Transport(e.to_string()))?;
        let api_base: String = api_base.into();
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            api_base: api_base.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, GenerateError> {
        Self::new(
            cfg.api_key.clone(),
            cfg.model.clone(),
            cfg.api_base.clone(),
            cfg.model_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }
}

#[async_trait::async_trait]
impl ResponseGenerator for GeminiGenerator {
    async fn generate(
        &self,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String, GenerateError> {
        let body = build_request(text, attachments);
        let url = self.endpoint();
        tracing::debug!(
            model = %self.model,
            attachments = attachments.len(),
            "sending generateContent request"
        );
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transport(e.without_url().to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GenerateError::Transport(e.without_url().to_string()))?;
        if !status.is_success() {
            return Err(GenerateError::Remote {
                status: status.as_u16(),
                message: remote_error_message(&bytes)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }
        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| GenerateError::Decode(format!("invalid response body: {e}")))?;
        parsed.into_text()
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Inline { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

/// Attachments first, in order, then the free text as the final part.
fn build_request<'a>(text: &'a str, attachments: &'a [Attachment]) -> GenerateContentRequest<'a> {
    let mut parts: Vec<RequestPart<'a>> = attachments
        .iter()
        .map(|a| RequestPart::Inline {
            inline_data: InlineData {
                mime_type: a.mime_type.as_str(),
                data: BASE64_STD.encode(&a.data),
            },
        })
        .collect();
    parts.push(RequestPart::Text { text });
    GenerateContentRequest {
        contents: vec![RequestContent {
            role: "user",
            parts,
        }],
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, GenerateError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .filter(|r| !r.is_empty());
            return match reason {
                Some(reason) => Err(GenerateError::Blocked(reason)),
                None => Err(GenerateError::Decode(
                    "response contained no candidates".into(),
                )),
            };
        };
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        if parts.is_empty() {
            if let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP") {
                return Err(GenerateError::Blocked(reason));
            }
        }
        Ok(parts.into_iter().filter_map(|p| p.text).collect())
    }
}

fn remote_error_message(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
}
