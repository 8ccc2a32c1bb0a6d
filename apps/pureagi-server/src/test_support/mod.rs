use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pureagi_core::{
    AgentOptions, Attachment, Config, DispatchAgent, FileConfig, GenerateError,
    InteractionLogger, ResponseGenerator, UploadDir,
};

use crate::AppState;

/// Echoes the prompt and how many images came with it; any prompt starting
/// with `fail` becomes a remote error.
pub(crate) struct FakeModel;

#[async_trait::async_trait]
impl ResponseGenerator for FakeModel {
    async fn generate(
        &self,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String, GenerateError> {
        if text.starts_with("fail") {
            return Err(GenerateError::Remote {
                status: 500,
                message: "boom".into(),
            });
        }
        Ok(format!("echo: {text} [{} image(s)]", attachments.len()))
    }
}

pub(crate) fn test_config(dir: &Path, ui_enabled: bool) -> Config {
    let mut cfg = Config::resolve(FileConfig::default(), |key| {
        (key == "GEMINI_API_KEY").then(|| "test-key".to_string())
    })
    .expect("test config");
    cfg.memory_file = dir.join("chat_memory.csv");
    cfg.upload_dir = dir.join("uploads");
    cfg.poll_interval = Duration::from_millis(20);
    cfg.ui_enabled = ui_enabled;
    cfg
}

pub(crate) fn build_state(dir: &Path, ui_enabled: bool) -> AppState {
    let cfg = test_config(dir, ui_enabled);
    let agent = DispatchAgent::spawn(
        Arc::new(FakeModel),
        InteractionLogger::open(&cfg.memory_file).expect("open log"),
        UploadDir::new(&cfg.upload_dir).expect("upload dir"),
        AgentOptions::from_config(&cfg),
    );
    AppState::new(cfg, agent)
}

pub(crate) fn multipart_body(
    boundary: &str,
    message: Option<&str>,
    files: &[(&str, &[u8])],
) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(message) = message {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\n{message}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, data) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
