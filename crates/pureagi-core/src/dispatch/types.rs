use std::path::PathBuf;

use crate::generator::GenerateError;
use crate::uploads::UploadError;

/// A message plus the on-disk attachments that go with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub text: String,
    pub attachments: Vec<PathBuf>,
}

impl ChatRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.attachments.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// Typed result carried back across the worker boundary.
pub type ChatOutcome = Result<String, ChatError>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("dispatch agent is stopped")]
    Stopped,
}

/// Text shown to a caller: the model reply or the rendered error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        let text = match outcome {
            Ok(text) => text,
            Err(err) => err.to_string(),
        };
        Self { text }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Running,
    ShuttingDown,
    Stopped,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Running => "running",
            AgentState::ShuttingDown => "shutting_down",
            AgentState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
