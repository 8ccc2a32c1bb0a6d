//! Core of the PureAGI chat relay: the Gemini response generator, the CSV
//! interaction log, upload staging and the dispatch agent that serializes
//! model calls through a single background worker.

mod config;
pub use config::{
    config_schema_json, load_config_file, write_schema_file, AgentSection, Config, ConfigError,
    FileConfig, ModelSection, ServerSection, StorageSection,
};
pub mod dispatch;
pub mod generator;
pub mod interaction_log;
pub mod uploads;

pub use dispatch::{
    AgentOptions, AgentState, ChatError, ChatOutcome, ChatRequest, ChatResponse, DispatchAgent,
};
pub use generator::{Attachment, GeminiGenerator, GenerateError, ResponseGenerator};
pub use interaction_log::{InteractionLogger, InteractionRecord, LogError};
pub use uploads::{StagedUploads, UploadDir, UploadError, UploadedFile};
