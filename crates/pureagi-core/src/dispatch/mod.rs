mod agent;
mod types;
mod worker;

pub use agent::{AgentOptions, DispatchAgent, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY};
pub use types::{AgentState, ChatError, ChatOutcome, ChatRequest, ChatResponse};
