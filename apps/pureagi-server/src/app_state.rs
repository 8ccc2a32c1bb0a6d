use std::sync::Arc;

use pureagi_core::{Config, DispatchAgent};

use crate::ui_history::UiHistory;

/// Application context injected into every handler: configuration plus the
/// single long-lived dispatch agent.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    config: Config,
    agent: DispatchAgent,
    history: UiHistory,
}

impl AppState {
    pub fn new(config: Config, agent: DispatchAgent) -> Self {
        Self {
            inner: Arc::new(AppInner {
                config,
                agent,
                history: UiHistory::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn agent(&self) -> &DispatchAgent {
        &self.inner.agent
    }

    pub fn history(&self) -> &UiHistory {
        &self.inner.history
    }

    pub fn ui_enabled(&self) -> bool {
        self.inner.config.ui_enabled
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.config.max_upload_bytes
    }
}
