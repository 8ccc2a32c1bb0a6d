use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;

const HISTORY_LIMIT: usize = 48;

/// One user/assistant exchange as shown by the browser UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

/// Process-wide conversation shown by the UI transport. The interaction log
/// on disk stays the durable record; this only feeds the page.
#[derive(Clone, Default)]
pub struct UiHistory {
    inner: Arc<Mutex<Vec<ChatTurn>>>,
}

impl UiHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<ChatTurn> {
        self.inner.lock().await.clone()
    }

    pub async fn push(&self, turn: ChatTurn) -> Vec<ChatTurn> {
        let mut guard = self.inner.lock().await;
        guard.push(turn);
        prune_history(&mut guard);
        guard.clone()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

fn prune_history(turns: &mut Vec<ChatTurn>) {
    if turns.len() > HISTORY_LIMIT {
        let excess = turns.len() - HISTORY_LIMIT;
        turns.drain(0..excess);
    }
}
