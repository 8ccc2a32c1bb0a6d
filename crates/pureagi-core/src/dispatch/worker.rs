use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::types::{AgentState, ChatError, ChatOutcome, ChatRequest};
use crate::generator::{Attachment, GenerateError, ResponseGenerator};
use crate::interaction_log::{InteractionLogger, InteractionRecord};
use crate::uploads::StagedUploads;

/// A queued request together with its own reply slot. The staged uploads
/// behind `request.attachments` are owned by the job until it is handled.
pub(super) struct Job {
    pub id: Uuid,
    pub request: ChatRequest,
    pub staged: StagedUploads,
    pub reply: oneshot::Sender<ChatOutcome>,
    pub enqueued_at: Instant,
}

/// Flags shared between the agent handles and the worker.
#[derive(Default)]
pub(super) struct WorkerSignals {
    pub stop: AtomicBool,
    pub wake: Notify,
    pub processed: AtomicU64,
}

pub(super) struct Worker {
    pub rx: mpsc::Receiver<Job>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub logger: InteractionLogger,
    pub signals: Arc<WorkerSignals>,
    pub state: Arc<watch::Sender<AgentState>>,
    pub poll_interval: Duration,
}

impl Worker {
    pub async fn run(mut self) {
        debug!(poll_ms = self.poll_interval.as_millis() as u64, "dispatch worker started");
        loop {
            if self.signals.stop.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                biased;
                _ = self.signals.wake.notified() => {
                    // re-check the stop flag
                }
                job = self.rx.recv() => match job {
                    Some(job) => self.handle(job).await,
                    None => {
                        debug!("request channel closed");
                        break;
                    }
                },
                _ = tokio::time::sleep(self.poll_interval) => {
                    trace!("dispatch worker idle");
                }
            }
        }
        self.state.send_replace(AgentState::Stopped);
        debug!(
            processed = self.signals.processed.load(Ordering::Relaxed),
            "dispatch worker stopped"
        );
    }

    async fn handle(&self, job: Job) {
        let Job {
            id,
            request,
            mut staged,
            reply,
            enqueued_at,
        } = job;
        let queued_ms = enqueued_at.elapsed().as_millis() as u64;
        debug!(%id, queued_ms, attachments = request.attachments.len(), "dispatching chat request");

        let started = Instant::now();
        let outcome = self.generate(&request).await.map_err(ChatError::from);
        let latency_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(text) => info!(%id, latency_ms, chars = text.len(), "chat request completed"),
            Err(err) => warn!(%id, latency_ms, error = %err, "chat request failed"),
        }

        if !staged.is_empty() {
            staged.cleanup().await;
        }
        self.record(&request, &outcome).await;
        self.signals.processed.fetch_add(1, Ordering::Relaxed);

        if reply.send(outcome).is_err() {
            debug!(%id, "caller went away before the reply was ready");
        }
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, GenerateError> {
        let mut attachments = Vec::with_capacity(request.attachments.len());
        for path in &request.attachments {
            attachments.push(Attachment::load(path).await?);
        }
        // Panics in the model client come back as an error reply.
        AssertUnwindSafe(self.generator.generate(&request.text, &attachments))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(GenerateError::Panicked(panic_message(payload))))
    }

    async fn record(&self, request: &ChatRequest, outcome: &ChatOutcome) {
        let bot_response = match outcome {
            Ok(text) => text.clone(),
            Err(err) => err.to_string(),
        };
        let record = InteractionRecord::now(
            request.text.clone(),
            bot_response,
            request
                .attachments
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        );
        let logger = self.logger.clone();
        match tokio::task::spawn_blocking(move || logger.record(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "failed to append interaction record"),
            Err(err) => warn!(error = %err, "interaction log task failed"),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
