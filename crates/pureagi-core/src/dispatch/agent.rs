use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{AgentState, ChatError, ChatOutcome, ChatRequest};
use super::worker::{Job, Worker, WorkerSignals};
use crate::generator::{GeminiGenerator, ResponseGenerator};
use crate::interaction_log::InteractionLogger;
use crate::uploads::{StagedUploads, UploadDir, UploadedFile};
use crate::Config;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Upper bound on how long the idle worker waits before re-checking its stop flag.
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl AgentOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            queue_capacity: cfg.queue_capacity,
        }
    }
}

/// Serializes chat requests through one background worker, so the model is
/// never called concurrently by the same agent. Clones share the worker.
#[derive(Clone)]
pub struct DispatchAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    tx: mpsc::Sender<Job>,
    state: Arc<watch::Sender<AgentState>>,
    signals: Arc<WorkerSignals>,
    worker: Mutex<Option<JoinHandle<()>>>,
    uploads: UploadDir,
}

impl DispatchAgent {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(
        generator: Arc<dyn ResponseGenerator>,
        logger: InteractionLogger,
        uploads: UploadDir,
        options: AgentOptions,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let signals = Arc::new(WorkerSignals::default());
        let state = Arc::new(watch::channel(AgentState::Running).0);
        let worker = Worker {
            rx,
            generator,
            logger,
            signals: signals.clone(),
            state: state.clone(),
            poll_interval: options.poll_interval.max(Duration::from_millis(1)),
        };
        let handle = tokio::spawn(worker.run());
        Self {
            inner: Arc::new(AgentInner {
                tx,
                state,
                signals,
                worker: Mutex::new(Some(handle)),
                uploads,
            }),
        }
    }

    /// Build the Gemini-backed agent described by `cfg`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let generator =
            GeminiGenerator::from_config(cfg).context("failed to build model client")?;
        let logger = InteractionLogger::open(&cfg.memory_file)
            .context("failed to open interaction log")?;
        let uploads = UploadDir::new(&cfg.upload_dir).context("failed to prepare upload dir")?;
        info!(
            model = generator.model(),
            memory_file = %cfg.memory_file.display(),
            upload_dir = %cfg.upload_dir.display(),
            "dispatch agent starting"
        );
        Ok(Self::spawn(
            Arc::new(generator),
            logger,
            uploads,
            AgentOptions::from_config(cfg),
        ))
    }

    pub fn state(&self) -> AgentState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.inner.state.subscribe()
    }

    /// Number of requests the worker has finished.
    pub fn processed(&self) -> u64 {
        self.inner.signals.processed.load(Ordering::Relaxed)
    }

    /// Queue a request and wait for its reply. There is no timeout; a stalled
    /// model call stalls the caller. Once the agent has stopped, requests are
    /// rejected with [`ChatError::Stopped`].
    pub async fn submit(&self, request: ChatRequest) -> ChatOutcome {
        self.dispatch(request, StagedUploads::default()).await
    }

    /// Stage uploaded files and submit them with `message`. The staged files
    /// travel with the job: the worker deletes them after the model call, so
    /// a caller that goes away while its request is queued does not pull the
    /// attachments out from under it.
    pub async fn process(&self, message: impl Into<String>, files: Vec<UploadedFile>) -> ChatOutcome {
        let staged = self.inner.uploads.stage(files).await?;
        let request = ChatRequest::new(message).with_attachments(staged.paths().iter().cloned());
        self.dispatch(request, staged).await
    }

    async fn dispatch(&self, request: ChatRequest, staged: StagedUploads) -> ChatOutcome {
        if self.state() != AgentState::Running {
            return Err(ChatError::Stopped);
        }
        let (reply, rx) = oneshot::channel();
        let job = Job {
            id: Uuid::new_v4(),
            request,
            staged,
            reply,
            enqueued_at: Instant::now(),
        };
        self.inner
            .tx
            .send(job)
            .await
            .map_err(|_| ChatError::Stopped)?;
        rx.await.map_err(|_| ChatError::Stopped)?
    }

    /// Stop the worker after its current request and wait for it to exit.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let began = self.inner.state.send_if_modified(|state| {
            if *state == AgentState::Running {
                *state = AgentState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if began {
            debug!("dispatch agent shutting down");
        }
        self.inner.signals.stop.store(true, Ordering::SeqCst);
        self.inner.signals.wake.notify_one();

        let mut worker = self.inner.worker.lock().await;
        if let Some(handle) = worker.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "dispatch worker join failed");
            }
        }
        drop(worker);
        self.inner.state.send_replace(AgentState::Stopped);
        if began {
            info!(processed = self.processed(), "dispatch agent stopped");
        }
    }

    #[cfg(test)]
    async fn worker_finished(&self) -> bool {
        self.inner.worker.lock().await.is_none()
    }
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        // last handle gone: let the worker wind down on its own
        self.signals.stop.store(true, Ordering::SeqCst);
        self.signals.wake.notify_one();
    }
}
