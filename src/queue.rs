//! Summarization Queue
//!
//! Serializes every summarization call into the generation service. Units are
//! sent over an unbounded channel to a single worker task, so the service sees
//! at most one outstanding call, and calls complete in enqueue order regardless
//! of which tab produced them.
//!
//! Enqueueing is synchronous: a producer installs its unit at the tail of the
//! channel in one step, so concurrent producers can never lose a slot.

use crate::error::PipelineError;
use crate::generation::{final_version, SharedSession};
use crate::tabs::TabId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Request ID for tracking a unit through the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        RequestId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Generated text for one chunk, or the reason it could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    Summary(String),
    Failed(String),
}

impl Fragment {
    /// Text shown (and stored) for this fragment
    pub fn display_text(&self) -> String {
        match self {
            Fragment::Summary(text) => text.clone(),
            Fragment::Failed(reason) => format!("[summary unavailable: {}]", reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Fragment::Failed(_))
    }
}

/// What a unit of work is for; used in logs only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkLabel {
    Chunk { tab_id: TabId, index: usize, count: usize },
    Merge { tab_id: TabId, fragments: usize },
}

/// Queue behavior knobs
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Per-call timeout; none by default
    pub call_timeout: Option<Duration>,
    /// Use the streaming variant and keep the final version
    pub streaming: bool,
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

struct WorkUnit {
    request_id: RequestId,
    session: SharedSession,
    input: String,
    label: WorkLabel,
    reply: oneshot::Sender<Fragment>,
}

/// Future for one enqueued unit. Never fails: errors arrive as
/// [`Fragment::Failed`].
pub struct ChunkTicket {
    request_id: RequestId,
    receiver: oneshot::Receiver<Fragment>,
}

impl ChunkTicket {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

impl Future for ChunkTicket {
    type Output = Fragment;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.unwrap_or_else(|_| Fragment::Failed(PipelineError::QueueClosed.to_string()))
        })
    }
}

/// FIFO queue with one worker in front of the generation service
pub struct SummarizationQueue {
    sender: mpsc::UnboundedSender<WorkUnit>,
    stats: Arc<RwLock<QueueStats>>,
}

impl SummarizationQueue {
    /// Create the queue and spawn its worker on the current tokio runtime.
    pub fn start(options: QueueOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(QueueStats::default()));

        tokio::spawn(Self::worker_loop(receiver, options, Arc::clone(&stats)));
        info!("Started summarization queue worker");

        Self { sender, stats }
    }

    /// Append a unit to the tail of the queue.
    pub fn enqueue(&self, session: SharedSession, input: String, label: WorkLabel) -> ChunkTicket {
        let request_id = RequestId::next();
        let (reply, receiver) = oneshot::channel();
        let input_chars = input.chars().count();

        let unit = WorkUnit {
            request_id,
            session,
            input,
            label,
            reply,
        };

        // Count before sending so the worker never observes an unaccounted unit.
        self.stats.write().pending += 1;
        if let Err(mpsc::error::SendError(unit)) = self.sender.send(unit) {
            self.stats.write().pending -= 1;
            let _ = unit.reply.send(Fragment::Failed(PipelineError::QueueClosed.to_string()));
        } else {
            debug!(
                request_id = request_id.as_u64(),
                label = ?label,
                input_chars,
                "Enqueued summarization unit"
            );
        }

        ChunkTicket {
            request_id,
            receiver,
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.read().clone()
    }

    async fn worker_loop(
        mut receiver: mpsc::UnboundedReceiver<WorkUnit>,
        options: QueueOptions,
        stats: Arc<RwLock<QueueStats>>,
    ) {
        debug!("Summarization worker started");

        while let Some(unit) = receiver.recv().await {
            {
                let mut stats = stats.write();
                stats.pending = stats.pending.saturating_sub(1);
                stats.processing += 1;
            }

            let start = Instant::now();
            let fragment = match Self::run_one(&unit, &options).await {
                Ok(text) => {
                    debug!(
                        request_id = unit.request_id.as_u64(),
                        label = ?unit.label,
                        duration_ms = start.elapsed().as_millis(),
                        "Summarization unit completed"
                    );
                    Fragment::Summary(text)
                }
                Err(err) => {
                    warn!(
                        request_id = unit.request_id.as_u64(),
                        label = ?unit.label,
                        duration_ms = start.elapsed().as_millis(),
                        error = %err,
                        "Summarization unit failed"
                    );
                    Fragment::Failed(err.to_string())
                }
            };

            {
                let mut stats = stats.write();
                stats.processing = stats.processing.saturating_sub(1);
                if fragment.is_failed() {
                    stats.failed += 1;
                } else {
                    stats.completed += 1;
                }
            }

            // The waiter may be gone (entry removed); the result is then dropped.
            let _ = unit.reply.send(fragment);
        }

        debug!("Summarization worker stopped");
    }

    async fn run_one(unit: &WorkUnit, options: &QueueOptions) -> Result<String, PipelineError> {
        let call = async {
            if options.streaming {
                let stream = unit.session.summarize_streaming(&unit.input).await?;
                final_version(stream).await
            } else {
                unit.session.summarize(&unit.input).await
            }
        };

        match options.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| PipelineError::ChunkTimeout(limit.as_millis() as u64))?,
            None => call.await,
        }
    }
}
