//! The priority-queued summarization service.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::SummarizerError;
use crate::model::SummarizationModel;
use crate::text::{reflow_paragraphs, truncate_to_tokens};
use crate::{SummarizationRequest, SummarizationResponse};

/// Tunables for [`SummarizerService`].
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Model input window in tokens; longer inputs are pre-truncated.
    pub max_input_tokens: usize,
    /// Device memory fraction above which the worker waits.
    pub memory_high_water: f32,
    pub memory_poll_interval: Duration,
    /// Upper bound on memory-gate waiting per request.
    pub memory_poll_budget: Duration,
    /// Release the model whenever the queue drains.
    pub idle_unload: bool,
    /// Paragraph reflow width for summaries.
    pub words_per_line: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 1024,
            memory_high_water: 0.95,
            memory_poll_interval: Duration::from_millis(500),
            memory_poll_budget: Duration::from_secs(30),
            idle_unload: false,
            words_per_line: 20,
        }
    }
}

impl SummarizerConfig {
    pub fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = tokens;
        self
    }

    pub fn with_idle_unload(mut self, idle_unload: bool) -> Self {
        self.idle_unload = idle_unload;
        self
    }

    pub fn with_memory_poll(mut self, interval: Duration, budget: Duration) -> Self {
        self.memory_poll_interval = interval;
        self.memory_poll_budget = budget;
        self
    }
}

struct QueuedRequest {
    seq: u64,
    request: SummarizationRequest,
    respond: oneshot::Sender<SummarizationResponse>,
}

// Min-ordering on (priority, seq) inside a max-heap: the smallest pair
// must compare greatest.
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.request.priority, other.seq).cmp(&(self.request.priority, self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.request.priority == other.request.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

struct QueueState {
    heap: BinaryHeap<QueuedRequest>,
    next_seq: u64,
}

struct ServiceShared {
    queue: Mutex<QueueState>,
    pending: Mutex<HashMap<Uuid, oneshot::Receiver<SummarizationResponse>>>,
    notify: Notify,
    shutdown: AtomicBool,
}

/// Handle to the running service. Cloneable; all clones feed the same
/// single worker.
#[derive(Clone)]
pub struct SummarizerService {
    shared: Arc<ServiceShared>,
    config: SummarizerConfig,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SummarizerService {
    /// Start the worker task over the given model.
    pub fn spawn(model: Arc<dyn SummarizationModel>, config: SummarizerConfig) -> Self {
        let shared = Arc::new(ServiceShared {
            queue: Mutex::new(QueueState { heap: BinaryHeap::new(), next_seq: 0 }),
            pending: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = tokio::spawn(worker_loop(Arc::clone(&shared), model, config.clone()));

        Self { shared, config, worker: Arc::new(Mutex::new(Some(worker))) }
    }

    /// Enqueue a request; returns the id to await on.
    pub fn submit(
        &self,
        text: impl Into<String>,
        priority: i32,
        max_len: usize,
        min_len: usize,
        deadline: Option<Instant>,
    ) -> Uuid {
        let request_id = Uuid::new_v4();
        let request = SummarizationRequest {
            request_id,
            priority,
            text: text.into(),
            max_len,
            min_len,
            deadline,
        };

        let (tx, rx) = oneshot::channel();
        if self.shared.shutdown.load(Ordering::SeqCst) {
            let _ = tx.send(SummarizationResponse {
                request_id,
                outcome: Err(SummarizerError::Cancelled),
            });
        } else {
            let mut queue = self.shared.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.heap.push(QueuedRequest { seq, request, respond: tx });
        }
        self.shared.pending.lock().insert(request_id, rx);
        self.shared.notify.notify_one();
        request_id
    }

    /// Block until the worker publishes the response for `request_id`.
    pub async fn await_response(
        &self,
        request_id: Uuid,
        timeout: Option<Duration>,
    ) -> SummarizationResponse {
        let Some(rx) = self.shared.pending.lock().remove(&request_id) else {
            return SummarizationResponse {
                request_id,
                outcome: Err(SummarizerError::UnknownRequest(request_id)),
            };
        };

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result,
                Err(_) => {
                    return SummarizationResponse {
                        request_id,
                        outcome: Err(SummarizerError::AwaitTimeout(limit)),
                    }
                }
            },
            None => rx.await,
        };

        received.unwrap_or(SummarizationResponse {
            request_id,
            outcome: Err(SummarizerError::Cancelled),
        })
    }

    /// Number of tokens above which callers should chunk their input.
    pub fn max_input_tokens(&self) -> usize {
        self.config.max_input_tokens
    }

    /// Stop the worker: queued requests are flushed with a cancellation
    /// error, then the worker exits.
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    shared: Arc<ServiceShared>,
    model: Arc<dyn SummarizationModel>,
    config: SummarizerConfig,
) {
    let mut loaded = false;

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            drain_cancelled(&shared);
            break;
        }

        let next = shared.queue.lock().heap.pop();
        let Some(item) = next else {
            if loaded && config.idle_unload {
                tracing::info!("queue idle, releasing summarization model");
                model.unload().await;
                loaded = false;
            }
            shared.notify.notified().await;
            continue;
        };

        let QueuedRequest { request, respond, .. } = item;
        let request_id = request.request_id;

        if request.deadline.is_some_and(|d| Instant::now() > d) {
            tracing::debug!(%request_id, "deadline expired at dequeue");
            let _ = respond.send(SummarizationResponse {
                request_id,
                outcome: Err(SummarizerError::DeadlineExpired),
            });
            continue;
        }

        // Memory gate: wait, bounded, for device pressure to drop.
        let gate_start = Instant::now();
        let mut cancelled = false;
        while model.memory_pressure() > config.memory_high_water {
            if shared.shutdown.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
            if gate_start.elapsed() >= config.memory_poll_budget {
                tracing::warn!(%request_id, "memory gate budget exhausted, proceeding anyway");
                break;
            }
            tokio::time::sleep(config.memory_poll_interval).await;
        }
        if cancelled {
            let _ = respond.send(SummarizationResponse {
                request_id,
                outcome: Err(SummarizerError::Cancelled),
            });
            continue;
        }

        if !loaded {
            match model.load().await {
                Ok(()) => loaded = true,
                Err(e) => {
                    tracing::error!(%request_id, error = %e, "model load failed");
                    let _ = respond.send(SummarizationResponse { request_id, outcome: Err(e) });
                    continue;
                }
            }
        }

        let input = truncate_to_tokens(&request.text, config.max_input_tokens);
        let outcome = match model.summarize(&input, request.max_len, request.min_len).await {
            Ok(summary) => Ok(reflow_paragraphs(&summary, config.words_per_line)),
            Err(e) => {
                tracing::warn!(%request_id, error = %e, "summarization failed");
                Err(e)
            }
        };

        let _ = respond.send(SummarizationResponse { request_id, outcome });
    }

    tracing::info!("summarizer worker exiting");
}

fn drain_cancelled(shared: &ServiceShared) {
    let mut queue = shared.queue.lock();
    while let Some(item) = queue.heap.pop() {
        let request_id = item.request.request_id;
        let _ = item.respond.send(SummarizationResponse {
            request_id,
            outcome: Err(SummarizerError::Cancelled),
        });
    }
}
