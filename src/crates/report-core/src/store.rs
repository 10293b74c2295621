//! Per-node status and payload store with subscriber streaming.
//!
//! The orchestrator is the only writer; any number of readers may
//! subscribe. Updates are fanned out to per-subscriber bounded buffers
//! so that a slow consumer never applies back-pressure to the run: when
//! a buffer fills, the oldest update for that subscriber is dropped and
//! the subscription is flagged lossy. Subscribers reconcile by calling
//! [`ResultStore::snapshot`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::StoreError;
use crate::messages::{NodeState, SectionResult};

/// Default per-subscriber buffer depth.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Clone)]
pub struct ResultStore {
    shared: Arc<StoreShared>,
}

struct StoreShared {
    inner: Mutex<Inner>,
}

struct Inner {
    nodes: BTreeMap<u32, NodeState>,
    subscribers: Vec<Weak<SubscriberShared>>,
}

struct SubscriberShared {
    queue: Mutex<VecDeque<(u32, NodeState)>>,
    notify: Notify,
    lossy: AtomicBool,
    capacity: usize,
}

/// A live subscription to store updates.
///
/// Each subscription sees every transition published after it attached,
/// in per-node FIFO order. Earlier transitions are not replayed; callers
/// needing the current picture take a snapshot first.
pub struct Subscription {
    shared: Arc<SubscriberShared>,
    store: Weak<StoreShared>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(StoreShared {
                inner: Mutex::new(Inner { nodes: BTreeMap::new(), subscribers: Vec::new() }),
            }),
        }
    }

    /// Insert every id as `pending`. Called once, before any node task
    /// is spawned; does not notify subscribers.
    pub fn init(&self, ids: impl IntoIterator<Item = u32>) {
        let mut inner = self.shared.inner.lock();
        for id in ids {
            inner.nodes.insert(id, NodeState::pending());
        }
    }

    /// Rebuild a store from a persisted snapshot (restored runs).
    pub fn from_snapshot(nodes: BTreeMap<u32, NodeState>) -> Self {
        let store = Self::new();
        store.shared.inner.lock().nodes = nodes;
        store
    }

    pub fn mark_processing(&self, id: u32, msg: impl Into<String>) -> Result<(), StoreError> {
        self.transition(id, NodeState::processing(msg))
    }

    pub fn store(&self, id: u32, section: SectionResult) -> Result<(), StoreError> {
        self.transition(id, NodeState::complete(section))
    }

    pub fn mark_failed(&self, id: u32, err: impl Into<String>) -> Result<(), StoreError> {
        self.transition(id, NodeState::failed(err))
    }

    fn transition(&self, id: u32, state: NodeState) -> Result<(), StoreError> {
        let mut inner = self.shared.inner.lock();
        let current = inner.nodes.get(&id).ok_or(StoreError::UnknownNode(id))?;
        if current.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal(id));
        }
        inner.nodes.insert(id, state.clone());
        inner.publish(id, state);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<NodeState> {
        self.shared.inner.lock().nodes.get(&id).cloned()
    }

    /// Consistent point-in-time view of every node.
    pub fn snapshot(&self) -> BTreeMap<u32, NodeState> {
        self.shared.inner.lock().nodes.clone()
    }

    /// Serialize the store with ids in ascending order.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.snapshot())
    }

    /// Attach a new subscriber with the default buffer depth.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(SUBSCRIBER_BUFFER)
    }

    /// Attach a new subscriber with an explicit buffer depth.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let shared = Arc::new(SubscriberShared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(SUBSCRIBER_BUFFER))),
            notify: Notify::new(),
            lossy: AtomicBool::new(false),
            capacity: capacity.max(1),
        });
        let mut inner = self.shared.inner.lock();
        inner.subscribers.push(Arc::downgrade(&shared));
        Subscription { shared, store: Arc::downgrade(&self.shared) }
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn publish(&mut self, id: u32, state: NodeState) {
        self.subscribers.retain(|sub| {
            let Some(sub) = sub.upgrade() else { return false };
            {
                let mut queue = sub.queue.lock();
                if queue.len() >= sub.capacity {
                    queue.pop_front();
                    sub.lossy.store(true, Ordering::Relaxed);
                }
                queue.push_back((id, state.clone()));
            }
            sub.notify.notify_one();
            true
        });
    }
}

impl Drop for StoreShared {
    fn drop(&mut self) {
        // Wake pending receivers so they can observe the closed store.
        for sub in &self.inner.get_mut().subscribers {
            if let Some(sub) = sub.upgrade() {
                sub.notify.notify_one();
            }
        }
    }
}

impl Subscription {
    /// Next update, or `None` once the store is gone and the buffer is
    /// drained.
    pub async fn recv(&mut self) -> Option<(u32, NodeState)> {
        loop {
            if let Some(update) = self.shared.queue.lock().pop_front() {
                return Some(update);
            }
            if self.store.upgrade().is_none() {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<(u32, NodeState)> {
        self.shared.queue.lock().pop_front()
    }

    /// Whether this subscription has dropped updates. Cleared by
    /// [`acknowledge_loss`](Self::acknowledge_loss) after the caller
    /// resynchronizes from a snapshot.
    pub fn is_lossy(&self) -> bool {
        self.shared.lossy.load(Ordering::Relaxed)
    }

    pub fn acknowledge_loss(&self) {
        self.shared.lossy.store(false, Ordering::Relaxed);
    }

    /// Adapt the subscription into a `futures::Stream` of updates.
    pub fn into_stream(self) -> impl futures::Stream<Item = (u32, NodeState)> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|update| (update, sub))
        })
    }
}
