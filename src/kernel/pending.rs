use crate::core::types::{Request, StreamEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

struct Entry {
    request: Request,
    timer: JoinHandle<()>,
}

struct Inner {
    live: HashMap<u64, Entry>,
    dropped: HashMap<u64, Request>,
}

/// In-flight request table keyed by request id.
///
/// Every entry carries its own expiry timer: a request that outlives the
/// reply timeout is moved to a dropped table, logged, and reported to the
/// caller as a `ReplyTimeout` event, which is distinct from a negative
/// reply. A reply observed in time cancels the timer.
#[derive(Clone)]
pub struct PendingRequests {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl PendingRequests {
    /// Must be created inside a Tokio runtime; `put` spawns timer tasks.
    pub fn new(timeout: Duration, events: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                live: HashMap::new(),
                dropped: HashMap::new(),
            })),
            timeout,
            events,
        }
    }

    /// Records `request` under `id`, replacing any previous entry.
    ///
    /// Ids are unique for the lifetime of a request; the channel's counter
    /// guarantees that for assigned ids.
    pub fn put(&self, id: u64, request: Request) {
        let timer = self.spawn_timer(id);
        let mut inner = lock(&self.inner);
        if let Some(old) = inner.live.insert(id, Entry { request, timer }) {
            old.timer.abort();
        }
    }

    /// Removes and returns the entry for `id`, cancelling its timer.
    pub fn remove(&self, id: u64) -> Option<Request> {
        let mut inner = lock(&self.inner);
        inner.live.remove(&id).map(|entry| {
            entry.timer.abort();
            entry.request
        })
    }

    pub fn get(&self, id: u64) -> Option<Request> {
        lock(&self.inner).live.get(&id).map(|e| e.request.clone())
    }

    pub fn contains(&self, id: u64) -> bool {
        lock(&self.inner).live.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).live.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).live.is_empty()
    }

    /// Whether `id` was evicted by its timer without ever seeing a reply.
    pub fn was_dropped(&self, id: u64) -> bool {
        lock(&self.inner).dropped.contains_key(&id)
    }

    fn spawn_timer(&self, id: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let timed_out = {
                let mut inner = lock(&inner);
                inner.live.remove(&id).map(|entry| {
                    inner.dropped.insert(id, entry.request.clone());
                    entry.request
                })
            };

            if let Some(request) = timed_out {
                debug!(id, method = %request.method, "Reach reply timeout, request dropped");
                let _ = events.send(StreamEvent::ReplyTimeout {
                    id,
                    method: request.method,
                    args: request.args,
                });
            }
        })
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
