use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

use crate::model::request::ReconcileRequest;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ReconcileRequest>,
    queued: HashSet<ReconcileRequest>,
    in_flight: HashSet<ReconcileRequest>,
    dirty: HashSet<ReconcileRequest>,
    failures: HashMap<ReconcileRequest, u32>,
    delayed: usize,
    shutdown: bool,
}

impl QueueState {
    /// Returns whether a worker has to be woken up.
    fn push(&mut self, request: ReconcileRequest) -> bool {
        if self.shutdown || self.queued.contains(&request) {
            return false;
        }
        if self.in_flight.contains(&request) {
            self.dirty.insert(request);
            return false;
        }
        self.queued.insert(request.clone());
        self.pending.push_back(request);
        true
    }
}

/// De-duplicating queue of reconcile requests with per-key serialization.
///
/// A request that is enqueued while a worker holds it is parked and delivered
/// again once the worker calls [`WorkQueue::done`], so at most one pass per key
/// runs at any time.
#[derive(Clone)]
pub struct WorkQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl WorkQueue {
    pub fn new(backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            backoff_base,
            backoff_max,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, request: ReconcileRequest) {
        if self.lock().push(request) {
            self.notify.notify_one();
        }
    }

    /// Waits for the next request, `None` once the queue is shut down and drained.
    pub async fn next(&self) -> Option<ReconcileRequest> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(request) = state.pending.pop_front() {
                    state.queued.remove(&request);
                    state.in_flight.insert(request.clone());
                    return Some(request);
                }
                if state.shutdown {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Puts a request back, right away or after its per-key backoff.
    pub fn requeue(&self, request: ReconcileRequest, immediate: bool) {
        if immediate {
            self.enqueue(request);
            return;
        }

        let delay = {
            let mut state = self.lock();
            if state.shutdown {
                return;
            }
            let failures = state.failures.entry(request.clone()).or_insert(0);
            let delay = self.backoff(*failures);
            *failures = failures.saturating_add(1);
            state.delayed += 1;
            delay
        };

        log::debug!("Requeueing {request} in {}ms", delay.as_millis());
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let wake = {
                let mut state = queue.lock();
                state.delayed -= 1;
                state.push(request)
            };
            if wake {
                queue.notify.notify_one();
            }
        });
    }

    /// Exponential backoff for a key that already failed `failures` times, with up to 10% jitter.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponential = self.backoff_base
            .checked_mul(2u32.saturating_pow(failures.min(31)))
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max);
        let jitter_bound = (exponential.as_millis() / 10) as u64;
        let jitter = if jitter_bound == 0 { 0 } else { rand::thread_rng().gen_range(0..=jitter_bound) };
        (exponential + Duration::from_millis(jitter)).min(self.backoff_max)
    }

    /// Releases the per-key slot taken by [`WorkQueue::next`].
    pub fn done(&self, request: &ReconcileRequest) {
        let wake = {
            let mut state = self.lock();
            state.in_flight.remove(request);
            if state.dirty.remove(request) {
                state.push(request.clone())
            } else {
                false
            }
        };
        if wake {
            self.notify.notify_one();
        }
    }

    /// Clears the failure history of a key.
    pub fn forget(&self, request: &ReconcileRequest) {
        self.lock().failures.remove(request);
    }

    pub fn failures(&self, request: &ReconcileRequest) -> u32 {
        self.lock().failures.get(request).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing pending, in flight or waiting out a backoff.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight.is_empty() && state.delayed == 0
    }

    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.notify.notify_waiters();
    }
}
