use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;

use crate::model::request::{ObjectKey, ReconcileOutcome, ReconcileRequest};
use crate::service::reconciler_svc::Reconciler;
use crate::service::store::ResourceStore;
use crate::service::work_queue::WorkQueue;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs reconcile workers over a [`WorkQueue`].
pub struct Dispatcher<S> {
    reconciler: Reconciler<S>,
    queue: WorkQueue,
    workers: usize,
    outcomes: Arc<DashMap<ObjectKey, ReconcileOutcome>>,
}

impl<S: ResourceStore + 'static> Dispatcher<S> {
    pub fn new(reconciler: Reconciler<S>, queue: WorkQueue, workers: usize) -> Self {
        Self {
            reconciler,
            queue,
            workers: workers.max(1),
            outcomes: Arc::new(DashMap::new()),
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Feeds an outcome back into the queue.
    pub fn settle(queue: &WorkQueue, request: &ReconcileRequest, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Done => queue.forget(request),
            ReconcileOutcome::RequeueImmediate => queue.requeue(request.clone(), true),
            ReconcileOutcome::Error(kind) if kind.is_retryable() => queue.requeue(request.clone(), false),
            ReconcileOutcome::Error(kind) => {
                log::warn!("Dropping {request} - [{}] {kind}", kind.code());
                queue.forget(request);
            }
        }
    }

    async fn work(reconciler: Reconciler<S>, queue: WorkQueue, outcomes: Arc<DashMap<ObjectKey, ReconcileOutcome>>) {
        while let Some(request) = queue.next().await {
            let outcome = reconciler.reconcile(&request).await;
            Self::settle(&queue, &request, &outcome);
            outcomes.insert(request.key.clone(), outcome);
            queue.done(&request);
        }
    }

    /// Processes requests until the queue is shut down.
    pub async fn run(&self) {
        let handles = (0..self.workers)
            .map(|_| tokio::spawn(Self::work(self.reconciler.clone(), self.queue.clone(), self.outcomes.clone())))
            .collect::<Vec<_>>();

        for result in join_all(handles).await {
            if let Err(err) = result {
                log::error!("Reconcile worker terminated abnormally - {err}");
            }
        }
    }

    /// Processes requests until nothing is pending, in flight or backing off, then
    /// returns the last outcome seen for every key.
    pub async fn run_until_idle(&self) -> BTreeMap<ObjectKey, ReconcileOutcome> {
        let queue = self.queue.clone();
        let watchdog = async move {
            while !queue.is_idle() {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
            queue.shutdown();
        };
        futures::join!(self.run(), watchdog);
        self.outcomes()
    }

    pub fn outcomes(&self) -> BTreeMap<ObjectKey, ReconcileOutcome> {
        self.outcomes.iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
