use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::error::StoreError;
use crate::model::request::{ReconcileOutcome, ReconcileRequest};

pub const RECONCILE_TOTAL_METRIC_NAME: &str = "demodeployment_reconcile_total";
pub const CHILD_WRITES_METRIC_NAME: &str = "demodeployment_child_writes_total";
pub const STORE_ERRORS_METRIC_NAME: &str = "demodeployment_store_errors_total";
pub const RECONCILE_DURATION_METRIC_NAME: &str = "demodeployment_reconcile_duration_seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    Fetch,
    Create,
    Update,
    List,
}

impl ReconcileStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStep::Fetch => "fetch",
            ReconcileStep::Create => "create",
            ReconcileStep::Update => "update",
            ReconcileStep::List => "list",
        }
    }
}

/// Notable things that happen during a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    Started,
    ManagedGone,
    PolicyViolation { requested: i32, max: i32 },
    ChildCreated,
    ChildUpToDate,
    ChildRepaired,
    ChildNotOwned { owner: Option<String> },
    StatusUpdated,
    StatusUnchanged,
    StoreFailure { step: ReconcileStep, error: StoreError },
    ChildMissing,
    ListFailure { error: StoreError },
    Finished { outcome: ReconcileOutcome, elapsed: Duration },
}

/// Telemetry sink handed to the reconciler at construction.
pub trait ReconcileObserver: Send + Sync {
    fn observe(&self, request: &ReconcileRequest, event: &ReconcileEvent);
}

/// Writes events to the `log` facade and records prometheus metrics.
#[derive(Debug, Clone, Default)]
pub struct LogObserver;

impl ReconcileObserver for LogObserver {
    fn observe(&self, request: &ReconcileRequest, event: &ReconcileEvent) {
        match event {
            ReconcileEvent::Started => log::debug!("Reconciling {request}"),
            ReconcileEvent::ManagedGone => log::info!("{request} no longer exists, nothing to reconcile"),
            ReconcileEvent::PolicyViolation { requested, max } => {
                log::error!("{request} rejected - unable to scale demo deployment replicas greater than {max} (requested {requested})")
            }
            ReconcileEvent::ChildCreated => {
                log::info!("Created deployment for {request}");
                metrics::counter!(CHILD_WRITES_METRIC_NAME, "op" => "create").increment(1);
            }
            ReconcileEvent::ChildUpToDate => log::debug!("Deployment for {request} already up to date"),
            ReconcileEvent::ChildRepaired => {
                log::info!("Repaired drifted deployment for {request}");
                metrics::counter!(CHILD_WRITES_METRIC_NAME, "op" => "replace").increment(1);
            }
            ReconcileEvent::ChildNotOwned { owner } => {
                log::error!("Deployment for {request} exists but is controlled by {}", owner.as_deref().unwrap_or("nobody"))
            }
            ReconcileEvent::StatusUpdated => log::debug!("Updated status of {request}"),
            ReconcileEvent::StatusUnchanged => log::debug!("Status of {request} unchanged"),
            ReconcileEvent::StoreFailure { step, error } => {
                log::warn!("Error during {} of {request} - {error}", step.as_str());
                metrics::counter!(STORE_ERRORS_METRIC_NAME, "step" => step.as_str(), "code" => error.code()).increment(1);
            }
            ReconcileEvent::ChildMissing => log::warn!("No deployment found for {request} after reconciliation"),
            ReconcileEvent::ListFailure { error } => {
                log::warn!("Unable to list deployments of {request} - {error}");
                metrics::counter!(STORE_ERRORS_METRIC_NAME, "step" => ReconcileStep::List.as_str(), "code" => error.code()).increment(1);
            }
            ReconcileEvent::Finished { outcome, elapsed } => {
                log::debug!("Reconciled {request} in {}ms - {}", elapsed.as_millis(), outcome.label());
                metrics::counter!(RECONCILE_TOTAL_METRIC_NAME, "outcome" => outcome.label()).increment(1);
                metrics::histogram!(RECONCILE_DURATION_METRIC_NAME).record(elapsed.as_secs_f64());
            }
        }
    }
}

/// Keeps every observed event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<(ReconcileRequest, ReconcileEvent)>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<(ReconcileRequest, ReconcileEvent)> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, request: &ReconcileRequest) -> Vec<ReconcileEvent> {
        self.events()
            .into_iter()
            .filter(|(req, _)| req == request)
            .map(|(_, event)| event)
            .collect()
    }
}

impl ReconcileObserver for RecordingObserver {
    fn observe(&self, request: &ReconcileRequest, event: &ReconcileEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((request.clone(), event.clone()));
        }
    }
}
