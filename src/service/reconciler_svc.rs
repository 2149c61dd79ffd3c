use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use crate::core::config::OperatorConfig;
use crate::core::error::{ErrorKind, StoreError};
use crate::model::request::{ReconcileOutcome, ReconcileRequest};
use crate::model::spec::{DemoDeployment, DemoDeploymentStatus};
use crate::service::observer::{ReconcileEvent, ReconcileObserver, ReconcileStep};
use crate::service::store::ResourceStore;
use crate::service::synthesizer::{child_selector, is_controlled_by, is_converged, merge_into, pod_selector, selector_string, synthesize};

/// Level-triggered reconciliation of a single DemoDeployment.
///
/// Every pass runs fetch, policy check, create, status update and verify in
/// this order, reading current state at each step. Passes never hold state
/// between calls, so they are safe to repeat under at-least-once delivery.
pub struct Reconciler<S> {
    store: Arc<S>,
    observer: Arc<dyn ReconcileObserver>,
    max_replicas: i32,
    controller_tag: String,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            observer: self.observer.clone(),
            max_replicas: self.max_replicas,
            controller_tag: self.controller_tag.clone(),
        }
    }
}

impl<S: ResourceStore> Reconciler<S> {
    pub fn new(store: Arc<S>, config: &OperatorConfig, observer: Arc<dyn ReconcileObserver>) -> Self {
        Self {
            store,
            observer,
            max_replicas: config.max_replicas,
            controller_tag: config.controller_tag.clone(),
        }
    }

    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconcileOutcome {
        let started = Instant::now();
        self.observer.observe(request, &ReconcileEvent::Started);
        let outcome = self.run(request).await;
        self.observer.observe(request, &ReconcileEvent::Finished {
            outcome: outcome.clone(),
            elapsed: started.elapsed(),
        });
        outcome
    }

    async fn run(&self, request: &ReconcileRequest) -> ReconcileOutcome {
        let managed = match self.store.get(&request.key).await {
            Ok(managed) => managed,
            Err(StoreError::NotFound(_)) => {
                self.observer.observe(request, &ReconcileEvent::ManagedGone);
                return ReconcileOutcome::Done;
            }
            Err(err) => {
                let kind = ErrorKind::FetchFailure(err.to_string());
                self.store_failure(request, ReconcileStep::Fetch, err);
                return ReconcileOutcome::Error(kind);
            }
        };

        if managed.spec.replicas > self.max_replicas {
            self.observer.observe(request, &ReconcileEvent::PolicyViolation {
                requested: managed.spec.replicas,
                max: self.max_replicas,
            });
            return ReconcileOutcome::Error(self.policy_violation(&managed));
        }

        let desired = synthesize(&managed, &self.controller_tag);
        match self.store.create(&desired).await {
            Ok(_) => self.observer.observe(request, &ReconcileEvent::ChildCreated),
            Err(StoreError::AlreadyExists(_)) => {
                if let Err(outcome) = self.converge_existing(request, &managed, &desired).await {
                    return outcome;
                }
            }
            Err(err) => {
                let kind = ErrorKind::WriteFailure(err.to_string());
                self.store_failure(request, ReconcileStep::Create, err);
                return ReconcileOutcome::Error(kind);
            }
        }

        let normalized = self.normalize(&managed);
        if normalized == managed {
            self.observer.observe(request, &ReconcileEvent::StatusUnchanged);
        } else {
            match self.store.update(&normalized).await {
                Ok(_) => self.observer.observe(request, &ReconcileEvent::StatusUpdated),
                Err(err @ (StoreError::Conflict(_) | StoreError::NotFound(_))) => {
                    self.store_failure(request, ReconcileStep::Update, err);
                    return ReconcileOutcome::RequeueImmediate;
                }
                Err(err @ StoreError::Rejected(_)) => {
                    self.store_failure(request, ReconcileStep::Update, err);
                    return ReconcileOutcome::Error(self.policy_violation(&managed));
                }
                Err(err) => {
                    let kind = ErrorKind::WriteFailure(err.to_string());
                    self.store_failure(request, ReconcileStep::Update, err);
                    return ReconcileOutcome::Error(kind);
                }
            }
        }

        let selector = child_selector(&managed, &self.controller_tag);
        match self.store.list(&request.key.namespace, &selector).await {
            Ok(children) => {
                if !children.iter().any(|child| is_controlled_by(child, &managed)) {
                    self.observer.observe(request, &ReconcileEvent::ChildMissing);
                }
                ReconcileOutcome::Done
            }
            Err(err @ StoreError::NotFound(_)) => {
                self.store_failure(request, ReconcileStep::List, err);
                ReconcileOutcome::RequeueImmediate
            }
            Err(error) => {
                self.observer.observe(request, &ReconcileEvent::ListFailure { error });
                ReconcileOutcome::Done
            }
        }
    }

    /// Brings an already existing child back to the desired definition.
    async fn converge_existing(&self, request: &ReconcileRequest, managed: &DemoDeployment, desired: &Deployment) -> Result<(), ReconcileOutcome> {
        let current = match self.store.get_child(&request.key).await {
            Ok(current) => current,
            Err(err @ StoreError::NotFound(_)) => {
                self.store_failure(request, ReconcileStep::Create, err);
                return Err(ReconcileOutcome::RequeueImmediate);
            }
            Err(err) => {
                let kind = ErrorKind::WriteFailure(err.to_string());
                self.store_failure(request, ReconcileStep::Create, err);
                return Err(ReconcileOutcome::Error(kind));
            }
        };

        if !is_controlled_by(&current, managed) {
            let owner = current.owner_references()
                .iter()
                .find(|oref| oref.controller.unwrap_or(false))
                .map(|oref| format!("{}/{}", oref.kind, oref.name));
            self.observer.observe(request, &ReconcileEvent::ChildNotOwned { owner });
            return Err(ReconcileOutcome::Error(ErrorKind::OwnershipConflict(format!(
                "deployment {} is not controlled by this demo deployment", request.key
            ))));
        }

        if is_converged(&current, desired) {
            self.observer.observe(request, &ReconcileEvent::ChildUpToDate);
            return Ok(());
        }

        match self.store.replace_child(&merge_into(&current, desired)).await {
            Ok(_) => {
                self.observer.observe(request, &ReconcileEvent::ChildRepaired);
                Ok(())
            }
            Err(err @ (StoreError::Conflict(_) | StoreError::NotFound(_))) => {
                self.store_failure(request, ReconcileStep::Create, err);
                Err(ReconcileOutcome::RequeueImmediate)
            }
            Err(err) => {
                let kind = ErrorKind::WriteFailure(err.to_string());
                self.store_failure(request, ReconcileStep::Create, err);
                Err(ReconcileOutcome::Error(kind))
            }
        }
    }

    /// The DemoDeployment as it should be stored once its child is in place.
    fn normalize(&self, managed: &DemoDeployment) -> DemoDeployment {
        let mut normalized = managed.clone();
        normalized.status = Some(DemoDeploymentStatus {
            observed_generation: managed.metadata.generation,
            replicas: managed.spec.replicas,
            deployment: Some(managed.name_any()),
            selector: Some(selector_string(&pod_selector(managed, &self.controller_tag))),
        });
        normalized
    }

    fn policy_violation(&self, managed: &DemoDeployment) -> ErrorKind {
        ErrorKind::PolicyViolation {
            requested: managed.spec.replicas,
            max: self.max_replicas,
        }
    }

    fn store_failure(&self, request: &ReconcileRequest, step: ReconcileStep, error: StoreError) {
        self.observer.observe(request, &ReconcileEvent::StoreFailure { step, error });
    }
}
