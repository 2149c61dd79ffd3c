use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use serde::{Deserialize, Serialize};

use crate::core::config::OperatorConfig;
use crate::model::request::{ObjectKey, ReconcileOutcome, ReconcileRequest};
use crate::model::spec::DemoDeployment;
use crate::policy::admission::AdmissionGate;
use crate::service::dispatcher::Dispatcher;
use crate::service::memory_store::InMemoryStore;
use crate::service::observer::ReconcileObserver;
use crate::service::reconciler_svc::Reconciler;
use crate::service::work_queue::WorkQueue;

const DEFAULT_NAMESPACE: &str = "default";

/// Result of converging one manifest against the in-memory store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub namespace: String,
    pub name: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
}

/// Parses a (possibly multi-document) YAML stream of DemoDeployment manifests.
/// Manifests without a namespace land in `default`.
pub fn parse_manifests(yaml: &str) -> Result<Vec<DemoDeployment>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_str(yaml)
        .map(DemoDeployment::deserialize)
        .map(|parsed| parsed.map(|mut dd| {
            if dd.metadata.namespace.is_none() {
                dd.metadata.namespace = Some(String::from(DEFAULT_NAMESPACE));
            }
            dd
        }))
        .collect()
}

/// Admits every manifest into a fresh in-memory store and drives them through
/// the work queue until nothing is left to do.
pub async fn plan(manifests: Vec<DemoDeployment>, config: &OperatorConfig, observer: Arc<dyn ReconcileObserver>) -> Vec<PlanEntry> {
    let store = Arc::new(InMemoryStore::new(AdmissionGate::new(config.max_replicas)));
    let queue = WorkQueue::new(config.backoff_base(), config.backoff_max());
    let mut entries = Vec::new();

    for manifest in manifests {
        let key = ObjectKey::of(&manifest);
        match store.apply_managed(manifest) {
            Ok(admitted) => {
                if let Some(request) = ReconcileRequest::for_object(&admitted) {
                    queue.enqueue(request);
                }
            }
            Err(err) => entries.push(PlanEntry {
                namespace: key.as_ref().map(|k| k.namespace.clone()).unwrap_or_default(),
                name: key.map(|k| k.name).unwrap_or_default(),
                outcome: String::from("rejected"),
                error: Some(err.to_string()),
                deployment: None,
            }),
        }
    }

    let reconciler = Reconciler::new(store.clone(), config, observer);
    let dispatcher = Dispatcher::new(reconciler, queue, config.workers);
    let outcomes = dispatcher.run_until_idle().await;

    entries.extend(outcomes.into_iter().map(|(key, outcome)| {
        let error = match &outcome {
            ReconcileOutcome::Error(kind) => Some(kind.to_string()),
            _ => None,
        };
        PlanEntry {
            deployment: store.child(&key),
            namespace: key.namespace,
            name: key.name,
            outcome: String::from(outcome.label()),
            error,
        }
    }));
    entries
}
