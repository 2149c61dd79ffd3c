#![allow(dead_code)]

use std::sync::Arc;

use demodeployment_operator::core::config::OperatorConfig;
use demodeployment_operator::model::request::{ObjectKey, ReconcileRequest};
use demodeployment_operator::model::spec::{DemoDeployment, DemoDeploymentSpec};
use demodeployment_operator::policy::admission::AdmissionGate;
use demodeployment_operator::service::memory_store::InMemoryStore;
use demodeployment_operator::service::observer::RecordingObserver;
use demodeployment_operator::service::reconciler_svc::Reconciler;

pub const NAMESPACE: &str = "default";
pub const CONTROLLER_TAG: &str = "demodeployment-controller";

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub observer: RecordingObserver,
    pub reconciler: Reconciler<InMemoryStore>,
    pub config: OperatorConfig,
}

/// Reconciler with the default ceiling over a store whose admission gate
/// accepts up to `admitted_replicas`, so over-ceiling objects can be stored.
pub fn harness(admitted_replicas: i32) -> Harness {
    let config = OperatorConfig::default();
    let store = Arc::new(InMemoryStore::new(AdmissionGate::new(admitted_replicas)));
    let observer = RecordingObserver::default();
    let reconciler = Reconciler::new(store.clone(), &config, Arc::new(observer.clone()));
    Harness { store, observer, reconciler, config }
}

pub fn demo_deployment(name: &str, image: &str, replicas: i32) -> DemoDeployment {
    let mut dd = DemoDeployment::new(name, DemoDeploymentSpec {
        image: String::from(image),
        replicas,
        template: None,
    });
    dd.metadata.namespace = Some(String::from(NAMESPACE));
    dd
}

pub fn request(name: &str) -> ReconcileRequest {
    ReconcileRequest::new(NAMESPACE, name)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}
