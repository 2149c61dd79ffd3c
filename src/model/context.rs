use crate::core::config::OperatorConfig;
use crate::service::kube_store::KubeStore;
use crate::service::reconciler_svc::Reconciler;

pub struct ContextData {
    /// Reconciler bound to the Kubernetes API server.
    pub reconciler: Reconciler<KubeStore>,
    pub config: OperatorConfig,
}
