use axum::extract::FromRef;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::core::config::OperatorConfig;
use crate::policy::admission::AdmissionGate;

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct OperatorState {
    admission_gate: AdmissionGate,
    recorder_handle: Option<PrometheusHandle>,
}

impl OperatorState {
    pub fn build(app_config: &OperatorConfig, recorder_handle: Option<PrometheusHandle>) -> Self {
        Self {
            admission_gate: AdmissionGate::new(app_config.max_replicas),
            recorder_handle,
        }
    }
}

impl FromRef<OperatorState> for AdmissionGate {
    fn from_ref(app_state: &OperatorState) -> Self {
        app_state.admission_gate
    }
}

impl FromRef<OperatorState> for Option<PrometheusHandle> {
    fn from_ref(app_state: &OperatorState) -> Self {
        app_state.recorder_handle.clone()
    }
}
