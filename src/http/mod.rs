use std::future::ready;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::state::OperatorState;

pub mod admission;

async fn metrics_handler(State(recorder_handle): State<Option<PrometheusHandle>>) -> String {
    recorder_handle
        .map(|handle| handle.render())
        .unwrap_or_default()
}

pub fn build_router(state: OperatorState) -> Router {
    Router::new()
        .route("/validate", post(admission::validate_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| ready("ok")))
        .with_state(state)
}
