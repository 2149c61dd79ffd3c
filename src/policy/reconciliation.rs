use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;

use crate::core::config::OperatorConfig;
use crate::model::context::ContextData;
use crate::model::error::Error;
use crate::model::request::{ReconcileOutcome, ReconcileRequest};
use crate::model::spec::DemoDeployment;

/// The reconciler that will be called when either the DemoDeployment or one of its Deployments changes
pub async fn reconcile(demo_deployment: Arc<DemoDeployment>, context: Arc<ContextData>) -> Result<Action, Error> {
    let request = ReconcileRequest::for_object(&demo_deployment)
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let outcome = context.reconciler.reconcile(&request).await;
    outcome_action(outcome, &context.config)
}

/// Maps a pass outcome onto the controller runtime's scheduling decision.
pub fn outcome_action(outcome: ReconcileOutcome, config: &OperatorConfig) -> Result<Action, Error> {
    match outcome {
        ReconcileOutcome::Done => Ok(Action::requeue(config.resync_interval())),
        ReconcileOutcome::RequeueImmediate => Ok(Action::requeue(Duration::ZERO)),
        ReconcileOutcome::Error(kind) => Err(Error::ReconcileFailed(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn done_waits_for_resync_and_requeue_is_immediate() {
        let config = OperatorConfig::default();
        assert_eq!(
            outcome_action(ReconcileOutcome::Done, &config).unwrap(),
            Action::requeue(Duration::from_secs(300)),
        );
        assert_eq!(
            outcome_action(ReconcileOutcome::RequeueImmediate, &config).unwrap(),
            Action::requeue(Duration::ZERO),
        );
    }

    #[test]
    fn errors_are_handed_to_the_error_policy() {
        let config = OperatorConfig::default();
        let result = outcome_action(ReconcileOutcome::Error(ErrorKind::PolicyViolation { requested: 3, max: 2 }), &config);
        assert!(matches!(result, Err(Error::ReconcileFailed(ErrorKind::PolicyViolation { .. }))));
    }
}
