use std::sync::Arc;

use kube::runtime::controller::Action;

use crate::core::config::OperatorConfig;
use crate::model::context::ContextData;
use crate::model::error::Error;
use crate::model::spec::DemoDeployment;

/// an error handler that will be called when the reconciler fails with access to both the
/// object that caused the failure and the actual error
pub fn error_policy(_obj: Arc<DemoDeployment>, error: &Error, ctx: Arc<ContextData>) -> Action {
    error_action(error, &ctx.config)
}

/// Permanent failures wait for the resource to change, the rest are retried later.
pub fn error_action(error: &Error, config: &OperatorConfig) -> Action {
    if error.is_permanent() {
        Action::await_change()
    } else {
        Action::requeue(config.error_requeue_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn policy_violations_are_not_retried() {
        let config = OperatorConfig::default();
        let violation = Error::ReconcileFailed(ErrorKind::PolicyViolation { requested: 3, max: 2 });
        assert_eq!(error_action(&violation, &config), Action::await_change());
    }

    #[test]
    fn write_failures_are_retried_later() {
        let config = OperatorConfig::default();
        let failure = Error::ReconcileFailed(ErrorKind::WriteFailure(String::from("timeout")));
        assert_eq!(error_action(&failure, &config), Action::requeue(config.error_requeue_interval()));
    }
}
