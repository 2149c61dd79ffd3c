use crate::core::error::AdmissionError;
use crate::model::spec::DemoDeploymentSpec;

/// Write-time validation of DemoDeployment specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionGate {
    max_replicas: i32,
}

impl AdmissionGate {
    pub fn new(max_replicas: i32) -> Self {
        Self { max_replicas }
    }

    pub fn validate_create(&self, spec: &DemoDeploymentSpec) -> Result<(), AdmissionError> {
        self.validate_spec(spec)
    }

    pub fn validate_update(&self, _old: Option<&DemoDeploymentSpec>, new: &DemoDeploymentSpec) -> Result<(), AdmissionError> {
        self.validate_spec(new)
    }

    pub fn validate_delete(&self, _old: Option<&DemoDeploymentSpec>) -> Result<(), AdmissionError> {
        Ok(())
    }

    fn validate_spec(&self, spec: &DemoDeploymentSpec) -> Result<(), AdmissionError> {
        if spec.image.trim().is_empty() {
            return Err(AdmissionError::EmptyImage);
        }
        if spec.replicas < 0 {
            return Err(AdmissionError::NegativeReplicas(spec.replicas));
        }
        if spec.replicas > self.max_replicas {
            return Err(AdmissionError::ReplicaCeiling {
                requested: spec.replicas,
                max: self.max_replicas,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(image: &str, replicas: i32) -> DemoDeploymentSpec {
        DemoDeploymentSpec {
            image: String::from(image),
            replicas,
            template: None,
        }
    }

    #[test]
    fn accepts_replicas_up_to_ceiling() {
        let gate = AdmissionGate::new(2);
        assert!(gate.validate_create(&spec("nginx", 0)).is_ok());
        assert!(gate.validate_create(&spec("nginx", 2)).is_ok());
    }

    #[test]
    fn rejects_replicas_over_ceiling() {
        let gate = AdmissionGate::new(2);
        let err = gate.validate_update(None, &spec("nginx", 3)).unwrap_err();
        assert_eq!(err, AdmissionError::ReplicaCeiling { requested: 3, max: 2 });
        assert_eq!(err.to_string(), "unable to scale demo deployment replicas greater than 2");
    }

    #[test]
    fn rejects_malformed_specs() {
        let gate = AdmissionGate::new(2);
        assert_eq!(gate.validate_create(&spec(" ", 1)), Err(AdmissionError::EmptyImage));
        assert_eq!(gate.validate_create(&spec("nginx", -1)), Err(AdmissionError::NegativeReplicas(-1)));
    }

    #[test]
    fn delete_is_always_allowed() {
        let gate = AdmissionGate::new(0);
        assert!(gate.validate_delete(Some(&spec("nginx", 10))).is_ok());
    }
}
