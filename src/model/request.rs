use std::fmt;

use kube::ResourceExt;

use crate::core::error::ErrorKind;
use crate::model::spec::DemoDeployment;

/// Namespaced identity of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object, `None` when name or namespace is missing.
    pub fn of<K: ResourceExt>(obj: &K) -> Option<Self> {
        let namespace = obj.namespace()?;
        let name = obj.meta().name.clone()?;
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// "Something about this DemoDeployment or its children may have changed."
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    pub key: ObjectKey,
}

impl ReconcileRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { key: ObjectKey::new(namespace, name) }
    }

    pub fn for_object(obj: &DemoDeployment) -> Option<Self> {
        ObjectKey::of(obj).map(|key| Self { key })
    }
}

impl From<ObjectKey> for ReconcileRequest {
    fn from(key: ObjectKey) -> Self {
        Self { key }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Done,
    RequeueImmediate,
    Error(ErrorKind),
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Done => "done",
            ReconcileOutcome::RequeueImmediate => "requeue",
            ReconcileOutcome::Error(ErrorKind::PolicyViolation { .. }) => "policy_violation",
            ReconcileOutcome::Error(ErrorKind::WriteFailure(_)) => "write_failure",
            ReconcileOutcome::Error(ErrorKind::FetchFailure(_)) => "fetch_failure",
            ReconcileOutcome::Error(ErrorKind::OwnershipConflict(_)) => "ownership_conflict",
        }
    }
}
