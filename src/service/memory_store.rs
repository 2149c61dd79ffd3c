use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use crate::core::error::StoreError;
use crate::model::request::ObjectKey;
use crate::model::spec::DemoDeployment;
use crate::policy::admission::AdmissionGate;
use crate::service::store::ResourceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    List,
    GetChild,
    ReplaceChild,
}

impl StoreOp {
    pub fn is_mutating(&self) -> bool {
        matches!(self, StoreOp::Create | StoreOp::Update | StoreOp::ReplaceChild)
    }
}

/// Process-local object store with resource versions, admission on managed
/// writes and owner-based cascade on delete.
#[derive(Clone)]
pub struct InMemoryStore {
    gate: AdmissionGate,
    managed: Arc<DashMap<ObjectKey, DemoDeployment>>,
    children: Arc<DashMap<ObjectKey, Deployment>>,
    faults: Arc<DashMap<StoreOp, StoreError>>,
    calls: Arc<DashMap<StoreOp, usize>>,
    writes: Arc<AtomicU64>,
    revision: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new(gate: AdmissionGate) -> Self {
        Self {
            gate,
            managed: Arc::new(DashMap::new()),
            children: Arc::new(DashMap::new()),
            faults: Arc::new(DashMap::new()),
            calls: Arc::new(DashMap::new()),
            writes: Arc::new(AtomicU64::new(0)),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record(&self, op: StoreOp) -> Result<(), StoreError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.faults.remove(&op) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn key_of<K: ResourceExt>(obj: &K) -> Result<ObjectKey, StoreError> {
        ObjectKey::of(obj).ok_or_else(|| StoreError::Other(String::from("object has no namespaced name")))
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.faults.insert(op, err);
    }

    /// Number of calls made for `op`, failed ones included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.get(&op).map(|count| *count).unwrap_or(0)
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls.iter()
            .filter(|entry| entry.key().is_mutating())
            .map(|entry| *entry.value())
            .sum()
    }

    /// Number of writes the store actually persisted through the reconciler-facing interface.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Creates or updates a DemoDeployment the way a user would, through the admission gate.
    /// The stored status is kept; the generation is bumped when the spec changes.
    pub fn apply_managed(&self, mut obj: DemoDeployment) -> Result<DemoDeployment, StoreError> {
        let key = Self::key_of(&obj)?;
        match self.managed.entry(key) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                self.gate.validate_update(Some(&current.spec), &obj.spec)
                    .map_err(|err| StoreError::Rejected(err.to_string()))?;
                let generation = current.metadata.generation.unwrap_or(1);
                obj.metadata.generation = Some(if current.spec == obj.spec { generation } else { generation + 1 });
                obj.metadata.uid = current.metadata.uid.clone();
                obj.metadata.resource_version = Some(self.next_revision());
                obj.status = current.status.clone();
                occupied.insert(obj.clone());
                Ok(obj)
            }
            Entry::Vacant(vacant) => {
                self.gate.validate_create(&obj.spec)
                    .map_err(|err| StoreError::Rejected(err.to_string()))?;
                obj.metadata.generation = Some(1);
                obj.metadata.uid = Some(format!("uid-{}", vacant.key()));
                obj.metadata.resource_version = Some(self.next_revision());
                vacant.insert(obj.clone());
                Ok(obj)
            }
        }
    }

    /// Deletes a DemoDeployment and every Deployment it controls.
    pub fn delete_managed(&self, key: &ObjectKey) -> Option<DemoDeployment> {
        let (_, removed) = self.managed.remove(key)?;
        let uid = removed.uid();
        self.children.retain(|_, child| {
            !child.owner_references().iter()
                .any(|oref| oref.controller.unwrap_or(false) && Some(&oref.uid) == uid.as_ref())
        });
        Some(removed)
    }

    /// Mutates a stored Deployment out of band, as another actor would.
    pub fn modify_child<F: FnOnce(&mut Deployment)>(&self, key: &ObjectKey, modify: F) -> bool {
        match self.children.get_mut(key) {
            Some(mut child) => {
                modify(child.value_mut());
                child.metadata.resource_version = Some(self.next_revision());
                true
            }
            None => false,
        }
    }

    /// Inserts a Deployment out of band, overwriting any existing one.
    pub fn insert_child(&self, mut child: Deployment) -> Result<Deployment, StoreError> {
        let key = Self::key_of(&child)?;
        child.metadata.resource_version = Some(self.next_revision());
        self.children.insert(key, child.clone());
        Ok(child)
    }

    pub fn managed(&self, key: &ObjectKey) -> Option<DemoDeployment> {
        self.managed.get(key).map(|obj| obj.clone())
    }

    pub fn child(&self, key: &ObjectKey) -> Option<Deployment> {
        self.children.get(key).map(|child| child.clone())
    }

    pub fn children(&self) -> Vec<Deployment> {
        let mut children = self.children.iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Vec<_>>();
        children.sort_by(|(a, _), (b, _)| a.cmp(b));
        children.into_iter().map(|(_, child)| child).collect()
    }
}

fn matches_selector(child: &Deployment, selector: &BTreeMap<String, String>) -> bool {
    let labels = child.labels();
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<DemoDeployment, StoreError> {
        self.record(StoreOp::Get)?;
        self.managed(key).ok_or_else(|| StoreError::NotFound(format!("demodeployment {key}")))
    }

    async fn create(&self, child: &Deployment) -> Result<Deployment, StoreError> {
        self.record(StoreOp::Create)?;
        let key = Self::key_of(child)?;
        match self.children.entry(key) {
            Entry::Occupied(occupied) => Err(StoreError::AlreadyExists(format!("deployment {}", occupied.key()))),
            Entry::Vacant(vacant) => {
                let mut created = child.clone();
                created.metadata.uid = Some(format!("uid-deployment-{}", vacant.key()));
                created.metadata.resource_version = Some(self.next_revision());
                vacant.insert(created.clone());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(created)
            }
        }
    }

    async fn update(&self, managed: &DemoDeployment) -> Result<DemoDeployment, StoreError> {
        self.record(StoreOp::Update)?;
        let key = Self::key_of(managed)?;
        let mut current = self.managed
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("demodeployment {key}")))?;
        if managed.resource_version().is_some() && managed.resource_version() != current.resource_version() {
            return Err(StoreError::Conflict(format!("demodeployment {key} was modified concurrently")));
        }
        current.status = managed.status.clone();
        current.metadata.resource_version = Some(self.next_revision());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(current.clone())
    }

    async fn list(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<Deployment>, StoreError> {
        self.record(StoreOp::List)?;
        Ok(self.children()
            .into_iter()
            .filter(|child| child.namespace().as_deref() == Some(namespace))
            .filter(|child| matches_selector(child, selector))
            .collect())
    }

    async fn get_child(&self, key: &ObjectKey) -> Result<Deployment, StoreError> {
        self.record(StoreOp::GetChild)?;
        self.child(key).ok_or_else(|| StoreError::NotFound(format!("deployment {key}")))
    }

    async fn replace_child(&self, child: &Deployment) -> Result<Deployment, StoreError> {
        self.record(StoreOp::ReplaceChild)?;
        let key = Self::key_of(child)?;
        let mut current = self.children
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("deployment {key}")))?;
        if child.resource_version().is_some() && child.resource_version() != current.resource_version() {
            return Err(StoreError::Conflict(format!("deployment {key} was modified concurrently")));
        }
        let selector_of = |deployment: &Deployment| deployment.spec.as_ref().map(|spec| spec.selector.clone());
        if selector_of(child) != selector_of(&*current) {
            return Err(StoreError::Other(format!("deployment {key} is invalid: spec.selector: field is immutable")));
        }
        let mut replaced = child.clone();
        replaced.metadata.uid = current.metadata.uid.clone();
        replaced.metadata.resource_version = Some(self.next_revision());
        *current = replaced.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::DemoDeploymentSpec;
    use crate::service::synthesizer::synthesize;

    fn demo(replicas: i32) -> DemoDeployment {
        let mut dd = DemoDeployment::new("web", DemoDeploymentSpec {
            image: String::from("nginx"),
            replicas,
            template: None,
        });
        dd.metadata.namespace = Some(String::from("default"));
        dd
    }

    #[test]
    fn apply_runs_admission_and_bumps_generation() {
        let store = InMemoryStore::new(AdmissionGate::new(2));
        let created = store.apply_managed(demo(1)).expect("admitted");
        assert_eq!(created.metadata.generation, Some(1));
        assert!(created.uid().is_some());

        let unchanged = store.apply_managed(demo(1)).expect("admitted");
        assert_eq!(unchanged.metadata.generation, Some(1));

        let scaled = store.apply_managed(demo(2)).expect("admitted");
        assert_eq!(scaled.metadata.generation, Some(2));

        let rejected = store.apply_managed(demo(3));
        assert!(matches!(rejected, Err(StoreError::Rejected(_))));
        assert_eq!(store.managed(&ObjectKey::new("default", "web")).unwrap().spec.replicas, 2);
    }

    #[tokio::test]
    async fn update_is_guarded_by_resource_version() {
        let store = InMemoryStore::new(AdmissionGate::new(2));
        let stored = store.apply_managed(demo(1)).unwrap();
        store.apply_managed(demo(2)).unwrap();

        let stale = store.update(&stored).await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let store = InMemoryStore::new(AdmissionGate::new(2));
        store.apply_managed(demo(1)).unwrap();
        store.fail_next(StoreOp::Get, StoreError::Other(String::from("boom")));

        let key = ObjectKey::new("default", "web");
        assert!(store.get(&key).await.is_err());
        assert!(store.get(&key).await.is_ok());
        assert_eq!(store.calls(StoreOp::Get), 2);
    }

    #[tokio::test]
    async fn replacing_child_selector_is_refused() {
        let store = InMemoryStore::new(AdmissionGate::new(2));
        let stored = store.insert_child(synthesize(&demo(1), "ctl")).unwrap();

        let mut moved = stored.clone();
        moved.spec.as_mut().unwrap().selector.match_labels = Some(
            [(String::from("app"), String::from("other"))].into_iter().collect(),
        );
        assert!(matches!(store.replace_child(&moved).await, Err(StoreError::Other(_))));

        let mut scaled = stored;
        scaled.spec.as_mut().unwrap().replicas = Some(2);
        assert!(store.replace_child(&scaled).await.is_ok());
        assert_eq!(store.writes(), 1);
    }
}
