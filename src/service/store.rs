use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;

use crate::core::error::StoreError;
use crate::model::request::ObjectKey;
use crate::model::spec::DemoDeployment;

/// Typed access to the platform object store, as seen by the reconciler.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<DemoDeployment, StoreError>;

    async fn create(&self, child: &Deployment) -> Result<Deployment, StoreError>;

    /// Writes back a DemoDeployment, guarded by its resource version.
    async fn update(&self, managed: &DemoDeployment) -> Result<DemoDeployment, StoreError>;

    async fn list(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<Deployment>, StoreError>;

    async fn get_child(&self, key: &ObjectKey) -> Result<Deployment, StoreError>;

    /// Replaces an existing Deployment, guarded by its resource version.
    async fn replace_child(&self, child: &Deployment) -> Result<Deployment, StoreError>;
}
