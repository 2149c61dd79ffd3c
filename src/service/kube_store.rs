use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};

use crate::core::error::StoreError;
use crate::model::request::ObjectKey;
use crate::model::spec::DemoDeployment;
use crate::service::store::ResourceStore;
use crate::service::synthesizer::selector_string;

/// [`ResourceStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn demo_deployments(&self, namespace: &str) -> Api<DemoDeployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
    obj.namespace()
        .ok_or_else(|| StoreError::Other(format!("{} has no namespace", obj.name_any())))
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<DemoDeployment, StoreError> {
        Ok(self.demo_deployments(&key.namespace).get(&key.name).await?)
    }

    async fn create(&self, child: &Deployment) -> Result<Deployment, StoreError> {
        let namespace = namespace_of(child)?;
        Ok(self.deployments(&namespace).create(&PostParams::default(), child).await?)
    }

    async fn update(&self, managed: &DemoDeployment) -> Result<DemoDeployment, StoreError> {
        let namespace = namespace_of(managed)?;
        let body = serde_json::to_vec(managed)
            .map_err(|err| StoreError::Other(format!("Error serializing {} - {err}", managed.name_any())))?;
        Ok(self.demo_deployments(&namespace)
            .replace_status(&managed.name_any(), &PostParams::default(), body)
            .await?)
    }

    async fn list(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<Deployment>, StoreError> {
        let params = ListParams::default().labels(&selector_string(selector));
        Ok(self.deployments(namespace).list(&params).await?.items)
    }

    async fn get_child(&self, key: &ObjectKey) -> Result<Deployment, StoreError> {
        Ok(self.deployments(&key.namespace).get(&key.name).await?)
    }

    async fn replace_child(&self, child: &Deployment) -> Result<Deployment, StoreError> {
        let namespace = namespace_of(child)?;
        Ok(self.deployments(&namespace)
            .replace(&child.name_any(), &PostParams::default(), child)
            .await?)
    }
}
