use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ContainerPort, EnvVar, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "scale.mstrielnikov";
pub const VERSION: &str = "v1";
pub const KIND: &str = "DemoDeployment";

/// Spec object for DemoDeployment
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(group = "scale.mstrielnikov", version = "v1", kind = "DemoDeployment", namespaced)]
#[kube(status = "DemoDeploymentStatus", shortname = "dd", derive = "PartialEq")]
#[kube(scale = r#"{"specReplicasPath":".spec.replicas", "statusReplicasPath":".status.replicas", "labelSelectorPath":".status.selector"}"#)]
#[kube(printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#)]
#[kube(printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#)]
#[serde(rename_all = "camelCase")]
pub struct DemoDeploymentSpec {
    pub image: String,
    #[schemars(range(min = 0))]
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplate>,
}

/// Optional pod template knobs copied onto the generated container.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct EnvSpec {
    pub name: String,
    pub value: String,
}

impl From<&EnvSpec> for EnvVar {
    fn from(value: &EnvSpec) -> Self {
        Self {
            name: value.name.clone(),
            value: Some(value.value.clone()),
            value_from: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub container_port: i32,
}

impl From<&PortSpec> for ContainerPort {
    fn from(value: &PortSpec) -> Self {
        Self {
            name: value.name.clone(),
            container_port: value.container_port,
            ..Default::default()
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ResourcesSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceConstraints>,
}

impl From<&ResourcesSpec> for ResourceRequirements {
    fn from(value: &ResourcesSpec) -> Self {
        Self {
            limits: value.limits.as_ref().map(ResourceConstraints::quantities),
            requests: value.requests.as_ref().map(ResourceConstraints::quantities),
            ..Default::default()
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ResourceConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceConstraints {
    fn quantities(&self) -> BTreeMap<String, Quantity> {
        [
            (String::from("cpu"), self.cpu.clone().map(Quantity)),
            (String::from("memory"), self.memory.clone().map(Quantity)),
        ]
            .into_iter()
            .flat_map(|(k, maybe_v)| maybe_v.map(|v| (k, v)))
            .collect()
    }
}

/// Status object for DemoDeployment
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DemoDeploymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[cfg(test)]
mod tests {
    use kube::CustomResourceExt;

    use super::*;

    #[test]
    fn crd_exposes_scale_and_status_subresources() {
        let crd = DemoDeployment::crd();
        assert_eq!(crd.spec.group, GROUP);
        assert_eq!(crd.spec.names.kind, KIND);

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, VERSION);
        let subresources = version.subresources.as_ref().expect("subresources");
        assert!(subresources.status.is_some());
        let scale = subresources.scale.as_ref().expect("scale subresource");
        assert_eq!(scale.spec_replicas_path, ".spec.replicas");
        assert_eq!(scale.label_selector_path.as_deref(), Some(".status.selector"));
    }

    #[test]
    fn resources_spec_skips_missing_quantities() {
        let spec = ResourcesSpec {
            limits: Some(ResourceConstraints { cpu: Some(String::from("20m")), memory: None }),
            requests: None,
        };
        let requirements = ResourceRequirements::from(&spec);
        let limits = requirements.limits.expect("limits");
        assert_eq!(limits.len(), 1);
        assert_eq!(limits.get("cpu"), Some(&Quantity(String::from("20m"))));
        assert!(requirements.requests.is_none());
    }

    #[test]
    fn spec_deserializes_without_template() {
        let spec: DemoDeploymentSpec = serde_json::from_str(r#"{"image":"nginx:latest","replicas":2}"#)
            .expect("valid spec");
        assert_eq!(spec.replicas, 2);
        assert!(spec.template.is_none());
    }
}
