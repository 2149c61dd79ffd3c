use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use lazy_static::lazy_static;
use regex::Regex;

use crate::model::spec::{DemoDeployment, GROUP, KIND, VERSION};

pub static LABEL_APP: &str = "app";
pub static LABEL_NAMESPACE: &str = "namespace";
pub static LABEL_CONTROLLER: &str = "controller";
pub static LABEL_INSTANCE: &str = "instance";

const LABEL_VALUE_MAX_LEN: usize = 63;

lazy_static! {
    static ref LABEL_VALUE_INVALID_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
}

/// Renders an arbitrary string as a valid label value: disallowed characters
/// become `-`, edges are trimmed to alphanumerics, length is capped at 63.
pub fn label_value(raw: &str) -> String {
    let replaced = LABEL_VALUE_INVALID_CHARS.replace_all(raw, "-");
    let truncated = replaced.chars().take(LABEL_VALUE_MAX_LEN).collect::<String>();
    truncated
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Labels shared by a generated Deployment and its pods.
pub fn child_labels(managed: &DemoDeployment, controller_tag: &str) -> BTreeMap<String, String> {
    let mut labels = pod_selector(managed, controller_tag);
    labels.insert(String::from(LABEL_APP), label_value(&managed.spec.image));
    labels.insert(String::from(LABEL_NAMESPACE), managed.namespace().unwrap_or_default());
    labels
}

/// The Deployment's pod selector. A selector is immutable once the Deployment
/// exists, so it only carries keys that stay fixed for the owner's lifetime.
pub fn pod_selector(managed: &DemoDeployment, controller_tag: &str) -> BTreeMap<String, String> {
    [
        (String::from(LABEL_CONTROLLER), String::from(controller_tag)),
        (String::from(LABEL_INSTANCE), label_value(&managed.name_any())),
    ]
        .into_iter()
        .collect()
}

/// The subset of [`child_labels`] used to correlate children of a DemoDeployment.
pub fn child_selector(managed: &DemoDeployment, controller_tag: &str) -> BTreeMap<String, String> {
    child_labels(managed, controller_tag)
        .into_iter()
        .filter(|(k, _)| k == LABEL_APP || k == LABEL_CONTROLLER)
        .collect()
}

/// Selector rendered the way `kubectl` and the scale subresource expect it.
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn owner_reference(managed: &DemoDeployment) -> OwnerReference {
    OwnerReference {
        api_version: format!("{GROUP}/{VERSION}"),
        kind: String::from(KIND),
        name: managed.name_any(),
        uid: managed.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Maps a DemoDeployment to the full desired definition of its Deployment.
pub fn synthesize(managed: &DemoDeployment, controller_tag: &str) -> Deployment {
    let name = managed.name_any();
    let labels = child_labels(managed, controller_tag);
    let template = managed.spec.template.clone().unwrap_or_default();

    let pod_labels = template.labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .chain(labels.clone())
        .collect::<BTreeMap<_, _>>();

    let non_empty = |v: &Vec<String>| if v.is_empty() { None } else { Some(v.clone()) };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: managed.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(managed)]),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(managed.spec.replicas),
            selector: LabelSelector {
                match_expressions: None,
                match_labels: Some(pod_selector(managed, controller_tag)),
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name,
                        image: Some(managed.spec.image.clone()),
                        command: non_empty(&template.command),
                        args: non_empty(&template.args),
                        env: if template.env.is_empty() { None } else { Some(template.env.iter().map(From::from).collect()) },
                        ports: if template.ports.is_empty() { None } else { Some(template.ports.iter().map(From::from).collect()) },
                        image_pull_policy: template.image_pull_policy.clone(),
                        resources: template.resources.as_ref().map(From::from),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Whether `child` is controlled by `managed`, matched by uid when both carry one.
pub fn is_controlled_by(child: &Deployment, managed: &DemoDeployment) -> bool {
    let expected = owner_reference(managed);
    child.owner_references()
        .iter()
        .filter(|oref| oref.controller.unwrap_or(false))
        .any(|oref| oref.kind == expected.kind
            && oref.api_version == expected.api_version
            && oref.name == expected.name
            && (oref.uid.is_empty() || expected.uid.is_empty() || oref.uid == expected.uid))
}

/// Whether the fields the synthesizer owns already match on `current`.
pub fn is_converged(current: &Deployment, desired: &Deployment) -> bool {
    let (Some(current_spec), Some(desired_spec)) = (&current.spec, &desired.spec) else {
        return false;
    };
    let desired_labels = desired.labels();
    let labels_present = desired_labels.iter()
        .all(|(k, v)| current.labels().get(k).map(|cv| cv == v).unwrap_or(false));

    current_spec.replicas == desired_spec.replicas
        && current_spec.selector == desired_spec.selector
        && current_spec.template == desired_spec.template
        && labels_present
        && current.owner_references() == desired.owner_references()
}

/// Applies the synthesized fields onto an existing Deployment, keeping its
/// server-side metadata (resource version, uid, annotations).
pub fn merge_into(current: &Deployment, desired: &Deployment) -> Deployment {
    let mut merged = current.clone();
    let labels = merged.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(desired.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.metadata.owner_references = desired.metadata.owner_references.clone();
    merged.spec = match (merged.spec.take(), &desired.spec) {
        (Some(current_spec), Some(desired_spec)) => Some(DeploymentSpec {
            replicas: desired_spec.replicas,
            selector: desired_spec.selector.clone(),
            template: desired_spec.template.clone(),
            ..current_spec
        }),
        (_, desired_spec) => desired_spec.clone(),
    };
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::{DemoDeploymentSpec, EnvSpec, PodTemplate};

    fn demo(image: &str, replicas: i32) -> DemoDeployment {
        let mut dd = DemoDeployment::new("web", DemoDeploymentSpec {
            image: String::from(image),
            replicas,
            template: None,
        });
        dd.metadata.namespace = Some(String::from("team-a"));
        dd.metadata.uid = Some(String::from("uid-1"));
        dd
    }

    #[test]
    fn label_value_sanitizes_image_references() {
        assert_eq!(label_value("nginx"), "nginx");
        assert_eq!(label_value("nginx:latest"), "nginx-latest");
        assert_eq!(label_value("registry.local:5000/team/app:1.2"), "registry.local-5000-team-app-1.2");
        assert_eq!(label_value("-weird-"), "weird");
        assert!(label_value(&"a".repeat(100)).len() <= 63);
    }

    #[test]
    fn synthesizes_labels_owner_and_container() {
        let dd = demo("nginx:latest", 2);
        let child = synthesize(&dd, "ctl");

        assert_eq!(child.metadata.name.as_deref(), Some("web"));
        assert_eq!(child.metadata.namespace.as_deref(), Some("team-a"));
        let labels = child.labels();
        assert_eq!(labels.get("app").map(String::as_str), Some("nginx-latest"));
        assert_eq!(labels.get("namespace").map(String::as_str), Some("team-a"));
        assert_eq!(labels.get("controller").map(String::as_str), Some("ctl"));
        assert_eq!(labels.get("instance").map(String::as_str), Some("web"));

        let oref = &child.owner_references()[0];
        assert_eq!(oref.api_version, "scale.mstrielnikov/v1");
        assert_eq!(oref.kind, "DemoDeployment");
        assert_eq!(oref.name, "web");
        assert_eq!(oref.uid, "uid-1");
        assert_eq!(oref.controller, Some(true));

        let spec = child.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(2));
        let selector = spec.selector.match_labels.as_ref().unwrap();
        assert_eq!(selector_string(selector), "controller=ctl,instance=web");
        let pod_labels = spec.template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert!(selector.iter().all(|(k, v)| pod_labels.get(k) == Some(v)));
        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image.as_deref(), Some("nginx:latest"));
        assert!(container.env.is_none());
    }

    #[test]
    fn synthesis_is_deterministic() {
        let dd = demo("nginx", 1);
        assert_eq!(synthesize(&dd, "ctl"), synthesize(&dd, "ctl"));
    }

    #[test]
    fn controller_labels_override_template_labels() {
        let mut dd = demo("nginx", 1);
        dd.spec.template = Some(PodTemplate {
            labels: [(String::from("app"), String::from("mine")), (String::from("tier"), String::from("web"))]
                .into_iter()
                .collect(),
            env: vec![EnvSpec { name: String::from("MODE"), value: String::from("demo") }],
            ..Default::default()
        });
        let child = synthesize(&dd, "ctl");
        let template = &child.spec.as_ref().unwrap().template;
        let pod_labels = template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(pod_labels.get("app").map(String::as_str), Some("nginx"));
        assert_eq!(pod_labels.get("tier").map(String::as_str), Some("web"));
        let env = template.spec.as_ref().unwrap().containers[0].env.as_ref().unwrap();
        assert_eq!(env[0].name, "MODE");
    }

    #[test]
    fn selector_keeps_app_and_controller_only() {
        let selector = child_selector(&demo("nginx", 1), "ctl");
        assert_eq!(selector_string(&selector), "app=nginx,controller=ctl");
    }

    #[test]
    fn pod_selector_survives_image_change() {
        let before = synthesize(&demo("nginx:1.25", 1), "ctl");
        let after = synthesize(&demo("nginx:1.26", 1), "ctl");
        assert_eq!(before.spec.as_ref().unwrap().selector, after.spec.as_ref().unwrap().selector);
        assert_ne!(before.labels().get("app"), after.labels().get("app"));
    }

    #[test]
    fn pod_selector_is_distinct_per_owner() {
        let web = demo("nginx", 1);
        let mut admin = demo("nginx", 1);
        admin.metadata.name = Some(String::from("admin"));
        assert_ne!(pod_selector(&web, "ctl"), pod_selector(&admin, "ctl"));
        assert_eq!(child_selector(&web, "ctl"), child_selector(&admin, "ctl"));
    }

    #[test]
    fn drift_is_detected_and_repaired_by_merge() {
        let desired = synthesize(&demo("nginx", 2), "ctl");
        let mut current = desired.clone();
        current.metadata.resource_version = Some(String::from("7"));
        assert!(is_converged(&current, &desired));

        current.spec.as_mut().unwrap().replicas = Some(5);
        assert!(!is_converged(&current, &desired));

        let merged = merge_into(&current, &desired);
        assert!(is_converged(&merged, &desired));
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn ownership_matches_by_uid() {
        let dd = demo("nginx", 1);
        let child = synthesize(&dd, "ctl");
        assert!(is_controlled_by(&child, &dd));

        let mut other = demo("nginx", 1);
        other.metadata.uid = Some(String::from("uid-2"));
        assert!(!is_controlled_by(&child, &other));
    }
}
