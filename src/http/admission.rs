use axum::extract::State;
use axum::Json;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::ResourceExt;

use crate::core::error::AdmissionError;
use crate::model::spec::DemoDeploymentSpec;
use crate::policy::admission::AdmissionGate;

fn decode_spec(obj: &DynamicObject) -> Result<DemoDeploymentSpec, String> {
    let spec = obj.data.get("spec")
        .cloned()
        .ok_or_else(|| format!("{} has no spec", obj.name_any()))?;
    serde_json::from_value(spec)
        .map_err(|err| format!("Malformed DemoDeployment spec - {err}"))
}

fn check(gate: &AdmissionGate, req: &AdmissionRequest<DynamicObject>) -> Result<(), String> {
    let new_spec = || req.object.as_ref()
        .ok_or_else(|| String::from("Missing object in admission request"))
        .and_then(decode_spec);
    let old_spec = req.old_object.as_ref().map(decode_spec).transpose()?;

    let verdict: Result<(), AdmissionError> = match req.operation {
        Operation::Create => gate.validate_create(&new_spec()?),
        Operation::Update => gate.validate_update(old_spec.as_ref(), &new_spec()?),
        Operation::Delete => gate.validate_delete(old_spec.as_ref()),
        Operation::Connect => Ok(()),
    };
    verdict.map_err(|err| err.to_string())
}

/// Admission verdict for a single request.
pub fn review(gate: &AdmissionGate, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let res = AdmissionResponse::from(req);
    match check(gate, req) {
        Ok(()) => {
            log::info!("Accepted {:?} on demo deployment {}", req.operation, req.name);
            res
        }
        Err(reason) => {
            log::warn!("Denied {:?} on demo deployment {} - {reason}", req.operation, req.name);
            res.deny(reason)
        }
    }
}

pub async fn validate_handler(
    State(gate): State<AdmissionGate>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            log::error!("Invalid admission review - {err}");
            return Json(AdmissionResponse::invalid(err.to_string()).into_review());
        }
    };
    Json(review(&gate, &req).into_review())
}
