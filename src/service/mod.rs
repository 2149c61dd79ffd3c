pub mod dispatcher;
pub mod kube_store;
pub mod memory_store;
pub mod observer;
pub mod plan_svc;
pub mod reconciler_svc;
pub mod store;
pub mod synthesizer;
pub mod work_queue;
