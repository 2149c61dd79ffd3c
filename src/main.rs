use std::fs;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::{StreamExt, TryFutureExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Controller;
use kube::runtime::watcher::Config;
use kube::{Api, Client, CustomResourceExt};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::try_join;

use demodeployment_operator::core::config::OperatorConfig;
use demodeployment_operator::http::build_router;
use demodeployment_operator::model::context::ContextData;
use demodeployment_operator::model::spec::DemoDeployment;
use demodeployment_operator::policy::error::error_policy;
use demodeployment_operator::policy::reconciliation::reconcile;
use demodeployment_operator::service::kube_store::KubeStore;
use demodeployment_operator::service::observer::{LogObserver, RECONCILE_DURATION_METRIC_NAME};
use demodeployment_operator::service::plan_svc::{parse_manifests, plan};
use demodeployment_operator::service::reconciler_svc::Reconciler;
use demodeployment_operator::state::OperatorState;

use crate::cli::{Commands, OperatorArgs, PlanArgs};

mod cli;

fn setup_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    const RECONCILE_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(String::from(RECONCILE_DURATION_METRIC_NAME)),
            RECONCILE_SECONDS,
        )?
        .install_recorder()?;
    Ok(handle)
}

async fn run_controller(app_config: OperatorConfig) -> anyhow::Result<()> {
    let kubernetes_client = Client::try_default().await
        .context("Error connecting to the kubernetes cluster")?;

    let context = Arc::new(ContextData {
        reconciler: Reconciler::new(
            Arc::new(KubeStore::new(kubernetes_client.clone())),
            &app_config,
            Arc::new(LogObserver),
        ),
        config: app_config,
    });

    let crd_api = Api::<DemoDeployment>::all(kubernetes_client.clone());
    let deployment_api = Api::<Deployment>::all(kubernetes_client);

    Controller::new(crd_api, Config::default())
        .owns(deployment_api, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok((object, action)) => {
                    log::debug!("Reconciliation of {} successful - {action:?}", object.name);
                }
                Err(reconciliation_err) => {
                    log::warn!("Reconciliation error - {reconciliation_err}");
                }
            }
        })
        .await;

    Ok(())
}

async fn run(app_config: OperatorConfig) -> anyhow::Result<()> {
    let recorder_handle = setup_metrics_recorder()?;
    let address = app_config.address;
    let app = build_router(OperatorState::build(&app_config, Some(recorder_handle)));

    log::info!("Serving admission webhook and metrics on {address}");
    try_join!(
        axum::Server::bind(&address)
            .serve(app.into_make_service())
            .map_err(anyhow::Error::from),
        run_controller(app_config),
    )?;
    Ok(())
}

fn print_crd() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&DemoDeployment::crd())
        .context("Error serializing CustomResourceDefinition")?;
    print!("{crd}");
    Ok(())
}

async fn run_plan(app_config: OperatorConfig, args: PlanArgs) -> anyhow::Result<()> {
    let manifests = fs::read_to_string(&args.file)
        .with_context(|| format!("Error reading {}", args.file.display()))?;
    let manifests = parse_manifests(&manifests)
        .with_context(|| format!("Error parsing manifests in {}", args.file.display()))?;

    let entries = plan(manifests, &app_config, Arc::new(LogObserver)).await;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = OperatorArgs::parse();
    let app_config = OperatorConfig::load(&args.config)
        .context("Error loading configuration")?;

    match args.subcommand {
        Commands::Run => run(app_config).await,
        Commands::Crd => print_crd(),
        Commands::Plan(plan_args) => run_plan(app_config, plan_args).await,
    }
}
