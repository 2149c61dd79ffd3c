use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use demodeployment_operator::core::config::DEFAULT_CONFIG_PATH;

/// Kubernetes operator converging DemoDeployment resources into Deployments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct OperatorArgs {
    /// Configuration file, extension optional
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
    #[clap(subcommand)]
    pub subcommand: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller together with the admission webhook and metrics server
    Run,
    /// Print the DemoDeployment CustomResourceDefinition as YAML
    Crd,
    /// Converge manifests against an in-memory cluster and print the resulting Deployments
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[arg(short, long)]
    pub file: PathBuf,
}
