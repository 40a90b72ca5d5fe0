//! Endpoint command - print the ingress load balancer hostname

use std::path::PathBuf;

use clap::Args;

use trellis_common::kube_utils::create_client;
use trellis_infra::apply::KubeProvider;
use trellis_infra::mesh::gateway::{load_balancer_output, HOSTNAME_TIMEOUT_SECS};

use crate::Result;

/// Endpoint command arguments
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Kubeconfig of the target cluster (defaults to the inferred config)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = HOSTNAME_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

/// Run the endpoint command
pub async fn run(args: &EndpointArgs) -> Result<()> {
    let client = create_client(args.kubeconfig.as_deref()).await?;
    let output = load_balancer_output();
    let spec = trellis_common::resource::OutputSpec {
        timeout_seconds: args.timeout_secs,
        ..output
    };
    let hostname = KubeProvider::new(client)
        .read_output(&spec.export_name, &spec)
        .await?;
    println!("{}", hostname);
    Ok(())
}
