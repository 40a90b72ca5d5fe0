//! Apply command - run the engine and persist state
//!
//! Without `--dry-run`, cloud-side nodes must already carry the deployment
//! engine's outputs (`trellis import`); only in-cluster nodes are applied.
//! `--dry-run` walks the whole template with fabricated outputs and never
//! writes the state back.

use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use trellis_common::kube_utils::create_client;
use trellis_infra::apply::{ApplyReport, DryRunProvider, KubeProvider, ResourceProvider};
use trellis_infra::{Applier, ApplyState, Template};

use super::plan::format_report;
use super::DEFAULT_STATE_FILE;
use crate::{Cli, Result};

/// Apply command arguments
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Apply state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,

    /// Use fabricated outputs and leave the state file untouched
    #[arg(long)]
    pub dry_run: bool,

    /// Kubeconfig of the target cluster (defaults to the inferred config)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
}

/// Run the apply command
pub async fn run(cli: &Cli, args: &ApplyArgs) -> Result<()> {
    let template = super::synthesize(cli)?;
    let mut state = ApplyState::load(&args.state)?;

    if args.dry_run {
        let report = apply_with(DryRunProvider::new(), &template, &mut state).await?;
        super::emit(&format_report(&report), None)?;
        info!("dry run, state not written");
        return Ok(());
    }

    let client = create_client(args.kubeconfig.as_deref()).await?;
    let result = apply_with(KubeProvider::new(client), &template, &mut state).await;

    // Nodes applied before a failure stay recorded.
    state.save(&args.state)?;
    let report = result?;
    super::emit(&format_report(&report), None)
}

async fn apply_with<P: ResourceProvider>(
    provider: P,
    template: &Template,
    state: &mut ApplyState,
) -> Result<ApplyReport> {
    let applier = Applier::new(provider);
    match applier.apply(template, state).await {
        Ok(report) => Ok(report),
        Err(failure) => {
            warn!(
                node = ?failure.node,
                applied = failure.report.nodes.len(),
                "apply failed"
            );
            Err(failure.into())
        }
    }
}
