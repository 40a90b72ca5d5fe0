//! Plan command - predict per-node outcomes against the recorded state
//!
//! Predicts the in-cluster apply: cloud-side nodes show as `external` once
//! their outputs have been imported.

use std::path::PathBuf;

use clap::Args;

use trellis_infra::apply::{ApplyReport, DryRunProvider, NodeOutcome};
use trellis_infra::{Applier, ApplyState};

use super::DEFAULT_STATE_FILE;
use crate::{Cli, Result};

/// Plan command arguments
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Apply state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

fn label(outcome: NodeOutcome) -> &'static str {
    match outcome {
        NodeOutcome::Created => "create",
        NodeOutcome::Updated => "update",
        NodeOutcome::Unchanged => "unchanged",
        NodeOutcome::External => "external",
        NodeOutcome::Orphaned => "orphaned",
    }
}

/// One line per node, then a summary line
pub fn format_report(report: &ApplyReport) -> String {
    let mut lines: Vec<String> = report
        .nodes
        .iter()
        .map(|n| format!("{:<10} {}", label(n.outcome), n.id))
        .collect();
    lines.push(format!(
        "{} to create, {} to update, {} unchanged, {} external, {} orphaned",
        report.count(NodeOutcome::Created),
        report.count(NodeOutcome::Updated),
        report.count(NodeOutcome::Unchanged),
        report.count(NodeOutcome::External),
        report.count(NodeOutcome::Orphaned),
    ));
    lines.join("\n")
}

/// Run the plan command
pub fn run(cli: &Cli, args: &PlanArgs) -> Result<()> {
    let template = super::synthesize(cli)?;
    let state = ApplyState::load(&args.state)?;
    let provider = DryRunProvider::new().in_cluster_only();
    let report = Applier::new(provider).plan(&template, &state)?;
    let rendered = if args.json {
        serde_json::to_string_pretty(&report)?
    } else {
        format_report(&report)
    };
    super::emit(&rendered, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_common::NodeId;
    use trellis_infra::apply::NodeReport;

    #[test]
    fn report_lists_each_node_and_totals() {
        let report = ApplyReport {
            nodes: vec![
                NodeReport {
                    id: NodeId::from("network/vpc"),
                    outcome: NodeOutcome::Unchanged,
                },
                NodeReport {
                    id: NodeId::from("storage/tenantc/bucket"),
                    outcome: NodeOutcome::Created,
                },
                NodeReport {
                    id: NodeId::from("cluster/control-plane"),
                    outcome: NodeOutcome::External,
                },
            ],
        };
        let text = format_report(&report);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "unchanged  network/vpc");
        assert_eq!(lines[1], "create     storage/tenantc/bucket");
        assert_eq!(lines[2], "external   cluster/control-plane");
        assert_eq!(
            lines[3],
            "1 to create, 0 to update, 1 unchanged, 1 external, 0 orphaned"
        );
    }
}
