//! Import command - record the deployment engine's outputs in the apply state
//!
//! The outputs file maps node ids to attribute values, JSON or YAML by
//! extension:
//!
//! ```json
//! { "network/vpc": { "vpcId": "vpc-0abc", "privateSubnetIds": "subnet-1,subnet-2" } }
//! ```
//!
//! Nothing is written unless every entry is accepted.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use trellis_infra::apply::EngineOutputs;
use trellis_infra::ApplyState;

use super::DEFAULT_STATE_FILE;
use crate::{Cli, Result};

/// Import command arguments
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Outputs reported by the deployment engine
    #[arg(long)]
    pub outputs: PathBuf,

    /// Apply state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,
}

/// Read an outputs file
pub fn load_outputs(path: &Path) -> Result<EngineOutputs> {
    let raw = std::fs::read_to_string(path)?;
    let outputs = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
        _ => serde_json::from_str(&raw)?,
    };
    Ok(outputs)
}

/// Run the import command
pub fn run(cli: &Cli, args: &ImportArgs) -> Result<()> {
    let template = super::synthesize(cli)?;
    let outputs = load_outputs(&args.outputs)?;
    let mut state = ApplyState::load(&args.state)?;

    let imported = state.import_outputs(&template, outputs)?;
    state.save(&args.state)?;
    info!(
        imported = imported.len(),
        state = %args.state.display(),
        "deployment engine outputs imported"
    );
    Ok(())
}
