//! CLI commands

use std::path::Path;

use tracing::info;

use trellis_infra::{Stack, Template};

use crate::{Cli, Result};

pub mod apply;
pub mod endpoint;
pub mod import;
pub mod plan;
pub mod synth;

/// Default location of the apply state
pub const DEFAULT_STATE_FILE: &str = "trellis-state.json";

/// Load inputs from the global flags and synthesize the template
pub fn synthesize(cli: &Cli) -> Result<Template> {
    let config = cli.load_config()?;
    let deployment = cli.deployment()?;
    let template = Stack::synthesize(&config, &deployment)?;
    info!(
        deployment_id = %template.deployment_id,
        nodes = template.nodes.len(),
        "synthesized"
    );
    Ok(template)
}

/// Write `contents` to `out`, or stdout when `out` is `None`
pub fn emit(contents: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, contents)?;
            info!(path = %path.display(), "written");
        }
        None => println!("{}", contents),
    }
    Ok(())
}
