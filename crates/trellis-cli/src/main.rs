//! Trellis CLI
//!
//! Synthesizes, plans and applies the multi-tenant provisioning stack.

use clap::Parser;

use trellis_cli::{Cli, Result};
use trellis_common::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;
    cli.run().await
}
