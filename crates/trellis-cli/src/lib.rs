//! Trellis CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trellis_common::config::DEFAULT_CONFIG_PATH;
use trellis_common::telemetry::LogFormat;
use trellis_common::{DeploymentContext, SystemConfig};

/// Trellis - multi-tenant EKS provisioning as an explicit resource graph
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON, or YAML by extension); defaults apply if absent
    #[arg(long, global = true, env = "TRELLIS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Context value, `key=value` (repeatable)
    #[arg(short = 'c', long = "context", global = true, value_parser = parse_context)]
    pub context: Vec<(String, String)>,

    /// Target AWS account id
    #[arg(long, global = true, env = "AWS_ACCOUNT_ID")]
    pub account: Option<String>,

    /// Target AWS region
    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Stack (deployment) name
    #[arg(long, global = true, default_value = "EksStack")]
    pub stack_name: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Emit the template
    Synth(commands::synth::SynthArgs),
    /// Show what an apply would do
    Plan(commands::plan::PlanArgs),
    /// Record the deployment engine's outputs in the apply state
    Import(commands::import::ImportArgs),
    /// Apply the template
    Apply(commands::apply::ApplyArgs),
    /// Wait for and print the ingress hostname
    Endpoint(commands::endpoint::EndpointArgs),
}

fn parse_context(arg: &str) -> std::result::Result<(String, String), String> {
    DeploymentContext::parse_value(arg).map_err(|e| e.to_string())
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match &self.command {
            Commands::Synth(args) => commands::synth::run(&self, args),
            Commands::Plan(args) => commands::plan::run(&self, args),
            Commands::Import(args) => commands::import::run(&self, args),
            Commands::Apply(args) => commands::apply::run(&self, args).await,
            Commands::Endpoint(args) => commands::endpoint::run(args).await,
        }
    }

    /// Load and validate the configuration file
    pub fn load_config(&self) -> Result<SystemConfig> {
        Ok(SystemConfig::load(&self.config)?)
    }

    /// Deployment context from the global flags
    pub fn deployment(&self) -> Result<DeploymentContext> {
        let account = self
            .account
            .as_deref()
            .ok_or_else(|| Error::validation("--account (or AWS_ACCOUNT_ID) is required"))?;
        let region = self
            .region
            .as_deref()
            .ok_or_else(|| Error::validation("--region (or AWS_REGION) is required"))?;
        let ctx = self.context.iter().fold(
            DeploymentContext::new(account, region, &self.stack_name),
            |ctx, (key, value)| ctx.with_value(key, value),
        );
        ctx.validate()?;
        Ok(ctx)
    }
}
