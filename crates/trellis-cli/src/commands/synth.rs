//! Synth command - emit the template

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use trellis_infra::Template;

use crate::{Cli, Result};

/// Template encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

/// Synth command arguments
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Output encoding
    #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
    pub format: TemplateFormat,

    /// Write to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Render a template in `format`
pub fn render(template: &Template, format: TemplateFormat) -> Result<String> {
    Ok(match format {
        TemplateFormat::Json => serde_json::to_string_pretty(template)?,
        TemplateFormat::Yaml => serde_yaml::to_string(template)?,
    })
}

/// Run the synth command
pub fn run(cli: &Cli, args: &SynthArgs) -> Result<()> {
    let template = super::synthesize(cli)?;
    let rendered = render(&template, args.format)?;
    super::emit(&rendered, args.out.as_deref())
}
