//! CI build project definitions
//!
//! Projects are declared, not run. Their environment variable names are
//! consumed by external shell scripts and must not change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::iam::PolicyDocument;

/// Managed build image
pub const STANDARD_7_0_IMAGE: &str = "aws/codebuild/standard:7.0";

/// Where a variable's value comes from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    /// Literal value
    Plaintext,
    /// `secret-id:json-key` resolved by the runner at build time
    SecretsManager,
}

/// Build environment variable
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    /// Value source
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    /// Value or secret reference
    pub value: String,
}

impl EnvironmentVariable {
    /// Literal value
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Plaintext,
            value: value.into(),
        }
    }

    /// Secrets Manager reference
    pub fn secret(reference: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::SecretsManager,
            value: reference.into(),
        }
    }
}

/// Compute size
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeType {
    /// 3 GB / 2 vCPU
    #[serde(rename = "BUILD_GENERAL1_SMALL")]
    Small,
}

/// Runner image and size
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildEnvironment {
    /// Build image
    pub build_image: String,
    /// Compute size
    pub compute_type: ComputeType,
}

/// Source repository
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitHubSource {
    /// Owner
    pub owner: String,
    /// Repository
    pub repo: String,
    /// Branch
    pub branch: String,
}

/// Commands of one build phase
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    /// Shell commands run in order
    pub commands: Vec<String>,
}

/// Buildspec (version 0.2)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BuildSpec {
    /// Buildspec version
    pub version: String,
    /// Phases keyed by name (`install`, `pre_build`, `build`)
    pub phases: BTreeMap<String, Phase>,
}

impl BuildSpec {
    /// Empty buildspec
    pub fn new() -> Self {
        Self {
            version: "0.2".to_string(),
            phases: BTreeMap::new(),
        }
    }

    /// Append commands to `phase`
    pub fn with_phase<I, S>(mut self, phase: &str, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phases
            .entry(phase.to_string())
            .or_default()
            .commands
            .extend(commands.into_iter().map(Into::into));
        self
    }
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// CI build project
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildProject {
    /// Project name
    pub project_name: String,
    /// Source repository
    pub source: GitHubSource,
    /// Runner environment
    pub environment: BuildEnvironment,
    /// Environment variables by name
    pub environment_variables: BTreeMap<String, EnvironmentVariable>,
    /// Build commands
    pub build_spec: BuildSpec,
    /// Permissions granted to the project's service role
    pub role_policy: PolicyDocument,
}
