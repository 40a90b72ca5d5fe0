//! System configuration and deployment context
//!
//! `SystemConfig` is read once at process start, from a JSON or YAML file when
//! one exists and from the documented defaults otherwise. It is never mutated
//! afterwards; every component borrows it.
//!
//! `DeploymentContext` carries the per-run values that are not part of the
//! config file: target account, region, stack name and the `-c key=value`
//! context map (node-group sizing lives there).

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "bin/config.json";

/// Context key for the node group minimum size
pub const CONTEXT_NODE_GROUP_MIN_SIZE: &str = "node_group_min_size";
/// Context key for the node group desired size
pub const CONTEXT_NODE_GROUP_DESIRED_SIZE: &str = "node_group_desired_size";
/// Context key for the node group maximum size
pub const CONTEXT_NODE_GROUP_MAX_SIZE: &str = "node_group_max_size";

/// Oldest control-plane version supporting the access entry API
const MIN_CONTROL_PLANE_VERSION: (u32, u32) = (1, 23);

/// Longest accepted tenant identifier (matches the identity directory's
/// `custom:tenantid` attribute limit)
const MAX_TENANT_LEN: usize = 20;

/// Optional reference to a pre-existing network
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfig {
    /// Existing VPC id; when set no network is created, only looked up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    /// Create interface/gateway endpoints in a newly created VPC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_vpc_endpoints: Option<bool>,
}

/// Source repository the build projects check out and push to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceRepo {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch the pipelines push generated manifests to
    #[serde(default = "SourceRepo::default_branch")]
    pub branch: String,
}

impl SourceRepo {
    fn default_branch() -> String {
        "main".to_string()
    }
}

impl Default for SourceRepo {
    fn default() -> Self {
        Self {
            owner: "Yas2020".to_string(),
            repo: "EKS-Istio-Multitenant".to_string(),
            branch: Self::default_branch(),
        }
    }
}

/// Immutable system configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    /// Resource name prefix
    pub prefix: String,
    /// Optional pre-existing network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc: Option<VpcConfig>,
    /// Optional ACM certificate ARN terminated at the ingress load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// Base domain; tenants are served from `<tenant>.<domain>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Serve the website privately (no public ingress)
    #[serde(default)]
    pub private_website: bool,
    /// Ordered, unique tenant identifiers
    pub tenants: Vec<String>,
    /// Text generation model id
    #[serde(rename = "TEXT2TEXT_MODEL_ID")]
    pub text2text_model_id: String,
    /// Embedding model id
    #[serde(rename = "EMBEDDING_MODEL_ID")]
    pub embedding_model_id: String,
    /// Model runtime service name
    #[serde(rename = "BEDROCK_SERVICE")]
    pub bedrock_service: String,
    /// Cluster name
    #[serde(rename = "EKS_CLUSTER_NAME")]
    pub eks_cluster_name: String,
    /// Control-plane Kubernetes version (`major.minor`)
    #[serde(rename = "KUBECTL_VERSION")]
    pub kubectl_version: String,
    /// Istio chart version
    #[serde(rename = "ISTIO_VERSION")]
    pub istio_version: String,
    /// AWS load balancer controller chart version
    #[serde(rename = "ALB_VERSION")]
    pub alb_version: String,
    /// cert-manager chart version
    #[serde(
        rename = "CERT_MANAGER_VERSION",
        default = "SystemConfig::default_cert_manager_version"
    )]
    pub cert_manager_version: String,
    /// SSH key pair name for worker nodes
    pub ssh_key_name: String,
    /// IAM user granted cluster-admin through an access entry
    #[serde(default = "SystemConfig::default_cluster_admin_user")]
    pub cluster_admin_user: String,
    /// Repository used by the build projects
    #[serde(default)]
    pub source_repo: SourceRepo,
    /// Secrets Manager reference (`secret-id:json-key`) of the repository token
    #[serde(default = "SystemConfig::default_github_token_secret")]
    pub github_token_secret: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            prefix: "yas-app".to_string(),
            vpc: None,
            certificate: None,
            domain: None,
            private_website: false,
            tenants: vec!["tenanta".to_string(), "tenantb".to_string()],
            text2text_model_id: "meta.llama3-8b-instruct-v1:0".to_string(),
            embedding_model_id: "amazon.titan-embed-text-v2:0".to_string(),
            bedrock_service: "bedrock-runtime".to_string(),
            eks_cluster_name: "Multitenant-App".to_string(),
            kubectl_version: "1.30".to_string(),
            istio_version: "1.22.3".to_string(),
            alb_version: "1.8.1".to_string(),
            cert_manager_version: Self::default_cert_manager_version(),
            ssh_key_name: "Mutltitenant-App-sshKey".to_string(),
            cluster_admin_user: Self::default_cluster_admin_user(),
            source_repo: SourceRepo::default(),
            github_token_secret: Self::default_github_token_secret(),
        }
    }
}

impl SystemConfig {
    fn default_cert_manager_version() -> String {
        "v1.15.1".to_string()
    }

    fn default_cluster_admin_user() -> String {
        "cluster-admin".to_string()
    }

    fn default_github_token_secret() -> String {
        "GitHub-PAT:GitHub-PAT".to_string()
    }

    /// Load the config from `path`, or the defaults if the file does not exist.
    ///
    /// `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
    /// The result is validated before it is returned.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            let parsed: Self = if is_yaml {
                serde_yaml::from_str(&data).map_err(|e| {
                    Error::config(format!("failed to parse {}: {}", path.display(), e))
                })?
            } else {
                serde_json::from_str(&data).map_err(|e| {
                    Error::config(format!("failed to parse {}: {}", path.display(), e))
                })?
            };
            info!(path = %path.display(), "loaded configuration file");
            parsed
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants every downstream component relies on
    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(Error::config_field("tenants", "at least one tenant is required"));
        }

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            validate_tenant_id(tenant)?;
            if !seen.insert(tenant.as_str()) {
                return Err(Error::config_field(
                    "tenants",
                    format!("duplicate tenant '{}'", tenant),
                ));
            }
        }

        for (field, value) in [
            ("prefix", &self.prefix),
            ("EKS_CLUSTER_NAME", &self.eks_cluster_name),
            ("ISTIO_VERSION", &self.istio_version),
            ("ALB_VERSION", &self.alb_version),
            ("CERT_MANAGER_VERSION", &self.cert_manager_version),
            ("TEXT2TEXT_MODEL_ID", &self.text2text_model_id),
            ("EMBEDDING_MODEL_ID", &self.embedding_model_id),
            ("clusterAdminUser", &self.cluster_admin_user),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config_field(field, "must not be empty"));
            }
        }

        let version = self.control_plane_version()?;
        if version < MIN_CONTROL_PLANE_VERSION {
            return Err(Error::config_field(
                "KUBECTL_VERSION",
                format!(
                    "control plane {} does not support access entries (need >= {}.{})",
                    self.kubectl_version, MIN_CONTROL_PLANE_VERSION.0, MIN_CONTROL_PLANE_VERSION.1
                ),
            ));
        }

        if let Some(vpc_id) = self.existing_vpc_id() {
            if !vpc_id.starts_with("vpc-") {
                return Err(Error::config_field(
                    "vpc.vpcId",
                    format!("'{}' is not a VPC id", vpc_id),
                ));
            }
        }

        Ok(())
    }

    /// Parse the control-plane version as `(major, minor)`
    pub fn control_plane_version(&self) -> Result<(u32, u32)> {
        let invalid = || {
            Error::config_field(
                "KUBECTL_VERSION",
                format!("'{}' is not a major.minor version", self.kubectl_version),
            )
        };
        let (major, minor) = self.kubectl_version.split_once('.').ok_or_else(invalid)?;
        let major = major.parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.parse::<u32>().map_err(|_| invalid())?;
        Ok((major, minor))
    }

    /// The referenced pre-existing VPC, if any
    pub fn existing_vpc_id(&self) -> Option<&str> {
        self.vpc
            .as_ref()
            .and_then(|v| v.vpc_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Base domain for gateway certificates and login callbacks
    pub fn base_domain(&self) -> &str {
        match self.domain.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => "example.com",
        }
    }
}

/// Tenant ids become namespace, bucket, and subdomain fragments, so they
/// must be lowercase DNS-1123 labels.
fn validate_tenant_id(tenant: &str) -> Result<()> {
    let valid_chars = tenant
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = tenant
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && tenant
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphanumeric());

    if tenant.is_empty() || tenant.len() > MAX_TENANT_LEN || !valid_chars || !valid_edges {
        return Err(Error::config_field(
            "tenants",
            format!(
                "tenant '{}' must be a lowercase DNS label of at most {} characters",
                tenant, MAX_TENANT_LEN
            ),
        ));
    }
    Ok(())
}

/// Per-run deployment context
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeploymentContext {
    /// Target account id
    pub account: String,
    /// Target region
    pub region: String,
    /// Stack (deployment) name
    pub stack_name: String,
    /// Context values from `-c key=value`
    pub values: BTreeMap<String, String>,
}

impl DeploymentContext {
    /// Create a context with no context values
    pub fn new(
        account: impl Into<String>,
        region: impl Into<String>,
        stack_name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            stack_name: stack_name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add a context value
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Parse a `key=value` context argument
    pub fn parse_value(arg: &str) -> Result<(String, String)> {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| Error::config(format!("context value '{}' is not key=value", arg)))?;
        if key.is_empty() {
            return Err(Error::config(format!("context value '{}' has no key", arg)));
        }
        Ok((key.to_string(), value.to_string()))
    }

    /// Validate account and region
    pub fn validate(&self) -> Result<()> {
        if self.account.is_empty() || !self.account.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::config_field(
                "account",
                format!("'{}' is not an account id", self.account),
            ));
        }
        if self.region.is_empty() {
            return Err(Error::config_field("region", "must not be empty"));
        }
        if self.stack_name.is_empty() {
            return Err(Error::config_field("stack_name", "must not be empty"));
        }
        Ok(())
    }

    fn required_size(&self, key: &str) -> Result<u32> {
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| Error::config_field(key, "context value is required"))?;
        raw.trim().parse::<u32>().map_err(|_| {
            Error::config_field(key, format!("'{}' is not a non-negative integer", raw))
        })
    }
}

/// Worker node group size bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSizing {
    /// Minimum node count
    pub min_size: u32,
    /// Desired node count
    pub desired_size: u32,
    /// Maximum node count
    pub max_size: u32,
}

impl NodeGroupSizing {
    /// Read sizing from the context map.
    ///
    /// Absent values are a configuration error, never defaulted to zero:
    /// a zero-capacity node group silently strands workloads.
    pub fn from_context(ctx: &DeploymentContext) -> Result<Self> {
        let sizing = Self {
            min_size: ctx.required_size(CONTEXT_NODE_GROUP_MIN_SIZE)?,
            desired_size: ctx.required_size(CONTEXT_NODE_GROUP_DESIRED_SIZE)?,
            max_size: ctx.required_size(CONTEXT_NODE_GROUP_MAX_SIZE)?,
        };
        sizing.validate()?;
        Ok(sizing)
    }

    fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::config_field(
                CONTEXT_NODE_GROUP_MAX_SIZE,
                "must be at least 1",
            ));
        }
        if self.desired_size == 0 {
            return Err(Error::config_field(
                CONTEXT_NODE_GROUP_DESIRED_SIZE,
                "must be at least 1",
            ));
        }
        if self.min_size > self.desired_size || self.desired_size > self.max_size {
            return Err(Error::config(format!(
                "node group sizing must satisfy min <= desired <= max (got {}/{}/{})",
                self.min_size, self.desired_size, self.max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sized_context() -> DeploymentContext {
        DeploymentContext::new("123456789012", "us-east-1", "EksStack")
            .with_value(CONTEXT_NODE_GROUP_MIN_SIZE, "1")
            .with_value(CONTEXT_NODE_GROUP_DESIRED_SIZE, "2")
            .with_value(CONTEXT_NODE_GROUP_MAX_SIZE, "4")
    }

    #[test]
    fn defaults_are_valid() {
        let config = SystemConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tenants, vec!["tenanta", "tenantb"]);
        assert_eq!(config.base_domain(), "example.com");
        assert_eq!(config.control_plane_version().unwrap(), (1, 30));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SystemConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, SystemConfig::default());
    }

    #[test]
    fn loads_json_file_with_original_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "prefix": "acme",
                "vpc": { "vpcId": "vpc-0abc", "createVpcEndpoints": true },
                "domain": "acme.dev",
                "privateWebsite": false,
                "tenants": ["red", "blue", "green"],
                "TEXT2TEXT_MODEL_ID": "m1",
                "EMBEDDING_MODEL_ID": "m2",
                "BEDROCK_SERVICE": "bedrock-runtime",
                "EKS_CLUSTER_NAME": "acme",
                "KUBECTL_VERSION": "1.31",
                "ISTIO_VERSION": "1.23.0",
                "ALB_VERSION": "1.8.1",
                "sshKeyName": "key"
            }"#,
        )
        .unwrap();

        let config = SystemConfig::load(&path).unwrap();
        assert_eq!(config.tenants.len(), 3);
        assert_eq!(config.existing_vpc_id(), Some("vpc-0abc"));
        assert_eq!(config.base_domain(), "acme.dev");
        assert_eq!(config.cert_manager_version, "v1.15.1");
        assert_eq!(config.source_repo.branch, "main");
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = serde_yaml::to_string(&SystemConfig::default()).unwrap();
        std::fs::write(&path, yaml).unwrap();
        assert_eq!(SystemConfig::load(&path).unwrap(), SystemConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SystemConfig::load(&path),
            Err(Error::Config { .. })
        ));
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::duplicate(vec!["tenanta", "tenanta"])]
    #[case::uppercase(vec!["TenantA"])]
    #[case::underscore(vec!["tenant_a"])]
    #[case::trailing_dash(vec!["tenant-"])]
    #[case::too_long(vec!["abcdefghijklmnopqrstuvwxyz"])]
    fn invalid_tenant_lists_are_rejected(#[case] tenants: Vec<&str>) {
        let config = SystemConfig {
            tenants: tenants.into_iter().map(String::from).collect(),
            ..SystemConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[rstest]
    #[case::too_old("1.22")]
    #[case::not_a_version("latest")]
    #[case::missing_minor("1")]
    fn unsupported_control_plane_versions_are_rejected(#[case] version: &str) {
        let config = SystemConfig {
            kubectl_version: version.to_string(),
            ..SystemConfig::default()
        };
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { field, .. } => assert_eq!(field.as_deref(), Some("KUBECTL_VERSION")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn empty_vpc_id_means_create() {
        let config = SystemConfig {
            vpc: Some(VpcConfig {
                vpc_id: Some(String::new()),
                create_vpc_endpoints: Some(true),
            }),
            ..SystemConfig::default()
        };
        assert_eq!(config.existing_vpc_id(), None);
    }

    #[test]
    fn sizing_reads_context_values() {
        let sizing = NodeGroupSizing::from_context(&sized_context()).unwrap();
        assert_eq!(
            sizing,
            NodeGroupSizing {
                min_size: 1,
                desired_size: 2,
                max_size: 4
            }
        );
    }

    #[rstest]
    #[case::missing_min(CONTEXT_NODE_GROUP_MIN_SIZE)]
    #[case::missing_desired(CONTEXT_NODE_GROUP_DESIRED_SIZE)]
    #[case::missing_max(CONTEXT_NODE_GROUP_MAX_SIZE)]
    fn missing_sizing_is_fatal(#[case] key: &str) {
        let mut ctx = sized_context();
        ctx.values.remove(key);
        match NodeGroupSizing::from_context(&ctx) {
            Err(Error::Config { field, .. }) => assert_eq!(field.as_deref(), Some(key)),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[rstest]
    #[case::inverted("3", "2", "1")]
    #[case::zero_max("0", "0", "0")]
    #[case::not_a_number("one", "2", "3")]
    fn inconsistent_sizing_is_rejected(#[case] min: &str, #[case] desired: &str, #[case] max: &str) {
        let ctx = DeploymentContext::new("123456789012", "us-east-1", "EksStack")
            .with_value(CONTEXT_NODE_GROUP_MIN_SIZE, min)
            .with_value(CONTEXT_NODE_GROUP_DESIRED_SIZE, desired)
            .with_value(CONTEXT_NODE_GROUP_MAX_SIZE, max);
        assert!(NodeGroupSizing::from_context(&ctx).is_err());
    }

    #[test]
    fn zero_desired_size_is_rejected() {
        let ctx = DeploymentContext::new("123456789012", "us-east-1", "EksStack")
            .with_value(CONTEXT_NODE_GROUP_MIN_SIZE, "0")
            .with_value(CONTEXT_NODE_GROUP_DESIRED_SIZE, "0")
            .with_value(CONTEXT_NODE_GROUP_MAX_SIZE, "1");
        match NodeGroupSizing::from_context(&ctx) {
            Err(Error::Config { field, .. }) => {
                assert_eq!(field.as_deref(), Some(CONTEXT_NODE_GROUP_DESIRED_SIZE))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn parse_context_value() {
        assert_eq!(
            DeploymentContext::parse_value("node_group_min_size=2").unwrap(),
            ("node_group_min_size".to_string(), "2".to_string())
        );
        assert!(DeploymentContext::parse_value("novalue").is_err());
        assert!(DeploymentContext::parse_value("=2").is_err());
    }

    #[test]
    fn context_validation() {
        sized_context().validate().unwrap();
        assert!(DeploymentContext::new("abc", "us-east-1", "s").validate().is_err());
        assert!(DeploymentContext::new("123", "", "s").validate().is_err());
    }
}
