//! Managed Kubernetes control plane, access entries, OIDC provider and node
//! groups

use serde::{Deserialize, Serialize};

use crate::config::NodeGroupSizing;

/// Audience the pod identity webhook requests for projected tokens
pub const STS_AUDIENCE: &str = "sts.amazonaws.com";

/// Cluster authentication mode
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationMode {
    /// Access entries only
    Api,
    /// Access entries plus the legacy aws-auth config map
    ApiAndConfigMap,
}

/// Managed control plane
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Cluster name
    pub cluster_name: String,
    /// Kubernetes `major.minor` version
    pub version: String,
    /// Worker nodes created with the cluster; always zero here
    pub default_capacity: u32,
    /// Authentication mode
    pub authentication_mode: AuthenticationMode,
    /// Grant the creating principal cluster-admin
    pub bootstrap_cluster_creator_admin_permissions: bool,
    /// VPC the control plane ENIs are placed in
    pub vpc_id: String,
    /// Subnets for the control plane and default node placement
    pub subnet_ids: String,
}

/// Scope of an access policy association
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AccessScope {
    /// Whole cluster
    #[serde(rename = "cluster")]
    Cluster,
    /// Listed namespaces only
    #[serde(rename = "namespace")]
    Namespace {
        /// Namespaces the policy applies to
        namespaces: Vec<String>,
    },
}

/// Access policy associated with an access entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    /// Access policy ARN
    pub policy_arn: String,
    /// Scope
    pub access_scope: AccessScope,
}

impl AccessPolicy {
    /// `AmazonEKSClusterAdminPolicy` at cluster scope
    pub fn cluster_admin() -> Self {
        Self {
            policy_arn: "arn:aws:eks::aws:cluster-access-policy/AmazonEKSClusterAdminPolicy"
                .to_string(),
            access_scope: AccessScope::Cluster,
        }
    }
}

/// Access entry granting an IAM principal Kubernetes permissions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    /// Cluster name
    pub cluster_name: String,
    /// IAM principal ARN
    pub principal_arn: String,
    /// Associated access policies
    pub access_policies: Vec<AccessPolicy>,
}

impl AccessEntry {
    /// Cluster-admin access for `principal_arn`
    pub fn cluster_admin(cluster_name: impl Into<String>, principal_arn: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            principal_arn: principal_arn.into(),
            access_policies: vec![AccessPolicy::cluster_admin()],
        }
    }
}

/// IAM OIDC identity provider trusting the cluster's token issuer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcProvider {
    /// Issuer URL (`https://oidc.eks.<region>.amazonaws.com/id/<id>`)
    pub issuer_url: String,
    /// Accepted audiences
    pub client_ids: Vec<String>,
}

/// Node image family
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmiType {
    /// Amazon Linux 2023, x86_64
    #[serde(rename = "AL2023_X86_64_STANDARD")]
    Al2023X8664Standard,
}

/// Purchase option of node capacity
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityType {
    /// On-demand instances
    OnDemand,
    /// Interruptible spot instances
    Spot,
}

/// Managed worker node group
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Nodegroup {
    /// Cluster name
    pub cluster_name: String,
    /// Node group name
    pub nodegroup_name: String,
    /// Instance role ARN
    pub node_role: String,
    /// Subnets nodes are launched in
    pub subnet_ids: String,
    /// Instance types in preference order
    pub instance_types: Vec<String>,
    /// Root volume size in GiB
    pub disk_size: u32,
    /// Node image family
    pub ami_type: AmiType,
    /// Capacity purchase option
    pub capacity_type: CapacityType,
    /// Size bounds
    pub scaling_config: NodeGroupSizing,
}
