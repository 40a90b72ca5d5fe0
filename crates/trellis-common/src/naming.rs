//! Deterministic resource naming
//!
//! Globally-scoped names (buckets, tables, hosted login domains) carry a
//! per-deployment disambiguator so two stacks never collide, while the same
//! stack always produces the same names. The disambiguator is a `DeploymentId`
//! computed once per run and passed explicitly into every function here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kube_utils::sha256_hex;

/// Length of the deployment disambiguator in hex characters
pub const DEPLOYMENT_ID_LEN: usize = 5;

/// Stable per-deployment disambiguator
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Derive the id for a stack instance from its account, region and name
    pub fn derive(account: &str, region: &str, stack_name: &str) -> Self {
        let digest = sha256_hex(&format!("{}/{}/{}", account, region, stack_name));
        Self(digest[..DEPLOYMENT_ID_LEN].to_string())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bucket holding the envoy reverse proxy's dynamic configuration
pub fn envoy_config_bucket(id: &DeploymentId) -> String {
    format!("envoy-config-{}", id)
}

/// Per-tenant contextual data bucket
pub fn tenant_bucket(tenant: &str, id: &DeploymentId) -> String {
    format!("contextual-data-{}-{}", tenant, id)
}

/// Per-tenant session table
pub fn sessions_table(tenant: &str, id: &DeploymentId) -> String {
    format!("Sessions_{}_{}", tenant, id)
}

/// Per-tenant chat history table
pub fn chat_history_table(tenant: &str, id: &DeploymentId) -> String {
    format!("ChatHistory_{}_{}", tenant, id)
}

/// Per-tenant workload-identity role
pub fn tenant_role(tenant: &str, id: &DeploymentId) -> String {
    format!("{}-app-access-role-{}", tenant, id)
}

/// Per-tenant identity directory
pub fn user_pool(tenant: &str) -> String {
    tenant.to_string()
}

/// Per-tenant app client
pub fn app_client(tenant: &str) -> String {
    format!("{}-app-client", tenant)
}

/// Per-tenant hosted login domain prefix
pub fn user_pool_domain(tenant: &str, id: &DeploymentId) -> String {
    format!("{}-{}", tenant, id)
}

/// Namespace the tenant's workloads run in
pub fn tenant_namespace(tenant: &str) -> String {
    format!("{}-ns", tenant)
}

/// Service account the tenant's workloads run as
pub fn tenant_service_account(tenant: &str) -> String {
    format!("{}-sa", tenant)
}

/// Subject claim a projected service-account token carries
pub fn service_account_subject(namespace: &str, service_account: &str) -> String {
    format!("system:serviceaccount:{}:{}", namespace, service_account)
}

/// External load balancer name requested by the ingress gateway
pub fn ingress_load_balancer(cluster_name: &str) -> String {
    format!("{}-nlb", cluster_name.to_lowercase())
}
