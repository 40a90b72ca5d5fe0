//! Resource providers realize one resolved node at a time

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tracing::debug;

use trellis_common::resource::ResourceKind;
use trellis_common::{Error, NodeId, Result};

/// A node with every attribute token substituted
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedNode {
    /// Node id
    pub id: NodeId,
    /// Node kind
    pub kind: ResourceKind,
    /// Properties with tokens replaced by recorded outputs
    pub properties: Value,
}

/// Applies resolved nodes and reports their attributes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Whether this provider realizes nodes of `kind`.
    ///
    /// Nodes of other kinds are applied by the deployment engine; the
    /// applier takes their outputs from state and never calls `apply`.
    fn handles(&self, kind: ResourceKind) -> bool;

    /// Create or update the node, returning its attribute outputs
    async fn apply(&self, node: &ResolvedNode) -> Result<BTreeMap<String, String>>;
}

/// Provider that records calls and fabricates outputs
///
/// Every attribute comes back as `<node-id>.<attribute>`, except a looked-up
/// VPC, which keeps its real id. With [`DryRunProvider::with_existing_vpcs`]
/// the lookup fails for ids outside the given set. With
/// [`DryRunProvider::in_cluster_only`] it handles the same kinds as
/// [`super::KubeProvider`].
#[derive(Debug, Default)]
pub struct DryRunProvider {
    existing_vpcs: Option<BTreeSet<String>>,
    in_cluster_only: bool,
    calls: Mutex<Vec<NodeId>>,
}

impl DryRunProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict network lookups to these VPC ids
    pub fn with_existing_vpcs<I, S>(mut self, vpc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existing_vpcs = Some(vpc_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Leave cloud-side kinds to the deployment engine
    pub fn in_cluster_only(mut self) -> Self {
        self.in_cluster_only = true;
        self
    }

    /// Ids of every applied node, in call order
    pub fn calls(&self) -> Vec<NodeId> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceProvider for DryRunProvider {
    fn handles(&self, kind: ResourceKind) -> bool {
        !self.in_cluster_only || kind.is_cluster_side()
    }

    async fn apply(&self, node: &ResolvedNode) -> Result<BTreeMap<String, String>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(node.id.clone());
        }

        let mut outputs: BTreeMap<String, String> = node
            .kind
            .attributes()
            .iter()
            .map(|attr| (attr.to_string(), format!("{}.{}", node.id, attr)))
            .collect();

        if node.kind == ResourceKind::NetworkLookup {
            let vpc_id = node
                .properties
                .get("vpcId")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::lookup(node.id.as_str(), "lookup has no vpcId"))?;
            if let Some(existing) = &self.existing_vpcs {
                if !existing.contains(vpc_id) {
                    return Err(Error::lookup(
                        node.id.as_str(),
                        format!("VPC '{}' does not exist", vpc_id),
                    ));
                }
            }
            outputs.insert("vpcId".to_string(), vpc_id.to_string());
        }

        debug!(node = %node.id, kind = %node.kind, "dry-run apply");
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup(vpc_id: &str) -> ResolvedNode {
        ResolvedNode {
            id: NodeId::from("network/vpc"),
            kind: ResourceKind::NetworkLookup,
            properties: json!({ "vpcId": vpc_id }),
        }
    }

    #[tokio::test]
    async fn fabricates_one_output_per_attribute() {
        let provider = DryRunProvider::new();
        let node = ResolvedNode {
            id: NodeId::from("irsa/envoy-proxy-role"),
            kind: ResourceKind::Role,
            properties: json!({}),
        };
        let outputs = provider.apply(&node).await.unwrap();
        assert_eq!(outputs["arn"], "irsa/envoy-proxy-role.arn");
        assert_eq!(outputs["name"], "irsa/envoy-proxy-role.name");
        assert_eq!(provider.calls(), vec![node.id]);
    }

    #[tokio::test]
    async fn lookup_keeps_the_real_vpc_id() {
        let provider = DryRunProvider::new();
        let outputs = provider.apply(&lookup("vpc-0abc")).await.unwrap();
        assert_eq!(outputs["vpcId"], "vpc-0abc");
        assert_eq!(outputs["privateSubnetIds"], "network/vpc.privateSubnetIds");
    }

    #[test]
    fn in_cluster_mode_leaves_cloud_kinds_to_the_engine() {
        let provider = DryRunProvider::new();
        assert!(provider.handles(ResourceKind::Network));

        let provider = DryRunProvider::new().in_cluster_only();
        assert!(!provider.handles(ResourceKind::Network));
        assert!(!provider.handles(ResourceKind::HelmRelease));
        assert!(provider.handles(ResourceKind::Manifest));
        assert!(provider.handles(ResourceKind::Output));
    }

    /// Story: a config pointing at a VPC that was deleted fails at the
    /// lookup node instead of producing a half-built cluster
    #[tokio::test]
    async fn lookup_of_missing_vpc_fails() {
        let provider = DryRunProvider::new().with_existing_vpcs(["vpc-0abc"]);
        let err = provider.apply(&lookup("vpc-0gone")).await.unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
        assert!(err.to_string().contains("vpc-0gone"));
    }
}
