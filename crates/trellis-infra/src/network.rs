//! Network foundation
//!
//! Creates a two-AZ VPC unless the configuration names an existing one, in
//! which case only a read-only lookup is declared. Either way the node is
//! `network/vpc` and exposes the same attributes, so downstream components
//! never branch on which variant was chosen.

use tracing::debug;

use trellis_common::aws::{Network, NetworkLookup};
use trellis_common::{NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result};

use crate::StackContext;

/// Scope of every node declared here
pub const SCOPE: &str = "network";

/// Handles to the declared network
#[derive(Clone, Debug)]
pub struct NetworkNodes {
    /// `network/vpc`, either a `Network` or a `NetworkLookup`
    pub vpc: NodeId,
    /// True when the VPC is pre-existing
    pub is_lookup: bool,
}

impl NetworkNodes {
    /// Token for the VPC id
    pub fn vpc_id(&self) -> String {
        self.vpc.attr("vpcId")
    }

    /// Token for the private subnet ids
    pub fn private_subnet_ids(&self) -> String {
        self.vpc.attr("privateSubnetIds")
    }
}

/// Declare the network
pub fn declare(graph: &mut ResourceGraph, ctx: &StackContext<'_>) -> Result<NetworkNodes> {
    let id = NodeId::new(SCOPE, "vpc");

    let (spec, is_lookup) = match ctx.config.existing_vpc_id() {
        Some(vpc_id) => {
            debug!(vpc_id = %vpc_id, "using existing VPC");
            (
                ResourceSpec::NetworkLookup(NetworkLookup {
                    vpc_id: vpc_id.to_string(),
                }),
                true,
            )
        }
        None => {
            let endpoints = ctx
                .config
                .vpc
                .as_ref()
                .and_then(|v| v.create_vpc_endpoints)
                .unwrap_or(false);
            debug!(endpoints, "declaring new VPC");
            (
                ResourceSpec::Network(Network::two_tier(
                    format!("{}-vpc", ctx.config.prefix),
                    endpoints,
                )),
                false,
            )
        }
    };

    let vpc = graph.add(ResourceNode::new(id, spec))?;
    Ok(NetworkNodes { vpc, is_lookup })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use trellis_common::config::VpcConfig;
    use trellis_common::resource::ResourceKind;
    use trellis_common::SystemConfig;

    fn declare_with(config: SystemConfig) -> (ResourceGraph, NetworkNodes) {
        let fixture = Fixture::new(config);
        let mut graph = ResourceGraph::new();
        let nodes = declare(&mut graph, &fixture.ctx()).unwrap();
        (graph, nodes)
    }

    #[test]
    fn creates_vpc_when_none_configured() {
        let (graph, nodes) = declare_with(SystemConfig::default());
        assert!(!nodes.is_lookup);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("network/vpc").unwrap().kind(), ResourceKind::Network);
        assert_eq!(nodes.vpc_id(), "${network/vpc.vpcId}");
    }

    #[test]
    fn only_looks_up_existing_vpc() {
        let config = SystemConfig {
            vpc: Some(VpcConfig {
                vpc_id: Some("vpc-0abc".to_string()),
                create_vpc_endpoints: Some(true),
            }),
            ..SystemConfig::default()
        };
        let (graph, nodes) = declare_with(config);
        assert!(nodes.is_lookup);
        assert_eq!(graph.len(), 1);
        let node = graph.get("network/vpc").unwrap();
        assert_eq!(node.kind(), ResourceKind::NetworkLookup);
        assert_eq!(node.spec.properties().unwrap()["vpcId"], "vpc-0abc");
    }

    #[test]
    fn empty_vpc_id_creates_network() {
        let config = SystemConfig {
            vpc: Some(VpcConfig {
                vpc_id: Some(String::new()),
                create_vpc_endpoints: Some(true),
            }),
            ..SystemConfig::default()
        };
        let (graph, nodes) = declare_with(config);
        assert!(!nodes.is_lookup);
        let props = graph.get("network/vpc").unwrap().spec.properties().unwrap();
        assert_eq!(props["vpcEndpoints"], true);
    }
}
