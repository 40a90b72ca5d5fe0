//! Node capacity
//!
//! One spot node group with an ordered instance-type preference list. The
//! node role carries exactly the three worker managed policies. Size bounds
//! come from context values resolved before anything is declared.

use tracing::debug;

use trellis_common::aws::eks::{AmiType, CapacityType};
use trellis_common::aws::{aws_managed_policy_arn, Nodegroup, PolicyDocument, Role};
use trellis_common::{NodeGroupSizing, NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result};

use crate::cluster::ClusterNodes;
use crate::network::NetworkNodes;

/// Scope of every node declared here
pub const SCOPE: &str = "nodegroup";

/// Managed node group name
pub const NODE_GROUP_NAME: &str = "custom-node-group";

/// Instance types, most preferred first
pub const INSTANCE_TYPES: [&str; 2] = ["t3.medium", "t3a.medium"];

/// Root volume size in GiB
pub const DISK_SIZE_GIB: u32 = 30;

/// Managed policies attached to the node role
pub const NODE_ROLE_POLICIES: [&str; 3] = [
    "AmazonEKSWorkerNodePolicy",
    "AmazonEC2ContainerRegistryReadOnly",
    "AmazonEKS_CNI_Policy",
];

/// Handles to the declared node capacity
#[derive(Clone, Debug)]
pub struct NodegroupNodes {
    /// Node instance role
    pub role: NodeId,
    /// Managed node group
    pub nodegroup: NodeId,
}

/// Declare the node role and node group
pub fn declare(
    graph: &mut ResourceGraph,
    network: &NetworkNodes,
    cluster: &ClusterNodes,
    sizing: NodeGroupSizing,
) -> Result<NodegroupNodes> {
    let trust = PolicyDocument::service_trust("ec2.amazonaws.com");
    let role_spec = NODE_ROLE_POLICIES
        .iter()
        .fold(Role::new(None, trust), |role, policy| {
            role.with_managed_policy(aws_managed_policy_arn(policy))
        });
    let role = graph.add(ResourceNode::new(
        NodeId::new(SCOPE, "node-role"),
        ResourceSpec::Role(role_spec),
    ))?;

    let nodegroup = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, NODE_GROUP_NAME),
            ResourceSpec::Nodegroup(Nodegroup {
                cluster_name: cluster.name(),
                nodegroup_name: NODE_GROUP_NAME.to_string(),
                node_role: role.attr("arn"),
                subnet_ids: network.private_subnet_ids(),
                instance_types: INSTANCE_TYPES.iter().map(|t| t.to_string()).collect(),
                disk_size: DISK_SIZE_GIB,
                ami_type: AmiType::Al2023X8664Standard,
                capacity_type: CapacityType::Spot,
                scaling_config: sizing,
            }),
        )
        .after(&cluster.control_plane)
        .after(&role),
    )?;

    debug!(
        min = sizing.min_size,
        desired = sizing.desired_size,
        max = sizing.max_size,
        "declared node group"
    );
    Ok(NodegroupNodes { role, nodegroup })
}
