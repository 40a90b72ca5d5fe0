//! Cluster provisioner
//!
//! Declares the control plane with zero default capacity, a cluster-admin
//! access entry for the configured IAM user, and the single OIDC provider
//! every workload-identity role trusts.

use tracing::debug;

use trellis_common::aws::eks::{AuthenticationMode, STS_AUDIENCE};
use trellis_common::aws::{iam_user_arn, AccessEntry, Cluster, OidcProvider};
use trellis_common::{NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result};

use crate::network::NetworkNodes;
use crate::StackContext;

/// Scope of every node declared here
pub const SCOPE: &str = "cluster";

/// Handles to the declared cluster
#[derive(Clone, Debug)]
pub struct ClusterNodes {
    /// Control plane
    pub control_plane: NodeId,
    /// Admin access entry
    pub admin_access: NodeId,
    /// OIDC identity provider for the cluster issuer
    pub oidc_provider: NodeId,
}

impl ClusterNodes {
    /// Token for the cluster name
    pub fn name(&self) -> String {
        self.control_plane.attr("name")
    }

    /// Token for the cluster ARN
    pub fn arn(&self) -> String {
        self.control_plane.attr("arn")
    }
}

/// Declare the control plane, admin access and OIDC provider
pub fn declare(
    graph: &mut ResourceGraph,
    ctx: &StackContext<'_>,
    network: &NetworkNodes,
) -> Result<ClusterNodes> {
    // Hand-built configs never went through `SystemConfig::load`.
    ctx.config.control_plane_version()?;

    let control_plane = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "control-plane"),
            ResourceSpec::Cluster(Cluster {
                cluster_name: ctx.config.eks_cluster_name.clone(),
                version: ctx.config.kubectl_version.clone(),
                default_capacity: 0,
                authentication_mode: AuthenticationMode::ApiAndConfigMap,
                bootstrap_cluster_creator_admin_permissions: true,
                vpc_id: network.vpc_id(),
                subnet_ids: network.private_subnet_ids(),
            }),
        )
        .after(&network.vpc),
    )?;

    let admin_access = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "admin-access"),
            ResourceSpec::AccessEntry(AccessEntry::cluster_admin(
                control_plane.attr("name"),
                iam_user_arn(ctx.account(), &ctx.config.cluster_admin_user),
            )),
        )
        .after(&control_plane),
    )?;

    let oidc_provider = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "oidc-provider"),
            ResourceSpec::OidcProvider(OidcProvider {
                issuer_url: format!("https://{}", control_plane.attr("oidcIssuer")),
                client_ids: vec![STS_AUDIENCE.to_string()],
            }),
        )
        .after(&control_plane),
    )?;

    debug!(
        cluster = %ctx.config.eks_cluster_name,
        version = %ctx.config.kubectl_version,
        "declared control plane"
    );
    Ok(ClusterNodes {
        control_plane,
        admin_access,
        oidc_provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network;
    use crate::testing::Fixture;
    use trellis_common::resource::ResourceKind;
    use trellis_common::SystemConfig;

    fn declare_all(fixture: &Fixture) -> (ResourceGraph, ClusterNodes) {
        let mut graph = ResourceGraph::new();
        let net = network::declare(&mut graph, &fixture.ctx()).unwrap();
        let nodes = declare(&mut graph, &fixture.ctx(), &net).unwrap();
        (graph, nodes)
    }

    #[test]
    fn control_plane_has_no_default_capacity() {
        let fixture = Fixture::default();
        let (graph, nodes) = declare_all(&fixture);
        graph.validate().unwrap();

        let props = graph
            .get(nodes.control_plane.as_str())
            .unwrap()
            .spec
            .properties()
            .unwrap();
        assert_eq!(props["defaultCapacity"], 0);
        assert_eq!(props["authenticationMode"], "API_AND_CONFIG_MAP");
        assert_eq!(props["subnetIds"], "${network/vpc.privateSubnetIds}");
        assert_eq!(props["version"], "1.30");
    }

    #[test]
    fn exactly_one_oidc_provider() {
        let fixture = Fixture::default();
        let (graph, nodes) = declare_all(&fixture);
        let providers: Vec<_> = graph
            .nodes()
            .filter(|n| n.kind() == ResourceKind::OidcProvider)
            .collect();
        assert_eq!(providers.len(), 1);
        let props = providers[0].spec.properties().unwrap();
        assert_eq!(props["issuerUrl"], "https://${cluster/control-plane.oidcIssuer}");
        assert_eq!(props["clientIds"][0], "sts.amazonaws.com");
        assert_eq!(providers[0].id, nodes.oidc_provider);
    }

    #[test]
    fn admin_entry_targets_configured_user() {
        let fixture = Fixture::new(SystemConfig {
            cluster_admin_user: "platform-admin".to_string(),
            ..SystemConfig::default()
        });
        let (graph, nodes) = declare_all(&fixture);
        let props = graph
            .get(nodes.admin_access.as_str())
            .unwrap()
            .spec
            .properties()
            .unwrap();
        assert_eq!(
            props["principalArn"],
            "arn:aws:iam::123456789012:user/platform-admin"
        );
        assert_eq!(props["clusterName"], "${cluster/control-plane.name}");
    }

    #[test]
    fn malformed_version_is_a_config_error() {
        let fixture = Fixture::new(SystemConfig {
            kubectl_version: "latest".to_string(),
            ..SystemConfig::default()
        });
        let mut graph = ResourceGraph::new();
        let net = network::declare(&mut graph, &fixture.ctx()).unwrap();
        let err = declare(&mut graph, &fixture.ctx(), &net).unwrap_err();
        assert!(matches!(err, trellis_common::Error::Config { .. }));
        assert!(!graph.contains("cluster/control-plane"));
    }
}
