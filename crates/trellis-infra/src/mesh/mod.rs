//! Mesh installer
//!
//! Strict linear chain, every chart waiting for readiness with a bounded
//! timeout:
//!
//! ```text
//! controller SA -> aws-load-balancer-controller -> istio-base -> istiod
//!   -> istio-ingressgateway -> { proxy-protocol, ingressgateway-xff } filters
//!                           -> LoadBalancerDomain output
//! ```
//!
//! The whole chain runs after the node group: charts with nothing to
//! schedule on never become ready.

pub mod gateway;

use serde_json::json;
use tracing::debug;

use trellis_common::manifests::{EnvoyFilter, HelmRelease, Manifest, ServiceAccount};
use trellis_common::{
    NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result, INGRESS_GATEWAY_NAME,
    ISTIO_INGRESS_NAMESPACE, ISTIO_SYSTEM_NAMESPACE, KUBE_SYSTEM_NAMESPACE,
};

use crate::cluster::ClusterNodes;
use crate::irsa::{IrsaNodes, ALB_CONTROLLER_SERVICE_ACCOUNT};
use crate::network::NetworkNodes;
use crate::nodegroup::NodegroupNodes;
use crate::StackContext;

pub use gateway::LOAD_BALANCER_DOMAIN_OUTPUT;

/// Scope of every node declared here
pub const SCOPE: &str = "mesh";

/// Chart repository of the AWS load balancer controller
pub const EKS_CHARTS_REPOSITORY: &str = "https://aws.github.io/eks-charts";

/// Chart repository of Istio
pub const ISTIO_CHARTS_REPOSITORY: &str = "https://istio-release.storage.googleapis.com/charts";

/// Label value selecting the ingress gateway pods (`istio=<label>`)
pub const GATEWAY_SELECTOR_LABEL: &str = "ingressgateway";

/// Trusted proxies in front of the gateway for `X-Forwarded-For`
pub const XFF_TRUSTED_HOPS: u32 = 1;

const ALB_CONTROLLER_TIMEOUT_SECS: u64 = 300;
const ISTIO_BASE_TIMEOUT_SECS: u64 = 180;
const ISTIOD_TIMEOUT_SECS: u64 = 180;
const GATEWAY_TIMEOUT_SECS: u64 = 180;

/// Handles to the declared mesh
#[derive(Clone, Debug)]
pub struct MeshNodes {
    /// Controller service account
    pub controller_service_account: NodeId,
    /// Load balancer controller release
    pub alb_controller: NodeId,
    /// Istio CRDs release
    pub istio_base: NodeId,
    /// Istio control plane release
    pub istiod: NodeId,
    /// Ingress gateway release
    pub ingress_gateway: NodeId,
    /// PROXY protocol listener filter
    pub proxy_protocol_filter: NodeId,
    /// X-Forwarded-For filter
    pub xff_filter: NodeId,
    /// Ingress hostname output
    pub load_balancer_domain: NodeId,
}

/// Declare the mesh chain
pub fn declare(
    graph: &mut ResourceGraph,
    ctx: &StackContext<'_>,
    network: &NetworkNodes,
    cluster: &ClusterNodes,
    nodegroup: &NodegroupNodes,
    irsa: &IrsaNodes,
) -> Result<MeshNodes> {
    let config = ctx.config;

    let controller_service_account = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "alb-controller-sa"),
            ResourceSpec::ServiceAccount(ServiceAccount::with_role(
                ALB_CONTROLLER_SERVICE_ACCOUNT,
                KUBE_SYSTEM_NAMESPACE,
                irsa.alb_controller.attr("arn"),
            )),
        )
        .after(&nodegroup.nodegroup)
        .after(&irsa.alb_controller),
    )?;

    let alb_controller = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "aws-load-balancer-controller"),
            ResourceSpec::HelmRelease(
                HelmRelease::new(
                    cluster.name(),
                    EKS_CHARTS_REPOSITORY,
                    "aws-load-balancer-controller",
                    "aws-load-balancer-controller",
                    &config.alb_version,
                    KUBE_SYSTEM_NAMESPACE,
                )
                .with_values(json!({
                    "clusterName": cluster.name(),
                    "serviceAccount": {
                        "create": false,
                        "name": ALB_CONTROLLER_SERVICE_ACCOUNT,
                    },
                    "vpcId": network.vpc_id(),
                    "region": ctx.region(),
                }))
                .with_timeout_seconds(ALB_CONTROLLER_TIMEOUT_SECS),
            ),
        )
        .after(&controller_service_account),
    )?;

    let istio_chart = |chart: &str, release: &str, namespace: &str, timeout: u64| {
        HelmRelease::new(
            cluster.name(),
            ISTIO_CHARTS_REPOSITORY,
            chart,
            release,
            &config.istio_version,
            namespace,
        )
        .with_timeout_seconds(timeout)
    };

    let istio_base = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "istio-base"),
            ResourceSpec::HelmRelease(istio_chart(
                "base",
                "istio-base",
                ISTIO_SYSTEM_NAMESPACE,
                ISTIO_BASE_TIMEOUT_SECS,
            )),
        )
        .after(&alb_controller),
    )?;

    let istiod = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "istiod"),
            ResourceSpec::HelmRelease(istio_chart(
                "istiod",
                "istio-istiod",
                ISTIO_SYSTEM_NAMESPACE,
                ISTIOD_TIMEOUT_SECS,
            )),
        )
        .after(&istio_base),
    )?;

    let ingress_gateway = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, INGRESS_GATEWAY_NAME),
            ResourceSpec::HelmRelease(
                istio_chart(
                    "gateway",
                    INGRESS_GATEWAY_NAME,
                    ISTIO_INGRESS_NAMESPACE,
                    GATEWAY_TIMEOUT_SECS,
                )
                .with_values(gateway::chart_values(config)),
            ),
        )
        .after(&istiod),
    )?;

    let proxy_protocol_filter = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "proxy-protocol-filter"),
            ResourceSpec::Manifest(Manifest::from(EnvoyFilter::proxy_protocol(
                ISTIO_INGRESS_NAMESPACE,
                GATEWAY_SELECTOR_LABEL,
            ))),
        )
        .after(&ingress_gateway),
    )?;

    let xff_filter = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "ingressgateway-xff-filter"),
            ResourceSpec::Manifest(Manifest::from(EnvoyFilter::forwarded_for(
                ISTIO_INGRESS_NAMESPACE,
                XFF_TRUSTED_HOPS,
            ))),
        )
        .after(&ingress_gateway),
    )?;

    let load_balancer_domain = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "load-balancer-domain"),
            ResourceSpec::Output(gateway::load_balancer_output()),
        )
        .after(&ingress_gateway),
    )?;

    debug!(
        istio = %config.istio_version,
        alb = %config.alb_version,
        "declared mesh chain"
    );
    Ok(MeshNodes {
        controller_service_account,
        alb_controller,
        istio_base,
        istiod,
        ingress_gateway,
        proxy_protocol_filter,
        xff_filter,
        load_balancer_domain,
    })
}
