//! Stack composition
//!
//! [`Stack::build`] turns a configuration and a deployment context into a
//! validated [`ResourceGraph`]. Node group sizing is resolved before any
//! component runs, so a missing context value fails with nothing declared.
//! [`Template`] is the serialized form: nodes in apply order plus the
//! exported outputs.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use trellis_common::{
    DeploymentContext, DeploymentId, NodeGroupSizing, ResourceGraph, ResourceNode, Result,
    SystemConfig,
};

use crate::mesh::LOAD_BALANCER_DOMAIN_OUTPUT;
use crate::{
    cert_manager, cluster, identity, irsa, mesh, network, nodegroup, pipeline, storage,
    StackContext,
};

/// A validated resource graph for one deployment
#[derive(Debug)]
pub struct Stack {
    deployment_id: DeploymentId,
    graph: ResourceGraph,
    outputs: BTreeMap<String, String>,
}

impl Stack {
    /// Declare every component and validate the result
    pub fn build(config: &SystemConfig, deployment: &DeploymentContext) -> Result<Self> {
        deployment.validate()?;
        config.validate()?;
        let sizing = NodeGroupSizing::from_context(deployment)?;

        let id = DeploymentId::derive(
            &deployment.account,
            &deployment.region,
            &deployment.stack_name,
        );
        let ctx = StackContext {
            config,
            deployment,
            id: &id,
        };

        let mut graph = ResourceGraph::new();
        let net = network::declare(&mut graph, &ctx)?;
        let store = storage::declare(&mut graph, &ctx)?;
        identity::declare(&mut graph, &ctx)?;
        let cl = cluster::declare(&mut graph, &ctx, &net)?;
        let ng = nodegroup::declare(&mut graph, &net, &cl, sizing)?;
        let roles = irsa::declare(&mut graph, &ctx, &cl, &store)?;
        let mesh_nodes = mesh::declare(&mut graph, &ctx, &net, &cl, &ng, &roles)?;
        cert_manager::declare(&mut graph, &ctx, &cl, &ng, &mesh_nodes)?;
        pipeline::declare(&mut graph, &ctx, &cl, &store, &roles)?;

        graph.validate()?;

        let outputs = BTreeMap::from([(
            LOAD_BALANCER_DOMAIN_OUTPUT.to_string(),
            mesh_nodes.load_balancer_domain.attr("value"),
        )]);

        info!(
            deployment_id = %id,
            tenants = config.tenants.len(),
            nodes = graph.len(),
            "stack built"
        );
        Ok(Self {
            deployment_id: id,
            graph,
            outputs,
        })
    }

    /// Build and serialize in one step
    pub fn synthesize(config: &SystemConfig, deployment: &DeploymentContext) -> Result<Template> {
        Self::build(config, deployment)?.template()
    }

    /// Deployment disambiguator
    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    /// The validated graph
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Nodes in apply order with the exported outputs
    pub fn template(&self) -> Result<Template> {
        let nodes = self
            .graph
            .topological_order()?
            .into_iter()
            .cloned()
            .collect();
        Ok(Template {
            deployment_id: self.deployment_id.to_string(),
            nodes,
            outputs: self.outputs.clone(),
        })
    }
}

/// Serialized stack, consumed by the deployment engine and [`crate::Applier`]
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Deployment disambiguator
    pub deployment_id: String,
    /// Nodes in apply order
    pub nodes: Vec<ResourceNode>,
    /// Exported outputs: name -> attribute token
    pub outputs: BTreeMap<String, String>,
}

impl Template {
    /// Find a node by id
    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }
}
