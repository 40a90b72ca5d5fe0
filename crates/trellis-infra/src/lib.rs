//! Provisioning components and the apply engine for Trellis
//!
//! Each component appends typed nodes to a shared [`ResourceGraph`] and
//! returns the ids later components reference:
//!
//! - [`network`]: new VPC or lookup of an existing one
//! - [`storage`]: envoy-config bucket, per-tenant bucket and tables
//! - [`identity`]: per-tenant user pool, app client and hosted domain
//! - [`cluster`]: control plane, admin access entry, OIDC provider
//! - [`nodegroup`]: node role and the spot node group
//! - [`irsa`]: workload-identity roles pinned to service-account subjects
//! - [`mesh`]: load balancer controller, Istio charts, envoy filters, ingress output
//! - [`cert_manager`]: cert-manager chart and per-domain CA chains
//! - [`pipeline`]: CI build projects and their cluster access
//!
//! [`stack::Stack`] composes them in dependency order and validates the
//! result; [`apply::Applier`] walks the validated graph.
//!
//! [`ResourceGraph`]: trellis_common::ResourceGraph

pub mod apply;
pub mod cert_manager;
pub mod cluster;
pub mod identity;
pub mod irsa;
pub mod mesh;
pub mod network;
pub mod nodegroup;
pub mod pipeline;
pub mod stack;
pub mod storage;

use trellis_common::{DeploymentContext, DeploymentId, SystemConfig};

pub use apply::{Applier, ApplyReport, ApplyState, NodeOutcome};
pub use stack::{Stack, Template};

/// Inputs shared by every component during one synthesis
#[derive(Clone, Copy, Debug)]
pub struct StackContext<'a> {
    /// Loaded system configuration
    pub config: &'a SystemConfig,
    /// Target account, region, stack name and context values
    pub deployment: &'a DeploymentContext,
    /// Disambiguator threaded into every generated name
    pub id: &'a DeploymentId,
}

impl StackContext<'_> {
    /// Target AWS account
    pub fn account(&self) -> &str {
        &self.deployment.account
    }

    /// Target AWS region
    pub fn region(&self) -> &str {
        &self.deployment.region
    }
}
