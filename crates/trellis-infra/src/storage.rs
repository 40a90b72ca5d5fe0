//! Shared and per-tenant storage
//!
//! One bucket holds the envoy reverse-proxy configuration. Every tenant gets
//! its own contextual-data bucket plus a sessions table and a chat-history
//! table. All names carry the deployment id.

use std::collections::BTreeMap;

use tracing::debug;

use trellis_common::aws::{Bucket, Table};
use trellis_common::naming;
use trellis_common::{NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result};

use crate::StackContext;

/// Scope of every node declared here
pub const SCOPE: &str = "storage";

/// Partition key of the sessions table
pub const SESSIONS_PARTITION_KEY: &str = "TenantId";

/// Partition key of the chat-history table
pub const CHAT_HISTORY_PARTITION_KEY: &str = "SessionId";

/// One tenant's storage nodes
#[derive(Clone, Debug)]
pub struct TenantStorage {
    /// Contextual-data bucket
    pub bucket: NodeId,
    /// Sessions table
    pub sessions: NodeId,
    /// Chat-history table
    pub chat_history: NodeId,
}

/// Handles to the declared storage
#[derive(Clone, Debug)]
pub struct StorageNodes {
    /// Envoy reverse-proxy configuration bucket
    pub envoy_config: NodeId,
    /// Per-tenant storage keyed by tenant id
    pub tenants: BTreeMap<String, TenantStorage>,
}

impl StorageNodes {
    /// Storage of `tenant`
    pub fn tenant(&self, tenant: &str) -> Option<&TenantStorage> {
        self.tenants.get(tenant)
    }
}

/// Declare the envoy-config bucket and every tenant's bucket and tables
pub fn declare(graph: &mut ResourceGraph, ctx: &StackContext<'_>) -> Result<StorageNodes> {
    let envoy_config = graph.add(ResourceNode::new(
        NodeId::new(SCOPE, "envoy-config-bucket"),
        ResourceSpec::Bucket(Bucket::private(naming::envoy_config_bucket(ctx.id))),
    ))?;

    let mut tenants = BTreeMap::new();
    for tenant in &ctx.config.tenants {
        let scope = format!("{}/{}", SCOPE, tenant);
        let bucket = graph.add(ResourceNode::new(
            NodeId::new(&scope, "bucket"),
            ResourceSpec::Bucket(Bucket::private(naming::tenant_bucket(tenant, ctx.id))),
        ))?;
        let sessions = graph.add(ResourceNode::new(
            NodeId::new(&scope, "sessions-table"),
            ResourceSpec::Table(Table::on_demand(
                naming::sessions_table(tenant, ctx.id),
                SESSIONS_PARTITION_KEY,
            )),
        ))?;
        let chat_history = graph.add(ResourceNode::new(
            NodeId::new(&scope, "chat-history-table"),
            ResourceSpec::Table(Table::on_demand(
                naming::chat_history_table(tenant, ctx.id),
                CHAT_HISTORY_PARTITION_KEY,
            )),
        ))?;
        debug!(tenant = %tenant, "declared tenant storage");
        tenants.insert(
            tenant.clone(),
            TenantStorage {
                bucket,
                sessions,
                chat_history,
            },
        );
    }

    Ok(StorageNodes {
        envoy_config,
        tenants,
    })
}
