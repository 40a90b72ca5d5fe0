//! In-cluster provider
//!
//! Server-side applies `ServiceAccount` and `Manifest` documents and reads
//! `Output` values from live objects. Cloud-side kinds and Helm releases
//! belong to the deployment engine: the applier adopts their imported
//! outputs and never hands them to this provider.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use serde_json::Value;
use tracing::info;

use trellis_common::kube_utils::{apply_document, get_object, json_path_get, wait_with_timeout};
use trellis_common::resource::{OutputSpec, ResourceKind};
use trellis_common::{Error, Result};

use super::provider::{ResolvedNode, ResourceProvider};

/// Provider backed by a Kubernetes client
#[derive(Clone)]
pub struct KubeProvider {
    client: Client,
}

impl KubeProvider {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Poll the object named by `spec` until the field at its path is a
    /// non-empty string
    pub async fn read_output(&self, resource: &str, spec: &OutputSpec) -> Result<String> {
        let client = &self.client;
        wait_with_timeout(
            Duration::from_secs(spec.timeout_seconds),
            Duration::from_secs(spec.poll_interval_seconds),
            resource,
            || async move {
                let object = get_object(
                    client,
                    &spec.api_version,
                    &spec.kind,
                    Some(&spec.namespace),
                    &spec.name,
                )
                .await
                .map_err(|e| e.to_string())?;
                Ok(object.as_ref().and_then(|o| field_value(o, &spec.json_path)))
            },
        )
        .await
    }
}

fn field_value(object: &Value, path: &str) -> Option<String> {
    json_path_get(object, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[async_trait]
impl ResourceProvider for KubeProvider {
    fn handles(&self, kind: ResourceKind) -> bool {
        kind.is_cluster_side()
    }

    async fn apply(&self, node: &ResolvedNode) -> Result<BTreeMap<String, String>> {
        if !self.handles(node.kind) {
            return Err(Error::dependency(
                node.id.as_str(),
                format!("{} is applied by the deployment engine, not in-cluster", node.kind),
            ));
        }

        if node.kind == ResourceKind::Output {
            let spec: OutputSpec = serde_json::from_value(node.properties.clone())
                .map_err(|e| Error::serialization_for_kind("Output", e.to_string()))?;
            let value = self.read_output(node.id.as_str(), &spec).await?;
            info!(output = %spec.export_name, value = %value, "output ready");
            return Ok(BTreeMap::from([("value".to_string(), value)]));
        }

        let metadata = apply_document(&self.client, &node.properties).await?;
        Ok(BTreeMap::from([("name".to_string(), metadata.name)]))
    }
}
