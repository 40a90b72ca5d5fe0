//! Persisted apply state
//!
//! One entry per applied node: its kind, the fingerprint of the resolved
//! spec that was applied, and the outputs the provider reported. Entries are
//! only ever added or replaced.
//!
//! Cloud-side nodes are realized by the deployment engine; their outputs
//! enter the state through [`ApplyState::import_outputs`] and carry
//! [`EXTERNAL_FINGERPRINT`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use trellis_common::resource::ResourceKind;
use trellis_common::{Error, NodeId, Result};

use super::check_outputs;
use crate::stack::Template;

/// Current state file format
pub const STATE_VERSION: u32 = 1;

/// Fingerprint of entries imported from the deployment engine
pub const EXTERNAL_FINGERPRINT: &str = "external";

/// Outputs reported by the deployment engine: node id -> attribute -> value
pub type EngineOutputs = BTreeMap<NodeId, BTreeMap<String, String>>;

/// What was applied for one node
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    /// Node kind
    pub kind: ResourceKind,
    /// Fingerprint of the applied resolved spec
    pub fingerprint: String,
    /// Attribute outputs
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Applied nodes of one deployment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyState {
    /// File format version
    pub version: u32,
    /// Deployment this state belongs to, set on first apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// Entries by node id
    #[serde(default)]
    pub resources: BTreeMap<NodeId, StateEntry>,
}

impl Default for ApplyState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            deployment_id: None,
            resources: BTreeMap::new(),
        }
    }
}

impl ApplyState {
    /// Load state from `path`; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no state file, starting empty");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::serialization(format!("invalid state file {}: {}", path.display(), e))
        })?;
        if state.version != STATE_VERSION {
            return Err(Error::validation_for(
                path.display().to_string(),
                format!(
                    "unsupported state version {} (expected {})",
                    state.version, STATE_VERSION
                ),
            ));
        }
        Ok(state)
    }

    /// Write state to `path` as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        debug!(path = %path.display(), resources = self.resources.len(), "state saved");
        Ok(())
    }

    /// Entry recorded for `id`
    pub fn entry(&self, id: &str) -> Option<&StateEntry> {
        self.resources.get(id)
    }

    /// Recorded output `attribute` of node `id`
    pub fn output(&self, id: &str, attribute: &str) -> Option<&str> {
        self.entry(id)
            .and_then(|e| e.outputs.get(attribute))
            .map(String::as_str)
    }

    /// Reject state recorded for a different deployment
    pub fn check_owner(&self, deployment_id: &str) -> Result<()> {
        match self.deployment_id.as_deref() {
            Some(existing) if existing != deployment_id => Err(Error::validation_for(
                "state",
                format!(
                    "state belongs to deployment '{}', template is '{}'",
                    existing, deployment_id
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Bind this state to `deployment_id`
    pub fn claim(&mut self, deployment_id: &str) -> Result<()> {
        self.check_owner(deployment_id)?;
        self.deployment_id = Some(deployment_id.to_string());
        Ok(())
    }

    /// Record outputs the deployment engine reported for cloud-side nodes.
    ///
    /// Every entry is checked against `template` before any is recorded: the
    /// node must exist and be cloud-side, and each attribute must be one its
    /// kind exposes. Returns the imported ids.
    pub fn import_outputs(
        &mut self,
        template: &Template,
        outputs: EngineOutputs,
    ) -> Result<Vec<NodeId>> {
        self.check_owner(&template.deployment_id)?;

        let mut entries = Vec::with_capacity(outputs.len());
        for (id, values) in outputs {
            let node = template.node(id.as_str()).ok_or_else(|| {
                Error::validation_for(id.as_str(), "not a node of this deployment")
            })?;
            let kind = node.kind();
            if kind.is_cluster_side() {
                return Err(Error::validation_for(
                    id.as_str(),
                    format!("{} is applied in-cluster, not by the deployment engine", kind),
                ));
            }
            if values.is_empty() {
                return Err(Error::validation_for(id.as_str(), "no outputs to import"));
            }
            if let Some(unknown) = values
                .keys()
                .find(|attr| !kind.attributes().contains(&attr.as_str()))
            {
                return Err(Error::validation_for(
                    id.as_str(),
                    format!("{} has no attribute '{}'", kind, unknown),
                ));
            }
            check_outputs(&id, kind, &values)?;
            entries.push((
                id,
                StateEntry {
                    kind,
                    fingerprint: EXTERNAL_FINGERPRINT.to_string(),
                    outputs: values,
                },
            ));
        }

        self.claim(&template.deployment_id)?;
        let ids: Vec<NodeId> = entries.iter().map(|(id, _)| id.clone()).collect();
        self.resources.extend(entries);
        info!(imported = ids.len(), "recorded deployment engine outputs");
        Ok(ids)
    }
}
