//! Apply engine
//!
//! Walks a [`Template`] in order and hands each node to a
//! [`ResourceProvider`] after substituting attribute tokens from the outputs
//! recorded in [`ApplyState`].
//!
//! A node whose resolved spec fingerprints the same as its state entry is
//! `Unchanged` and the provider is not called. The first failure halts the
//! run; nodes applied before it stay recorded, nothing is rolled back. State
//! entries with no node in the template are reported `Orphaned` and left in
//! place.
//!
//! Kinds the provider does not handle belong to the deployment engine. Their
//! outputs must already be in the state (see [`ApplyState::import_outputs`]);
//! such nodes are reported `External` and only feed token resolution.
//! Issuer outputs are checked as soon as they are recorded, so a malformed
//! value stops the run before any role trusting it is applied.

pub mod kube;
pub mod provider;
pub mod state;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use trellis_common::kube_utils::deterministic_hash;
use trellis_common::resource::{resolve_value, AttributeRef, ResourceKind};
use trellis_common::{Error, NodeId, ResourceNode, Result};

use crate::irsa::check_issuer_value;
use crate::stack::Template;

pub use self::kube::KubeProvider;
pub use provider::{DryRunProvider, ResolvedNode, ResourceProvider};
pub use state::{ApplyState, EngineOutputs, StateEntry, EXTERNAL_FINGERPRINT};

/// What happened (or would happen) to a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOutcome {
    /// No state entry existed
    Created,
    /// State entry existed with a different fingerprint
    Updated,
    /// Fingerprint matched, provider not called
    Unchanged,
    /// Applied by the deployment engine, outputs taken from state
    External,
    /// In state but absent from the template
    Orphaned,
}

/// Outcome of one node
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeReport {
    /// Node id
    pub id: NodeId,
    /// Outcome
    pub outcome: NodeOutcome,
}

/// Per-node outcomes in apply order, orphans last
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    /// Outcomes
    pub nodes: Vec<NodeReport>,
}

impl ApplyReport {
    fn record(&mut self, id: &NodeId, outcome: NodeOutcome) {
        self.nodes.push(NodeReport {
            id: id.clone(),
            outcome,
        });
    }

    /// Outcome of `id`, if it was reached
    pub fn outcome_of(&self, id: &str) -> Option<NodeOutcome> {
        self.nodes
            .iter()
            .find(|n| n.id.as_str() == id)
            .map(|n| n.outcome)
    }

    /// Number of nodes with `outcome`
    pub fn count(&self, outcome: NodeOutcome) -> usize {
        self.nodes.iter().filter(|n| n.outcome == outcome).count()
    }
}

/// A halted apply: the failing node, its error, and what was done before it
#[derive(Debug, Error)]
#[error("apply halted{}: {source}", .node.as_ref().map(|n| format!(" at {}", n)).unwrap_or_default())]
pub struct ApplyFailure {
    /// Node that failed, `None` if the run never started
    pub node: Option<NodeId>,
    /// Underlying error
    pub source: Error,
    /// Outcomes of the nodes applied before the failure
    pub report: ApplyReport,
}

/// Drives a provider through a template
pub struct Applier<P> {
    provider: P,
}

impl<P: ResourceProvider> Applier<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Predict outcomes without calling the provider.
    ///
    /// Nodes whose tokens wait on outputs not yet recorded are reported
    /// `Created` or `Updated` depending on whether they have an entry. Any
    /// other resolution error is returned.
    pub fn plan(&self, template: &Template, state: &ApplyState) -> Result<ApplyReport> {
        state.check_owner(&template.deployment_id)?;
        let mut report = ApplyReport::default();
        for node in &template.nodes {
            let outcome = if !self.provider.handles(node.kind()) {
                match state.entry(node.id.as_str()) {
                    Some(_) => NodeOutcome::External,
                    None => NodeOutcome::Created,
                }
            } else {
                match resolve(node, state) {
                    Ok(resolved) => classify(state, &node.id, &fingerprint(&resolved)?),
                    Err(Error::Dependency { .. }) if state.entry(node.id.as_str()).is_some() => {
                        NodeOutcome::Updated
                    }
                    Err(Error::Dependency { .. }) => NodeOutcome::Created,
                    Err(e) => return Err(e),
                }
            };
            report.record(&node.id, outcome);
        }
        for id in orphans(template, state) {
            report.record(&id, NodeOutcome::Orphaned);
        }
        Ok(report)
    }

    /// Apply every node in template order, recording outputs in `state`
    pub async fn apply(
        &self,
        template: &Template,
        state: &mut ApplyState,
    ) -> std::result::Result<ApplyReport, ApplyFailure> {
        let mut report = ApplyReport::default();
        if let Err(source) = state.claim(&template.deployment_id) {
            return Err(ApplyFailure {
                node: None,
                source,
                report,
            });
        }

        for node in &template.nodes {
            match self.apply_node(node, state).await {
                Ok(outcome) => report.record(&node.id, outcome),
                Err(source) => {
                    warn!(node = %node.id, error = %source, "apply halted");
                    return Err(ApplyFailure {
                        node: Some(node.id.clone()),
                        source,
                        report,
                    });
                }
            }
        }

        for id in orphans(template, state) {
            warn!(node = %id, "state entry has no node in the template, leaving it in place");
            report.record(&id, NodeOutcome::Orphaned);
        }

        info!(
            created = report.count(NodeOutcome::Created),
            updated = report.count(NodeOutcome::Updated),
            unchanged = report.count(NodeOutcome::Unchanged),
            external = report.count(NodeOutcome::External),
            orphaned = report.count(NodeOutcome::Orphaned),
            "apply complete"
        );
        Ok(report)
    }

    async fn apply_node(&self, node: &ResourceNode, state: &mut ApplyState) -> Result<NodeOutcome> {
        let kind = node.kind();
        if !self.provider.handles(kind) {
            let entry = state.entry(node.id.as_str()).ok_or_else(|| {
                Error::dependency(
                    node.id.as_str(),
                    format!(
                        "{} is applied by the deployment engine; import its outputs first",
                        kind
                    ),
                )
            })?;
            check_outputs(&node.id, kind, &entry.outputs)?;
            debug!(node = %node.id, "recorded by the deployment engine");
            return Ok(NodeOutcome::External);
        }

        let resolved = resolve(node, state)?;
        let fingerprint = fingerprint(&resolved)?;
        let outcome = classify(state, &node.id, &fingerprint);
        if outcome == NodeOutcome::Unchanged {
            if let Some(entry) = state.entry(node.id.as_str()) {
                check_outputs(&node.id, kind, &entry.outputs)?;
            }
            debug!(node = %node.id, "unchanged");
            return Ok(outcome);
        }

        let outputs = self.provider.apply(&resolved).await?;
        check_outputs(&node.id, kind, &outputs)?;
        info!(node = %node.id, kind = %resolved.kind, outcome = ?outcome, "applied");
        state.resources.insert(
            node.id.clone(),
            StateEntry {
                kind: resolved.kind,
                fingerprint,
                outputs,
            },
        );
        Ok(outcome)
    }
}

/// Substitute every token in the node's properties from recorded outputs
fn resolve(node: &ResourceNode, state: &ApplyState) -> Result<ResolvedNode> {
    let lookup = |r: &AttributeRef| {
        state
            .output(r.node.as_str(), &r.attribute)
            .map(String::from)
            .ok_or_else(|| {
                Error::dependency(
                    node.id.as_str(),
                    format!("{} has no recorded output", r),
                )
            })
    };
    let properties = resolve_value(&node.spec.properties()?, &lookup)?;
    Ok(ResolvedNode {
        id: node.id.clone(),
        kind: node.kind(),
        properties,
    })
}

/// Reject recorded outputs that later nodes cannot use.
///
/// Cluster and OIDC provider issuers end up in every workload role's trust
/// policy.
pub(crate) fn check_outputs(
    id: &NodeId,
    kind: ResourceKind,
    outputs: &BTreeMap<String, String>,
) -> Result<()> {
    let attribute = match kind {
        ResourceKind::Cluster => "oidcIssuer",
        ResourceKind::OidcProvider => "issuer",
        _ => return Ok(()),
    };
    match outputs.get(attribute) {
        Some(issuer) => check_issuer_value(id.as_str(), issuer),
        None => Ok(()),
    }
}

fn fingerprint(node: &ResolvedNode) -> Result<String> {
    fingerprint_of(node.kind, &node.properties)
}

fn fingerprint_of(kind: ResourceKind, properties: &Value) -> Result<String> {
    let body = serde_json::to_string(properties)?;
    Ok(deterministic_hash(&format!("{}:{}", kind, body)))
}

fn classify(state: &ApplyState, id: &NodeId, fingerprint: &str) -> NodeOutcome {
    match state.entry(id.as_str()) {
        None => NodeOutcome::Created,
        Some(entry) if entry.fingerprint == fingerprint => NodeOutcome::Unchanged,
        Some(_) => NodeOutcome::Updated,
    }
}

fn orphans(template: &Template, state: &ApplyState) -> Vec<NodeId> {
    let declared: HashSet<&str> = template.nodes.iter().map(|n| n.id.as_str()).collect();
    state
        .resources
        .keys()
        .filter(|id| !declared.contains(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::Stack;
    use provider::MockResourceProvider;
    use trellis_common::aws::Bucket;
    use trellis_common::ResourceSpec;

    fn template() -> Template {
        let fixture = Fixture::default();
        Stack::synthesize(&fixture.config, &fixture.deployment).unwrap()
    }

    fn placeholder_outputs(node: &ResolvedNode) -> BTreeMap<String, String> {
        node.kind
            .attributes()
            .iter()
            .map(|a| (a.to_string(), format!("{}.{}", node.id, a)))
            .collect()
    }

    /// Outputs for every cloud-side node, as the deployment engine reports them
    fn engine_outputs(template: &Template) -> EngineOutputs {
        template
            .nodes
            .iter()
            .filter(|n| !n.kind().is_cluster_side())
            .map(|n| {
                let outputs = n
                    .kind()
                    .attributes()
                    .iter()
                    .map(|a| (a.to_string(), format!("{}.{}", n.id, a)))
                    .collect();
                (n.id.clone(), outputs)
            })
            .collect()
    }

    #[tokio::test]
    async fn first_apply_creates_every_node() {
        let template = template();
        let applier = Applier::new(DryRunProvider::new());
        let mut state = ApplyState::default();

        let report = applier.apply(&template, &mut state).await.unwrap();
        assert_eq!(report.count(NodeOutcome::Created), template.nodes.len());
        assert_eq!(state.resources.len(), template.nodes.len());
        assert_eq!(
            state.deployment_id.as_deref(),
            Some(template.deployment_id.as_str())
        );

        let called: Vec<_> = applier.provider().calls();
        let order: Vec<_> = template.nodes.iter().map(|n| n.id.clone()).collect();
        assert_eq!(called, order);
    }

    #[tokio::test]
    async fn tokens_are_resolved_before_the_provider_sees_them() {
        let template = template();
        let mut provider = MockResourceProvider::new();
        provider.expect_handles().return_const(true);
        provider.expect_apply().returning(|node| {
            if node.id.as_str() == "cluster/control-plane" {
                assert_eq!(node.properties["subnetIds"], "network/vpc.privateSubnetIds");
            }
            let text = node.properties.to_string();
            assert!(!text.contains("${"), "unresolved token in {}", node.id);
            Ok(placeholder_outputs(node))
        });
        let mut state = ApplyState::default();
        Applier::new(provider)
            .apply(&template, &mut state)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failure_halts_and_keeps_earlier_entries() {
        let template = template();
        let failing = "cluster/control-plane";
        let mut provider = MockResourceProvider::new();
        provider.expect_handles().return_const(true);
        provider.expect_apply().returning(move |node| {
            if node.id.as_str() == failing {
                return Err(Error::provider(node.id.as_str(), "quota exceeded"));
            }
            Ok(placeholder_outputs(node))
        });

        let mut state = ApplyState::default();
        let failure = Applier::new(provider)
            .apply(&template, &mut state)
            .await
            .unwrap_err();

        assert_eq!(failure.node.as_ref().map(NodeId::as_str), Some(failing));
        let position = template
            .nodes
            .iter()
            .position(|n| n.id.as_str() == failing)
            .unwrap();
        assert_eq!(failure.report.nodes.len(), position);
        assert_eq!(state.resources.len(), position);
        assert!(state.entry(failing).is_none());
        assert!(failure.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn orphans_are_reported_not_deleted() {
        let template = template();
        let applier = Applier::new(DryRunProvider::new());
        let mut state = ApplyState::default();
        state.resources.insert(
            NodeId::from("storage/retired/bucket"),
            StateEntry {
                kind: ResourceKind::Bucket,
                fingerprint: "0000000000000000".to_string(),
                outputs: BTreeMap::new(),
            },
        );

        let report = applier.apply(&template, &mut state).await.unwrap();
        assert_eq!(
            report.outcome_of("storage/retired/bucket"),
            Some(NodeOutcome::Orphaned)
        );
        assert!(state.entry("storage/retired/bucket").is_some());
    }

    #[tokio::test]
    async fn state_from_another_deployment_is_rejected() {
        let template = template();
        let applier = Applier::new(DryRunProvider::new());
        let mut state = ApplyState {
            deployment_id: Some("someone-else".to_string()),
            ..ApplyState::default()
        };
        let failure = applier.apply(&template, &mut state).await.unwrap_err();
        assert!(failure.node.is_none());
        assert!(matches!(failure.source, Error::Validation { .. }));
        assert!(applier.provider().calls().is_empty());
        assert!(applier.plan(&template, &state).is_err());
    }

    #[tokio::test]
    async fn plan_matches_apply() {
        let template = template();
        let applier = Applier::new(DryRunProvider::new());
        let mut state = ApplyState::default();

        let planned = applier.plan(&template, &state).unwrap();
        assert_eq!(planned.count(NodeOutcome::Created), template.nodes.len());

        applier.apply(&template, &mut state).await.unwrap();
        let replanned = applier.plan(&template, &state).unwrap();
        assert_eq!(replanned.count(NodeOutcome::Unchanged), template.nodes.len());
    }

    /// Story: the deployment engine has created the cloud resources and its
    /// outputs were imported; an in-cluster apply adopts them and reaches
    /// every manifest behind them
    #[tokio::test]
    async fn engine_recorded_nodes_are_adopted() {
        let template = template();
        let cluster_side = template
            .nodes
            .iter()
            .filter(|n| n.kind().is_cluster_side())
            .count();

        let mut provider = MockResourceProvider::new();
        provider
            .expect_handles()
            .returning(|kind| kind.is_cluster_side());
        provider
            .expect_apply()
            .times(cluster_side)
            .returning(|node| {
                assert!(node.kind.is_cluster_side(), "{} reached the provider", node.id);
                Ok(placeholder_outputs(node))
            });

        let mut state = ApplyState::default();
        state
            .import_outputs(&template, engine_outputs(&template))
            .unwrap();
        let applier = Applier::new(provider);

        let planned = applier.plan(&template, &state).unwrap();
        assert_eq!(planned.count(NodeOutcome::Created), cluster_side);

        let report = applier.apply(&template, &mut state).await.unwrap();
        assert_eq!(report.count(NodeOutcome::Created), cluster_side);
        assert_eq!(
            report.count(NodeOutcome::External),
            template.nodes.len() - cluster_side
        );
        assert_eq!(
            report.outcome_of("mesh/load-balancer-domain"),
            Some(NodeOutcome::Created)
        );
        assert_eq!(
            state.output("mesh/load-balancer-domain", "value"),
            Some("mesh/load-balancer-domain.value")
        );
        assert_eq!(
            state.entry("network/vpc").unwrap().fingerprint,
            EXTERNAL_FINGERPRINT
        );
    }

    #[tokio::test]
    async fn engine_node_without_imported_outputs_halts() {
        let template = template();
        let mut provider = MockResourceProvider::new();
        provider
            .expect_handles()
            .returning(|kind| kind.is_cluster_side());
        provider.expect_apply().never();

        let mut state = ApplyState::default();
        let failure = Applier::new(provider)
            .apply(&template, &mut state)
            .await
            .unwrap_err();
        assert_eq!(failure.node.as_ref().map(NodeId::as_str), Some("network/vpc"));
        assert!(matches!(failure.source, Error::Dependency { .. }));
        assert!(failure.source.to_string().contains("import its outputs"));
    }

    /// Story: the provider reports the issuer as a URL; the run stops at the
    /// OIDC provider instead of applying roles whose trust nobody satisfies
    #[tokio::test]
    async fn issuer_with_scheme_halts_before_any_role() {
        let template = template();
        let mut provider = MockResourceProvider::new();
        provider.expect_handles().return_const(true);
        provider.expect_apply().returning(|node| {
            let mut outputs = placeholder_outputs(node);
            if node.kind == ResourceKind::OidcProvider {
                outputs.insert(
                    "issuer".to_string(),
                    "https://oidc.eks.us-east-1.amazonaws.com/id/ABC".to_string(),
                );
            }
            Ok(outputs)
        });

        let mut state = ApplyState::default();
        let failure = Applier::new(provider)
            .apply(&template, &mut state)
            .await
            .unwrap_err();
        assert_eq!(
            failure.node.as_ref().map(NodeId::as_str),
            Some("cluster/oidc-provider")
        );
        assert!(matches!(failure.source, Error::Validation { .. }));
        assert!(state.entry("cluster/oidc-provider").is_none());
        assert!(!state.resources.keys().any(|id| id.scope() == crate::irsa::SCOPE));
    }

    #[tokio::test]
    async fn imported_issuer_is_checked_again_on_apply() {
        let template = template();
        let mut provider = MockResourceProvider::new();
        provider
            .expect_handles()
            .returning(|kind| kind.is_cluster_side());
        provider.expect_apply().never();

        let mut state = ApplyState::default();
        state
            .import_outputs(&template, engine_outputs(&template))
            .unwrap();
        if let Some(entry) = state.resources.get_mut("cluster/oidc-provider") {
            entry.outputs.insert(
                "issuer".to_string(),
                "https://oidc.eks.us-east-1.amazonaws.com/id/ABC".to_string(),
            );
        }

        let failure = Applier::new(provider)
            .apply(&template, &mut state)
            .await
            .unwrap_err();
        assert_eq!(
            failure.node.as_ref().map(NodeId::as_str),
            Some("cluster/oidc-provider")
        );
        assert!(matches!(failure.source, Error::Validation { .. }));
    }

    #[test]
    fn plan_returns_malformed_token_errors() {
        let template = Template {
            deployment_id: "d6d9a".to_string(),
            nodes: vec![ResourceNode::new(
                "storage/broken-bucket",
                ResourceSpec::Bucket(Bucket::private("${storage/envoy-config-bucket")),
            )],
            outputs: BTreeMap::new(),
        };
        let err = Applier::new(DryRunProvider::new())
            .plan(&template, &ApplyState::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn fingerprint_depends_on_kind_and_properties() {
        let props = serde_json::json!({ "name": "a" });
        let a = fingerprint_of(ResourceKind::Bucket, &props).unwrap();
        assert_eq!(a, fingerprint_of(ResourceKind::Bucket, &props).unwrap());
        assert_ne!(a, fingerprint_of(ResourceKind::Table, &props).unwrap());
        assert_ne!(
            a,
            fingerprint_of(ResourceKind::Bucket, &serde_json::json!({ "name": "b" })).unwrap()
        );
        assert_eq!(a.len(), 16);
    }
}
