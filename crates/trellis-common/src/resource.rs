//! Resource nodes, typed specs and attribute tokens
//!
//! A node's spec may embed values only known after another node has been
//! applied (a VPC id, the cluster's OIDC issuer, a role ARN). These are
//! written as attribute tokens, `${<node-id>.<attribute>}`, and substituted
//! by the apply engine from the outputs recorded for the referenced node.
//! Tokens may appear in any string and in object keys (trust-policy
//! condition keys embed the issuer).

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::aws::{
    AccessEntry, BuildProject, Bucket, Cluster, ManagedPolicy, Network, NetworkLookup, Nodegroup,
    OidcProvider, Role, Table, UserPool, UserPoolClient, UserPoolDomain,
};
use crate::manifests::{HelmRelease, Manifest, ServiceAccount};
use crate::{Error, Result};

/// Unique node identifier, `scope/logical-id`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Build an id from a scope and a logical id within it
    pub fn new(scope: &str, logical_id: &str) -> Self {
        Self(format!("{}/{}", scope, logical_id))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading scope segment
    pub fn scope(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// Token referencing `attribute` of this node
    pub fn attr(&self, attribute: &str) -> String {
        format!("${{{}.{}}}", self.0, attribute)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A parsed `${node.attribute}` token
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttributeRef {
    /// Referenced node
    pub node: NodeId,
    /// Attribute of that node
    pub attribute: String,
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.attribute)
    }
}

/// Split `s` into literal text and token references.
fn scan(s: &str) -> std::result::Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let body = &rest[start + 2..];
        let end = body
            .find('}')
            .ok_or_else(|| format!("unterminated attribute token in '{}'", s))?;
        let inner = &body[..end];
        let (node, attribute) = inner
            .rsplit_once('.')
            .filter(|(n, a)| !n.is_empty() && !a.is_empty())
            .ok_or_else(|| format!("malformed attribute token '${{{}}}'", inner))?;
        segments.push(Segment::Token(AttributeRef {
            node: NodeId::from(node),
            attribute: attribute.to_string(),
        }));
        rest = &body[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

enum Segment<'a> {
    Literal(&'a str),
    Token(AttributeRef),
}

/// Every token referenced in `value`, keys included, in document order
pub fn collect_tokens(value: &Value) -> std::result::Result<Vec<AttributeRef>, String> {
    fn from_str(s: &str, out: &mut Vec<AttributeRef>) -> std::result::Result<(), String> {
        for segment in scan(s)? {
            if let Segment::Token(r) = segment {
                out.push(r);
            }
        }
        Ok(())
    }
    fn walk(value: &Value, out: &mut Vec<AttributeRef>) -> std::result::Result<(), String> {
        match value {
            Value::String(s) => from_str(s, out),
            Value::Array(items) => items.iter().try_for_each(|v| walk(v, out)),
            Value::Object(map) => map.iter().try_for_each(|(k, v)| {
                from_str(k, out)?;
                walk(v, out)
            }),
            _ => Ok(()),
        }
    }
    let mut out = Vec::new();
    walk(value, &mut out)?;
    Ok(out)
}

/// Substitute every token in `s` using `lookup`
pub fn substitute<F>(s: &str, lookup: &F) -> Result<String>
where
    F: Fn(&AttributeRef) -> Result<String>,
{
    let mut out = String::with_capacity(s.len());
    for segment in scan(s).map_err(Error::validation)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Token(r) => out.push_str(&lookup(&r)?),
        }
    }
    Ok(out)
}

/// Substitute tokens throughout a JSON value, keys included
pub fn resolve_value<F>(value: &Value, lookup: &F) -> Result<Value>
where
    F: Fn(&AttributeRef) -> Result<String>,
{
    Ok(match value {
        Value::String(s) => Value::String(substitute(s, lookup)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value(v, lookup))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(substitute(k, lookup)?, resolve_value(v, lookup)?);
            }
            Value::Object(resolved)
        }
        other => other.clone(),
    })
}

/// Read of a live cluster object field, exposed as a stack output
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Exported output name
    pub export_name: String,
    /// Object apiVersion
    pub api_version: String,
    /// Object kind
    pub kind: String,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
    /// kubectl-style field path
    pub json_path: String,
    /// Give up after this long
    pub timeout_seconds: u64,
    /// Delay between reads
    pub poll_interval_seconds: u64,
}

/// Kind of a resource node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// New network
    Network,
    /// Existing network reference
    NetworkLookup,
    /// Control plane
    Cluster,
    /// Access entry
    AccessEntry,
    /// OIDC identity provider
    OidcProvider,
    /// Node group
    Nodegroup,
    /// IAM role
    Role,
    /// Managed IAM policy
    ManagedPolicy,
    /// Object storage bucket
    Bucket,
    /// Key-value table
    Table,
    /// Identity directory
    UserPool,
    /// Identity directory app client
    UserPoolClient,
    /// Hosted login domain
    UserPoolDomain,
    /// Kubernetes service account
    ServiceAccount,
    /// Helm chart release
    HelmRelease,
    /// Kubernetes manifest
    Manifest,
    /// CI build project
    BuildProject,
    /// Live-state output
    Output,
}

impl ResourceKind {
    /// Name used in templates and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "Network",
            ResourceKind::NetworkLookup => "NetworkLookup",
            ResourceKind::Cluster => "Cluster",
            ResourceKind::AccessEntry => "AccessEntry",
            ResourceKind::OidcProvider => "OidcProvider",
            ResourceKind::Nodegroup => "Nodegroup",
            ResourceKind::Role => "Role",
            ResourceKind::ManagedPolicy => "ManagedPolicy",
            ResourceKind::Bucket => "Bucket",
            ResourceKind::Table => "Table",
            ResourceKind::UserPool => "UserPool",
            ResourceKind::UserPoolClient => "UserPoolClient",
            ResourceKind::UserPoolDomain => "UserPoolDomain",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::HelmRelease => "HelmRelease",
            ResourceKind::Manifest => "Manifest",
            ResourceKind::BuildProject => "BuildProject",
            ResourceKind::Output => "Output",
        }
    }

    /// Attributes a node of this kind exposes once applied
    pub fn attributes(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Network | ResourceKind::NetworkLookup => {
                &["vpcId", "publicSubnetIds", "privateSubnetIds"]
            }
            ResourceKind::Cluster => &["name", "arn", "endpoint", "oidcIssuer", "securityGroupId"],
            ResourceKind::AccessEntry => &["accessEntryArn"],
            ResourceKind::OidcProvider => &["arn", "issuer"],
            ResourceKind::Nodegroup => &["name", "arn"],
            ResourceKind::Role => &["name", "arn"],
            ResourceKind::ManagedPolicy => &["arn"],
            ResourceKind::Bucket | ResourceKind::Table => &["name", "arn"],
            ResourceKind::UserPool => &["id", "arn", "providerUrl"],
            ResourceKind::UserPoolClient => &["id"],
            ResourceKind::UserPoolDomain => &["domain"],
            ResourceKind::ServiceAccount => &["name"],
            ResourceKind::HelmRelease => &["release"],
            ResourceKind::Manifest => &["name"],
            ResourceKind::BuildProject => &["name", "arn", "roleArn"],
            ResourceKind::Output => &["value"],
        }
    }

    /// Kinds realized inside the cluster (everything else is cloud-side)
    pub fn is_cluster_side(&self) -> bool {
        matches!(
            self,
            ResourceKind::ServiceAccount | ResourceKind::Manifest | ResourceKind::Output
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a node, one typed variant per kind
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type", content = "properties")]
pub enum ResourceSpec {
    /// New network
    Network(Network),
    /// Existing network reference
    NetworkLookup(NetworkLookup),
    /// Control plane
    Cluster(Cluster),
    /// Access entry
    AccessEntry(AccessEntry),
    /// OIDC identity provider
    OidcProvider(OidcProvider),
    /// Node group
    Nodegroup(Nodegroup),
    /// IAM role
    Role(Role),
    /// Managed IAM policy
    ManagedPolicy(ManagedPolicy),
    /// Object storage bucket
    Bucket(Bucket),
    /// Key-value table
    Table(Table),
    /// Identity directory
    UserPool(UserPool),
    /// Identity directory app client
    UserPoolClient(UserPoolClient),
    /// Hosted login domain
    UserPoolDomain(UserPoolDomain),
    /// Kubernetes service account
    ServiceAccount(ServiceAccount),
    /// Helm chart release
    HelmRelease(HelmRelease),
    /// Kubernetes manifest
    Manifest(Manifest),
    /// CI build project
    BuildProject(BuildProject),
    /// Live-state output
    Output(OutputSpec),
}

impl ResourceSpec {
    /// Kind of this spec
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::NetworkLookup(_) => ResourceKind::NetworkLookup,
            ResourceSpec::Cluster(_) => ResourceKind::Cluster,
            ResourceSpec::AccessEntry(_) => ResourceKind::AccessEntry,
            ResourceSpec::OidcProvider(_) => ResourceKind::OidcProvider,
            ResourceSpec::Nodegroup(_) => ResourceKind::Nodegroup,
            ResourceSpec::Role(_) => ResourceKind::Role,
            ResourceSpec::ManagedPolicy(_) => ResourceKind::ManagedPolicy,
            ResourceSpec::Bucket(_) => ResourceKind::Bucket,
            ResourceSpec::Table(_) => ResourceKind::Table,
            ResourceSpec::UserPool(_) => ResourceKind::UserPool,
            ResourceSpec::UserPoolClient(_) => ResourceKind::UserPoolClient,
            ResourceSpec::UserPoolDomain(_) => ResourceKind::UserPoolDomain,
            ResourceSpec::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ResourceSpec::HelmRelease(_) => ResourceKind::HelmRelease,
            ResourceSpec::Manifest(_) => ResourceKind::Manifest,
            ResourceSpec::BuildProject(_) => ResourceKind::BuildProject,
            ResourceSpec::Output(_) => ResourceKind::Output,
        }
    }

    /// Serialize the variant's properties (the part handed to a provider)
    pub fn properties(&self) -> Result<Value> {
        let mut tagged = serde_json::to_value(self)
            .map_err(|e| Error::serialization_for_kind(self.kind().as_str(), e.to_string()))?;
        Ok(tagged
            .get_mut("properties")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

/// A declared resource with its explicit predecessors
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    /// Unique id
    pub id: NodeId,
    /// Nodes that must be applied first, in declaration order, no duplicates
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<NodeId>,
    /// Desired state
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

impl ResourceNode {
    /// A node with no dependencies
    pub fn new(id: impl Into<NodeId>, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            spec,
        }
    }

    /// Add a predecessor (ignored if already present)
    pub fn after(mut self, dependency: &NodeId) -> Self {
        self.add_dependency(dependency.clone());
        self
    }

    /// Add several predecessors
    pub fn after_all<'a>(mut self, dependencies: impl IntoIterator<Item = &'a NodeId>) -> Self {
        for dep in dependencies {
            self.add_dependency(dep.clone());
        }
        self
    }

    pub(crate) fn add_dependency(&mut self, dependency: NodeId) {
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
    }

    /// Kind of this node
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Tokens embedded in the spec
    pub fn references(&self) -> Result<Vec<AttributeRef>> {
        collect_tokens(&self.spec.properties()?)
            .map_err(|message| Error::validation_for(self.id.as_str(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::NetworkLookup;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup_from(map: HashMap<&'static str, &'static str>) -> impl Fn(&AttributeRef) -> Result<String> {
        move |r: &AttributeRef| {
            map.get(r.to_string().as_str())
                .map(|v| v.to_string())
                .ok_or_else(|| Error::dependency(r.node.as_str(), "missing"))
        }
    }

    #[test]
    fn node_id_helpers() {
        let id = NodeId::new("cluster", "oidc-provider");
        assert_eq!(id.as_str(), "cluster/oidc-provider");
        assert_eq!(id.scope(), "cluster");
        assert_eq!(id.attr("issuer"), "${cluster/oidc-provider.issuer}");
    }

    #[test]
    fn collects_tokens_from_values_and_keys() {
        let value = json!({
            "${cluster/oidc-provider.issuer}:sub": "system:serviceaccount:a:b",
            "list": ["x", "${network/vpc.vpcId}-suffix"],
            "n": 3
        });
        let refs = collect_tokens(&value).unwrap();
        let rendered: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert!(rendered.contains(&"cluster/oidc-provider.issuer".to_string()));
        assert!(rendered.contains(&"network/vpc.vpcId".to_string()));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn tenant_scoped_ids_split_on_last_dot() {
        let refs = collect_tokens(&json!("${storage/tenanta/bucket.arn}/*")).unwrap();
        assert_eq!(refs[0].node.as_str(), "storage/tenanta/bucket");
        assert_eq!(refs[0].attribute, "arn");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(collect_tokens(&json!("${unterminated")).is_err());
        assert!(collect_tokens(&json!("${noattribute}")).is_err());
        assert!(collect_tokens(&json!("${node.}")).is_err());
    }

    #[test]
    fn resolves_tokens_in_keys_and_values() {
        let lookup = lookup_from(HashMap::from([
            ("cluster/oidc-provider.issuer", "oidc.example/id/1"),
            ("network/vpc.vpcId", "vpc-1"),
        ]));
        let resolved = resolve_value(
            &json!({
                "${cluster/oidc-provider.issuer}:aud": "sts.amazonaws.com",
                "vpc": "${network/vpc.vpcId}"
            }),
            &lookup,
        )
        .unwrap();
        assert_eq!(
            resolved,
            json!({ "oidc.example/id/1:aud": "sts.amazonaws.com", "vpc": "vpc-1" })
        );
    }

    #[test]
    fn resolution_fails_on_unknown_reference() {
        let lookup = lookup_from(HashMap::new());
        let err = substitute("${network/vpc.vpcId}", &lookup).unwrap_err();
        assert!(matches!(err, Error::Dependency { .. }));
    }

    #[test]
    fn node_serializes_in_template_format() {
        let vpc = NodeId::from("network/vpc");
        let node = ResourceNode::new(
            "network/vpc-lookup",
            ResourceSpec::NetworkLookup(NetworkLookup {
                vpc_id: "vpc-1".to_string(),
            }),
        )
        .after(&vpc)
        .after(&vpc);
        assert_eq!(node.depends_on.len(), 1);

        let doc = serde_json::to_value(&node).unwrap();
        assert_eq!(
            doc,
            json!({
                "id": "network/vpc-lookup",
                "dependsOn": ["network/vpc"],
                "type": "NetworkLookup",
                "properties": { "vpcId": "vpc-1" }
            })
        );
        assert_eq!(node.kind(), ResourceKind::NetworkLookup);
        assert!(!node.kind().is_cluster_side());
    }
}
