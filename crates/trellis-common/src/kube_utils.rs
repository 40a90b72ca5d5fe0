//! Shared Kubernetes utilities using kube-rs
//!
//! Typed manifests are serialized to JSON documents and applied with
//! server-side apply through `Api<DynamicObject>`, so no kubectl binary is
//! needed. Also hosts the polling helper used by readiness waits and the
//! hashing helpers used for deployment ids and fingerprints.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{Error, Result};

// =============================================================================
// ObjectMeta - metadata for typed manifests
// =============================================================================

/// Kubernetes metadata for typed manifests.
///
/// Adds the standard name and managed-by labels on construction. Cluster
/// scoped resources (ClusterIssuer) carry no namespace.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace, `None` for cluster-scoped resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Metadata for a namespaced resource
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut meta = Self::cluster_scoped(name);
        meta.namespace = Some(namespace.into());
        meta
    }

    /// Metadata for a cluster-scoped resource
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(crate::LABEL_NAME.to_string(), name.clone());
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_TRELLIS.to_string(),
        );
        Self {
            name,
            namespace: None,
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ApiResource building
// =============================================================================

/// Types with a compile-time known API version and kind.
pub trait HasApiResource {
    /// Full API version (e.g., "cert-manager.io/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "ClusterIssuer")
    const KIND: &'static str;
}

/// Build an ApiResource from an explicit apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version); core types have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

const KIND_PLURALS: &[(&str, &str)] = &[
    ("certificate", "certificates"),
    ("clusterissuer", "clusterissuers"),
    ("envoyfilter", "envoyfilters"),
    ("issuer", "issuers"),
    ("service", "services"),
    ("serviceaccount", "serviceaccounts"),
];

/// Pluralize a Kubernetes resource kind
///
/// Known kinds come from a lookup table, anything else falls back to simple
/// English pluralization.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Client and apply
// =============================================================================

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from an optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Identity of a manifest document extracted before applying it
#[derive(Clone, Debug)]
pub struct ManifestMetadata {
    /// API resource derived from apiVersion and kind
    pub api_resource: ApiResource,
    /// metadata.name
    pub name: String,
    /// metadata.namespace, if namespaced
    pub namespace: Option<String>,
}

/// Extract apiVersion, kind, name and namespace from a manifest document
pub fn parse_manifest(document: &Value) -> Result<ManifestMetadata> {
    let field = |pointer: &str| document.pointer(pointer).and_then(Value::as_str);

    let api_version = field("/apiVersion").ok_or_else(|| {
        Error::internal_with_context("parse_manifest", "manifest missing apiVersion")
    })?;
    let kind = field("/kind")
        .ok_or_else(|| Error::internal_with_context("parse_manifest", "manifest missing kind"))?;
    let name = field("/metadata/name").ok_or_else(|| {
        Error::internal_with_context("parse_manifest", "manifest missing metadata.name")
    })?;

    Ok(ManifestMetadata {
        api_resource: build_api_resource(api_version, kind),
        name: name.to_string(),
        namespace: field("/metadata/namespace").map(String::from),
    })
}

fn dynamic_api(client: &Client, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, ar),
        None => Api::all_with(client.clone(), ar),
    }
}

/// Server-side apply a manifest document, returning its metadata
pub async fn apply_document(client: &Client, document: &Value) -> Result<ManifestMetadata> {
    let metadata = parse_manifest(document)?;
    let params = PatchParams::apply(crate::FIELD_MANAGER).force();
    let api = dynamic_api(client, &metadata.api_resource, metadata.namespace.as_deref());

    api.patch(&metadata.name, &params, &Patch::Apply(document))
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "apply_document",
                format!(
                    "failed to apply {}/{}: {}",
                    metadata.api_resource.kind, metadata.name, e
                ),
            )
        })?;

    info!(
        kind = %metadata.api_resource.kind,
        name = %metadata.name,
        namespace = ?metadata.namespace,
        "applied manifest"
    );
    Ok(metadata)
}

/// Fetch an object as JSON, `None` if it does not exist
pub async fn get_object(
    client: &Client,
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<Value>> {
    let ar = build_api_resource(api_version, kind);
    let api = dynamic_api(client, &ar, namespace);
    match api.get_opt(name).await? {
        Some(obj) => Ok(Some(serde_json::to_value(&obj)?)),
        None => Ok(None),
    }
}

/// Evaluate a kubectl-style field path such as
/// `.status.loadBalancer.ingress[0].hostname`.
///
/// Supports dotted fields and numeric indexes; returns `None` if any segment
/// is missing.
pub fn json_path_get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.trim_start_matches('.').split('.') {
        if segment.is_empty() {
            continue;
        }
        let (field, indexes) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !field.is_empty() {
            current = current.get(field)?;
        }
        for index in indexes.split('[').filter(|s| !s.is_empty()) {
            let index: usize = index.strip_suffix(']')?.parse().ok()?;
            current = current.get(index)?;
        }
    }
    Some(current)
}

// =============================================================================
// Polling
// =============================================================================

/// Result type for polling check functions.
///
/// - `Ok(Some(value))` - Condition met, return the value
/// - `Ok(None)` - Condition not met yet, keep polling
/// - `Err(e)` - Fatal error, stop polling immediately
pub type PollResult<T> = std::result::Result<Option<T>, String>;

/// Poll `check_fn` every `interval` until it yields a value or `timeout`
/// elapses.
///
/// `resource` names what is being waited for; it becomes the resource of the
/// returned `Error::Timeout` or `Error::Provider`.
pub async fn wait_with_timeout<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    resource: &str,
    mut check_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let start = Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    return Err(Error::timeout(
                        resource,
                        format!("not ready after {}s", timeout.as_secs()),
                    ));
                }
                debug!(resource = %resource, "waiting");
                tokio::time::sleep(interval).await;
            }
            Err(e) => return Err(Error::provider_permanent(resource, e)),
        }
    }
}

// =============================================================================
// Hashing
// =============================================================================

/// Full lowercase hex SHA-256 digest of the input
pub fn sha256_hex(input: &str) -> String {
    use aws_lc_rs::digest;
    use std::fmt::Write;

    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Compact 16-char digest used for persisted fingerprints.
///
/// Truncated SHA-256 so the value is stable across toolchain versions.
pub fn deterministic_hash(input: &str) -> String {
    sha256_hex(input)[..16].to_string()
}
