//! Istio EnvoyFilter resources for the ingress gateway
//!
//! Two patches are needed behind an external TCP load balancer speaking
//! PROXY protocol v2: listener filters that accept the PROXY header (plus TLS
//! inspection for SNI), and HTTP connection manager settings that derive the
//! client address from `X-Forwarded-For` with one trusted hop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

const PROXY_PROTOCOL_TYPE: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.proxy_protocol.v3.ProxyProtocol";
const TLS_INSPECTOR_TYPE: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";
const HTTP_CONNECTION_MANAGER_TYPE: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
/// Envoy's name for the HTTP connection manager network filter
pub const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";

/// Istio EnvoyFilter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyFilter {
    /// API version (networking.istio.io/v1alpha3)
    #[serde(default = "EnvoyFilter::default_api_version")]
    pub api_version: String,
    /// Resource kind (EnvoyFilter)
    #[serde(default = "EnvoyFilter::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Filter specification
    pub spec: EnvoyFilterSpec,
}

impl HasApiResource for EnvoyFilter {
    const API_VERSION: &'static str = "networking.istio.io/v1alpha3";
    const KIND: &'static str = "EnvoyFilter";
}

impl_api_defaults!(EnvoyFilter);

/// EnvoyFilter spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyFilterSpec {
    /// Restrict the patch to matching workloads; all proxies in the namespace otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// Patches applied in order
    pub config_patches: Vec<ConfigPatch>,
}

/// Label selector for the proxies a filter applies to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSelector {
    /// Required pod labels
    pub labels: BTreeMap<String, String>,
}

/// Part of the proxy configuration a patch targets
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyTo {
    /// Listener
    Listener,
    /// Network filter within a listener filter chain
    NetworkFilter,
}

/// Patch operation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchOperation {
    /// Merge the value into the matched object
    Merge,
}

/// One configuration patch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    /// Target object type
    pub apply_to: ApplyTo,
    /// Object selector
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_: Option<PatchMatch>,
    /// Patch payload
    pub patch: Patch,
}

/// Selects the listener object a patch applies to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatchMatch {
    /// Listener match
    pub listener: ListenerMatch,
}

/// Listener match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerMatch {
    /// Filter chain match
    pub filter_chain: FilterChainMatch,
}

/// Filter chain match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FilterChainMatch {
    /// Filter match
    pub filter: FilterMatch,
}

/// Filter match by name
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FilterMatch {
    /// Envoy filter name
    pub name: String,
}

/// Patch operation and value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    /// Operation
    pub operation: PatchOperation,
    /// Value merged into the target
    pub value: PatchValue,
}

/// Envoy configuration fragment; keys use Envoy's snake_case names
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PatchValue {
    /// Listener-level filters
    Listener {
        /// Filters run on new connections before the filter chain is chosen
        listener_filters: Vec<TypedFilter>,
    },
    /// HTTP connection manager settings
    HttpConnectionManager {
        /// Filter name
        name: String,
        /// HCM configuration
        typed_config: HcmConfig,
    },
}

/// A named filter with a typed (but empty) configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TypedFilter {
    /// Filter name
    pub name: String,
    /// Filter configuration
    pub typed_config: TypeUrl,
}

/// An `@type`-only typed configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TypeUrl {
    /// Protobuf type URL
    #[serde(rename = "@type")]
    pub type_url: String,
}

/// HTTP connection manager client-address settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HcmConfig {
    /// Protobuf type URL
    #[serde(rename = "@type")]
    pub type_url: String,
    /// Do not append the peer address to `X-Forwarded-For`
    pub skip_xff_append: bool,
    /// Use the real remote address for trust decisions
    pub use_remote_address: bool,
    /// Number of trusted proxy hops in `X-Forwarded-For`
    pub xff_num_trusted_hops: u32,
}

fn typed_filter(name: &str, type_url: &str) -> TypedFilter {
    TypedFilter {
        name: name.to_string(),
        typed_config: TypeUrl {
            type_url: type_url.to_string(),
        },
    }
}

impl EnvoyFilter {
    /// Create a new EnvoyFilter
    pub fn new(metadata: ObjectMeta, spec: EnvoyFilterSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }

    /// Accept PROXY protocol and inspect TLS on the gateway listeners
    /// selected by `istio=<gateway_label>`.
    pub fn proxy_protocol(namespace: &str, gateway_label: &str) -> Self {
        let labels = BTreeMap::from([("istio".to_string(), gateway_label.to_string())]);
        Self::new(
            ObjectMeta::new("proxy-protocol", namespace),
            EnvoyFilterSpec {
                workload_selector: Some(WorkloadSelector { labels }),
                config_patches: vec![ConfigPatch {
                    apply_to: ApplyTo::Listener,
                    match_: None,
                    patch: Patch {
                        operation: PatchOperation::Merge,
                        value: PatchValue::Listener {
                            listener_filters: vec![
                                typed_filter("proxy_protocol", PROXY_PROTOCOL_TYPE),
                                typed_filter("tls_inspector", TLS_INSPECTOR_TYPE),
                            ],
                        },
                    },
                }],
            },
        )
    }

    /// Derive the client address from `X-Forwarded-For` with
    /// `trusted_hops` trusted proxies in front of the gateway.
    pub fn forwarded_for(namespace: &str, trusted_hops: u32) -> Self {
        Self::new(
            ObjectMeta::new("ingressgateway-xff", namespace),
            EnvoyFilterSpec {
                workload_selector: None,
                config_patches: vec![ConfigPatch {
                    apply_to: ApplyTo::NetworkFilter,
                    match_: Some(PatchMatch {
                        listener: ListenerMatch {
                            filter_chain: FilterChainMatch {
                                filter: FilterMatch {
                                    name: HTTP_CONNECTION_MANAGER.to_string(),
                                },
                            },
                        },
                    }),
                    patch: Patch {
                        operation: PatchOperation::Merge,
                        value: PatchValue::HttpConnectionManager {
                            name: HTTP_CONNECTION_MANAGER.to_string(),
                            typed_config: HcmConfig {
                                type_url: HTTP_CONNECTION_MANAGER_TYPE.to_string(),
                                skip_xff_append: false,
                                use_remote_address: true,
                                xff_num_trusted_hops: trusted_hops,
                            },
                        },
                    },
                }],
            },
        )
    }
}
