//! Common types for Trellis: config, errors, naming, the resource graph and
//! typed resource documents.

#![deny(missing_docs)]

pub mod aws;
pub mod config;
pub mod error;
pub mod graph;
pub mod kube_utils;
pub mod manifests;
pub mod naming;
pub mod resource;
pub mod telemetry;

pub use config::{DeploymentContext, NodeGroupSizing, SystemConfig};
pub use error::Error;
pub use graph::ResourceGraph;
pub use naming::DeploymentId;
pub use resource::{NodeId, ResourceNode, ResourceSpec};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for Kubernetes server-side apply
pub const FIELD_MANAGER: &str = "trellis";

/// Namespace of the Istio control plane
pub const ISTIO_SYSTEM_NAMESPACE: &str = "istio-system";

/// Namespace of the Istio ingress gateway
pub const ISTIO_INGRESS_NAMESPACE: &str = "istio-ingress";

/// Namespace of cert-manager and the CA certificates it stores
pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";

/// Namespace of cluster add-ons such as the load balancer controller
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Name of the ingress gateway Service (and Helm release)
pub const INGRESS_GATEWAY_NAME: &str = "istio-ingressgateway";

/// Label key for the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label key for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value identifying resources managed by Trellis
pub const LABEL_MANAGED_BY_TRELLIS: &str = "trellis";
