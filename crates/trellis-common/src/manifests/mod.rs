//! Typed Kubernetes documents applied to the cluster
//!
//! - **cert-manager**: Issuer, ClusterIssuer, Certificate
//! - **Istio**: EnvoyFilter
//! - **Core**: ServiceAccount
//! - **Helm**: chart release definitions (installed by the deployment engine)
//!
//! Every document type implements `HasApiResource`; `apiVersion` and `kind`
//! are filled in from those constants and only become JSON at the boundary.

use serde::Serialize;
use serde_json::Value;

use crate::kube_utils::{HasApiResource, ObjectMeta};
use crate::Result;

/// Implements `default_api_version()` and `default_kind()` for serde
/// defaults on types implementing `HasApiResource`.
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

pub mod cert_manager;
pub mod envoy_filter;
pub mod helm;
pub mod service_account;

pub use cert_manager::{
    Certificate, CertificateSpec, ClusterIssuer, Issuer, IssuerRef, IssuerSpec, PrivateKey,
};
pub use envoy_filter::EnvoyFilter;
pub use helm::HelmRelease;
pub use service_account::ServiceAccount;

/// A manifest applied to the cluster, one variant per document kind
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Manifest {
    /// Namespaced cert-manager issuer
    Issuer(Issuer),
    /// Cluster-scoped cert-manager issuer
    ClusterIssuer(ClusterIssuer),
    /// cert-manager certificate
    Certificate(Certificate),
    /// Istio proxy configuration patch
    EnvoyFilter(EnvoyFilter),
}

impl Manifest {
    /// Document kind
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::Issuer(_) => Issuer::KIND,
            Manifest::ClusterIssuer(_) => ClusterIssuer::KIND,
            Manifest::Certificate(_) => Certificate::KIND,
            Manifest::EnvoyFilter(_) => EnvoyFilter::KIND,
        }
    }

    /// Document metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Manifest::Issuer(m) => &m.metadata,
            Manifest::ClusterIssuer(m) => &m.metadata,
            Manifest::Certificate(m) => &m.metadata,
            Manifest::EnvoyFilter(m) => &m.metadata,
        }
    }

    /// Serialize to the JSON document sent to the API server
    pub fn to_document(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| crate::Error::serialization_for_kind(self.kind(), e.to_string()))
    }
}

impl From<Issuer> for Manifest {
    fn from(m: Issuer) -> Self {
        Manifest::Issuer(m)
    }
}

impl From<ClusterIssuer> for Manifest {
    fn from(m: ClusterIssuer) -> Self {
        Manifest::ClusterIssuer(m)
    }
}

impl From<Certificate> for Manifest {
    fn from(m: Certificate) -> Self {
        Manifest::Certificate(m)
    }
}

impl From<EnvoyFilter> for Manifest {
    fn from(m: EnvoyFilter) -> Self {
        Manifest::EnvoyFilter(m)
    }
}
