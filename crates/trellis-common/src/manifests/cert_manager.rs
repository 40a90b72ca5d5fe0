//! cert-manager Issuer, ClusterIssuer and Certificate resources

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// API group of every cert-manager resource
pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// How an issuer signs certificates
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum IssuerSpec {
    /// Each certificate signs itself (used once, for a CA root)
    SelfSigned {},
    /// Sign with the CA key pair stored in a secret
    Ca {
        /// Secret holding `tls.crt` / `tls.key` of the CA
        #[serde(rename = "secretName")]
        secret_name: String,
    },
}

/// cert-manager namespaced Issuer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    /// API version (cert-manager.io/v1)
    #[serde(default = "Issuer::default_api_version")]
    pub api_version: String,
    /// Resource kind (Issuer)
    #[serde(default = "Issuer::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Signing configuration
    pub spec: IssuerSpec,
}

impl HasApiResource for Issuer {
    const API_VERSION: &'static str = "cert-manager.io/v1";
    const KIND: &'static str = "Issuer";
}

impl_api_defaults!(Issuer);

impl Issuer {
    /// Create a new Issuer
    pub fn new(metadata: ObjectMeta, spec: IssuerSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }

    /// A self-signed issuer in `namespace`
    pub fn self_signed(name: &str, namespace: &str) -> Self {
        Self::new(ObjectMeta::new(name, namespace), IssuerSpec::SelfSigned {})
    }
}

/// cert-manager ClusterIssuer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIssuer {
    /// API version (cert-manager.io/v1)
    #[serde(default = "ClusterIssuer::default_api_version")]
    pub api_version: String,
    /// Resource kind (ClusterIssuer)
    #[serde(default = "ClusterIssuer::default_kind")]
    pub kind: String,
    /// Resource metadata (no namespace)
    pub metadata: ObjectMeta,
    /// Signing configuration
    pub spec: IssuerSpec,
}

impl HasApiResource for ClusterIssuer {
    const API_VERSION: &'static str = "cert-manager.io/v1";
    const KIND: &'static str = "ClusterIssuer";
}

impl_api_defaults!(ClusterIssuer);

impl ClusterIssuer {
    /// Create a new ClusterIssuer
    pub fn new(name: &str, spec: IssuerSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta::cluster_scoped(name),
            spec,
        }
    }

    /// A self-signed root issuer
    pub fn self_signed(name: &str) -> Self {
        Self::new(name, IssuerSpec::SelfSigned {})
    }

    /// An issuer signing with the CA stored in `secret_name`
    pub fn ca(name: &str, secret_name: &str) -> Self {
        Self::new(
            name,
            IssuerSpec::Ca {
                secret_name: secret_name.to_string(),
            },
        )
    }
}

/// cert-manager Certificate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// API version (cert-manager.io/v1)
    #[serde(default = "Certificate::default_api_version")]
    pub api_version: String,
    /// Resource kind (Certificate)
    #[serde(default = "Certificate::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Certificate specification
    pub spec: CertificateSpec,
}

impl HasApiResource for Certificate {
    const API_VERSION: &'static str = "cert-manager.io/v1";
    const KIND: &'static str = "Certificate";
}

impl_api_defaults!(Certificate);

impl Certificate {
    /// Create a new Certificate
    pub fn new(metadata: ObjectMeta, spec: CertificateSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Certificate spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Mark the certificate as a certificate authority
    #[serde(rename = "isCA", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ca: bool,
    /// Requested validity (e.g., "8760h")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Subject common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// Name of the Secret to store the certificate
    pub secret_name: String,
    /// Private key parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
    /// Reference to the issuer
    pub issuer_ref: IssuerRef,
    /// DNS names for the certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
}

/// Private key parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrivateKey {
    /// Key algorithm (RSA, ECDSA, Ed25519)
    pub algorithm: String,
    /// Key size in bits (curve size for ECDSA)
    pub size: u32,
}

impl PrivateKey {
    /// ECDSA P-256
    pub fn ecdsa_p256() -> Self {
        Self {
            algorithm: "ECDSA".to_string(),
            size: 256,
        }
    }
}

/// Issuer reference for Certificate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    /// Issuer name
    pub name: String,
    /// Issuer kind (Issuer or ClusterIssuer)
    pub kind: String,
    /// API group (cert-manager.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl IssuerRef {
    /// Reference a ClusterIssuer by name
    pub fn cluster_issuer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ClusterIssuer::KIND.to_string(),
            group: Some(CERT_MANAGER_GROUP.to_string()),
        }
    }
}
