//! Certificate chain installer
//!
//! Installs cert-manager, then builds a two-tier CA per trust domain (the
//! mesh plus one per tenant):
//!
//! ```text
//! ClusterIssuer selfsigned-<d>-issuer -> Certificate <d>-ca -> ClusterIssuer <issuer>
//! ```
//!
//! The root key only ever signs the CA certificate; everything else is
//! issued by the CA issuer. Each step names the secret produced by the
//! previous one, so the edges are strict.

use std::collections::HashSet;

use serde_json::json;
use tracing::debug;

use trellis_common::kube_utils::ObjectMeta;
use trellis_common::manifests::{
    Certificate, CertificateSpec, ClusterIssuer, HelmRelease, IssuerRef, Manifest, PrivateKey,
};
use trellis_common::{
    Error, NodeId, ResourceGraph, ResourceNode, ResourceSpec, Result, CERT_MANAGER_NAMESPACE,
    ISTIO_INGRESS_NAMESPACE, ISTIO_SYSTEM_NAMESPACE,
};

use crate::cluster::ClusterNodes;
use crate::mesh::MeshNodes;
use crate::nodegroup::NodegroupNodes;
use crate::StackContext;

/// Scope of every node declared here
pub const SCOPE: &str = "certs";

/// cert-manager chart repository
pub const JETSTACK_REPOSITORY: &str = "https://charts.jetstack.io";

/// Validity of CA and gateway certificates (one year)
pub const CERTIFICATE_DURATION: &str = "8760h";

/// Name of the gateway certificate and its secret
pub const GATEWAY_TLS_NAME: &str = "gateway-tls";

/// Label of the mesh's own trust domain
pub const MESH_TRUST_DOMAIN: &str = "istio";

const CERT_MANAGER_TIMEOUT_SECS: u64 = 300;

/// A trust domain with its own CA
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustDomain {
    /// Label used in node ids and generated names
    pub label: String,
    /// Name of the CA-backed ClusterIssuer (also the CA common name)
    pub issuer: String,
}

impl TrustDomain {
    /// The mesh domain, issued by `istio-system`
    pub fn mesh() -> Self {
        Self {
            label: MESH_TRUST_DOMAIN.to_string(),
            issuer: ISTIO_SYSTEM_NAMESPACE.to_string(),
        }
    }

    /// A tenant domain, issued by a ClusterIssuer named after the tenant
    pub fn tenant(tenant: &str) -> Self {
        Self {
            label: tenant.to_string(),
            issuer: tenant.to_string(),
        }
    }

    /// Self-signed root issuer name
    pub fn root_issuer_name(&self) -> String {
        format!("selfsigned-{}-issuer", self.label)
    }

    /// CA certificate name
    pub fn ca_certificate_name(&self) -> String {
        format!("{}-ca", self.label)
    }

    /// Secret holding the CA key pair
    pub fn ca_secret_name(&self) -> String {
        format!("{}-ca-selfsigned", self.label)
    }
}

/// Nodes of one trust domain's chain
#[derive(Clone, Debug)]
pub struct TrustChain {
    /// The domain
    pub domain: TrustDomain,
    /// Self-signed root ClusterIssuer
    pub root_issuer: NodeId,
    /// CA certificate
    pub ca_certificate: NodeId,
    /// CA-backed ClusterIssuer
    pub intermediate_issuer: NodeId,
}

/// Handles to the declared certificate infrastructure
#[derive(Clone, Debug)]
pub struct CertNodes {
    /// cert-manager release
    pub cert_manager: NodeId,
    /// One chain per trust domain, mesh first
    pub chains: Vec<TrustChain>,
    /// Gateway leaf certificate
    pub gateway_tls: NodeId,
}

/// Trust domains in declaration order: mesh, then tenants in config order
pub fn trust_domains(tenants: &[String]) -> Vec<TrustDomain> {
    std::iter::once(TrustDomain::mesh())
        .chain(tenants.iter().map(|t| TrustDomain::tenant(t)))
        .collect()
}

fn declare_chain(
    graph: &mut ResourceGraph,
    domain: TrustDomain,
    cert_manager: &NodeId,
) -> Result<TrustChain> {
    let scope = format!("{}/{}", SCOPE, domain.label);
    let root_name = domain.root_issuer_name();

    let root_issuer = graph.add(
        ResourceNode::new(
            NodeId::new(&scope, "root-issuer"),
            ResourceSpec::Manifest(ClusterIssuer::self_signed(&root_name).into()),
        )
        .after(cert_manager),
    )?;

    let ca = Certificate::new(
        ObjectMeta::new(domain.ca_certificate_name(), CERT_MANAGER_NAMESPACE),
        CertificateSpec {
            is_ca: true,
            duration: Some(CERTIFICATE_DURATION.to_string()),
            common_name: Some(domain.issuer.clone()),
            secret_name: domain.ca_secret_name(),
            private_key: Some(PrivateKey::ecdsa_p256()),
            issuer_ref: IssuerRef::cluster_issuer(&root_name),
            dns_names: Vec::new(),
        },
    );
    let ca_certificate = graph.add(
        ResourceNode::new(
            NodeId::new(&scope, "ca-certificate"),
            ResourceSpec::Manifest(ca.into()),
        )
        .after(&root_issuer),
    )?;

    let intermediate_issuer = graph.add(
        ResourceNode::new(
            NodeId::new(&scope, "intermediate-issuer"),
            ResourceSpec::Manifest(
                ClusterIssuer::ca(&domain.issuer, &domain.ca_secret_name()).into(),
            ),
        )
        .after(&ca_certificate),
    )?;

    debug!(domain = %domain.label, issuer = %domain.issuer, "declared CA chain");
    Ok(TrustChain {
        domain,
        root_issuer,
        ca_certificate,
        intermediate_issuer,
    })
}

/// Two domains resolving to the same ClusterIssuer would overwrite each
/// other's CA.
fn reject_shared_issuers(domains: &[TrustDomain]) -> Result<()> {
    let mut seen = HashSet::new();
    for domain in domains {
        if !seen.insert(domain.issuer.as_str()) {
            return Err(Error::validation_for(
                format!("{}/{}", SCOPE, domain.label),
                format!("ClusterIssuer '{}' is already used by another trust domain", domain.issuer),
            ));
        }
    }
    Ok(())
}

/// Gateway certificate covering the base domain and one subdomain per tenant
pub fn gateway_certificate(base_domain: &str, tenants: &[String], issuer: &str) -> Certificate {
    let dns_names = std::iter::once(base_domain.to_string())
        .chain(tenants.iter().map(|t| format!("{}.{}", t, base_domain)))
        .collect();
    Certificate::new(
        ObjectMeta::new(GATEWAY_TLS_NAME, ISTIO_INGRESS_NAMESPACE),
        CertificateSpec {
            is_ca: false,
            duration: Some(CERTIFICATE_DURATION.to_string()),
            common_name: Some(base_domain.to_string()),
            secret_name: GATEWAY_TLS_NAME.to_string(),
            private_key: Some(PrivateKey::ecdsa_p256()),
            issuer_ref: IssuerRef::cluster_issuer(issuer),
            dns_names,
        },
    )
}

/// Declare cert-manager, every trust chain and the gateway certificate
pub fn declare(
    graph: &mut ResourceGraph,
    ctx: &StackContext<'_>,
    cluster: &ClusterNodes,
    nodegroup: &NodegroupNodes,
    mesh: &MeshNodes,
) -> Result<CertNodes> {
    let cert_manager = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, "cert-manager"),
            ResourceSpec::HelmRelease(
                HelmRelease::new(
                    cluster.name(),
                    JETSTACK_REPOSITORY,
                    "cert-manager",
                    "cert-manager",
                    &ctx.config.cert_manager_version,
                    CERT_MANAGER_NAMESPACE,
                )
                .with_values(json!({
                    "crds": { "enabled": "true" },
                    "featureGates": "ExperimentalCertificateSigningRequestControllers=true",
                }))
                .with_timeout_seconds(CERT_MANAGER_TIMEOUT_SECS),
            ),
        )
        .after(&nodegroup.nodegroup),
    )?;

    let domains = trust_domains(&ctx.config.tenants);
    reject_shared_issuers(&domains)?;
    let chains = domains
        .into_iter()
        .map(|domain| declare_chain(graph, domain, &cert_manager))
        .collect::<Result<Vec<_>>>()?;

    let mesh_chain = chains
        .first()
        .ok_or_else(|| Error::internal_with_context(SCOPE, "mesh trust domain missing"))?;
    let leaf = gateway_certificate(
        ctx.config.base_domain(),
        &ctx.config.tenants,
        &mesh_chain.domain.issuer,
    );
    let gateway_tls = graph.add(
        ResourceNode::new(
            NodeId::new(SCOPE, GATEWAY_TLS_NAME),
            ResourceSpec::Manifest(Manifest::from(leaf)),
        )
        .after(&mesh_chain.intermediate_issuer)
        .after(&mesh.ingress_gateway),
    )?;

    Ok(CertNodes {
        cert_manager,
        chains,
        gateway_tls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use crate::testing::Fixture;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::mesh(TrustDomain::mesh(), "selfsigned-istio-issuer", "istio-ca", "istio-ca-selfsigned")]
    #[case::tenant(TrustDomain::tenant("tenanta"), "selfsigned-tenanta-issuer", "tenanta-ca", "tenanta-ca-selfsigned")]
    fn trust_domain_names(
        #[case] domain: TrustDomain,
        #[case] root: &str,
        #[case] ca: &str,
        #[case] secret: &str,
    ) {
        assert_eq!(domain.root_issuer_name(), root);
        assert_eq!(domain.ca_certificate_name(), ca);
        assert_eq!(domain.ca_secret_name(), secret);
    }

    #[test]
    fn mesh_domain_comes_first() {
        let domains = trust_domains(&["tenanta".to_string(), "tenantb".to_string()]);
        let issuers: Vec<_> = domains.iter().map(|d| d.issuer.as_str()).collect();
        assert_eq!(issuers, vec!["istio-system", "tenanta", "tenantb"]);
    }

    #[test]
    fn tenant_named_after_mesh_issuer_is_rejected() {
        let fixture = Fixture::new(trellis_common::SystemConfig {
            tenants: vec!["tenanta".to_string(), "istio-system".to_string()],
            ..trellis_common::SystemConfig::default()
        });
        let err = Stack::build(&fixture.config, &fixture.deployment).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("istio-system"));
    }

    #[test]
    fn gateway_certificate_covers_tenant_subdomains() {
        let cert = gateway_certificate(
            "example.com",
            &["tenanta".to_string(), "tenantb".to_string()],
            "istio-system",
        );
        assert_eq!(
            cert.spec.dns_names,
            vec!["example.com", "tenanta.example.com", "tenantb.example.com"]
        );
        assert!(!cert.spec.is_ca);
        assert_eq!(cert.metadata.namespace.as_deref(), Some("istio-ingress"));
        assert_eq!(cert.spec.issuer_ref.kind, "ClusterIssuer");
    }

    #[test]
    fn ca_certificate_document_shape() {
        let fixture = Fixture::default();
        let stack = Stack::build(&fixture.config, &fixture.deployment).unwrap();
        let doc = stack
            .graph()
            .get("certs/tenantb/ca-certificate")
            .unwrap()
            .spec
            .properties()
            .unwrap();
        assert_eq!(
            doc,
            json!({
                "apiVersion": "cert-manager.io/v1",
                "kind": "Certificate",
                "metadata": {
                    "name": "tenantb-ca",
                    "namespace": "cert-manager",
                    "labels": {
                        "app.kubernetes.io/name": "tenantb-ca",
                        "app.kubernetes.io/managed-by": "trellis"
                    }
                },
                "spec": {
                    "isCA": true,
                    "duration": "8760h",
                    "commonName": "tenantb",
                    "secretName": "tenantb-ca-selfsigned",
                    "privateKey": { "algorithm": "ECDSA", "size": 256 },
                    "issuerRef": {
                        "name": "selfsigned-tenantb-issuer",
                        "kind": "ClusterIssuer",
                        "group": "cert-manager.io"
                    }
                }
            })
        );
    }

    #[test]
    fn chain_edges_are_strict() {
        let fixture = Fixture::default();
        let stack = Stack::build(&fixture.config, &fixture.deployment).unwrap();
        let graph = stack.graph();
        for label in ["istio", "tenanta", "tenantb"] {
            let id = |step: &str| NodeId::new(&format!("certs/{}", label), step);
            assert_eq!(
                graph.dependencies_of(id("root-issuer").as_str()),
                vec![&NodeId::from("certs/cert-manager")]
            );
            assert_eq!(
                graph.dependencies_of(id("ca-certificate").as_str()),
                vec![&id("root-issuer")]
            );
            assert_eq!(
                graph.dependencies_of(id("intermediate-issuer").as_str()),
                vec![&id("ca-certificate")]
            );
        }
        let leaf_deps = graph.dependencies_of("certs/gateway-tls");
        assert!(leaf_deps.contains(&&NodeId::from("certs/istio/intermediate-issuer")));
        assert!(leaf_deps.contains(&&NodeId::from("mesh/istio-ingressgateway")));
    }
}
