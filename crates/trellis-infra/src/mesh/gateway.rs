//! Ingress gateway Service settings and the hostname output

use std::collections::BTreeMap;

use serde_json::{json, Value};

use trellis_common::naming;
use trellis_common::resource::OutputSpec;
use trellis_common::{SystemConfig, INGRESS_GATEWAY_NAME, ISTIO_INGRESS_NAMESPACE};

/// Name of the exported ingress hostname
pub const LOAD_BALANCER_DOMAIN_OUTPUT: &str = "LoadBalancerDomain";

/// Field holding the provisioned load balancer hostname
pub const HOSTNAME_PATH: &str = ".status.loadBalancer.ingress[0].hostname";

/// Give up on the hostname after this many seconds
pub const HOSTNAME_TIMEOUT_SECS: u64 = 600;

/// Delay between hostname reads
pub const HOSTNAME_POLL_INTERVAL_SECS: u64 = 10;

const ANNOTATION_PREFIX: &str = "service.beta.kubernetes.io/aws-load-balancer-";

/// Load balancer annotations for the gateway Service
///
/// Requests a cross-zone NLB with IP targets and PROXY protocol v2 on every
/// port, so client addresses survive to the gateway.
pub fn service_annotations(config: &SystemConfig) -> BTreeMap<String, String> {
    let scheme = if config.private_website {
        "internal"
    } else {
        "internet-facing"
    };
    let mut annotations: BTreeMap<String, String> = [
        ("type", "external".to_string()),
        ("scheme", scheme.to_string()),
        ("name", naming::ingress_load_balancer(&config.eks_cluster_name)),
        ("nlb-target-type", "ip".to_string()),
        ("proxy-protocol", "*".to_string()),
        ("cross-zone-load-balancing-enabled", "true".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (format!("{}{}", ANNOTATION_PREFIX, k), v))
    .collect();

    if let Some(cert) = config.certificate.as_deref().filter(|c| !c.is_empty()) {
        annotations.insert(format!("{}ssl-cert", ANNOTATION_PREFIX), cert.to_string());
        annotations.insert(format!("{}ssl-ports", ANNOTATION_PREFIX), "443".to_string());
    }
    annotations
}

/// Chart values of the gateway release
pub fn chart_values(config: &SystemConfig) -> Value {
    json!({ "service": { "annotations": service_annotations(config) } })
}

/// Output reading the gateway load balancer hostname
pub fn load_balancer_output() -> OutputSpec {
    OutputSpec {
        export_name: LOAD_BALANCER_DOMAIN_OUTPUT.to_string(),
        api_version: "v1".to_string(),
        kind: "Service".to_string(),
        namespace: ISTIO_INGRESS_NAMESPACE.to_string(),
        name: INGRESS_GATEWAY_NAME.to_string(),
        json_path: HOSTNAME_PATH.to_string(),
        timeout_seconds: HOSTNAME_TIMEOUT_SECS,
        poll_interval_seconds: HOSTNAME_POLL_INTERVAL_SECS,
    }
}
