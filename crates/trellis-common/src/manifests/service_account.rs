//! Kubernetes ServiceAccount bound to a workload-identity role

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// Annotation the pod identity webhook reads to inject role credentials
pub const ROLE_ARN_ANNOTATION: &str = "eks.amazonaws.com/role-arn";

/// Core ServiceAccount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// API version (v1)
    #[serde(default = "ServiceAccount::default_api_version")]
    pub api_version: String,
    /// Resource kind (ServiceAccount)
    #[serde(default = "ServiceAccount::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
}

impl HasApiResource for ServiceAccount {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ServiceAccount";
}

impl_api_defaults!(ServiceAccount);

impl ServiceAccount {
    /// A service account assuming `role_arn` (usually an attribute token)
    pub fn with_role(name: &str, namespace: &str, role_arn: impl Into<String>) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta::new(name, namespace).with_annotation(ROLE_ARN_ANNOTATION, role_arn),
        }
    }

    /// Role the account is bound to, if annotated
    pub fn role_arn(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ROLE_ARN_ANNOTATION)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotated_with_role() {
        let sa = ServiceAccount::with_role(
            "aws-load-balancer-controller",
            "kube-system",
            "${irsa/alb-controller-role.arn}",
        );
        let doc = serde_json::to_value(&sa).unwrap();
        assert_eq!(doc["apiVersion"], "v1");
        assert_eq!(doc["kind"], "ServiceAccount");
        assert_eq!(
            doc["metadata"]["annotations"][ROLE_ARN_ANNOTATION],
            "${irsa/alb-controller-role.arn}"
        );
        assert_eq!(sa.role_arn(), Some("${irsa/alb-controller-role.arn}"));
    }
}
