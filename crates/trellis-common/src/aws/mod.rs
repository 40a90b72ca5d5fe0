//! Typed definitions of the cloud-side resources
//!
//! These are applied by the deployment engine, never by this crate. Field
//! names follow the engine's camelCase property format so the template can be
//! handed over unchanged.

use serde::{Deserialize, Serialize};

pub mod codebuild;
pub mod cognito;
pub mod eks;
pub mod iam;
pub mod network;
pub mod storage;

pub use codebuild::BuildProject;
pub use cognito::{UserPool, UserPoolClient, UserPoolDomain};
pub use eks::{AccessEntry, Cluster, Nodegroup, OidcProvider};
pub use iam::{ManagedPolicy, PolicyDocument, PolicyStatement, Role};
pub use network::{Network, NetworkLookup};
pub use storage::{Bucket, Table};

/// What happens to the physical resource when its node is removed
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalPolicy {
    /// Delete the resource (and its contents)
    #[default]
    Destroy,
    /// Keep the resource, detached from the stack
    Retain,
}

/// ARN of an AWS-managed IAM policy
pub fn aws_managed_policy_arn(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{}", name)
}

/// ARN of an IAM user
pub fn iam_user_arn(account: &str, user: &str) -> String {
    format!("arn:aws:iam::{}:user/{}", account, user)
}

/// ARN of an IAM OIDC identity provider for `issuer` (without scheme)
pub fn oidc_provider_arn(account: &str, issuer: &str) -> String {
    format!("arn:aws:iam::{}:oidc-provider/{}", account, issuer)
}

/// ARN of a Bedrock foundation model
pub fn foundation_model_arn(region: &str, model_id: &str) -> String {
    format!("arn:aws:bedrock:{}::foundation-model/{}", region, model_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arn_formats() {
        assert_eq!(
            aws_managed_policy_arn("AmazonEKS_CNI_Policy"),
            "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy"
        );
        assert_eq!(
            iam_user_arn("123456789012", "cluster-admin"),
            "arn:aws:iam::123456789012:user/cluster-admin"
        );
        assert_eq!(
            foundation_model_arn("us-east-1", "amazon.titan-embed-text-v2:0"),
            "arn:aws:bedrock:us-east-1::foundation-model/amazon.titan-embed-text-v2:0"
        );
    }

    #[test]
    fn removal_policy_wire_format() {
        assert_eq!(
            serde_json::to_string(&RemovalPolicy::Destroy).unwrap(),
            "\"DESTROY\""
        );
    }
}
