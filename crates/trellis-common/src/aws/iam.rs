//! IAM roles, policies and trust documents
//!
//! Workload-identity trust is expressed as a web-identity trust policy whose
//! `StringEquals` condition pins both the `aud` and the `sub` claim of the
//! cluster's projected service-account token. The `sub` pin is the only
//! thing keeping one tenant's pods out of another tenant's role.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::eks::STS_AUDIENCE;
use super::oidc_provider_arn;

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Condition operator used for claim pinning
pub const STRING_EQUALS: &str = "StringEquals";

/// Statement effect
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Effect {
    /// Allow
    Allow,
    /// Deny
    Deny,
}

/// Trusted principal of an assume-role statement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Principal {
    /// AWS service principal (e.g., `ec2.amazonaws.com`)
    Service(String),
    /// Federated identity provider ARN
    Federated(String),
}

/// Policy statement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Effect
    pub effect: Effect,
    /// Principal (trust policies only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    /// Actions
    pub action: Vec<String>,
    /// Resources (permission policies only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    /// Conditions: operator -> key -> value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: BTreeMap<String, BTreeMap<String, String>>,
}

impl PolicyStatement {
    /// Allow `actions` on `resources`
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.into_iter().map(Into::into).collect(),
            resource: resources.into_iter().map(Into::into).collect(),
            condition: BTreeMap::new(),
        }
    }
}

/// Policy document
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Language version
    pub version: String,
    /// Statements
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// A document with the given statements
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Trust policy letting an AWS service assume the role
    pub fn service_trust(service: &str) -> Self {
        Self::new(vec![PolicyStatement {
            effect: Effect::Allow,
            principal: Some(Principal::Service(service.to_string())),
            action: vec!["sts:AssumeRole".to_string()],
            resource: Vec::new(),
            condition: BTreeMap::new(),
        }])
    }

    /// Trust policy for pods running as `subject`, authenticated by the
    /// cluster OIDC issuer `issuer` (host and path, no scheme).
    pub fn web_identity_trust(account: &str, issuer: &str, subject: &str) -> Self {
        let claims = BTreeMap::from([
            (format!("{}:aud", issuer), STS_AUDIENCE.to_string()),
            (format!("{}:sub", issuer), subject.to_string()),
        ]);
        Self::new(vec![PolicyStatement {
            effect: Effect::Allow,
            principal: Some(Principal::Federated(oidc_provider_arn(account, issuer))),
            action: vec!["sts:AssumeRoleWithWebIdentity".to_string()],
            resource: Vec::new(),
            condition: BTreeMap::from([(STRING_EQUALS.to_string(), claims)]),
        }])
    }

    fn claims(&self, suffix: &str) -> Vec<&str> {
        self.statement
            .iter()
            .flat_map(|s| s.condition.values())
            .flat_map(|m| m.iter())
            .filter(|(k, _)| k.ends_with(suffix))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Values of every pinned `:sub` claim
    pub fn subject_claims(&self) -> Vec<&str> {
        self.claims(":sub")
    }

    /// Values of every pinned `:aud` claim
    pub fn audience_claims(&self) -> Vec<&str> {
        self.claims(":aud")
    }
}

/// IAM role
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Explicit role name; generated by the engine when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    /// Trust policy
    pub assume_role_policy_document: PolicyDocument,
    /// Attached managed policy ARNs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<String>,
    /// Inline permissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDocument>,
}

impl Role {
    /// A role with a trust policy and nothing attached
    pub fn new(role_name: Option<String>, trust: PolicyDocument) -> Self {
        Self {
            role_name,
            assume_role_policy_document: trust,
            managed_policy_arns: Vec::new(),
            policy: None,
        }
    }

    /// Attach a managed policy
    pub fn with_managed_policy(mut self, arn: impl Into<String>) -> Self {
        self.managed_policy_arns.push(arn.into());
        self
    }

    /// Add an inline statement
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.policy
            .get_or_insert_with(|| PolicyDocument::new(Vec::new()))
            .statement
            .push(statement);
        self
    }
}

/// Customer-managed policy with an externally maintained document
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedPolicy {
    /// Policy name
    pub managed_policy_name: String,
    /// Policy document, kept as published upstream
    pub policy_document: Value,
}
