//! Object storage buckets and key-value tables

use serde::{Deserialize, Serialize};

use super::RemovalPolicy;

/// Bucket server-side encryption
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketEncryption {
    /// S3-managed keys (SSE-S3)
    S3Managed,
}

/// Object storage bucket
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Globally unique bucket name
    pub bucket_name: String,
    /// Block every form of public access
    pub block_public_access: bool,
    /// Server-side encryption
    pub encryption: BucketEncryption,
    /// Deny requests not using TLS
    pub enforce_ssl: bool,
    /// Empty the bucket before deleting it
    pub auto_delete_objects: bool,
    /// Removal behavior
    pub removal_policy: RemovalPolicy,
}

impl Bucket {
    /// A private, encrypted, TLS-only bucket
    pub fn private(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            block_public_access: true,
            encryption: BucketEncryption::S3Managed,
            enforce_ssl: true,
            auto_delete_objects: true,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

/// Key attribute type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    /// String (`S`)
    String,
}

/// Table key attribute
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

/// Table billing mode
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    /// On-demand capacity
    PayPerRequest,
}

/// Table encryption at rest
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableEncryption {
    /// AWS-managed KMS key
    AwsManaged,
}

/// Key-value table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name
    pub table_name: String,
    /// Partition key
    pub partition_key: KeyAttribute,
    /// Billing mode
    pub billing_mode: BillingMode,
    /// Encryption at rest
    pub encryption: TableEncryption,
    /// Continuous backups
    pub point_in_time_recovery: bool,
    /// Removal behavior
    pub removal_policy: RemovalPolicy,
}

impl Table {
    /// On-demand, encrypted table with PITR and a string partition key
    pub fn on_demand(table_name: impl Into<String>, partition_key: &str) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key: KeyAttribute {
                name: partition_key.to_string(),
                attribute_type: AttributeType::String,
            },
            billing_mode: BillingMode::PayPerRequest,
            encryption: TableEncryption::AwsManaged,
            point_in_time_recovery: true,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn private_bucket_defaults() {
        let bucket = Bucket::private("envoy-config-abcde");
        assert!(bucket.block_public_access);
        assert!(bucket.enforce_ssl);
        assert_eq!(
            serde_json::to_value(&bucket).unwrap()["encryption"],
            "S3_MANAGED"
        );
    }

    #[test]
    fn on_demand_table_shape() {
        let doc = serde_json::to_value(Table::on_demand("Sessions_tenanta_abcde", "TenantId")).unwrap();
        assert_eq!(doc["partitionKey"], json!({ "name": "TenantId", "type": "STRING" }));
        assert_eq!(doc["billingMode"], "PAY_PER_REQUEST");
        assert_eq!(doc["encryption"], "AWS_MANAGED");
        assert_eq!(doc["pointInTimeRecovery"], true);
    }
}
