//! Virtual network definitions

use serde::{Deserialize, Serialize};

/// Subnet tier type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubnetType {
    /// Routed through an internet gateway
    Public,
    /// Private, egress through the NAT gateway
    PrivateWithEgress,
}

/// A subnet tier replicated across the availability zones
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetTier {
    /// Tier name
    pub name: String,
    /// Routing type
    pub subnet_type: SubnetType,
}

/// A new isolated network
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// VPC name tag
    pub vpc_name: String,
    /// Availability zones to spread subnets across
    pub max_azs: u8,
    /// NAT gateways for private egress
    pub nat_gateways: u8,
    /// Subnet tiers
    pub subnets: Vec<SubnetTier>,
    /// Create gateway/interface endpoints for AWS services
    pub vpc_endpoints: bool,
}

impl Network {
    /// Two AZs, one NAT gateway, a public and a private-with-egress tier
    pub fn two_tier(vpc_name: impl Into<String>, vpc_endpoints: bool) -> Self {
        Self {
            vpc_name: vpc_name.into(),
            max_azs: 2,
            nat_gateways: 1,
            subnets: vec![
                SubnetTier {
                    name: "public".to_string(),
                    subnet_type: SubnetType::Public,
                },
                SubnetTier {
                    name: "private".to_string(),
                    subnet_type: SubnetType::PrivateWithEgress,
                },
            ],
            vpc_endpoints,
        }
    }
}

/// Read-only reference to an existing network
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLookup {
    /// VPC id to resolve
    pub vpc_id: String,
}
