//! Helm chart release definitions
//!
//! Releases are installed by the deployment engine against the cluster; this
//! crate only describes them. Values may contain attribute tokens that are
//! resolved at apply time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Helm chart release
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    /// Cluster the release is installed into
    pub cluster_name: String,
    /// Chart repository URL
    pub repository: String,
    /// Chart name within the repository
    pub chart: String,
    /// Release name
    pub release: String,
    /// Chart version
    pub version: String,
    /// Target namespace
    pub namespace: String,
    /// Create the namespace if missing
    pub create_namespace: bool,
    /// Chart values
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub values: Value,
    /// Block until all release resources are ready
    pub wait: bool,
    /// Upper bound on the readiness wait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl HelmRelease {
    /// A release that waits for readiness, with no values and no timeout
    pub fn new(
        cluster_name: impl Into<String>,
        repository: &str,
        chart: &str,
        release: &str,
        version: &str,
        namespace: &str,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            repository: repository.to_string(),
            chart: chart.to_string(),
            release: release.to_string(),
            version: version.to_string(),
            namespace: namespace.to_string(),
            create_namespace: true,
            values: Value::Null,
            wait: true,
            timeout_seconds: None,
        }
    }

    /// Set chart values
    pub fn with_values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    /// Bound the readiness wait
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn release_serializes_with_wait_and_timeout() {
        let release = HelmRelease::new(
            "Multitenant-App",
            "https://istio-release.storage.googleapis.com/charts",
            "istiod",
            "istio-istiod",
            "1.22.3",
            "istio-system",
        )
        .with_timeout_seconds(180);
        let doc = serde_json::to_value(&release).unwrap();
        assert_eq!(doc["wait"], true);
        assert_eq!(doc["timeoutSeconds"], 180);
        assert!(doc.get("values").is_none());
    }

    #[test]
    fn values_are_kept_verbatim() {
        let release = HelmRelease::new("c", "r", "base", "istio-base", "1", "istio-system")
            .with_values(json!({ "defaultRevision": "default" }));
        let doc = serde_json::to_value(&release).unwrap();
        assert_eq!(doc["values"]["defaultRevision"], "default");
    }
}
