//! Error types for Trellis
//!
//! Errors are structured with fields to aid debugging when a provisioning run
//! halts. Each variant names the resource node (or config field) involved so
//! the operator can see which step failed without reading logs.
//!
//! Nothing in this crate retries on its own. `is_retryable()` only tells the
//! deployment engine whether a failure looks transient.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Trellis operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Filesystem error while reading config or state
    #[error("io error: {source}")]
    Io {
        /// The underlying io error
        #[from]
        source: std::io::Error,
    },

    /// Configuration error: missing context value, malformed config file
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
        /// The offending field or context key (e.g., "tenants", "node_group_min_size")
        field: Option<String>,
    },

    /// Invalid declaration in the resource graph
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource node (or component) with the invalid declaration
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// The dependency graph contains a cycle
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle {
        /// Node ids forming the cycle, first node repeated at the end
        path: Vec<String>,
    },

    /// A reference points at a node that is unknown or not yet applied
    #[error("dependency error for {resource}: {message}")]
    Dependency {
        /// Node holding the unresolved reference
        resource: String,
        /// Description of the missing dependency
        message: String,
    },

    /// A readiness wait exceeded its timeout
    #[error("timeout waiting for {resource}: {message}")]
    Timeout {
        /// Node that did not become ready
        resource: String,
        /// What was being waited for
        message: String,
    },

    /// A referenced pre-existing resource does not exist
    #[error("lookup failed for {resource}: {message}")]
    Lookup {
        /// Lookup node
        resource: String,
        /// Description of the failed lookup
        message: String,
    },

    /// Resource provider error
    #[error("provider error for {resource}: {message}")]
    Provider {
        /// Node being applied
        resource: String,
        /// Description of what failed
        message: String,
        /// Whether the deployment engine may retry this
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "apply", "poll")
        context: String,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn config_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a specific resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a dependency-resolution error
    pub fn dependency(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Dependency {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a readiness-timeout error
    pub fn timeout(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Timeout {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an external lookup error
    pub fn lookup(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Lookup {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a retryable provider error
    pub fn provider(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable provider error (e.g., configuration rejected)
    pub fn provider_permanent(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Config, validation, cycle, dependency, lookup and timeout errors are
    /// fatal for the run. Only provider errors marked retryable and transient
    /// Kubernetes errors may be retried by the deployment engine.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Provider { retryable, .. } => *retryable,
            Error::Io { .. }
            | Error::Config { .. }
            | Error::Validation { .. }
            | Error::Cycle { .. }
            | Error::Dependency { .. }
            | Error::Timeout { .. }
            | Error::Lookup { .. }
            | Error::Serialization { .. }
            | Error::Internal { .. } => false,
        }
    }

    /// Get the resource node this error is associated with, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Validation { resource, .. }
            | Error::Dependency { resource, .. }
            | Error::Timeout { resource, .. }
            | Error::Lookup { resource, .. }
            | Error::Provider { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
