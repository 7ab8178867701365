//! Error types for the devicetree node labeller

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the devicetree node labeller
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Hardware Discovery Errors
    // =========================================================================
    /// Device tree missing or unreadable
    #[error("no valid device tree configuration found at {path}: {reason}")]
    DescriptorUnavailable { path: PathBuf, reason: String },

    /// A node-name specifier could not be compiled into a match pattern
    #[error("Invalid node name pattern: {0}")]
    InvalidNodePattern(#[from] regex::Error),

    // =========================================================================
    // Cluster API Errors
    // =========================================================================
    /// Node object does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Node was modified concurrently; the update must be retried on a fresh copy
    #[error("Conflicting update on node {0}")]
    Conflict(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Node watch stream error
    #[error("Node watch error: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    // =========================================================================
    // Output Errors
    // =========================================================================
    /// Feature file could not be written
    #[error("Failed to write feature file {path}: {source}")]
    FeatureFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Local node identity could not be determined
    #[error("Unable to determine local node name: {0}")]
    Hostname(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the reconcile loop should retry after this error.
    ///
    /// Only cluster API failures are transient; descriptor, output and
    /// configuration errors are fatal to the invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_) | Error::Kube(_) | Error::Watch(_) | Error::Internal(_)
        )
    }

    /// Whether this is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
