//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when reading or patching cluster objects
#[derive(Debug, Error)]
pub enum ClusterClientError {
    /// Kubernetes API request error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A patch was rejected or could not be sent
    #[error("Write failed: {0}")]
    WriteFailed(String),
}
