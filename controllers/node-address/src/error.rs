//! Controller-specific error types.
//!
//! Library errors from the cluster client, the address source and the
//! annotation codec are wrapped here so the reconciler has a single error type.

use annotations::AnnotationError;
use cluster_client::ClusterClientError;
use thiserror::Error;

use crate::source::SourceError;

/// Errors that can occur in the node address controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterClientError),

    /// Address source error
    #[error("Address source error: {0}")]
    Source(#[from] SourceError),

    /// Annotation codec error
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The address change subscription ended
    #[error("Address subscription lost")]
    SubscriptionLost,

    /// The reconciler has stopped
    #[error("Reconciler stopped")]
    Stopped,
}
