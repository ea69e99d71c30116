//! ClusterClient trait for mocking
//!
//! This trait abstracts node and pod access so controllers can be unit tested
//! against an in-memory store instead of a running API server.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};

use crate::error::ClusterClientError;

/// Trait for the cluster operations the node controllers need
///
/// Writes only ever touch the given annotation keys; every other field of the
/// object is left as the server has it.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Get a node by name
    async fn get_node(&self, name: &str) -> Result<Node, ClusterClientError>;

    /// Set a single annotation on a node
    async fn set_node_annotation(&self, name: &str, key: &str, value: &str) -> Result<(), ClusterClientError>;

    /// Get a pod by namespace and name
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterClientError>;

    /// Merge annotations into a pod
    async fn set_pod_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterClientError>;
}
