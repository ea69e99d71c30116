//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of ClusterClientTrait that
//! can be used in unit tests without a running API server. Writes merge into
//! the stored object the same way a merge patch would, and can be made to fail
//! to exercise retry paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterClientError;

/// Mock ClusterClient for testing
#[derive(Clone, Debug, Default)]
pub struct MockClusterClient {
    pub(crate) nodes: Arc<Mutex<HashMap<String, Node>>>,
    pub(crate) pods: Arc<Mutex<HashMap<(String, String), Pod>>>,
    // Successful node annotation writes
    pub(crate) node_writes: Arc<Mutex<usize>>,
    // Upcoming writes to reject
    pub(crate) failing_writes: Arc<Mutex<usize>>,
}

impl MockClusterClient {
    /// Create an empty mock client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the given annotations (for test setup)
    pub fn add_node(&self, name: &str, annotations: BTreeMap<String, String>) {
        let node = Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        };
        self.nodes.lock().unwrap().insert(name.to_string(), node);
    }

    /// Add a pod to the mock store (for test setup)
    pub fn add_pod(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.pods.lock().unwrap().insert(key, pod);
    }

    /// Current value of a node annotation
    #[must_use]
    pub fn node_annotation(&self, name: &str, key: &str) -> Option<String> {
        self.nodes
            .lock()
            .unwrap()
            .get(name)
            .and_then(|node| node.metadata.annotations.as_ref())
            .and_then(|annotations| annotations.get(key).cloned())
    }

    /// Number of node annotation writes that succeeded so far
    #[must_use]
    pub fn node_writes(&self) -> usize {
        *self.node_writes.lock().unwrap()
    }

    /// Reject the next `count` writes with `WriteFailed`
    pub fn fail_next_writes(&self, count: usize) {
        *self.failing_writes.lock().unwrap() = count;
    }

    fn take_failure(&self) -> bool {
        let mut remaining = self.failing_writes.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return true;
        }
        false
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_node(&self, name: &str) -> Result<Node, ClusterClientError> {
        self.nodes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterClientError::NotFound(format!("node {name}")))
    }

    async fn set_node_annotation(&self, name: &str, key: &str, value: &str) -> Result<(), ClusterClientError> {
        if self.take_failure() {
            return Err(ClusterClientError::WriteFailed(format!("node {name}: injected failure")));
        }

        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterClientError::NotFound(format!("node {name}")))?;
        node.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());

        *self.node_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterClientError> {
        self.pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterClientError::NotFound(format!("pod {namespace}/{name}")))
    }

    async fn set_pod_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterClientError> {
        if self.take_failure() {
            return Err(ClusterClientError::WriteFailed(format!("pod {namespace}/{name}: injected failure")));
        }

        let mut pods = self.pods.lock().unwrap();
        let pod = pods
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterClientError::NotFound(format!("pod {namespace}/{name}")))?;
        pod.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
