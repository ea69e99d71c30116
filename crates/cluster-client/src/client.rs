//! Kubernetes-backed cluster client

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterClientError;

/// Cluster client talking to the API server through `kube`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a cluster client from an existing kube client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a cluster client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterClientError> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn annotation_patch(annotations: &BTreeMap<String, String>) -> Patch<serde_json::Value> {
    Patch::Merge(json!({
        "metadata": {
            "annotations": annotations
        }
    }))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_node(&self, name: &str) -> Result<Node, ClusterClientError> {
        self.nodes()
            .get_opt(name)
            .await?
            .ok_or_else(|| ClusterClientError::NotFound(format!("node {name}")))
    }

    async fn set_node_annotation(&self, name: &str, key: &str, value: &str) -> Result<(), ClusterClientError> {
        let annotations = BTreeMap::from([(key.to_string(), value.to_string())]);
        debug!("Patching node {} annotation {}", name, key);

        self.nodes()
            .patch(name, &PatchParams::default(), &annotation_patch(&annotations))
            .await
            .map_err(|e| ClusterClientError::WriteFailed(format!("node {name}: {e}")))?;
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterClientError> {
        self.pods(namespace)
            .get_opt(name)
            .await?
            .ok_or_else(|| ClusterClientError::NotFound(format!("pod {namespace}/{name}")))
    }

    async fn set_pod_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterClientError> {
        debug!("Patching pod {}/{} annotations", namespace, name);

        self.pods(namespace)
            .patch(name, &PatchParams::default(), &annotation_patch(annotations))
            .await
            .map_err(|e| ClusterClientError::WriteFailed(format!("pod {namespace}/{name}: {e}")))?;
        Ok(())
    }
}
