//! Secondary network selection annotations.
//!
//! Pods request attachments through `k8s.v1.cni.cncf.io/networks` and may
//! override their primary network with `v1.multus-cni.io/default-network`.
//! Both accept either a JSON array of selection objects or a comma separated
//! list of `[namespace/]name[@interface]` entries.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;

/// Pod annotation overriding the primary network
pub const DEFAULT_NETWORK_ANNOTATION: &str = "v1.multus-cni.io/default-network";

/// Pod annotation requesting secondary networks
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// One requested network attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSelectionElement {
    /// Name of the network attachment definition
    pub name: String,
    /// Namespace of the definition; defaults to the pod's namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Requested interface name inside the pod
    #[serde(rename = "interface", default, skip_serializing_if = "Option::is_none")]
    pub interface_request: Option<String>,
    /// Requested static addresses
    #[serde(rename = "ips", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_request: Vec<String>,
    /// Requested MAC address
    #[serde(rename = "mac", default, skip_serializing_if = "Option::is_none")]
    pub mac_request: Option<String>,
    /// Gateways the attachment should install default routes through
    #[serde(rename = "default-route", default, skip_serializing_if = "Vec::is_empty")]
    pub gateway_request: Vec<String>,
}

/// Parses a network selection annotation value.
pub fn parse_network_selection(value: &str, default_namespace: &str) -> Result<Vec<NetworkSelectionElement>, AnnotationError> {
    let value = value.trim();
    let mut networks = if value.starts_with('[') {
        serde_json::from_str::<Vec<NetworkSelectionElement>>(value)
            .map_err(|e| AnnotationError::InvalidConfig(format!("failed to parse network selection {value:?}: {e}")))?
    } else {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(parse_shorthand)
            .collect::<Result<Vec<_>, _>>()?
    };

    for network in &mut networks {
        if network.name.is_empty() {
            return Err(AnnotationError::InvalidConfig(format!(
                "network selection {value:?} has an entry without a name"
            )));
        }
        if network.namespace.is_empty() {
            network.namespace = default_namespace.to_string();
        }
    }

    Ok(networks)
}

fn parse_shorthand(item: &str) -> Result<NetworkSelectionElement, AnnotationError> {
    let invalid = || AnnotationError::InvalidConfig(format!("invalid network selection entry {item:?}"));

    let (rest, interface) = match item.split_once('@') {
        Some((rest, interface)) if !interface.is_empty() && !interface.contains('@') => {
            (rest, Some(interface.to_string()))
        }
        Some(_) => return Err(invalid()),
        None => (item, None),
    };

    let (namespace, name) = match rest.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.contains('/') => (namespace, name),
        Some(_) => return Err(invalid()),
        None => ("", rest),
    };

    Ok(NetworkSelectionElement {
        name: name.to_string(),
        namespace: namespace.to_string(),
        interface_request: interface,
        ..Default::default()
    })
}

fn pod_annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a String> {
    pod.metadata.annotations.as_ref().and_then(|a| a.get(key))
}

/// Returns the network overriding the pod's primary network, if any.
pub fn get_pod_default_network(pod: &Pod) -> Result<Option<NetworkSelectionElement>, AnnotationError> {
    let Some(value) = pod_annotation(pod, DEFAULT_NETWORK_ANNOTATION) else {
        return Ok(None);
    };

    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let mut networks = parse_network_selection(value, namespace)?;
    if networks.len() > 1 {
        return Err(AnnotationError::InvalidConfig(format!(
            "more than one default network is specified: {value}"
        )));
    }
    Ok(networks.pop())
}

/// Returns every secondary network the pod requests.
pub fn get_pod_all_networks(pod: &Pod) -> Result<Vec<NetworkSelectionElement>, AnnotationError> {
    let Some(value) = pod_annotation(pod, NETWORKS_ANNOTATION) else {
        return Ok(Vec::new());
    };

    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    parse_network_selection(value, namespace).map_err(|e| {
        AnnotationError::InvalidConfig(format!(
            "failed to get all network selections for pod {}/{}: {}",
            namespace,
            pod.metadata.name.as_deref().unwrap_or_default(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    fn pod(annotations: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("apps".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_shorthand_list() {
        let networks = parse_network_selection("net-a, other/net-b@eth2", "apps").unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].namespace, "apps");
        assert_eq!(networks[0].name, "net-a");
        assert_eq!(networks[0].interface_request, None);
        assert_eq!(networks[1].namespace, "other");
        assert_eq!(networks[1].interface_request.as_deref(), Some("eth2"));
    }

    #[test]
    fn test_shorthand_rejects_bad_entries() {
        for bad in ["a/b/c", "net@", "net@a@b", "/net"] {
            assert!(parse_network_selection(bad, "apps").is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_json_list() {
        let networks = parse_network_selection(
            r#"[{"name":"net-a","interface":"net1","ips":["10.10.0.5/24"],"mac":"0a:58:0a:0a:00:05"}]"#,
            "apps",
        )
        .unwrap();
        assert_eq!(networks[0].namespace, "apps");
        assert_eq!(networks[0].ip_request, vec!["10.10.0.5/24".to_string()]);
        assert_eq!(networks[0].mac_request.as_deref(), Some("0a:58:0a:0a:00:05"));

        assert!(parse_network_selection(r#"[{"namespace":"x"}]"#, "apps").is_err());
        assert!(parse_network_selection("[not json", "apps").is_err());
    }

    #[test]
    fn test_default_network() {
        assert_eq!(get_pod_default_network(&pod(&[])).unwrap(), None);

        let selected = get_pod_default_network(&pod(&[(DEFAULT_NETWORK_ANNOTATION, "kube-system/primary")]))
            .unwrap()
            .unwrap();
        assert_eq!(selected.namespace, "kube-system");
        assert_eq!(selected.name, "primary");

        let err = get_pod_default_network(&pod(&[(DEFAULT_NETWORK_ANNOTATION, "a,b")])).unwrap_err();
        assert!(err.to_string().contains("more than one default network"));
    }

    #[test]
    fn test_all_networks() {
        assert!(get_pod_all_networks(&pod(&[])).unwrap().is_empty());

        let networks = get_pod_all_networks(&pod(&[(NETWORKS_ANNOTATION, "net-a,net-a@eth2")])).unwrap();
        assert_eq!(networks.len(), 2);
        assert!(networks.iter().all(|n| n.namespace == "apps" && n.name == "net-a"));
        assert_eq!(networks[1].interface_request.as_deref(), Some("eth2"));
    }
}
