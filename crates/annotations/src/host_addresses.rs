//! The `k8s.ovn.org/host-addresses` node annotation.
//!
//! The value is a JSON array of `address/prefix` strings in sorted order.
//! Older writers published bare addresses, which are read back as full-length
//! prefixes.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnet::IpNet;
use k8s_openapi::api::core::v1::Node;

use crate::error::AnnotationError;

/// Node annotation key carrying the host's addresses
pub const HOST_ADDRESSES_ANNOTATION: &str = "k8s.ovn.org/host-addresses";

/// Renders the set as the annotation value.
pub fn encode_host_addresses(addresses: &BTreeSet<IpNet>) -> String {
    let entries: Vec<String> = addresses.iter().map(ToString::to_string).collect();
    // A Vec<String> always serializes
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// Parses an annotation value.
pub fn parse_host_addresses(value: &str) -> Result<BTreeSet<IpNet>, AnnotationError> {
    let entries: Vec<String> =
        serde_json::from_str(value).map_err(|e| AnnotationError::MalformedWireFormat {
            key: HOST_ADDRESSES_ANNOTATION.to_string(),
            source: e,
        })?;

    entries.iter().map(|entry| parse_host_address(entry)).collect()
}

fn parse_host_address(entry: &str) -> Result<IpNet, AnnotationError> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| AnnotationError::InvalidConfig(format!("failed to parse host address {entry:?}")))
}

/// Reads the host addresses a node has published.
pub fn parse_node_host_addresses(node: &Node) -> Result<BTreeSet<IpNet>, AnnotationError> {
    let value = node
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(HOST_ADDRESSES_ANNOTATION))
        .ok_or_else(|| {
            AnnotationError::NotPresent(format!(
                "{} annotation not found for node {:?}",
                HOST_ADDRESSES_ANNOTATION,
                node.metadata.name.as_deref().unwrap_or_default()
            ))
        })?;

    parse_host_addresses(value)
}

/// Reads the host addresses a node has published, without prefix lengths.
pub fn parse_node_host_addresses_drop_netmask(node: &Node) -> Result<BTreeSet<IpAddr>, AnnotationError> {
    Ok(parse_node_host_addresses(node)?.iter().map(IpNet::addr).collect())
}
