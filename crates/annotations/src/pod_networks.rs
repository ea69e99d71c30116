//! The `k8s.ovn.org/pod-networks` annotation.
//!
//! The cluster-level control component records the resolved network
//! configuration of every pod attachment in this annotation, and the agent on
//! the pod's host reads it back to wire up the pod. The value is a JSON object
//! keyed by network name:
//!
//! ```json
//! {
//!   "default": {
//!     "ip_addresses": ["192.168.0.5/24"],
//!     "mac_address": "0a:58:fd:98:00:01",
//!     "gateway_ips": ["192.168.0.1"],
//!     "ip_address": "192.168.0.5/24",
//!     "gateway_ip": "192.168.0.1"
//!   }
//! }
//! ```
//!
//! `ip_address` and `gateway_ip` are deprecated. They are only written when the
//! matching list has exactly one entry, and on read they must agree with the
//! list when both are present. [`PodAnnotation`] itself never carries them;
//! they exist only on the wire record.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;

use crate::error::AnnotationError;
use crate::mac::MacAddress;

/// Pod annotation key carrying the network details
pub const POD_NETWORKS_ANNOTATION: &str = "k8s.ovn.org/pod-networks";

/// Network name of the primary pod interface
pub const DEFAULT_NETWORK: &str = "default";

/// Resolved network configuration of one pod attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodAnnotation {
    /// Assigned addresses with their prefix length, in order
    pub ips: Vec<IpNet>,
    /// Assigned hardware address
    pub mac: MacAddress,
    /// Gateway addresses; there may be fewer gateways than addresses
    pub gateways: Vec<IpAddr>,
    /// Additional routes for the pod's network namespace
    pub routes: Vec<PodRoute>,
}

/// A static route inside the pod's network namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRoute {
    /// Route destination; never the default network
    pub dest: IpNet,
    /// Next hop for traffic to `dest`, same family as `dest`
    pub next_hop: Option<IpAddr>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PodNetworkRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    ip_addresses: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    mac_address: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    gateway_ips: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    routes: Vec<PodRouteRecord>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    ip_address: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    gateway_ip: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PodRouteRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    dest: String,
    #[serde(rename = "nextHop", default, deserialize_with = "null_as_default")]
    next_hop: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_default_route(dest: &IpNet) -> bool {
    dest.trunc().addr().is_unspecified()
}

fn same_family(a: &IpNet, b: &IpAddr) -> bool {
    a.addr().is_ipv4() == b.is_ipv4()
}

impl PodNetworkRecord {
    /// Builds the wire record, including the compatibility fields.
    fn from_annotation(pod: &PodAnnotation) -> Result<Self, AnnotationError> {
        let mut record = PodNetworkRecord {
            mac_address: pod.mac.to_string(),
            ..Default::default()
        };

        if pod.ips.len() == 1 {
            record.ip_address = pod.ips[0].to_string();
            if pod.gateways.len() > 1 {
                return Err(AnnotationError::InvalidConfig(
                    "bad podNetwork data: single-stack network can only have a single gateway".to_string(),
                ));
            }
        }
        if pod.gateways.len() == 1 {
            record.gateway_ip = pod.gateways[0].to_string();
        }

        record.ip_addresses = pod.ips.iter().map(ToString::to_string).collect();
        record.gateway_ips = pod.gateways.iter().map(ToString::to_string).collect();

        for route in &pod.routes {
            // Written as the network, the same form decode yields
            let dest = route.dest.trunc();
            if is_default_route(&dest) {
                return Err(AnnotationError::InvalidConfig(format!(
                    "bad podNetwork data: default route {dest} should be specified as gateway"
                )));
            }
            if let Some(next_hop) = route.next_hop {
                if !same_family(&dest, &next_hop) {
                    return Err(AnnotationError::InvalidConfig(format!(
                        "pod route {dest} has next hop {next_hop} of different family"
                    )));
                }
            }
            record.routes.push(PodRouteRecord {
                dest: dest.to_string(),
                next_hop: route.next_hop.map(|nh| nh.to_string()).unwrap_or_default(),
            });
        }

        Ok(record)
    }

    /// Validates the record and converts it into the canonical form.
    fn into_annotation(self) -> Result<PodAnnotation, AnnotationError> {
        let mac = self.mac_address.parse::<MacAddress>().map_err(|e| {
            AnnotationError::InvalidConfig(format!("failed to parse pod MAC {:?}: {}", self.mac_address, e))
        })?;

        let ip_strings = resolve_compat_list(
            self.ip_addresses,
            self.ip_address,
            "ip_address and ip_addresses conflict",
            |s| parse_ip_net(s).ok(),
        )?;
        if ip_strings.is_empty() {
            return Err(AnnotationError::InvalidConfig(
                "bad annotation data (neither ip_address nor ip_addresses is set)".to_string(),
            ));
        }
        let ips = ip_strings
            .iter()
            .map(|s| {
                parse_ip_net(s).map_err(|e| {
                    AnnotationError::InvalidConfig(format!("failed to parse pod IP {s:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let gateway_strings = resolve_compat_list(
            self.gateway_ips,
            self.gateway_ip,
            "gateway_ip and gateway_ips conflict",
            |s| s.parse::<IpAddr>().ok(),
        )?;
        let gateways = gateway_strings
            .iter()
            .map(|s| {
                s.parse::<IpAddr>().map_err(|_| {
                    AnnotationError::InvalidConfig(format!("failed to parse pod gateway {s:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut routes = Vec::with_capacity(self.routes.len());
        for route in self.routes {
            let dest = route.dest.parse::<IpNet>().map_err(|e| {
                AnnotationError::InvalidConfig(format!("failed to parse pod route dest {:?}: {}", route.dest, e))
            })?;
            // The route destination is the network, not an address inside it
            let dest = dest.trunc();
            if is_default_route(&dest) {
                return Err(AnnotationError::InvalidConfig(format!(
                    "bad podNetwork data: default route {dest} should be specified as gateway"
                )));
            }

            let next_hop = if route.next_hop.is_empty() {
                None
            } else {
                let next_hop = route.next_hop.parse::<IpAddr>().map_err(|_| {
                    AnnotationError::InvalidConfig(format!("failed to parse pod route next hop {:?}", route.next_hop))
                })?;
                if !same_family(&dest, &next_hop) {
                    return Err(AnnotationError::InvalidConfig(format!(
                        "pod route {} has next hop {} of different family",
                        route.dest, route.next_hop
                    )));
                }
                Some(next_hop)
            };

            routes.push(PodRoute { dest, next_hop });
        }

        Ok(PodAnnotation { ips, mac, gateways, routes })
    }
}

/// Merges a plural field with its deprecated singular form.
///
/// An empty list falls back to the singular value. When both are present the
/// singular value must match the first list entry. This is looser than exact
/// string agreement: values are compared parsed, so `fd00::0001` and `fd00::1`
/// agree. Unparseable values only agree when the strings are identical.
fn resolve_compat_list<T: PartialEq>(
    mut plural: Vec<String>,
    singular: String,
    conflict: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<String>, AnnotationError> {
    if plural.is_empty() {
        if !singular.is_empty() {
            plural.push(singular);
        }
        return Ok(plural);
    }

    if !singular.is_empty() && singular != plural[0] {
        let agree = match (parse(&singular), parse(&plural[0])) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if !agree {
            return Err(AnnotationError::InvalidConfig(format!("bad annotation data ({conflict})")));
        }
    }

    Ok(plural)
}

/// Parses `address/prefix`, keeping the host bits of the address.
fn parse_ip_net(s: &str) -> Result<IpNet, ipnet::AddrParseError> {
    s.parse::<IpNet>()
}

/// Encodes the annotation for the default network.
///
/// Returns the annotations to merge into the pod's metadata.
pub fn encode(pod: &PodAnnotation) -> Result<BTreeMap<String, String>, AnnotationError> {
    encode_network(DEFAULT_NETWORK, pod)
}

/// Encodes the annotation for the given network name.
pub fn encode_network(network: &str, pod: &PodAnnotation) -> Result<BTreeMap<String, String>, AnnotationError> {
    let record = PodNetworkRecord::from_annotation(pod)?;
    let pod_networks = BTreeMap::from([(network.to_string(), record)]);

    let value = serde_json::to_string(&pod_networks).map_err(|e| {
        error!("Failed marshaling pod networks for {}: {}", network, e);
        AnnotationError::MalformedWireFormat {
            key: POD_NETWORKS_ANNOTATION.to_string(),
            source: e,
        }
    })?;

    Ok(BTreeMap::from([(POD_NETWORKS_ANNOTATION.to_string(), value)]))
}

/// Decodes the default network entry from a pod's annotations.
pub fn decode(annotations: &BTreeMap<String, String>) -> Result<PodAnnotation, AnnotationError> {
    decode_network(annotations, DEFAULT_NETWORK)
}

/// Decodes the entry for `network` from a pod's annotations.
///
/// A missing entry for the network decodes as an empty record, which then
/// fails validation on the missing MAC address.
pub fn decode_network(
    annotations: &BTreeMap<String, String>,
    network: &str,
) -> Result<PodAnnotation, AnnotationError> {
    let value = annotations.get(POD_NETWORKS_ANNOTATION).ok_or_else(|| {
        AnnotationError::NotPresent(format!("could not find pod annotation {POD_NETWORKS_ANNOTATION}"))
    })?;

    let mut pod_networks: BTreeMap<String, PodNetworkRecord> =
        serde_json::from_str(value).map_err(|e| AnnotationError::MalformedWireFormat {
            key: POD_NETWORKS_ANNOTATION.to_string(),
            source: e,
        })?;

    pod_networks.remove(network).unwrap_or_default().into_annotation()
}
