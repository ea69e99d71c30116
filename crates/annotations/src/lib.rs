//! Network annotations
//!
//! Wire formats for the network state the cluster keeps in object metadata:
//!
//! - **Pod networks**: per-attachment addresses, MAC, gateways and routes
//!   (`k8s.ovn.org/pod-networks`)
//! - **Host addresses**: the addresses a node publishes for itself
//!   (`k8s.ovn.org/host-addresses`)
//! - **Network selection**: secondary network requests read from pods
//!
//! # Example
//!
//! ```
//! use annotations::{decode, encode, PodAnnotation};
//!
//! # fn example() -> Result<(), annotations::AnnotationError> {
//! let pod = PodAnnotation {
//!     ips: vec!["10.244.0.5/24".parse().unwrap()],
//!     mac: "0a:58:0a:f4:00:05".parse().unwrap(),
//!     gateways: vec!["10.244.0.1".parse().unwrap()],
//!     routes: vec![],
//! };
//!
//! let metadata = encode(&pod)?;
//! assert_eq!(decode(&metadata)?, pod);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod error;
pub mod host_addresses;
pub mod mac;
pub mod network_selection;
pub mod pod_ips;
pub mod pod_networks;

pub use error::AnnotationError;
pub use host_addresses::{
    encode_host_addresses, parse_host_addresses, parse_node_host_addresses,
    parse_node_host_addresses_drop_netmask, HOST_ADDRESSES_ANNOTATION,
};
pub use mac::{MacAddress, MacParseError};
pub use network_selection::{
    get_pod_all_networks, get_pod_default_network, parse_network_selection, NetworkSelectionElement,
    DEFAULT_NETWORK_ANNOTATION, NETWORKS_ANNOTATION,
};
pub use pod_ips::{get_all_pod_ips, get_pod_cidrs_with_full_mask};
pub use pod_networks::{
    decode, decode_network, encode, encode_network, PodAnnotation, PodRoute, DEFAULT_NETWORK,
    POD_NETWORKS_ANNOTATION,
};
