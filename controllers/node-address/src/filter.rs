//! Address filter
//!
//! Some interface addresses exist only to make the overlay work: the
//! management port addresses and the gateway bridge masquerade addresses.
//! They must never be published as host addresses.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::config::{BridgeConfig, ManagementPortConfig};

/// Addresses that are never published, compared without prefix length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedAddressSet {
    addresses: BTreeSet<IpAddr>,
}

impl ExcludedAddressSet {
    /// Builds the set from the management port and bridge settings.
    #[must_use]
    pub fn from_config(management_port: &ManagementPortConfig, bridge: &BridgeConfig) -> Self {
        let addresses = [
            management_port.ipv4.map(|net| net.addr()),
            management_port.ipv6.map(|net| net.addr()),
            bridge.v4_masquerade_ip,
            bridge.v6_masquerade_ip,
        ]
        .into_iter()
        .flatten()
        .collect();

        Self { addresses }
    }

    /// Returns true if `address` may be published.
    #[must_use]
    pub fn is_publishable(&self, address: &IpNet) -> bool {
        !self.addresses.contains(&address.addr())
    }

    /// Number of excluded addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns true if nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
