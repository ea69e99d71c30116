//! Configuration for the node address controller.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use ipnet::IpNet;

use crate::error::ControllerError;

/// Default name of the management port interface
pub const DEFAULT_MGMT_PORT_INTERFACE: &str = "ovn-k8s-mp0";

/// Default IPv4 masquerade address of the gateway bridge
pub const DEFAULT_V4_MASQUERADE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(169, 254, 169, 2));

/// Default IPv6 masquerade address of the gateway bridge
pub const DEFAULT_V6_MASQUERADE_IP: IpAddr = IpAddr::V6(Ipv6Addr::new(0xfd69, 0, 0, 0, 0, 0, 0, 2));

/// Default interval between full resyncs
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Management port addresses. These are internal to the overlay and are never
/// published as host addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementPortConfig {
    /// Interface name of the management port
    pub interface: String,
    /// IPv4 interface address, if the node has one
    pub ipv4: Option<IpNet>,
    /// IPv6 interface address, if the node has one
    pub ipv6: Option<IpNet>,
}

impl Default for ManagementPortConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_MGMT_PORT_INTERFACE.to_string(),
            ipv4: None,
            ipv6: None,
        }
    }
}

/// Gateway bridge masquerade addresses. Like the management port they are
/// internal and are never published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// IPv4 masquerade address
    pub v4_masquerade_ip: Option<IpAddr>,
    /// IPv6 masquerade address
    pub v6_masquerade_ip: Option<IpAddr>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            v4_masquerade_ip: Some(DEFAULT_V4_MASQUERADE_IP),
            v6_masquerade_ip: Some(DEFAULT_V6_MASQUERADE_IP),
        }
    }
}

/// Node address reconciler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Name of the Node object to annotate
    pub node_name: String,

    /// Management port addresses to exclude
    pub management_port: ManagementPortConfig,

    /// Gateway bridge masquerade addresses to exclude
    pub bridge: BridgeConfig,

    /// Subscribe to address notifications; when false only periodic resyncs run
    pub use_netlink: bool,

    /// Interval between full resyncs
    pub resync_interval: Duration,

    /// First delay before retrying a failed subscription
    pub resubscribe_min_backoff: Duration,

    /// Upper bound on the resubscribe delay
    pub resubscribe_max_backoff: Duration,
}

impl ReconcilerConfig {
    /// Configuration for `node_name` with every other setting at its default.
    #[must_use]
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            management_port: ManagementPortConfig::default(),
            bridge: BridgeConfig::default(),
            use_netlink: true,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            resubscribe_min_backoff: Duration::from_secs(1),
            resubscribe_max_backoff: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let node_name = lookup("NODE_NAME")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ControllerError::InvalidConfig("NODE_NAME environment variable is required".to_string())
            })?;

        let mut config = Self::new(node_name);

        if let Some(value) = lookup("MGMT_PORT_IPV4") {
            config.management_port.ipv4 = Some(parse_interface_address("MGMT_PORT_IPV4", &value, true)?);
        }
        if let Some(value) = lookup("MGMT_PORT_IPV6") {
            config.management_port.ipv6 = Some(parse_interface_address("MGMT_PORT_IPV6", &value, false)?);
        }
        if let Some(value) = lookup("MGMT_PORT_INTERFACE") {
            config.management_port.interface = value;
        }
        if let Some(value) = lookup("V4_MASQUERADE_IP") {
            config.bridge.v4_masquerade_ip = Some(parse_address("V4_MASQUERADE_IP", &value, true)?);
        }
        if let Some(value) = lookup("V6_MASQUERADE_IP") {
            config.bridge.v6_masquerade_ip = Some(parse_address("V6_MASQUERADE_IP", &value, false)?);
        }
        if let Some(value) = lookup("USE_NETLINK") {
            config.use_netlink = value.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!("USE_NETLINK must be true or false, got {value:?}"))
            })?;
        }
        if let Some(value) = lookup("ADDRESS_RESYNC_INTERVAL_SECS") {
            let secs: u64 = value.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!("ADDRESS_RESYNC_INTERVAL_SECS must be a number, got {value:?}"))
            })?;
            if secs == 0 {
                return Err(ControllerError::InvalidConfig(
                    "ADDRESS_RESYNC_INTERVAL_SECS must be greater than zero".to_string(),
                ));
            }
            config.resync_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn check_family(name: &str, addr: IpAddr, want_v4: bool) -> Result<(), ControllerError> {
    if addr.is_ipv4() != want_v4 {
        return Err(ControllerError::InvalidConfig(format!(
            "{name} must be an IPv{} address, got {addr}",
            if want_v4 { 4 } else { 6 }
        )));
    }
    Ok(())
}

fn parse_address(name: &str, value: &str, want_v4: bool) -> Result<IpAddr, ControllerError> {
    let addr = value
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| ControllerError::InvalidConfig(format!("{name} is not an IP address: {value:?}")))?;
    check_family(name, addr, want_v4)?;
    Ok(addr)
}

// Accepts `address/prefix` or a bare address.
fn parse_interface_address(name: &str, value: &str, want_v4: bool) -> Result<IpNet, ControllerError> {
    let value = value.trim();
    let net = match value.parse::<IpNet>() {
        Ok(net) => net,
        Err(_) => IpNet::from(parse_address(name, value, want_v4)?),
    };
    check_family(name, net.addr(), want_v4)?;
    Ok(net)
}
