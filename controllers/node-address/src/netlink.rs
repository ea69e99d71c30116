//! Netlink address source
//!
//! Reads interface addresses with an `RTM_GETADDR` dump and follows changes by
//! joining the IPv4 and IPv6 ifaddr multicast groups. Only universe-scope
//! addresses are reported, and addresses on the management port are skipped.

use std::pin::pin;

use futures::stream::{self, StreamExt, TryStreamExt};
use ipnet::IpNet;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::address::{AddressAttribute, AddressMessage, AddressScope};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_sys::{AsyncSocket, SocketAddr};
use rtnetlink::{new_connection, Handle};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::source::{AddressEvent, AddressSource, AddressStream, SourceError};

const RTMGRP_IPV4_IFADDR: u32 = 0x10;
const RTMGRP_IPV6_IFADDR: u32 = 0x100;

/// Aborts the netlink connection task when the last user goes away.
#[derive(Debug)]
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Address source backed by rtnetlink
#[derive(Debug, Clone)]
pub struct NetlinkAddressSource {
    mgmt_port_interface: String,
}

impl NetlinkAddressSource {
    /// Create a source that ignores addresses on `mgmt_port_interface`.
    #[must_use]
    pub fn new(mgmt_port_interface: impl Into<String>) -> Self {
        Self {
            mgmt_port_interface: mgmt_port_interface.into(),
        }
    }

    // The management port may not exist yet; nothing is skipped then.
    async fn mgmt_port_index(&self, handle: &Handle) -> Option<u32> {
        let mut links = pin!(handle.link().get().match_name(self.mgmt_port_interface.clone()).execute());
        match links.try_next().await {
            Ok(Some(link)) => Some(link.header.index),
            Ok(None) => None,
            Err(e) => {
                debug!("Management port {} not found: {}", self.mgmt_port_interface, e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl AddressSource for NetlinkAddressSource {
    async fn list_addresses(&self) -> Result<Vec<IpNet>, SourceError> {
        let (connection, handle, _) = new_connection()?;
        let _guard = ConnectionGuard(tokio::spawn(connection));

        let skip_index = self.mgmt_port_index(&handle).await;

        let mut addresses = Vec::new();
        let mut dump = pin!(handle.address().get().execute());
        while let Some(message) = dump
            .try_next()
            .await
            .map_err(|e| SourceError::Netlink(format!("address dump failed: {e}")))?
        {
            if let Some(address) = interface_address(&message, skip_index) {
                addresses.push(address);
            }
        }

        debug!("Address dump returned {} usable addresses", addresses.len());
        Ok(addresses)
    }

    async fn subscribe(&self) -> Result<AddressStream, SourceError> {
        let (mut connection, handle, messages) = new_connection()?;
        connection
            .socket_mut()
            .socket_mut()
            .bind(&SocketAddr::new(0, RTMGRP_IPV4_IFADDR | RTMGRP_IPV6_IFADDR))?;
        let guard = ConnectionGuard(tokio::spawn(connection));

        let skip_index = self.mgmt_port_index(&handle).await;
        info!("Subscribed to netlink address notifications");

        // The receiver ends once the connection task goes away
        let events = stream::unfold((messages, guard), move |(mut messages, guard)| async move {
            while let Some((message, _)) = messages.next().await {
                if let Some(event) = address_event(message, skip_index) {
                    return Some((event, (messages, guard)));
                }
            }
            None
        });

        Ok(events.boxed())
    }
}

fn address_event(message: NetlinkMessage<RouteNetlinkMessage>, skip_index: Option<u32>) -> Option<AddressEvent> {
    let NetlinkPayload::InnerMessage(inner) = message.payload else {
        return None;
    };

    match inner {
        RouteNetlinkMessage::NewAddress(msg) => interface_address(&msg, skip_index).map(AddressEvent::Added),
        RouteNetlinkMessage::DelAddress(msg) => interface_address(&msg, skip_index).map(AddressEvent::Removed),
        _ => None,
    }
}

/// Extracts the local address of a universe-scope interface address message.
fn interface_address(message: &AddressMessage, skip_index: Option<u32>) -> Option<IpNet> {
    if message.header.scope != AddressScope::Universe {
        return None;
    }
    if skip_index == Some(message.header.index) {
        return None;
    }

    let mut local = None;
    let mut address = None;
    for attribute in &message.attributes {
        match attribute {
            AddressAttribute::Local(ip) => local = Some(*ip),
            AddressAttribute::Address(ip) => address = Some(*ip),
            _ => {}
        }
    }

    // On point-to-point links Address is the peer; Local is ours
    IpNet::new(local.or(address)?, message.header.prefix_len).ok()
}
