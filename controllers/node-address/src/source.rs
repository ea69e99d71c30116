//! Interface address sources
//!
//! An [`AddressSource`] enumerates the host's current interface addresses and
//! hands out subscriptions to address changes. The stream of a subscription
//! ends when the underlying notification channel is lost; dropping it releases
//! the channel.

use std::io;

use futures::stream::BoxStream;
use ipnet::IpNet;
use thiserror::Error;

/// An address appeared on or disappeared from a host interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEvent {
    /// Address was added
    Added(IpNet),
    /// Address was removed
    Removed(IpNet),
}

impl AddressEvent {
    /// The address the event is about.
    #[must_use]
    pub fn address(&self) -> &IpNet {
        match self {
            AddressEvent::Added(address) | AddressEvent::Removed(address) => address,
        }
    }
}

/// Ordered address change notifications. The stream ends when the
/// subscription is lost.
pub type AddressStream = BoxStream<'static, AddressEvent>;

/// Errors from an address source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Netlink request failed
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// Socket setup failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Source of host interface addresses
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait AddressSource: Send + Sync {
    /// Enumerate the addresses currently configured on host interfaces
    async fn list_addresses(&self) -> Result<Vec<IpNet>, SourceError>;

    /// Open a subscription to address changes
    async fn subscribe(&self) -> Result<AddressStream, SourceError>;
}
