//! Node Address Controller
//!
//! Publishes the addresses configured on a host's interfaces as the
//! `k8s.ovn.org/host-addresses` annotation of its Node object:
//! - Initial and periodic full resyncs from an address dump
//! - Incremental updates from netlink address notifications
//! - Automatic resubscription when the notification channel is lost
//!
//! Management port and masquerade addresses are never published.

pub mod backoff;
pub mod config;
pub mod error;
pub mod filter;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod reconciler;
pub mod source;
pub mod supervisor;

#[cfg(test)]
mod test_utils;

pub use config::{BridgeConfig, ManagementPortConfig, ReconcilerConfig};
pub use error::ControllerError;
pub use filter::ExcludedAddressSet;
#[cfg(target_os = "linux")]
pub use netlink::NetlinkAddressSource;
pub use reconciler::{NodeAddressReconciler, ReconcilerHandle, ReconcilerState};
pub use source::{AddressEvent, AddressSource, AddressStream, SourceError};
pub use supervisor::SubscriptionSupervisor;
