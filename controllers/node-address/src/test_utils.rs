//! Test utilities for unit testing the reconciler
//!
//! This module provides a scripted address source and helpers for setting up
//! reconciler test scenarios.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use annotations::HOST_ADDRESSES_ANNOTATION;
use cluster_client::{ClusterClientTrait, MockClusterClient};
use futures::StreamExt;
use ipnet::IpNet;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::ReconcilerConfig;
use crate::reconciler::NodeAddressReconciler;
use crate::source::{AddressEvent, AddressSource, AddressStream, SourceError};

/// Name of the node every test reconciles
pub const TEST_NODE: &str = "node1";

#[derive(Debug, Default)]
struct FakeState {
    addresses: Vec<IpNet>,
    sender: Option<mpsc::UnboundedSender<AddressEvent>>,
    failing_subscribes: usize,
    subscribes: usize,
}

/// In-memory address source driven by the test
#[derive(Debug, Default)]
pub struct FakeAddressSource {
    state: Mutex<FakeState>,
}

impl FakeAddressSource {
    /// Create a source reporting `addresses`
    pub fn new(addresses: &[&str]) -> Arc<Self> {
        let source = Self::default();
        source.state.lock().unwrap().addresses = addresses.iter().map(|a| net(a)).collect();
        Arc::new(source)
    }

    /// Configure an address and notify the current subscriber
    pub fn add_address(&self, address: &str) {
        let address = net(address);
        let mut state = self.state.lock().unwrap();
        state.addresses.push(address);
        Self::send(&mut state, AddressEvent::Added(address));
    }

    /// Remove an address and notify the current subscriber
    pub fn remove_address(&self, address: &str) {
        let address = net(address);
        let mut state = self.state.lock().unwrap();
        state.addresses.retain(|known| *known != address);
        Self::send(&mut state, AddressEvent::Removed(address));
    }

    /// Deliver an event without changing the configured addresses
    pub fn emit(&self, event: AddressEvent) {
        Self::send(&mut self.state.lock().unwrap(), event);
    }

    /// End the current subscription's stream
    pub fn close_subscription(&self) {
        self.state.lock().unwrap().sender = None;
    }

    /// Fail the next `count` subscribe calls
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state.lock().unwrap().failing_subscribes = count;
    }

    /// Subscribe calls so far, failed ones included
    pub fn subscribes(&self) -> usize {
        self.state.lock().unwrap().subscribes
    }

    fn send(state: &mut FakeState, event: AddressEvent) {
        let closed = state.sender.as_ref().is_some_and(|sender| sender.send(event).is_err());
        if closed {
            state.sender = None;
        }
    }
}

#[async_trait::async_trait]
impl AddressSource for FakeAddressSource {
    async fn list_addresses(&self) -> Result<Vec<IpNet>, SourceError> {
        Ok(self.state.lock().unwrap().addresses.clone())
    }

    async fn subscribe(&self) -> Result<AddressStream, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.subscribes += 1;
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(SourceError::Netlink("injected subscribe failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.sender = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Parse an `address/prefix` literal
pub fn net(address: &str) -> IpNet {
    address.parse().unwrap()
}

/// Reconciler settings used by the tests: management port 10.1.1.2/24 and
/// 2001:db8::1/64, default masquerade addresses, fast resubscribe and no
/// periodic resync getting in the way.
pub fn test_config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::new(TEST_NODE);
    config.management_port.ipv4 = Some(net("10.1.1.2/24"));
    config.management_port.ipv6 = Some(net("2001:db8::1/64"));
    config.resubscribe_min_backoff = Duration::from_millis(10);
    config.resubscribe_max_backoff = Duration::from_millis(50);
    config.resync_interval = Duration::from_secs(3600);
    config
}

/// Host addresses plus the addresses the reconciler must filter out
pub const HOST_INTERFACE_ADDRESSES: [&str; 6] = [
    "10.1.1.10/24",
    "2001:db8::10/64",
    "10.1.1.2/24",
    "2001:db8::1/64",
    "169.254.169.2/29",
    "fd69::2/125",
];

/// Annotation value for the host addresses in [`HOST_INTERFACE_ADDRESSES`]
pub const HOST_ANNOTATION: &str = r#"["10.1.1.10/24","2001:db8::10/64"]"#;

/// Create a mock cluster with `node1`, optionally carrying a host-addresses annotation
pub fn create_test_cluster(host_addresses: Option<&str>) -> Arc<MockClusterClient> {
    let client = MockClusterClient::new();
    let mut annotations = BTreeMap::from([("node.example.com/owner".to_string(), "ops".to_string())]);
    if let Some(value) = host_addresses {
        annotations.insert(HOST_ADDRESSES_ANNOTATION.to_string(), value.to_string());
    }
    client.add_node(TEST_NODE, annotations);
    Arc::new(client)
}

/// Create a reconciler over the given cluster and source
pub fn create_test_reconciler(
    config: ReconcilerConfig,
    client: &Arc<MockClusterClient>,
    source: &Arc<FakeAddressSource>,
) -> NodeAddressReconciler {
    let client: Arc<dyn ClusterClientTrait> = Arc::clone(client) as Arc<dyn ClusterClientTrait>;
    let source: Arc<dyn AddressSource> = Arc::clone(source) as Arc<dyn AddressSource>;
    NodeAddressReconciler::new(config, client, source)
}

/// Current host-addresses annotation of the test node
pub fn host_annotation(client: &MockClusterClient) -> Option<String> {
    client.node_annotation(TEST_NODE, HOST_ADDRESSES_ANNOTATION)
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if condition() {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
