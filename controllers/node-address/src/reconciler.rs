//! Node address reconciler.
//!
//! Keeps the node's `k8s.ovn.org/host-addresses` annotation in line with the
//! addresses configured on the host's interfaces. A single task owns the
//! address set: it applies change notifications in arrival order, runs a full
//! resync whenever a subscription is (re)acquired and on a timer, and serves
//! explicit sync requests. The annotation is only written when the computed
//! set differs from the last one written.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use annotations::{encode_host_addresses, parse_node_host_addresses, HOST_ADDRESSES_ANNOTATION};
use cluster_client::ClusterClientTrait;
use futures::StreamExt;
use ipnet::IpNet;
use k8s_openapi::api::core::v1::Node;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backoff::FibonacciBackoff;
use crate::config::ReconcilerConfig;
use crate::error::ControllerError;
use crate::filter::ExcludedAddressSet;
use crate::source::{AddressEvent, AddressSource, AddressStream, SourceError};
use crate::supervisor::{stopped, SubscriptionSupervisor};

type SyncReply = oneshot::Sender<Result<bool, ControllerError>>;

/// Lifecycle of the reconciler, published on [`ReconcilerHandle::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Not started, or running the initial resync
    Unsubscribed,
    /// Acquiring the first subscription
    Subscribing,
    /// Processing notifications; `epoch` counts acquired subscriptions
    Subscribed {
        /// 1 for the first subscription, incremented on each resubscribe
        epoch: u64,
    },
    /// The subscription was lost and is being re-acquired
    Resubscribing,
    /// Subscriptions are disabled; only periodic resyncs run
    Polling,
    /// Stopped; nothing is written any more
    Stopped,
}

/// Cheap handle to a running reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    state: watch::Receiver<ReconcilerState>,
    requests: mpsc::Sender<SyncReply>,
}

impl ReconcilerHandle {
    /// Receiver for state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.clone()
    }

    /// Ask the worker for a full resync and wait for the outcome.
    ///
    /// Returns whether the annotation was written. Requests are served in
    /// order with notifications already queued, so a completed sync also
    /// means those notifications have been handled. Requests are also served
    /// while a lost subscription is being re-acquired.
    pub async fn sync(&self) -> Result<bool, ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .await
            .map_err(|_| ControllerError::Stopped)?;
        reply_rx.await.map_err(|_| ControllerError::Stopped)?
    }
}

/// Publishes the host's interface addresses on its Node object.
pub struct NodeAddressReconciler {
    config: ReconcilerConfig,
    client: Arc<dyn ClusterClientTrait>,
    source: Arc<dyn AddressSource>,
    excluded: ExcludedAddressSet,
    addresses: BTreeSet<IpNet>,
    last_written: Option<BTreeSet<IpNet>>,
    stop: Option<watch::Receiver<bool>>,
    state: watch::Sender<ReconcilerState>,
    requests_tx: mpsc::Sender<SyncReply>,
    requests_rx: mpsc::Receiver<SyncReply>,
}

impl NodeAddressReconciler {
    /// Create a reconciler. Nothing runs until [`start`](Self::start) or
    /// [`run`](Self::run).
    pub fn new(
        config: ReconcilerConfig,
        client: Arc<dyn ClusterClientTrait>,
        source: Arc<dyn AddressSource>,
    ) -> Self {
        let excluded = ExcludedAddressSet::from_config(&config.management_port, &config.bridge);
        let (state, _) = watch::channel(ReconcilerState::Unsubscribed);
        let (requests_tx, requests_rx) = mpsc::channel(16);

        Self {
            config,
            client,
            source,
            excluded,
            addresses: BTreeSet::new(),
            last_written: None,
            stop: None,
            state,
            requests_tx,
            requests_rx,
        }
    }

    /// Handle for state notifications and sync requests.
    #[must_use]
    pub fn handle(&self) -> ReconcilerHandle {
        ReconcilerHandle {
            state: self.state.subscribe(),
            requests: self.requests_tx.clone(),
        }
    }

    /// Addresses the reconciler currently considers published.
    #[must_use]
    pub fn addresses(&self) -> &BTreeSet<IpNet> {
        &self.addresses
    }

    /// Run the reconciler on its own task.
    pub fn start(self, stop: watch::Receiver<bool>) -> JoinHandle<Result<(), ControllerError>> {
        tokio::spawn(self.run(stop))
    }

    /// Run until `stop` fires, subscribing through the address source.
    pub async fn run(self, stop: watch::Receiver<bool>) -> Result<(), ControllerError> {
        let source = Arc::clone(&self.source);
        let subscribe = move || {
            let source = Arc::clone(&source);
            async move { source.subscribe().await }
        };
        self.run_with(stop, subscribe).await
    }

    /// Run until `stop` fires, acquiring subscriptions with `subscribe`.
    pub async fn run_with<F, Fut>(mut self, mut stop: watch::Receiver<bool>, subscribe: F) -> Result<(), ControllerError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<AddressStream, SourceError>> + Send,
    {
        info!(
            "Starting node address reconciler for node {} ({} excluded addresses)",
            self.config.node_name,
            self.excluded.len()
        );
        self.stop = Some(stop.clone());

        self.resync().await;

        let period = self.config.resync_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if !self.config.use_netlink {
            info!("Address subscriptions disabled, resyncing every {:?}", period);
            self.set_state(ReconcilerState::Polling);
            self.poll(&mut stop, &mut ticker).await;
        } else {
            self.set_state(ReconcilerState::Subscribing);
            let backoff = FibonacciBackoff::new(self.config.resubscribe_min_backoff, self.config.resubscribe_max_backoff);
            let mut supervisor = SubscriptionSupervisor::new(subscribe, backoff);
            let mut epoch = 0;

            while let Some(mut events) = self.acquire(&mut supervisor, &mut stop, &mut ticker).await {
                epoch += 1;
                self.set_state(ReconcilerState::Subscribing);
                // New baseline; anything missed while unsubscribed is picked up here
                self.resync().await;
                ticker.reset();
                self.set_state(ReconcilerState::Subscribed { epoch });

                match self.process(&mut stop, &mut events, &mut ticker).await {
                    ControllerError::SubscriptionLost => {
                        warn!("Address subscription lost, resubscribing");
                        self.set_state(ReconcilerState::Resubscribing);
                    }
                    _ => break,
                }
            }
        }

        self.set_state(ReconcilerState::Stopped);
        info!("Node address reconciler for node {} stopped", self.config.node_name);
        Ok(())
    }

    // Returns why processing ended: SubscriptionLost or Stopped.
    async fn process(
        &mut self,
        stop: &mut watch::Receiver<bool>,
        events: &mut AddressStream,
        ticker: &mut Interval,
    ) -> ControllerError {
        loop {
            tokio::select! {
                biased;
                () = stopped(stop) => return ControllerError::Stopped,
                event = events.next() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return ControllerError::SubscriptionLost,
                },
                Some(reply) = self.requests_rx.recv() => self.serve(reply).await,
                _ = ticker.tick() => self.resync().await,
            }
        }
    }

    // Keeps serving sync requests and resyncs until the supervisor yields.
    async fn acquire<F, Fut>(
        &mut self,
        supervisor: &mut SubscriptionSupervisor<F>,
        stop: &mut watch::Receiver<bool>,
        ticker: &mut Interval,
    ) -> Option<AddressStream>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<AddressStream, SourceError>> + Send,
    {
        let acquire = supervisor.acquire(stop);
        tokio::pin!(acquire);
        loop {
            tokio::select! {
                biased;
                events = &mut acquire => return events,
                Some(reply) = self.requests_rx.recv() => self.serve(reply).await,
                _ = ticker.tick() => self.resync().await,
            }
        }
    }

    async fn poll(&mut self, stop: &mut watch::Receiver<bool>, ticker: &mut Interval) {
        loop {
            tokio::select! {
                biased;
                () = stopped(stop) => return,
                Some(reply) = self.requests_rx.recv() => self.serve(reply).await,
                _ = ticker.tick() => self.resync().await,
            }
        }
    }

    async fn serve(&mut self, reply: SyncReply) {
        let result = self.sync().await;
        let _ = reply.send(result);
    }

    async fn handle_event(&mut self, event: AddressEvent) {
        if !self.excluded.is_publishable(event.address()) {
            debug!("Ignoring excluded address event {:?}", event);
            return;
        }

        let changed = match event {
            AddressEvent::Added(address) => self.addresses.insert(address),
            AddressEvent::Removed(address) => self.remove_address(&address),
        };
        if changed {
            debug!("Host address set changed by {:?}", event);
        }

        // Also retries a write that failed on an earlier event
        if self.last_written.as_ref() != Some(&self.addresses) {
            if let Err(e) = self.write_annotation().await {
                warn!("Failed to update host addresses of node {}: {}", self.config.node_name, e);
            }
        }
    }

    // Removal notifications may carry a different prefix than the add did.
    fn remove_address(&mut self, address: &IpNet) -> bool {
        if self.addresses.remove(address) {
            return true;
        }
        let stale: Vec<IpNet> = self
            .addresses
            .iter()
            .filter(|known| known.addr() == address.addr())
            .copied()
            .collect();
        for known in &stale {
            self.addresses.remove(known);
        }
        !stale.is_empty()
    }

    async fn resync(&mut self) {
        match self.sync().await {
            Ok(_) | Err(ControllerError::Stopped) => {}
            Err(e) => warn!("Failed to sync host addresses of node {}: {}", self.config.node_name, e),
        }
    }

    /// Recompute the address set from scratch and write it if the node's
    /// stored annotation differs.
    ///
    /// Returns whether the annotation was written. Call this directly only
    /// before the reconciler is started; afterwards use
    /// [`ReconcilerHandle::sync`].
    pub async fn sync(&mut self) -> Result<bool, ControllerError> {
        let listed = self.source.list_addresses().await?;
        self.addresses = listed
            .into_iter()
            .filter(|address| self.excluded.is_publishable(address))
            .collect();

        let node = self.client.get_node(&self.config.node_name).await?;
        let stored = match stored_addresses(&node) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Replacing unreadable host addresses of node {}: {}", self.config.node_name, e);
                None
            }
        };

        if stored.as_ref() == Some(&self.addresses) {
            self.last_written = stored;
            return Ok(false);
        }

        self.write_annotation().await?;
        Ok(true)
    }

    async fn write_annotation(&mut self) -> Result<(), ControllerError> {
        if self.is_stopped() {
            return Err(ControllerError::Stopped);
        }

        let value = encode_host_addresses(&self.addresses);
        self.client
            .set_node_annotation(&self.config.node_name, HOST_ADDRESSES_ANNOTATION, &value)
            .await?;

        info!("Updated host addresses of node {}: {}", self.config.node_name, value);
        self.last_written = Some(self.addresses.clone());
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| *stop.borrow() || stop.has_changed().is_err())
    }

    fn set_state(&self, state: ReconcilerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Reconciler state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }
}

/// The node's published address set, `None` when it has none yet.
pub(crate) fn stored_addresses(node: &Node) -> Result<Option<BTreeSet<IpNet>>, ControllerError> {
    match parse_node_host_addresses(node) {
        Ok(stored) => Ok(Some(stored)),
        Err(e) if e.is_not_present() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
