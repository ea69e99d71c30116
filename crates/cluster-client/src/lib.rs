//! Cluster client
//!
//! Typed access to the Node and Pod objects the node networking controllers
//! read and annotate.
//!
//! - **Reads**: fetch a node or pod by name
//! - **Writes**: JSON merge patches of individual annotation keys, so
//!   concurrent writers owning other keys are never clobbered
//!
//! Controllers depend on [`ClusterClientTrait`]; [`KubeClusterClient`] is the
//! production implementation and `MockClusterClient` (feature `test-util`) an
//! in-memory one for tests.

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterClientError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterClient;
