//! Subscription supervisor
//!
//! Acquires an address change subscription, retrying failed attempts with
//! Fibonacci backoff until one succeeds or the stop signal fires.

use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backoff::FibonacciBackoff;
use crate::source::{AddressStream, SourceError};

/// Resolves once `stop` is set or its sender is gone.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A closed channel counts as stop
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Retries a subscribe function until it yields a stream.
#[derive(Debug)]
pub struct SubscriptionSupervisor<F> {
    subscribe: F,
    backoff: FibonacciBackoff,
    attempts: u64,
}

impl<F, Fut> SubscriptionSupervisor<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<AddressStream, SourceError>> + Send,
{
    /// Create a supervisor around `subscribe`.
    #[must_use]
    pub fn new(subscribe: F, backoff: FibonacciBackoff) -> Self {
        Self {
            subscribe,
            backoff,
            attempts: 0,
        }
    }

    /// Subscribe attempts made so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Acquire a subscription.
    ///
    /// Returns `None` once stop fires, whether during an attempt or while
    /// waiting out the backoff.
    pub async fn acquire(&mut self, stop: &mut watch::Receiver<bool>) -> Option<AddressStream> {
        loop {
            if *stop.borrow() {
                return None;
            }

            self.attempts += 1;
            let result = tokio::select! {
                biased;
                () = stopped(stop) => return None,
                result = (self.subscribe)() => result,
            };

            match result {
                Ok(stream) => {
                    debug!("Address subscription acquired after {} attempts", self.attempts);
                    self.backoff.reset();
                    return Some(stream);
                }
                Err(e) => {
                    let delay = self.backoff.next_backoff();
                    warn!(
                        "Error subscribing to address changes (attempt {}): {}; retrying in {:?}",
                        self.attempts, e, delay
                    );
                    tokio::select! {
                        biased;
                        () = stopped(stop) => return None,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
