//! Bounded at-least-once delivery
//!
//! The sampling loop never waits on the network: it hands payloads to a
//! bounded queue and a single worker drains it, retrying each payload with
//! exponential backoff until the collector accepts it. When the queue is
//! full the newest payload is dropped.

use crate::transport::{MetricPayload, Transport};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub queue_capacity: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Doubling retry delay, capped at `max`
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self { initial, max, current: initial }
    }

    /// Delay before the next attempt; grows for the one after
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

pub struct DeliveryQueue {
    tx: mpsc::Sender<MetricPayload>,
}

impl DeliveryQueue {
    /// Start the delivery worker. It stops on shutdown, abandoning what is still queued.
    pub fn spawn<T: Transport>(
        transport: T,
        policy: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(policy.queue_capacity.max(1));
        let handle = tokio::spawn(deliver_loop(transport, rx, policy, shutdown));
        (Self { tx }, handle)
    }

    /// Queue a payload without waiting. Returns false when it was dropped.
    pub fn enqueue(&self, payload: MetricPayload) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(p)) => {
                warn!(host = %p.server_ip, "Delivery queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(p)) => {
                warn!(host = %p.server_ip, "Delivery worker stopped, record dropped");
                false
            }
        }
    }
}

async fn deliver_loop<T: Transport>(
    transport: T,
    mut rx: mpsc::Receiver<MetricPayload>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(policy.initial_backoff, policy.max_backoff);

    loop {
        if *shutdown.borrow() {
            break;
        }
        let payload = tokio::select! {
            next = rx.recv() => match next {
                Some(p) => p,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        backoff.reset();
        let mut attempt = 1u32;
        loop {
            match transport.send(&payload).await {
                Ok(()) => {
                    debug!(attempt, "Record delivered");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, attempt, retry_in_ms = delay.as_millis() as u64, "Delivery failed, will retry");
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            info!("Shutdown with a record still undelivered");
                            return;
                        }
                    }
                }
            }
        }
    }
    debug!("Delivery worker stopped");
}
