//! Periodic sample-and-publish loop
//!
//! One cycle: sample the host, build the payload, hand it off, then idle for
//! the interval. Dispatch never blocks the loop, so a slow or unreachable
//! collector cannot stretch the cadence. Cancellation is observed while idle.

use crate::delivery::{DeliveryQueue, RetryPolicy};
use crate::identity::HostIdentity;
use crate::sampler::HostSampler;
use crate::transport::{MetricPayload, Transport};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One detached send per record; failures are logged and the record is lost
    FireAndForget,
    /// Bounded queue drained by a retrying worker
    AtLeastOnce(RetryPolicy),
}

pub struct Publisher<S, T> {
    identity: HostIdentity,
    sampler: S,
    transport: T,
    interval: Duration,
    mode: DeliveryMode,
}

enum Dispatcher<T> {
    Spawn(T),
    Queue(DeliveryQueue),
}

impl<S, T> Publisher<S, T>
where
    S: HostSampler + 'static,
    T: Transport,
{
    pub fn new(identity: HostIdentity, sampler: S, transport: T, interval: Duration) -> Self {
        Self {
            identity,
            sampler,
            transport,
            interval,
            mode: DeliveryMode::FireAndForget,
        }
    }

    pub fn with_delivery(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run until `shutdown` flips to true (or its sender goes away)
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let (dispatcher, worker) = match self.mode {
            DeliveryMode::FireAndForget => (Dispatcher::Spawn(self.transport.clone()), None),
            DeliveryMode::AtLeastOnce(policy) => {
                let (queue, handle) = DeliveryQueue::spawn(self.transport.clone(), policy, shutdown.clone());
                (Dispatcher::Queue(queue), Some(handle))
            }
        };

        info!(
            host_ip = %self.identity.ip,
            hostname = %self.identity.hostname,
            interval_secs = self.interval.as_secs(),
            mode = ?self.mode,
            "Publisher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let sample = self.sampler.sample().await;
            if sample.is_degraded() {
                debug!("Publishing degraded sample");
            }
            let payload = MetricPayload::new(&self.identity, &sample);
            dispatch(&dispatcher, payload);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!(error = %e, "Delivery worker ended abnormally");
            }
        }
        info!("Publisher stopped");
    }
}

fn dispatch<T: Transport>(dispatcher: &Dispatcher<T>, payload: MetricPayload) {
    match dispatcher {
        Dispatcher::Spawn(transport) => {
            let transport = transport.clone();
            tokio::spawn(async move {
                match transport.send(&payload).await {
                    Ok(()) => debug!("Record delivered"),
                    Err(e) => warn!(error = %e, "Delivery failed, record dropped"),
                }
            });
        }
        Dispatcher::Queue(queue) => {
            queue.enqueue(payload);
        }
    }
}
