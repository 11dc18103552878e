//! Wire payload and HTTP delivery to the collector

use crate::identity::HostIdentity;
use crate::sampler::Sample;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// JSON body accepted by `POST /api/v1/metrics`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPayload {
    pub server_ip: String,
    pub server_name: String,
    pub cpu_utilization: f32,
    pub memory_utilization: f32,
    pub disk_utilization: f32,
}

impl MetricPayload {
    pub fn new(identity: &HostIdentity, sample: &Sample) -> Self {
        Self {
            server_ip: identity.ip.to_string(),
            server_name: identity.hostname.clone(),
            cpu_utilization: sample.cpu_pct,
            memory_utilization: sample.mem_pct,
            disk_utilization: sample.disk_pct,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("collector answered HTTP {0}")]
    Status(u16),
}

/// Sends one payload to the collector
pub trait Transport: Clone + Send + Sync + 'static {
    fn send(&self, payload: &MetricPayload) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, payload: &MetricPayload) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}
