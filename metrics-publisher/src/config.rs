//! Publisher configuration
//!
//! Handles:
//! - Collector endpoint and request timeout
//! - Sampling cadence and CPU averaging window
//! - Delivery mode (fire-and-forget or bounded retry queue)

use crate::delivery::RetryPolicy;
use crate::publisher::DeliveryMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const TARGET_ENV: &str = "METRICS_PUBLISHER_TARGET";

/// Upper bound on the CPU averaging window, so a sample returns within seconds
pub const MAX_CPU_WINDOW_MS: u64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublisherConfig {
    pub target_url: String,
    pub interval_secs: u64,
    pub cpu_window_ms: u64,
    pub disk_mount: PathBuf,
    pub request_timeout_secs: u64,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    pub mode: DeliveryKind,
    pub queue_capacity: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    FireAndForget,
    AtLeastOnce,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            target_url: "http://127.0.0.1:8080/api/v1/metrics".to_string(),
            interval_secs: 25,
            cpu_window_ms: 1000,
            disk_mount: PathBuf::from("/"),
            request_timeout_secs: 10,
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryKind::FireAndForget,
            queue_capacity: 64,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl PublisherConfig {
    /// Load config from an explicit path, or from the OS-specific location.
    /// A missing default file means defaults; a missing explicit file is an error.
    pub async fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(&path).await?,
            None => {
                let path = Self::config_file_path()?;
                if path.exists() {
                    Self::from_file(&path).await?
                } else {
                    info!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config = Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.interval_secs == 0 {
            anyhow::bail!("interval_secs must be at least 1");
        }
        if config.cpu_window_ms > MAX_CPU_WINDOW_MS || config.cpu_window_ms >= config.interval_secs.saturating_mul(1000) {
            anyhow::bail!(
                "cpu_window_ms must be at most {MAX_CPU_WINDOW_MS} and shorter than interval_secs"
            );
        }
        if config.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        if config.delivery.queue_capacity == 0 {
            anyhow::bail!("delivery.queue_capacity must be at least 1");
        }
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(TARGET_ENV).filter(|v| !v.trim().is_empty()) {
            self.target_url = url;
        }
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("metrics-publisher");
        path.push("config.toml");
        Ok(path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        match self.delivery.mode {
            DeliveryKind::FireAndForget => DeliveryMode::FireAndForget,
            DeliveryKind::AtLeastOnce => DeliveryMode::AtLeastOnce(RetryPolicy {
                queue_capacity: self.delivery.queue_capacity,
                initial_backoff: Duration::from_millis(self.delivery.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.delivery.max_backoff_ms),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PublisherConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(25));
        assert_eq!(config.delivery.mode, DeliveryKind::FireAndForget);
        assert_eq!(config.delivery_mode(), DeliveryMode::FireAndForget);
    }

    #[test]
    fn test_config_file_path() {
        let path = PublisherConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("metrics-publisher"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PublisherConfig::from_toml(
            r#"
            target_url = "http://collector:9000/api/v1/metrics"

            [delivery]
            mode = "at_least_once"
            max_backoff_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.target_url, "http://collector:9000/api/v1/metrics");
        assert_eq!(config.interval_secs, 25);
        assert_eq!(
            config.delivery_mode(),
            DeliveryMode::AtLeastOnce(RetryPolicy {
                queue_capacity: 64,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_millis(5000),
            })
        );
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(PublisherConfig::from_toml("interval_secs = 0").is_err());
        assert!(PublisherConfig::from_toml("[delivery]\nqueue_capacity = 0").is_err());
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let err = PublisherConfig::from_toml("request_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_cpu_window_is_bounded() {
        assert!(PublisherConfig::from_toml("cpu_window_ms = 60000").is_err());
        assert!(PublisherConfig::from_toml("interval_secs = 2\ncpu_window_ms = 2000").is_err());

        let config = PublisherConfig::from_toml("interval_secs = 2\ncpu_window_ms = 1500").unwrap();
        assert_eq!(config.cpu_window(), Duration::from_millis(1500));
        assert!(PublisherConfig::from_toml(&format!("cpu_window_ms = {MAX_CPU_WINDOW_MS}")).is_ok());
    }

    #[test]
    fn test_env_overrides_target() {
        let mut config = PublisherConfig::default();
        config.apply_env(|key| (key == TARGET_ENV).then(|| "http://10.1.1.1:8080/api/v1/metrics".to_string()));
        assert_eq!(config.target_url, "http://10.1.1.1:8080/api/v1/metrics");

        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config.target_url, "http://10.1.1.1:8080/api/v1/metrics");
    }

    #[tokio::test]
    async fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publisher.toml");
        std::fs::write(&path, "interval_secs = 5\ndisk_mount = \"/var\"\n").unwrap();

        let config = PublisherConfig::load(Some(path)).await.unwrap();
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.disk_mount, PathBuf::from("/var"));

        let missing = dir.path().join("nope.toml");
        assert!(PublisherConfig::load(Some(missing)).await.is_err());
    }
}
