use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    pub listen: SocketAddr,
    pub store: StoreConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConf {
    pub data_dir: PathBuf,
    pub keyspace: String,
    /// opérations store concurrentes max
    pub pool_size: usize,
    pub timeout_secs: u64,
    /// false = store purement en mémoire
    pub persist: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreConf::default(),
        }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            keyspace: "collector".into(),
            pool_size: 10,
            timeout_secs: 10,
            persist: true,
        }
    }
}

impl StoreConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl CollectorConfig {
    pub fn from_yaml(txt: &str) -> Result<Self> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt).context("invalid collector config")
    }

    /// METRICS_COLLECTOR_LISTEN / METRICS_COLLECTOR_DATA_DIR
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("METRICS_COLLECTOR_LISTEN") {
            self.listen = listen
                .parse()
                .with_context(|| format!("invalid METRICS_COLLECTOR_LISTEN '{listen}'"))?;
        }
        if let Some(dir) = lookup("METRICS_COLLECTOR_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Fichier absent = config par défaut ; fichier invalide = erreur de démarrage
pub async fn load_config() -> Result<CollectorConfig> {
    let path = std::env::var("METRICS_COLLECTOR_CONFIG").unwrap_or_else(|_| "collector.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        info!(path = %path, "loaded collector config");
        CollectorConfig::from_yaml(&txt)?
    } else {
        warn!(path = %path, "no collector config file, using defaults");
        CollectorConfig::default()
    };
    cfg.apply_env(|key| std::env::var(key).ok())?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = CollectorConfig::default();
        assert_eq!(cfg.listen.port(), 8080);
        assert_eq!(cfg.store.keyspace, "collector");
        assert_eq!(cfg.store.pool_size, 10);
        assert_eq!(cfg.store.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = CollectorConfig::from_yaml("store:\n  pool_size: 4\n  persist: false\n").unwrap();
        assert_eq!(cfg.store.pool_size, 4);
        assert!(!cfg.store.persist);
        assert_eq!(cfg.store.timeout_secs, 10);
        assert_eq!(cfg.listen.port(), 8080);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(CollectorConfig::from_yaml("listen: [not, an, address]").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("METRICS_COLLECTOR_LISTEN", "127.0.0.1:9999"),
            ("METRICS_COLLECTOR_DATA_DIR", "/var/lib/metrics"),
        ]
        .into();
        let mut cfg = CollectorConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.listen.port(), 9999);
        assert_eq!(cfg.store.data_dir, PathBuf::from("/var/lib/metrics"));
    }

    #[test]
    fn test_bad_listen_override_is_rejected() {
        let mut cfg = CollectorConfig::default();
        assert!(cfg
            .apply_env(|k| (k == "METRICS_COLLECTOR_LISTEN").then(|| "nope".to_string()))
            .is_err());
    }
}
