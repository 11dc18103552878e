use crate::store::MetricsRepository;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::System;

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectorHealth {
    pub uptime_seconds: u64,
    pub hosts_tracked: u32,
    pub records_stored: u64,
    pub memory_usage_mb: f32,
    pub store_status: String,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Un store en échec est reporté dans `store_status`, pas en erreur HTTP
    pub async fn get_health(&self, repo: &MetricsRepository) -> CollectorHealth {
        let uptime = self.start_time.elapsed().as_secs();
        let (hosts, records, status) = match repo.stats().await {
            Ok(stats) => (stats.partitions as u32, stats.rows as u64, "ok".to_string()),
            Err(e) => (0, 0, e.to_string()),
        };

        CollectorHealth {
            uptime_seconds: uptime,
            hosts_tracked: hosts,
            records_stored: records,
            memory_usage_mb: get_memory_usage_mb(),
            store_status: status,
        }
    }
}

/// RSS du process collecteur, 0.0 si la plateforme ne l'expose pas
fn get_memory_usage_mb() -> f32 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return 0.0;
    }
    sys.process(pid)
        .map(|p| p.memory() as f32 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricIn;
    use crate::store::PartitionedStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_counts_hosts_and_records() {
        let repo = MetricsRepository::new(Arc::new(PartitionedStore::in_memory()), 2, Duration::from_secs(5));
        for ip in ["10.0.0.1", "10.0.0.1", "10.0.0.2"] {
            repo.insert(MetricIn {
                host_ip: ip.into(),
                host_name: "h".into(),
                cpu_pct: 1.0,
                mem_pct: 2.0,
                disk_pct: 3.0,
            })
            .await
            .unwrap();
        }

        let health = HealthTracker::new().get_health(&repo).await;
        assert_eq!(health.hosts_tracked, 2);
        assert_eq!(health.records_stored, 3);
        assert_eq!(health.store_status, "ok");
        if sysinfo::IS_SUPPORTED_SYSTEM {
            assert!(health.memory_usage_mb > 0.0);
        }
    }
}
