/**
 * DIAGNOSTICS LOCAUX - lectures ponctuelles de la machine qui héberge le collecteur
 *
 * Exposé via GET /api/v1/metrics/{disk,cpu,memory}. Sans lien avec la série
 * temporelle stockée : rien n'est écrit.
 */

use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use sysinfo::{Disks, System};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Serialize)]
pub struct DiskReport {
    pub mount: String,
    pub total: String,
    pub used: String,
    pub free: String,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct CpuReport {
    pub utilization: f32,
    pub utilization_per_core: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct MemoryReport {
    pub total: String,
    pub used: String,
    pub free: String,
    pub percentage: f64,
}

pub fn bytes_to_gb(bytes: u64) -> String {
    format!("{:.2}GB", bytes as f64 / GIB)
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

/// Disque monté sur `/`, sinon le premier disque listé
pub fn disk_report() -> Option<DiskReport> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().next())?;

    let total = disk.total_space();
    let free = disk.available_space();
    let used = total.saturating_sub(free);
    Some(DiskReport {
        mount: disk.mount_point().to_string_lossy().to_string(),
        total: bytes_to_gb(total),
        used: bytes_to_gb(used),
        free: bytes_to_gb(free),
        percentage: percent(used, total),
    })
}

/// Moyenne sur `window` (au moins l'intervalle minimal de sysinfo)
pub async fn cpu_report(window: Duration) -> CpuReport {
    let mut sys = System::new();
    sys.refresh_cpu();
    tokio::time::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
    sys.refresh_cpu();

    CpuReport {
        utilization: sys.global_cpu_info().cpu_usage(),
        utilization_per_core: sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
    }
}

pub fn memory_report() -> MemoryReport {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let free = sys.available_memory();
    let used = total.saturating_sub(free);
    MemoryReport {
        total: bytes_to_gb(total),
        used: bytes_to_gb(used),
        free: bytes_to_gb(free),
        percentage: percent(used, total),
    }
}
