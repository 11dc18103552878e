//! Host sampling: point-in-time CPU, memory and disk utilization
//!
//! A failed reading never aborts a cycle. The field is replaced by
//! [`UNAVAILABLE`] and the failure is logged.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};
use tracing::{debug, warn};

/// Sentinel sent for a field whose reading failed.
/// Real utilization is always within [0, 100].
pub const UNAVAILABLE: f32 = -1.0;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("no CPU information available")]
    NoCpu,
    #[error("total memory reported as zero")]
    NoMemory,
    #[error("no disk mounted at {0}")]
    DiskNotFound(String),
    #[error("disk at {0} reports zero capacity")]
    EmptyDisk(String),
}

/// One utilization snapshot, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub disk_pct: f32,
}

impl Sample {
    /// Build a sample, degrading each failed field independently
    pub fn from_readings(
        cpu: Result<f32, SampleError>,
        mem: Result<f32, SampleError>,
        disk: Result<f32, SampleError>,
    ) -> Self {
        Self {
            cpu_pct: or_unavailable("cpu", cpu),
            mem_pct: or_unavailable("memory", mem),
            disk_pct: or_unavailable("disk", disk),
        }
    }

    pub fn is_degraded(&self) -> bool {
        [self.cpu_pct, self.mem_pct, self.disk_pct].contains(&UNAVAILABLE)
    }
}

fn or_unavailable(field: &'static str, reading: Result<f32, SampleError>) -> f32 {
    match reading {
        Ok(value) => value,
        Err(e) => {
            warn!(field, error = %e, "Reading unavailable, sending sentinel");
            UNAVAILABLE
        }
    }
}

/// Source of utilization snapshots. May block briefly (CPU averaging window).
pub trait HostSampler: Send {
    fn sample(&mut self) -> impl Future<Output = Sample> + Send;
}

/// sysinfo-backed sampler
pub struct SysinfoSampler {
    sys: System,
    disks: Disks,
    cpu_window: Duration,
    disk_mount: PathBuf,
}

impl SysinfoSampler {
    pub fn new(cpu_window: Duration, disk_mount: impl Into<PathBuf>) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            cpu_window: cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
            disk_mount: disk_mount.into(),
        }
    }

    async fn cpu_pct(&mut self) -> Result<f32, SampleError> {
        self.sys.refresh_cpu();
        tokio::time::sleep(self.cpu_window).await;
        self.sys.refresh_cpu();

        if self.sys.cpus().is_empty() {
            return Err(SampleError::NoCpu);
        }
        Ok(self.sys.global_cpu_info().cpu_usage())
    }

    fn mem_pct(&mut self) -> Result<f32, SampleError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(SampleError::NoMemory);
        }
        let used = total.saturating_sub(self.sys.available_memory());
        Ok((used as f64 / total as f64 * 100.0) as f32)
    }

    fn disk_pct(&mut self) -> Result<f32, SampleError> {
        self.disks.refresh_list();
        let mount = self.disk_mount.to_string_lossy().to_string();
        let disk = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new(&self.disk_mount))
            .ok_or_else(|| SampleError::DiskNotFound(mount.clone()))?;

        let total = disk.total_space();
        if total == 0 {
            return Err(SampleError::EmptyDisk(mount));
        }
        let used = total.saturating_sub(disk.available_space());
        Ok((used as f64 / total as f64 * 100.0) as f32)
    }
}

impl HostSampler for SysinfoSampler {
    async fn sample(&mut self) -> Sample {
        let cpu = self.cpu_pct().await;
        let mem = self.mem_pct();
        let disk = self.disk_pct();

        let sample = Sample::from_readings(cpu, mem, disk);
        debug!(
            cpu = sample.cpu_pct,
            mem = sample.mem_pct,
            disk = sample.disk_pct,
            "Host sampled"
        );
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_field_gets_sentinel() {
        let sample = Sample::from_readings(Ok(12.5), Err(SampleError::NoMemory), Ok(40.0));
        assert_eq!(sample.cpu_pct, 12.5);
        assert_eq!(sample.mem_pct, UNAVAILABLE);
        assert_eq!(sample.disk_pct, 40.0);
        assert!(sample.is_degraded());
    }

    #[test]
    fn test_all_fields_fail_independently() {
        let sample = Sample::from_readings(
            Err(SampleError::NoCpu),
            Err(SampleError::NoMemory),
            Err(SampleError::DiskNotFound("/data".into())),
        );
        assert_eq!(sample, Sample { cpu_pct: UNAVAILABLE, mem_pct: UNAVAILABLE, disk_pct: UNAVAILABLE });
    }

    #[test]
    fn test_healthy_sample_is_not_degraded() {
        let sample = Sample::from_readings(Ok(0.0), Ok(55.0), Ok(100.0));
        assert!(!sample.is_degraded());
    }

    #[tokio::test]
    async fn test_unknown_mount_degrades_only_disk() {
        let mut sampler = SysinfoSampler::new(Duration::from_millis(0), "/definitely/not/a/mount");
        let sample = sampler.sample().await;
        assert_eq!(sample.disk_pct, UNAVAILABLE);
        assert!(sample.cpu_pct >= 0.0);
        assert!((0.0..=100.0).contains(&sample.mem_pct));
    }
}
