use serde::{Deserialize, Serialize};

pub mod capacity;
pub mod classify;
pub mod config;
pub mod report;

pub use capacity::{CapacityEstimate, CapacityEstimates, Resource, estimate};
pub use classify::{HealthState, classify};
pub use config::{CapacityConfig, CapacityProfile, Configuration, Thresholds};
pub use report::{
    ClusterReport, DiskRow, MetricRow, NodeSummary, Report, compose, compose_cluster,
};

const KIB: f64 = 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A single point-in-time read of host resource counters.
///
/// Built by the metrics probe for every request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub hostname: String,
    /// Seconds since the unix epoch, UTC.
    pub now_ts: i64,
    /// Logical CPUs, at least 1.
    pub cpu_count: u32,
    pub cpu_usage_percent: Option<f64>,
    pub mem_total_kb: u64,
    pub mem_available_kb: Option<u64>,
    pub load: Option<LoadAverage>,
    pub uptime_seconds: Option<f64>,
    /// Monitored disks in configured order, one entry per mountpoint.
    pub disks: Vec<DiskUsage>,
}

/// Load averages come as a triple or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mountpoint: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    /// Used space as a percentage of the total, absent for a zero-sized filesystem.
    pub fn used_percent(&self) -> Option<f64> {
        (self.total_bytes > 0).then(|| self.used_bytes as f64 / self.total_bytes as f64 * 100.0)
    }
}

pub fn kib_to_gib(kib: u64) -> f64 {
    kib as f64 * KIB / GIB
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_percent_is_absent_for_zero_total() {
        let disk = DiskUsage {
            mountpoint: "/mnt/empty".to_owned(),
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
        };
        assert_eq!(disk.used_percent(), None);
    }

    #[test]
    fn disk_percent() {
        let disk = DiskUsage {
            mountpoint: "/".to_owned(),
            total_bytes: 400,
            used_bytes: 100,
            free_bytes: 300,
        };
        assert_eq!(disk.used_percent(), Some(25.0));
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(kib_to_gib(1024 * 1024), 1.0);
        assert_eq!(bytes_to_gib(3 * 1024 * 1024 * 1024), 3.0);
    }
}
