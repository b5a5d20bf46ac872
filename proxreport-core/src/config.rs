//! Validated, read-only configuration consumed by the report pipeline.
//!
//! Loading and validation happen in the server; values arriving here are
//! assumed to satisfy the documented invariants.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub thresholds: Thresholds,
    pub capacity: CapacityConfig,
    /// Monitored mountpoints, unique, in display order.
    pub mountpoints: Vec<String>,
}

/// Warn/critical percentages per metric, `warn < crit`, all within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu_warn: u8,
    pub cpu_crit: u8,
    pub ram_warn: u8,
    pub ram_crit: u8,
    pub disk_warn: u8,
    pub disk_crit: u8,
}

/// Headroom kept for the host itself plus the two VM profiles to estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityConfig {
    pub reserve_cores: f64,
    pub reserve_ram_mb: f64,
    pub reserve_disk_gb: f64,
    pub standard: CapacityProfile,
    pub light: CapacityProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityProfile {
    pub name: String,
    pub vcpus: u32,
    pub ram_mb: u32,
    pub disk_gb: u32,
}
