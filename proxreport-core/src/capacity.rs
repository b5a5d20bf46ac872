//! Conservative estimate of how many more VMs of a profile fit on a host.
//!
//! Every resource is reduced by its reserve and the tightest one wins, so the
//! estimate errs towards undercounting.

use serde::{Deserialize, Serialize};

use crate::{CapacityConfig, CapacityProfile, HostSnapshot, bytes_to_gib};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Ram,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEstimate {
    pub profile_name: String,
    pub vcpus: u32,
    pub ram_mb: u32,
    pub disk_gb: u32,
    pub estimated_count: u64,
    /// Resource that produced the lowest limit.
    pub bottleneck: Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEstimates {
    pub standard: CapacityEstimate,
    pub light: CapacityEstimate,
}

/// Resources left on the host after reserves. `None` means unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Available {
    cores: f64,
    ram_mb: Option<f64>,
    disk_gb: Option<f64>,
}

impl Available {
    fn new(config: &CapacityConfig, snapshot: &HostSnapshot) -> Self {
        let load1 = snapshot.load.map_or(0.0, |load| load.one);
        let cores = (f64::from(snapshot.cpu_count) - load1 - config.reserve_cores).max(0.0);

        let ram_mb = snapshot
            .mem_available_kb
            .map(|kb| (kb as f64 / 1024.0 - config.reserve_ram_mb).max(0.0));

        // The fullest monitored disk bounds what can be provisioned.
        let disk_gb = snapshot
            .disks
            .iter()
            .map(|disk| bytes_to_gib(disk.free_bytes))
            .reduce(f64::min)
            .map(|free_gb| (free_gb - config.reserve_disk_gb).max(0.0));

        Self {
            cores,
            ram_mb,
            disk_gb,
        }
    }

    fn fit(&self, profile: &CapacityProfile) -> CapacityEstimate {
        let cpu_limit = whole_units(self.cores, profile.vcpus);
        let ram_limit = self
            .ram_mb
            .map_or(cpu_limit, |ram| whole_units(ram, profile.ram_mb));
        let disk_limit = self
            .disk_gb
            .map_or(cpu_limit, |disk| whole_units(disk, profile.disk_gb));

        let (estimated_count, bottleneck) = [
            (cpu_limit, Resource::Cpu),
            (ram_limit, Resource::Ram),
            (disk_limit, Resource::Disk),
        ]
        .into_iter()
        // min_by_key keeps the first of equal elements
        .min_by_key(|(limit, _)| *limit)
        .unwrap_or((cpu_limit, Resource::Cpu));

        CapacityEstimate {
            profile_name: profile.name.clone(),
            vcpus: profile.vcpus,
            ram_mb: profile.ram_mb,
            disk_gb: profile.disk_gb,
            estimated_count,
            bottleneck,
        }
    }
}

/// How many whole `per_unit` quantities fit into `available`.
fn whole_units(available: f64, per_unit: u32) -> u64 {
    let per_unit = f64::from(per_unit.max(1));
    (available.max(0.0) / per_unit).floor() as u64
}

/// Estimate the standard and light profile counts for one host.
pub fn estimate(config: &CapacityConfig, snapshot: &HostSnapshot) -> CapacityEstimates {
    let available = Available::new(config, snapshot);
    CapacityEstimates {
        standard: available.fit(&config.standard),
        light: available.fit(&config.light),
    }
}
