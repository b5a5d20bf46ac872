use std::path::Path;

use futures_util::future::BoxFuture;
use proxreport_core::{DiskUsage, HostSnapshot, LoadAverage};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use time::OffsetDateTime;
use tracing::debug;

/// Source of host snapshots for the report pipeline.
pub trait SnapshotSource: Send + Sync {
    fn snapshot<'a>(&'a self, mountpoints: &'a [String]) -> BoxFuture<'a, HostSnapshot>;
}

/// Reads the local host through sysinfo.
///
/// Every snapshot samples on its own [`System`] in a blocking task, CPU usage
/// is measured over [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`].
#[derive(Debug, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }

    async fn query(&self, mountpoints: &[String]) -> HostSnapshot {
        let mountpoints = mountpoints.to_vec();
        match tokio::task::spawn_blocking(move || query_blocking(&mountpoints)).await {
            Ok(snapshot) => snapshot,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

impl SnapshotSource for SystemProbe {
    fn snapshot<'a>(&'a self, mountpoints: &'a [String]) -> BoxFuture<'a, HostSnapshot> {
        Box::pin(self.query(mountpoints))
    }
}

fn query_blocking(mountpoints: &[String]) -> HostSnapshot {
    let mut system = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything()),
    );
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_cpu_usage();

    let cpu_count = system.cpus().len().max(1) as u32;
    let cpu_usage_percent =
        sysinfo::IS_SUPPORTED_SYSTEM.then(|| f64::from(system.global_cpu_usage()));

    let mem_total_kb = system.total_memory() / 1024;
    let mem_available_kb = (sysinfo::IS_SUPPORTED_SYSTEM && mem_total_kb > 0)
        .then(|| system.available_memory() / 1024);

    let disks = Disks::new_with_refreshed_list();
    let disks = select_disks(
        mountpoints,
        disks.list().iter().map(|disk| {
            (
                disk.mount_point(),
                disk.total_space(),
                disk.available_space(),
            )
        }),
    );

    HostSnapshot {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_owned()),
        now_ts: OffsetDateTime::now_utc().unix_timestamp(),
        cpu_count,
        cpu_usage_percent,
        mem_total_kb,
        mem_available_kb,
        load: query_load(),
        uptime_seconds: sysinfo::IS_SUPPORTED_SYSTEM.then(|| System::uptime() as f64),
        disks,
    }
}

#[cfg(unix)]
fn query_load() -> Option<LoadAverage> {
    let load = System::load_average();
    Some(LoadAverage {
        one: load.one,
        five: load.five,
        fifteen: load.fifteen,
    })
}

#[cfg(not(unix))]
fn query_load() -> Option<LoadAverage> {
    None
}

/// Pick the usage of every configured mountpoint, in configured order.
/// Mountpoints that are not mounted are left out.
fn select_disks<'a>(
    mountpoints: &[String],
    mounted: impl Iterator<Item = (&'a Path, u64, u64)> + Clone,
) -> Vec<DiskUsage> {
    mountpoints
        .iter()
        .filter_map(|mountpoint| {
            let found = mounted
                .clone()
                .find(|(path, _, _)| *path == Path::new(mountpoint));
            if found.is_none() {
                debug!(%mountpoint, "mountpoint not found, skipping");
            }
            found.map(|(_, total, available)| DiskUsage {
                mountpoint: mountpoint.clone(),
                total_bytes: total,
                used_bytes: total.saturating_sub(available),
                free_bytes: available,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) struct FixedSnapshot(pub HostSnapshot);

#[cfg(test)]
impl SnapshotSource for FixedSnapshot {
    fn snapshot<'a>(&'a self, _mountpoints: &'a [String]) -> BoxFuture<'a, HostSnapshot> {
        Box::pin(std::future::ready(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disks_follow_configured_order() {
        let mounted = [
            (Path::new("/"), 1000, 400),
            (Path::new("/boot"), 100, 90),
            (Path::new("/var/lib/vz"), 5000, 6000),
        ];
        let mountpoints = vec![
            "/var/lib/vz".to_owned(),
            "/mnt/missing".to_owned(),
            "/".to_owned(),
        ];

        let disks = select_disks(&mountpoints, mounted.iter().copied());

        assert_eq!(
            disks,
            vec![
                DiskUsage {
                    mountpoint: "/var/lib/vz".to_owned(),
                    total_bytes: 5000,
                    used_bytes: 0,
                    free_bytes: 6000,
                },
                DiskUsage {
                    mountpoint: "/".to_owned(),
                    total_bytes: 1000,
                    used_bytes: 600,
                    free_bytes: 400,
                },
            ]
        );
    }

    #[tokio::test]
    async fn probe_local_host() {
        let probe = SystemProbe::new();
        let snapshot = probe.snapshot(&["/".to_owned()]).await;

        assert!(snapshot.cpu_count >= 1);
        assert!(!snapshot.hostname.is_empty());
        assert!(snapshot.now_ts > 0);
        println!("{snapshot:?}");
    }

    #[tokio::test]
    async fn concurrent_snapshots_sample_in_parallel() {
        let probe = SystemProbe::new();
        let mountpoints = ["/".to_owned()];

        let started = std::time::Instant::now();
        let snapshots = futures_util::future::join_all(
            (0..4).map(|_| probe.snapshot(&mountpoints)),
        )
        .await;

        assert_eq!(snapshots.len(), 4);
        assert!(started.elapsed() < 4 * sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }
}
