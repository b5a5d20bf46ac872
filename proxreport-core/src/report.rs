//! Presentation-neutral report model for a single host and for a cluster.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, macros::format_description};

use crate::{
    CapacityEstimates, Configuration, HealthState, HostSnapshot, bytes_to_gib, classify, estimate,
    kib_to_gib,
};

const NOT_AVAILABLE: &str = "n/a";

/// Utilization of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub percent: Option<f64>,
    pub state: HealthState,
    /// Human readable amount, e.g. `"3.0 / 8.0 GiB"`.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRow {
    pub mountpoint: String,
    #[serde(flatten)]
    pub usage: MetricRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub hostname: String,
    /// Snapshot time as `YYYY-MM-DD HH:MM:SSZ`.
    pub updated: String,
    pub cpu_count: u32,
    pub cpu: MetricRow,
    pub ram: MetricRow,
    /// Same order as the snapshot disks.
    pub disks: Vec<DiskRow>,
    pub load: String,
    pub uptime: String,
    pub capacity: CapacityEstimates,
}

/// Condensed view of one node, as shown on the cluster overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    pub cpu_pct: Option<f64>,
    pub cpu_state: HealthState,
    pub ram_pct: Option<f64>,
    pub ram_state: HealthState,
    pub disk_pct: Option<f64>,
    pub disk_state: HealthState,
    pub estimated_count: u64,
}

impl NodeSummary {
    /// Summarise a single-host report. The disk figures are those of the
    /// worst monitored disk and the estimate is the standard profile's.
    pub fn from_report(report: &Report) -> Self {
        let worst_disk = report
            .disks
            .iter()
            .map(|row| &row.usage)
            .max_by(|a, b| {
                a.state.cmp(&b.state).then_with(|| {
                    a.percent
                        .partial_cmp(&b.percent)
                        .unwrap_or(Ordering::Equal)
                })
            });
        let (disk_pct, disk_state) = match worst_disk {
            Some(row) => (row.percent, row.state),
            None => (None, HealthState::Amber),
        };

        Self {
            name: report.hostname.clone(),
            cpu_pct: report.cpu.percent,
            cpu_state: report.cpu.state,
            ram_pct: report.ram.percent,
            ram_state: report.ram.state,
            disk_pct,
            disk_state,
            estimated_count: report.capacity.standard.estimated_count,
        }
    }

    /// Summary for a node whose figures could not be obtained.
    pub fn unreachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpu_pct: None,
            cpu_state: HealthState::Amber,
            ram_pct: None,
            ram_state: HealthState::Amber,
            disk_pct: None,
            disk_state: HealthState::Amber,
            estimated_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub nodes: Vec<NodeSummary>,
}

/// Build the report for one host.
pub fn compose(config: &Configuration, snapshot: &HostSnapshot) -> Report {
    let thresholds = &config.thresholds;

    let cpu = MetricRow {
        percent: snapshot.cpu_usage_percent,
        state: classify(
            snapshot.cpu_usage_percent,
            thresholds.cpu_warn,
            thresholds.cpu_crit,
        ),
        detail: None,
    };

    let (ram_percent, ram_detail) = match snapshot.mem_available_kb {
        Some(available_kb) if snapshot.mem_total_kb > 0 => {
            let used_kb = snapshot.mem_total_kb.saturating_sub(available_kb);
            (
                Some(used_kb as f64 / snapshot.mem_total_kb as f64 * 100.0),
                Some(format!(
                    "{:.1} / {:.1} GiB",
                    kib_to_gib(used_kb),
                    kib_to_gib(snapshot.mem_total_kb)
                )),
            )
        }
        _ => (None, None),
    };
    let ram = MetricRow {
        percent: ram_percent,
        state: classify(ram_percent, thresholds.ram_warn, thresholds.ram_crit),
        detail: ram_detail,
    };

    let disks = snapshot
        .disks
        .iter()
        .map(|disk| {
            let percent = disk.used_percent();
            DiskRow {
                mountpoint: disk.mountpoint.clone(),
                usage: MetricRow {
                    percent,
                    state: classify(percent, thresholds.disk_warn, thresholds.disk_crit),
                    detail: Some(format!(
                        "{:.1} / {:.1} GiB",
                        bytes_to_gib(disk.used_bytes),
                        bytes_to_gib(disk.total_bytes)
                    )),
                },
            }
        })
        .collect();

    let load = match snapshot.load {
        Some(load) => format!(
            "{:.2} {:.2} {:.2} (1/5/15m)",
            load.one, load.five, load.fifteen
        ),
        None => NOT_AVAILABLE.to_owned(),
    };

    let uptime = match snapshot.uptime_seconds {
        Some(seconds) => format_duration(seconds.max(0.0) as u64),
        None => NOT_AVAILABLE.to_owned(),
    };

    Report {
        hostname: snapshot.hostname.clone(),
        updated: format_timestamp(snapshot.now_ts),
        cpu_count: snapshot.cpu_count,
        cpu,
        ram,
        disks,
        load,
        uptime,
        capacity: estimate(&config.capacity, snapshot),
    }
}

/// Assemble the cluster overview. Node order is kept as given.
pub fn compose_cluster(nodes: Vec<NodeSummary>) -> ClusterReport {
    ClusterReport { nodes }
}

/// Compact duration such as `3d 4h 5m`, dropping seconds once hours appear.
pub fn format_duration(seconds: u64) -> String {
    let (days, rem) = (seconds / 86_400, seconds % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (mins, secs) = (rem / 60, rem % 60);

    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| {
            dt.format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]Z"
            ))
            .ok()
        })
        .unwrap_or_else(|| NOT_AVAILABLE.to_owned())
}

/// Clamp a percentage into `0..=100` for drawing a bar. Absent reads as empty.
pub fn bar_percent(percent: Option<f64>) -> f64 {
    percent.map_or(0.0, |p| p.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiskUsage, fixtures};

    fn disk(mountpoint: &str, total_bytes: u64, used_bytes: u64) -> DiskUsage {
        DiskUsage {
            mountpoint: mountpoint.to_owned(),
            total_bytes,
            used_bytes,
            free_bytes: total_bytes.saturating_sub(used_bytes),
        }
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(3_661), "1h 1m");
        assert_eq!(format_duration(90_061), "1d 1h 1m");
        assert_eq!(format_duration(86_400), "1d 0h 0m");
    }

    #[test]
    fn ram_used_percent() {
        let report = compose(&fixtures::configuration(), &fixtures::snapshot());
        assert_eq!(report.ram.percent, Some(75.0));
        assert_eq!(report.ram.state, HealthState::Amber);
        assert!(report.ram.detail.is_some());
    }

    #[test]
    fn stale_ram_sample_is_clamped() {
        let snapshot = HostSnapshot {
            mem_total_kb: 1_000,
            mem_available_kb: Some(1_500),
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);
        assert_eq!(report.ram.percent, Some(0.0));
        assert_eq!(report.ram.state, HealthState::Green);
    }

    #[test]
    fn unknown_ram_is_amber() {
        let config = fixtures::configuration();
        for snapshot in [
            HostSnapshot {
                mem_available_kb: None,
                ..fixtures::snapshot()
            },
            HostSnapshot {
                mem_total_kb: 0,
                ..fixtures::snapshot()
            },
        ] {
            let report = compose(&config, &snapshot);
            assert_eq!(report.ram.percent, None);
            assert_eq!(report.ram.state, HealthState::Amber);
            assert_eq!(report.ram.detail, None);
        }
    }

    #[test]
    fn disk_rows_keep_order_and_handle_zero_total() {
        let snapshot = HostSnapshot {
            disks: vec![
                disk("/var/lib/vz", 100, 95),
                disk("/", 100, 10),
                disk("/mnt/empty", 0, 0),
            ],
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);

        let rows: Vec<_> = report
            .disks
            .iter()
            .map(|row| (row.mountpoint.as_str(), row.usage.percent, row.usage.state))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("/var/lib/vz", Some(95.0), HealthState::Red),
                ("/", Some(10.0), HealthState::Green),
                ("/mnt/empty", None, HealthState::Amber),
            ]
        );
    }

    #[test]
    fn cpu_is_classified_raw() {
        let snapshot = HostSnapshot {
            cpu_usage_percent: Some(95.0),
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);
        assert_eq!(report.cpu.percent, Some(95.0));
        assert_eq!(report.cpu.state, HealthState::Red);

        let snapshot = HostSnapshot {
            cpu_usage_percent: None,
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);
        assert_eq!(report.cpu.state, HealthState::Amber);
    }

    #[test]
    fn load_uptime_and_timestamp_strings() {
        let report = compose(&fixtures::configuration(), &fixtures::snapshot());
        assert_eq!(report.load, "2.00 1.50 1.25 (1/5/15m)");
        assert_eq!(report.uptime, "1d 1h 1m");
        assert_eq!(report.updated, "2023-11-14 22:13:20Z");

        let snapshot = HostSnapshot {
            load: None,
            uptime_seconds: None,
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);
        assert_eq!(report.load, "n/a");
        assert_eq!(report.uptime, "n/a");
    }

    #[test]
    fn report_carries_both_estimates() {
        let snapshot = HostSnapshot {
            mem_available_kb: None,
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);
        assert_eq!(report.capacity.standard.estimated_count, 2);
        assert_eq!(report.capacity.light.estimated_count, 5);
    }

    #[test]
    fn summary_picks_worst_disk() {
        let snapshot = HostSnapshot {
            disks: vec![
                disk("/", 100, 85),
                disk("/var/lib/vz", 100, 60),
                disk("/mnt/backup", 100, 82),
            ],
            ..fixtures::snapshot()
        };
        let report = compose(&fixtures::configuration(), &snapshot);
        let summary = NodeSummary::from_report(&report);

        assert_eq!(summary.name, "pve-node01");
        assert_eq!(summary.disk_pct, Some(85.0));
        assert_eq!(summary.disk_state, HealthState::Amber);
        assert_eq!(summary.ram_pct, Some(75.0));
        assert_eq!(summary.cpu_state, HealthState::Green);
        assert_eq!(
            summary.estimated_count,
            report.capacity.standard.estimated_count
        );
    }

    #[test]
    fn summary_without_disks_is_amber() {
        let report = compose(&fixtures::configuration(), &fixtures::snapshot());
        let summary = NodeSummary::from_report(&report);
        assert_eq!(summary.disk_pct, None);
        assert_eq!(summary.disk_state, HealthState::Amber);
    }

    #[test]
    fn cluster_keeps_node_order_and_states() {
        let mut busy = NodeSummary::unreachable("pve-node02");
        busy.cpu_pct = Some(10.0);
        // deliberately inconsistent with any threshold
        busy.cpu_state = HealthState::Red;
        let nodes = vec![
            NodeSummary::unreachable("pve-node03"),
            busy.clone(),
            NodeSummary::unreachable("pve-node01"),
        ];

        let cluster = compose_cluster(nodes.clone());
        assert_eq!(cluster.nodes, nodes);
        assert_eq!(cluster.nodes[1].cpu_state, HealthState::Red);
    }

    #[test]
    fn bar_is_clamped_for_display() {
        assert_eq!(bar_percent(None), 0.0);
        assert_eq!(bar_percent(Some(-3.0)), 0.0);
        assert_eq!(bar_percent(Some(42.5)), 42.5);
        assert_eq!(bar_percent(Some(130.0)), 100.0);
    }
}
