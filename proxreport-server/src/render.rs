//! HTML pages for the report models. No scripts, pages refresh through a meta tag.

use std::{borrow::Cow, fmt::Write};

use proxreport_core::{
    CapacityEstimate, ClusterReport, Configuration, HealthState, MetricRow, Report, Resource,
    report::bar_percent,
};

pub const STYLESHEET: &str = include_str!("../static/style.css");

pub fn dashboard(report: &Report, config: &Configuration, autorefresh_seconds: u64) -> String {
    let refresh = autorefresh_seconds.max(1);
    let hostname = escape(&report.hostname);

    let mut rows = String::new();
    metric_row(&mut rows, "CPU usage", &report.cpu);
    metric_row(&mut rows, "RAM usage", &report.ram);
    for disk in &report.disks {
        metric_row(
            &mut rows,
            &format!("Disk {}", disk.mountpoint),
            &disk.usage,
        );
    }

    let mut capacity = String::new();
    capacity_row(&mut capacity, &report.capacity.standard);
    capacity_row(&mut capacity, &report.capacity.light);

    let reserves = &config.capacity;
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta http-equiv="refresh" content="{refresh}">
  <title>ProxReport - {hostname}</title>
  <link rel="stylesheet" href="/static/style.css">
</head>
<body>
  <div class="container">
    <div class="header">
      <div>
        <h1>ProxReport &mdash; {hostname}</h1>
        <div class="small">Updated {updated} &middot; Auto-refresh {refresh}s &middot; Uptime {uptime}</div>
      </div>
      <div class="small">Load: <code>{load}</code> &middot; CPUs: <code>{cpus}</code> &middot; <a href="/cluster">Cluster</a></div>
    </div>

    <div class="grid">
      <div class="card">
{rows}      </div>

      <div class="card">
        <div class="label">Capacity estimate (conservative)</div>
        <div class="small">Based on current load and available RAM/disk, minus reserves.</div>
        <table>
          <thead><tr><th>Profile</th><th>vCPU</th><th>RAM</th><th>Disk</th><th>Estimated VMs</th><th>Limited by</th></tr></thead>
          <tbody>
{capacity}          </tbody>
        </table>
      </div>

      <div class="card">
        <div class="label">Config</div>
        <div class="kv small">
          <div>Mountpoints</div><div><code>{mountpoints}</code></div>
          <div>Reserves</div><div><code>{cores} cores, {ram} MiB RAM, {disk} GiB disk</code></div>
        </div>
      </div>
    </div>
  </div>
</body>
</html>
"#,
        updated = escape(&report.updated),
        uptime = escape(&report.uptime),
        load = escape(&report.load),
        cpus = report.cpu_count,
        mountpoints = escape(&config.mountpoints.join(", ")),
        cores = reserves.reserve_cores,
        ram = reserves.reserve_ram_mb,
        disk = reserves.reserve_disk_gb,
    )
}

pub fn cluster(report: &ClusterReport) -> String {
    let mut cards = String::new();
    for node in &report.nodes {
        let _ = write!(
            cards,
            r#"      <div class="node-card {state}">
        <h2>{name}</h2>
{cpu}{ram}{disk}        <div class="small">Est. VMs: <code>{count}</code></div>
      </div>
"#,
            state = state_class(node.cpu_state),
            name = escape(&node.name),
            cpu = compact_row("CPU", node.cpu_pct, node.cpu_state),
            ram = compact_row("RAM", node.ram_pct, node.ram_state),
            disk = compact_row("Disk", node.disk_pct, node.disk_state),
            count = node.estimated_count,
        );
    }

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>ProxReport - Cluster</title>
  <link rel="stylesheet" href="/static/style.css">
</head>
<body>
  <div class="container">
    <div class="header">
      <h1>ProxReport &mdash; Cluster overview</h1>
      <div class="small">{count} nodes &middot; <a href="/">This node</a></div>
    </div>

    <div class="grid grid-nodes">
{cards}    </div>
  </div>
</body>
</html>
"#,
        count = report.nodes.len(),
    )
}

fn metric_row(out: &mut String, label: &str, row: &MetricRow) {
    let detail = match &row.detail {
        Some(detail) => format!(" &middot; {}", escape(detail)),
        None => String::new(),
    };
    let _ = write!(
        out,
        r#"        <div class="row">
          <div class="label">{label}</div>
          {bar}
          <div class="value"><span class="{state}">{percent}</span>{detail}</div>
        </div>
"#,
        label = escape(label),
        bar = bar(row.percent, row.state),
        state = state_class(row.state),
        percent = percent_text(row.percent),
    );
}

fn compact_row(label: &str, percent: Option<f64>, state: HealthState) -> String {
    format!(
        r#"        <div class="row compact">
          <div class="label">{label}</div>
          {bar}
          <div class="value {state}">{percent}</div>
        </div>
"#,
        bar = bar(percent, state),
        state = state_class(state),
        percent = percent_text(percent.map(|p| p.clamp(0.0, 100.0))),
    )
}

fn capacity_row(out: &mut String, estimate: &CapacityEstimate) {
    let _ = writeln!(
        out,
        "            <tr><td>{}</td><td>{}</td><td>{} MiB</td><td>{} GiB</td><td><code>{}</code></td><td>{}</td></tr>",
        escape(&estimate.profile_name),
        estimate.vcpus,
        estimate.ram_mb,
        estimate.disk_gb,
        estimate.estimated_count,
        resource_name(estimate.bottleneck),
    );
}

fn bar(percent: Option<f64>, state: HealthState) -> String {
    format!(
        r#"<div class="bar"><div class="fill {}" style="width:{:.1}%;"></div></div>"#,
        state_class(state),
        bar_percent(percent),
    )
}

fn state_class(state: HealthState) -> &'static str {
    match state {
        HealthState::Green => "state-green",
        HealthState::Amber => "state-amber",
        HealthState::Red => "state-red",
    }
}

fn resource_name(resource: Resource) -> &'static str {
    match resource {
        Resource::Cpu => "CPU",
        Resource::Ram => "RAM",
        Resource::Disk => "Disk",
    }
}

fn percent_text(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{p:.1}%"),
        None => "n/a".to_owned(),
    }
}

fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
