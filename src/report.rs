//! Report generation for a discovery run.
//!
//! Produces a human-readable text report, a JSON document, or a GraphViz
//! graph from the fused topology and its validation issues.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use crate::collector::{DiscoveryMethod, HostStatus};
use crate::orchestrator::CollectionRun;
use crate::topology::{Link, Severity, Topology, ValidationIssue};

/// Output format selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Dot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    pub total_hosts: usize,
    pub succeeded_hosts: usize,
    pub degraded_hosts: usize,
    pub failed_hosts: usize,
    pub total_interfaces: usize,
    pub total_links: usize,
    pub total_conflicts: usize,
    pub dangling_observations: usize,
}

/// Per-host row of the status table
#[derive(Debug, Clone, Serialize)]
pub struct HostSummary {
    pub name: String,
    pub address: String,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub elapsed_ms: u64,
    pub interfaces: usize,
    pub neighbor_observations: usize,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub metadata: ReportMetadata,
    pub hosts: Vec<HostSummary>,
    pub topology: Topology,
    pub issues: Vec<ValidationIssue>,
}

impl DiscoveryReport {
    pub fn new(run: &CollectionRun, topology: Topology, issues: Vec<ValidationIssue>, inventory: Option<&Path>) -> Self {
        let hosts = run
            .hosts
            .iter()
            .map(|set| HostSummary {
                name: set.host.name.clone(),
                address: set.host.address.clone(),
                status: set.status,
                failure: set.failure.as_ref().map(|f| format!("{}: {}", f.cause, f.detail)),
                elapsed_ms: set.elapsed_ms,
                interfaces: set.interfaces.len(),
                neighbor_observations: set.neighbors.len(),
                diagnostics: set.diagnostics.iter().map(ToString::to_string).collect(),
            })
            .collect();

        let metadata = ReportMetadata {
            generated_at: Utc::now(),
            started_at: run.started_at,
            duration_ms: run.elapsed.as_millis() as u64,
            inventory: inventory.map(|p| p.display().to_string()),
            total_hosts: run.hosts.len(),
            succeeded_hosts: run.count(HostStatus::Succeeded),
            degraded_hosts: run.count(HostStatus::Degraded),
            failed_hosts: run.count(HostStatus::Failed),
            total_interfaces: topology.interface_count(),
            total_links: topology.links.len(),
            total_conflicts: topology.conflicts.len(),
            dangling_observations: topology.dangling.len(),
        };

        Self { metadata, hosts, topology, issues }
    }
}

fn method_list(link: &Link) -> String {
    link.methods.iter().map(DiscoveryMethod::as_str).collect::<Vec<_>>().join("+")
}

const MATRIX_COLUMN: usize = 12;

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

/// Host-by-host grid: `local-peer` interface pair for a single link, a count
/// for several, `.` for none
fn connection_matrix(topology: &Topology) -> Vec<String> {
    let hosts: Vec<&String> = topology.hosts.keys().collect();
    if hosts.is_empty() {
        return vec!["(no hosts)".to_string()];
    }

    let mut adjacency: BTreeMap<(&str, &str), Vec<(&str, &str)>> = BTreeMap::new();
    for link in &topology.links {
        let (a, b) = (&link.a, &link.b);
        adjacency
            .entry((a.host.as_str(), b.host.as_str()))
            .or_default()
            .push((a.interface.as_str(), b.interface.as_str()));
        adjacency
            .entry((b.host.as_str(), a.host.as_str()))
            .or_default()
            .push((b.interface.as_str(), a.interface.as_str()));
    }

    let w = MATRIX_COLUMN;
    let mut lines = Vec::with_capacity(hosts.len() + 2);
    let header: String = hosts.iter().map(|h| format!("{:^w$}", truncate(h, w))).collect();
    lines.push(format!("{:w$}{}", "", header));
    lines.push("-".repeat(w * (hosts.len() + 1)));

    for row in &hosts {
        let mut line = format!("{:<w$}", truncate(row, w));
        for col in &hosts {
            let cell = if row == col {
                "-".to_string()
            } else {
                match adjacency.get(&(row.as_str(), col.as_str())).map(Vec::as_slice) {
                    Some([(local, peer)]) => format!("{}-{}", local, peer),
                    Some(pairs) if !pairs.is_empty() => format!("{} links", pairs.len()),
                    _ => ".".to_string(),
                }
            };
            line.push_str(&format!("{:^w$}", truncate(&cell, w)));
        }
        lines.push(line.trim_end().to_string());
    }
    lines
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

/// Render the human-readable report
pub fn render_text(report: &DiscoveryReport) -> String {
    let meta = &report.metadata;
    let topo = &report.topology;
    let mut lines: Vec<String> = Vec::new();

    section(&mut lines, "LINKSCOPE TOPOLOGY DISCOVERY");
    lines.push(format!("Run Started: {}", meta.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    if let Some(inventory) = &meta.inventory {
        lines.push(format!("Inventory: {}", inventory));
    }
    lines.push(format!("Duration: {:.1}s", meta.duration_ms as f64 / 1000.0));
    lines.push(format!(
        "Hosts: {} ({} succeeded, {} degraded, {} failed)",
        meta.total_hosts, meta.succeeded_hosts, meta.degraded_hosts, meta.failed_hosts
    ));
    lines.push(format!("Interfaces: {}", meta.total_interfaces));
    lines.push(format!("Links: {}", meta.total_links));
    lines.push(format!("Conflicts: {}", meta.total_conflicts));
    lines.push(format!("Unresolved Observations: {}", meta.dangling_observations));
    lines.push(String::new());

    section(&mut lines, "HOST STATUS");
    lines.push(format!("{:<20} {:<18} {:<10} {:>6} {:>6} {:>8}", "HOST", "ADDRESS", "STATUS", "IFACES", "NEIGH", "TIME"));
    lines.push("-".repeat(80));
    for host in &report.hosts {
        lines.push(format!(
            "{:<20} {:<18} {:<10} {:>6} {:>6} {:>7.1}s",
            host.name,
            host.address,
            host.status.to_string(),
            host.interfaces,
            host.neighbor_observations,
            host.elapsed_ms as f64 / 1000.0
        ));
        if let Some(failure) = &host.failure {
            lines.push(format!("    failure: {}", failure));
        }
        for diagnostic in &host.diagnostics {
            lines.push(format!("    note: {}", diagnostic));
        }
    }
    lines.push(String::new());

    section(&mut lines, "INTERFACES");
    for host in topo.hosts.values() {
        if host.interfaces.is_empty() {
            continue;
        }
        lines.push(format!("{}:", host.name));
        for (name, node) in &host.interfaces {
            let fact = &node.fact;
            let carrier = match &node.link_state {
                Some(state) if state.carrier => "carrier",
                Some(_) => "no-carrier",
                None => "-",
            };
            lines.push(format!(
                "  {:<14} {:<17} {:<8} {:<10} {:<10} {:<8} {}",
                name,
                fact.mac.as_deref().unwrap_or("-"),
                fact.oper_state.to_string(),
                carrier,
                fact.speed.as_deref().unwrap_or("-"),
                fact.duplex.as_deref().unwrap_or("-"),
                fact.ipv4_addresses.join(",")
            ));
        }
        lines.push(String::new());
    }

    section(&mut lines, "CONNECTION MATRIX");
    lines.extend(connection_matrix(topo));
    lines.push(String::new());

    section(&mut lines, "LINKS");
    if topo.links.is_empty() {
        lines.push("No links inferred.".to_string());
    }
    for link in &topo.links {
        let mut flags = Vec::new();
        if link.high_confidence {
            flags.push("high-confidence");
        }
        if !link.is_bidirectional() {
            flags.push("one-sided");
        }
        if link.is_conflicting() {
            flags.push("CONFLICT");
        }
        lines.push(format!(
            "  {} <-> {}  [{}; confidence {}]{}",
            link.a,
            link.b,
            method_list(link),
            link.confidence,
            if flags.is_empty() { String::new() } else { format!(" ({})", flags.join(", ")) }
        ));
    }
    lines.push(String::new());

    if !topo.conflicts.is_empty() {
        section(&mut lines, "CONFLICTS");
        for conflict in &topo.conflicts {
            lines.push(format!("{} has {} candidate peers:", conflict.endpoint, conflict.candidates.len()));
            for candidate in &conflict.candidates {
                let methods: Vec<&str> = candidate.methods.iter().map(DiscoveryMethod::as_str).collect();
                lines.push(format!("  - {} via {}", candidate.peer, methods.join("+")));
            }
        }
        lines.push(String::new());
    }

    if !topo.dangling.is_empty() {
        section(&mut lines, "UNRESOLVED OBSERVATIONS");
        for d in &topo.dangling {
            let obs = &d.observation;
            let claimed = obs
                .remote_host
                .as_deref()
                .or(obs.remote_mac.as_deref())
                .or(obs.remote_ip.as_deref())
                .unwrap_or("?");
            lines.push(format!(
                "  {}:{} [{}] -> {} ({})",
                obs.local_host, obs.local_interface, obs.method, claimed, d.reason
            ));
        }
        lines.push(String::new());
    }

    section(&mut lines, "VALIDATION");
    if report.issues.is_empty() {
        lines.push("No issues found.".to_string());
    }
    for issue in &report.issues {
        let location = match &issue.interface {
            Some(interface) => format!("{}:{}", issue.host, interface),
            None => issue.host.clone(),
        };
        lines.push(format!("  [{:<7}] {}: {}", issue.severity, location, issue.message));
    }
    let errors = report.issues.iter().filter(|i| i.severity == Severity::Error).count();
    lines.push(String::new());
    lines.push(format!("{} issue(s), {} error(s)", report.issues.len(), errors));
    lines.push("=".repeat(80));

    lines.join("\n") + "\n"
}

/// Render the full report as pretty-printed JSON
pub fn render_json(report: &DiscoveryReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
}

fn dot_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render the topology as an undirected GraphViz graph, one cluster per host.
///
/// Bold edges are high-confidence, dashed edges rest on a single method
/// weaker than LLDP, red edges are in conflict.
pub fn render_dot(topology: &Topology) -> String {
    let mut dot = String::new();
    dot.push_str("graph Topology {\n");
    dot.push_str("    rankdir=LR;\n");
    dot.push_str("    node [shape=box, style=rounded];\n\n");

    for (i, host) in topology.hosts.values().enumerate() {
        let color = match host.status {
            HostStatus::Succeeded => "black",
            HostStatus::Degraded => "orange",
            HostStatus::Failed => "red",
        };
        dot.push_str(&format!("    subgraph cluster_{} {{\n", i));
        dot.push_str(&format!("        label={};\n", dot_quote(&host.name)));
        dot.push_str(&format!("        color={};\n", color));
        if host.interfaces.is_empty() {
            dot.push_str(&format!(
                "        {} [label=\"(no data)\", shape=plaintext];\n",
                dot_quote(&format!("{}:", host.name))
            ));
        }
        for name in host.interfaces.keys() {
            dot.push_str(&format!(
                "        {} [label={}];\n",
                dot_quote(&format!("{}:{}", host.name, name)),
                dot_quote(name)
            ));
        }
        dot.push_str("    }\n\n");
    }

    for link in &topology.links {
        let mut attrs = vec![format!("label={}", dot_quote(&method_list(link)))];
        if link.high_confidence {
            attrs.push("penwidth=2".to_string());
        } else if link.confidence < DiscoveryMethod::Lldp {
            attrs.push("style=dashed".to_string());
        }
        if link.is_conflicting() {
            attrs.push("color=red".to_string());
        }
        dot.push_str(&format!(
            "    {} -- {} [{}];\n",
            dot_quote(&link.a.to_string()),
            dot_quote(&link.b.to_string()),
            attrs.join(", ")
        ));
    }

    dot.push_str("}\n");
    dot
}

pub fn render(report: &DiscoveryReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Json => render_json(report),
        ReportFormat::Dot => Ok(render_dot(&report.topology)),
    }
}

/// Write the report to `output`, or to stdout when no path is given
pub fn write_report(report: &DiscoveryReport, format: ReportFormat, output: Option<&Path>) -> Result<()> {
    let rendered = render(report, format)?;
    match output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Failed to write report to {}", path.display()))?;
            log::info!("Report written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{FailureCause, Host, HostFactSet, InterfaceFact, NeighborObservation};
    use crate::topology::{fuse, validate_topology, ValidationConfig};
    use std::time::Duration;

    fn sample_report() -> DiscoveryReport {
        let mut a = HostFactSet::failed(Host::new("a", "10.0.0.1"), FailureCause::Aborted, "");
        a.status = HostStatus::Succeeded;
        a.failure = None;
        a.interfaces.push(InterfaceFact::new("eth0").with_mac("02:00:00:00:00:0a"));
        a.neighbors.push(
            NeighborObservation::new(DiscoveryMethod::Arp, "a", "eth0").with_remote_mac("02:00:00:00:00:0b"),
        );

        let mut b = HostFactSet::failed(Host::new("b", "10.0.0.2"), FailureCause::Aborted, "");
        b.status = HostStatus::Succeeded;
        b.failure = None;
        b.interfaces.push(InterfaceFact::new("eth0").with_mac("02:00:00:00:00:0b"));

        let down = HostFactSet::failed(Host::new("c", "10.0.0.3"), FailureCause::Unreachable, "connection refused");

        let run = CollectionRun { hosts: vec![a, b, down], started_at: Utc::now(), elapsed: Duration::from_secs(3) };
        let topology = fuse(&run.hosts);
        let issues = validate_topology(&topology, &ValidationConfig::default());
        DiscoveryReport::new(&run, topology, issues, None)
    }

    #[test]
    fn test_metadata_counts() {
        let report = sample_report();
        assert_eq!(report.metadata.total_hosts, 3);
        assert_eq!(report.metadata.succeeded_hosts, 2);
        assert_eq!(report.metadata.failed_hosts, 1);
        assert_eq!(report.metadata.total_links, 1);
        assert_eq!(report.metadata.duration_ms, 3000);
    }

    #[test]
    fn test_text_report_lists_every_host() {
        let text = render_text(&sample_report());
        assert!(text.contains("HOST STATUS"));
        assert!(text.contains("a:eth0 <-> b:eth0"));
        assert!(text.contains("failure: unreachable: connection refused"));
        for host in ["a", "b", "c"] {
            assert!(text.lines().any(|l| l.starts_with(&format!("{:<20}", host))));
        }
    }

    #[test]
    fn test_connection_matrix() {
        let report = sample_report();
        let matrix = connection_matrix(&report.topology);

        assert_eq!(matrix.len(), 5);
        assert_eq!(matrix[0].split_whitespace().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(matrix[2].split_whitespace().collect::<Vec<_>>(), vec!["a", "-", "eth0-eth0", "."]);
        assert_eq!(matrix[3].split_whitespace().collect::<Vec<_>>(), vec!["b", "eth0-eth0", "-", "."]);
        assert_eq!(matrix[4].split_whitespace().collect::<Vec<_>>(), vec!["c", ".", ".", "-"]);

        assert!(render_text(&report).contains("CONNECTION MATRIX"));
        assert_eq!(connection_matrix(&Topology::default()), vec!["(no hosts)".to_string()]);
    }

    #[test]
    fn test_json_report_structure() {
        let json = render_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["metadata"]["total_hosts"], 3);
        assert_eq!(value["topology"]["links"][0]["confidence"], "arp");
        assert_eq!(value["topology"]["hosts"]["c"]["status"], "failed");
        assert!(value["issues"].as_array().is_some_and(|a| !a.is_empty()));
    }

    #[test]
    fn test_dot_output() {
        let dot = render_dot(&sample_report().topology);
        assert!(dot.starts_with("graph Topology {"));
        assert!(dot.contains("\"a:eth0\" -- \"b:eth0\" [label=\"arp\", style=dashed];"));
        assert!(dot.contains("subgraph cluster_2"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
