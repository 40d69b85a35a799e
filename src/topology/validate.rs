//! Health checks over a fused topology.
//!
//! Validation never changes the topology; it reports things an operator
//! should look at: one-sided links, mismatched link ends, dead ports, noisy
//! counters, conflicts and hosts that could not be collected.

use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use super::types::{Endpoint, InterfaceNode, Topology};
use crate::collector::HostStatus;

/// Counter thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// rx/tx errors above this raise a warning
    pub error_threshold: u64,
    /// rx/tx dropped above this raise an info
    pub dropped_threshold: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { error_threshold: 100, dropped_threshold: 1000 }
    }
}

/// Declared most severe first so sorting puts errors on top
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    HostFailed,
    HostDegraded,
    LinkConflict,
    UnidirectionalLink,
    SpeedMismatch,
    DuplexMismatch,
    NoLinkDetected,
    HighErrors,
    HighDropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn new(severity: Severity, kind: IssueKind, host: &str, interface: Option<&str>, message: String) -> Self {
        Self { severity, kind, host: host.to_string(), interface: interface.map(str::to_string), message }
    }

    fn at(severity: Severity, kind: IssueKind, endpoint: &Endpoint, message: String) -> Self {
        Self::new(severity, kind, &endpoint.host, Some(&endpoint.interface), message)
    }
}

/// Run every check and return the issues sorted by severity, host, interface
pub fn validate_topology(topology: &Topology, config: &ValidationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    check_hosts(topology, &mut issues);
    check_conflicts(topology, &mut issues);
    check_links(topology, &mut issues);
    check_interfaces(topology, config, &mut issues);

    issues.sort_by(|x, y| {
        (x.severity, &x.host, &x.interface, x.kind).cmp(&(y.severity, &y.host, &y.interface, y.kind))
    });

    info!(
        "Validation complete: {} issues ({} errors, {} warnings)",
        issues.len(),
        issues.iter().filter(|i| i.severity == Severity::Error).count(),
        issues.iter().filter(|i| i.severity == Severity::Warning).count()
    );

    issues
}

fn check_hosts(topology: &Topology, issues: &mut Vec<ValidationIssue>) {
    for host in topology.hosts.values() {
        match host.status {
            HostStatus::Failed => {
                let reason = host
                    .failure
                    .as_ref()
                    .map(|f| format!("{}: {}", f.cause, f.detail))
                    .unwrap_or_else(|| "no usable data".to_string());
                issues.push(ValidationIssue::new(
                    Severity::Error,
                    IssueKind::HostFailed,
                    &host.name,
                    None,
                    format!("Collection failed ({})", reason),
                ));
            }
            HostStatus::Degraded => issues.push(ValidationIssue::new(
                Severity::Warning,
                IssueKind::HostDegraded,
                &host.name,
                None,
                "Collection incomplete; some probes failed".to_string(),
            )),
            HostStatus::Succeeded => {}
        }
    }
}

fn check_conflicts(topology: &Topology, issues: &mut Vec<ValidationIssue>) {
    for conflict in &topology.conflicts {
        let peers: Vec<String> = conflict.candidates.iter().map(|c| c.peer.to_string()).collect();
        issues.push(ValidationIssue::at(
            Severity::Error,
            IssueKind::LinkConflict,
            &conflict.endpoint,
            format!("Conflicting neighbor evidence: {}", peers.join(", ")),
        ));
    }
}

fn check_links(topology: &Topology, issues: &mut Vec<ValidationIssue>) {
    for link in &topology.links {
        if !link.is_bidirectional() {
            // Report at the side that saw it
            let (seen_from, other) = if link.observed_from.contains(&link.a) { (&link.a, &link.b) } else { (&link.b, &link.a) };
            issues.push(ValidationIssue::at(
                Severity::Info,
                IssueKind::UnidirectionalLink,
                seen_from,
                format!("Unidirectional link to {}; only one side observes the connection", other),
            ));
        }

        let (Some(a), Some(b)) = (topology.interface(&link.a), topology.interface(&link.b)) else {
            continue;
        };

        if let (Some(sa), Some(sb)) = (&a.fact.speed, &b.fact.speed) {
            if sa != sb {
                issues.push(ValidationIssue::at(
                    Severity::Warning,
                    IssueKind::SpeedMismatch,
                    &link.a,
                    format!("Speed mismatch with {}: {} vs {}", link.b, sa, sb),
                ));
            }
        }
        if let (Some(da), Some(db)) = (&a.fact.duplex, &b.fact.duplex) {
            if da != db {
                issues.push(ValidationIssue::at(
                    Severity::Warning,
                    IssueKind::DuplexMismatch,
                    &link.a,
                    format!("Duplex mismatch with {}: {} vs {}", link.b, da, db),
                ));
            }
        }
    }
}

fn check_interfaces(topology: &Topology, config: &ValidationConfig, issues: &mut Vec<ValidationIssue>) {
    for host in topology.hosts.values() {
        for (name, node) in &host.interfaces {
            let endpoint = Endpoint::new(&host.name, name);
            check_no_link(topology, &endpoint, node, issues);
            check_counters(&endpoint, node, config, issues);
        }
    }
}

fn check_no_link(topology: &Topology, endpoint: &Endpoint, node: &InterfaceNode, issues: &mut Vec<ValidationIssue>) {
    let Some(state) = &node.link_state else {
        return;
    };
    if !node.fact.admin_up || state.carrier || state.link_detected {
        return;
    }
    if topology.links_at(endpoint).next().is_none() {
        issues.push(ValidationIssue::at(
            Severity::Info,
            IssueKind::NoLinkDetected,
            endpoint,
            "Interface is up but no link detected and no neighbors found".to_string(),
        ));
    }
}

fn check_counters(endpoint: &Endpoint, node: &InterfaceNode, config: &ValidationConfig, issues: &mut Vec<ValidationIssue>) {
    let Some(state) = &node.link_state else {
        return;
    };
    let c = &state.counters;

    for (label, value) in [("RX", c.rx_errors), ("TX", c.tx_errors)] {
        if value > config.error_threshold {
            issues.push(ValidationIssue::at(
                Severity::Warning,
                IssueKind::HighErrors,
                endpoint,
                format!("High {} error count: {} (threshold {})", label, value, config.error_threshold),
            ));
        }
    }
    for (label, value) in [("RX", c.rx_dropped), ("TX", c.tx_dropped)] {
        if value > config.dropped_threshold {
            issues.push(ValidationIssue::at(
                Severity::Info,
                IssueKind::HighDropped,
                endpoint,
                format!("High {} dropped count: {} (threshold {})", label, value, config.dropped_threshold),
            ));
        }
    }
}
