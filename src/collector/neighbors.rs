//! Neighbor discovery probes.
//!
//! Three independent methods, each yielding [`NeighborObservation`]s:
//! - `lldp`: parse `lldpcli show neighbors details`
//! - `arp`: parse the kernel neighbor table (`ip neigh show`)
//! - `probe`: ping the IPv6 all-nodes group out of one interface, then read
//!   that interface's IPv6 neighbor cache

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;

use super::parse::{base_ifname, content_lines, is_safe_ifname, Parsed};
use super::types::{DiscoveryMethod, InterfaceFact, NeighborObservation, ProbeKind};
use super::ProbeContext;
use crate::utils::normalize_mac;

pub const LLDP_COMMAND: &str = "command -v lldpcli >/dev/null 2>&1 || exit 127; lldpcli show neighbors details";
pub const ARP_COMMAND: &str = "ip neigh show";

/// Neighbor-table states that carry no usable link-layer address
const UNUSABLE_STATES: [&str; 3] = ["FAILED", "INCOMPLETE", "NOARP"];

fn probe_command(interface: &str) -> String {
    format!(
        "command -v ping >/dev/null 2>&1 || exit 127; \
         ping -6 -c 2 -w 2 ff02::1%{iface} >/dev/null 2>&1; \
         ip -6 neigh show dev {iface}",
        iface = interface
    )
}

struct LldpPatterns {
    /// Match: "Interface:    eth0, via: LLDP, RID: 1, Time: 0 day, 00:01:23"
    interface: Regex,
    /// Match: "SysName:      switch1"
    field: Regex,
}

static LLDP: LazyLock<LldpPatterns> = LazyLock::new(|| LldpPatterns {
    interface: Regex::new(r"^Interface:\s*([^,\s]+),").expect("Invalid LLDP interface regex"),
    field: Regex::new(r"^(ChassisID|SysName|MgmtIP|PortID|PortDescr):\s*(.*)$").expect("Invalid LLDP field regex"),
});

/// Fields of one LLDP neighbor block
#[derive(Default)]
struct LldpBlock {
    line_no: usize,
    header: String,
    local_interface: String,
    sys_name: Option<String>,
    mgmt_ip: Option<String>,
    port_mac: Option<String>,
    port_ifname: Option<String>,
    port_descr: Option<String>,
}

impl LldpBlock {
    fn finish(self, host: &str, parsed: &mut Parsed<NeighborObservation>) {
        let remote_interface = self.port_ifname.or(self.port_descr);
        if self.port_mac.is_none() && (self.sys_name.is_none() || remote_interface.is_none()) {
            parsed.skip(self.line_no, &self.header, "LLDP neighbor without port MAC or system/port name");
            return;
        }

        let mut obs = NeighborObservation::new(DiscoveryMethod::Lldp, host, self.local_interface);
        obs.remote_mac = self.port_mac;
        obs.remote_host = self.sys_name;
        obs.remote_interface = remote_interface;
        obs.remote_ip = self.mgmt_ip;
        parsed.push(obs);
    }
}

/// Parse `lldpcli show neighbors [details]`. One interface may list several
/// neighbors; each gets its own `Interface:` header.
pub fn parse_lldp(output: &str, host: &str) -> Parsed<NeighborObservation> {
    let mut parsed = Parsed::default();
    let mut current: Option<LldpBlock> = None;

    for (line_no, raw) in content_lines(output) {
        let line = raw.trim();

        if let Some(caps) = LLDP.interface.captures(line) {
            if let Some(block) = current.take() {
                block.finish(host, &mut parsed);
            }
            current = Some(LldpBlock {
                line_no,
                header: line.to_string(),
                local_interface: base_ifname(&caps[1]).to_string(),
                ..LldpBlock::default()
            });
            continue;
        }

        // Banner and separator lines sit outside any block
        let Some(block) = current.as_mut() else {
            continue;
        };
        let Some(caps) = LLDP.field.captures(line) else {
            continue;
        };

        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        match &caps[1] {
            "SysName" => block.sys_name = Some(value.to_string()),
            // details output may list several management addresses
            "MgmtIP" => {
                if block.mgmt_ip.is_none() {
                    block.mgmt_ip = Some(value.to_string());
                }
            }
            "PortID" => {
                let (kind, id) = value.split_once(char::is_whitespace).unwrap_or(("", value));
                match kind {
                    "mac" => block.port_mac = normalize_mac(id.trim()),
                    "ifname" | "local" => block.port_ifname = Some(id.trim().to_string()),
                    _ => debug!("Ignoring LLDP PortID subtype '{}'", kind),
                }
            }
            "PortDescr" => block.port_descr = Some(value.to_string()),
            // ChassisID identifies the box, not the port; not used for resolution
            _ => {}
        }
    }

    if let Some(block) = current {
        block.finish(host, &mut parsed);
    }

    parsed
}

/// Parse `ip neigh show` output. `default_dev` applies when the output was
/// filtered by device and lines carry no `dev` token.
pub fn parse_neighbor_table(
    output: &str,
    host: &str,
    method: DiscoveryMethod,
    default_dev: Option<&str>,
) -> Parsed<NeighborObservation> {
    let mut parsed = Parsed::default();

    for (line_no, line) in content_lines(output) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            parsed.skip(line_no, line, "too few fields for a neighbor entry");
            continue;
        }

        let ip = tokens[0];
        let mut dev = default_dev;
        let mut lladdr = None;
        let mut unusable = false;

        for (i, token) in tokens.iter().enumerate() {
            match *token {
                "dev" => dev = tokens.get(i + 1).copied(),
                "lladdr" => lladdr = tokens.get(i + 1).copied(),
                state if UNUSABLE_STATES.contains(&state) => unusable = true,
                _ => {}
            }
        }

        if unusable {
            continue;
        }
        let Some(dev) = dev else {
            parsed.skip(line_no, line, "neighbor entry without device");
            continue;
        };
        // Entries without a link-layer address are still being resolved
        let Some(lladdr) = lladdr else {
            continue;
        };
        let Some(mac) = normalize_mac(lladdr) else {
            parsed.skip(line_no, line, "invalid link-layer address");
            continue;
        };

        let mut obs = NeighborObservation::new(method, host, base_ifname(dev));
        obs.remote_mac = Some(mac);
        obs.remote_ip = Some(ip.to_string());
        parsed.push(obs);
    }

    parsed
}

/// Run every enabled neighbor method and return the observations that belong
/// to listed, non-excluded interfaces.
pub(super) async fn probe_neighbors(
    ctx: &mut ProbeContext<'_>,
    interfaces: &[InterfaceFact],
    methods: &BTreeSet<DiscoveryMethod>,
) -> Vec<NeighborObservation> {
    let listed: HashSet<&str> = interfaces.iter().map(|i| i.name.as_str()).collect();
    let mut observations = Vec::new();

    for method in methods.iter().rev() {
        let found = match method {
            DiscoveryMethod::Lldp => probe_lldp(ctx).await,
            DiscoveryMethod::Arp => probe_arp(ctx).await,
            DiscoveryMethod::Probe => probe_active(ctx, interfaces).await,
        };
        let kept = keep_listed(ctx, ProbeKind::Neighbors(*method), found, &listed);
        debug!("{}: {} {} observation(s)", ctx.host.name, kept.len(), method);
        observations.extend(kept);
    }

    observations.sort();
    observations.dedup();
    observations
}

fn keep_listed(
    ctx: &mut ProbeContext<'_>,
    probe: ProbeKind,
    observations: Vec<NeighborObservation>,
    listed: &HashSet<&str>,
) -> Vec<NeighborObservation> {
    let mut kept = Vec::with_capacity(observations.len());
    let mut unlisted = BTreeSet::new();

    for obs in observations {
        if ctx.exclusions.is_excluded(&obs.local_interface) {
            continue;
        }
        if listed.contains(obs.local_interface.as_str()) {
            kept.push(obs);
        } else {
            unlisted.insert(obs.local_interface);
        }
    }

    for interface in unlisted {
        ctx.unlisted(probe, &interface);
    }
    kept
}

async fn probe_lldp(ctx: &mut ProbeContext<'_>) -> Vec<NeighborObservation> {
    let probe = ProbeKind::Neighbors(DiscoveryMethod::Lldp);
    match ctx.run(LLDP_COMMAND).await {
        Ok(output) => {
            let parsed = parse_lldp(&output, &ctx.host.name);
            ctx.note_skipped(probe, parsed.warnings.len());
            parsed.facts
        }
        Err(e) if e.is_command_missing() => {
            ctx.unavailable(probe);
            Vec::new()
        }
        Err(e) => {
            ctx.probe_failed(probe, &e);
            Vec::new()
        }
    }
}

async fn probe_arp(ctx: &mut ProbeContext<'_>) -> Vec<NeighborObservation> {
    let probe = ProbeKind::Neighbors(DiscoveryMethod::Arp);
    match ctx.run(ARP_COMMAND).await {
        Ok(output) => {
            let parsed = parse_neighbor_table(&output, &ctx.host.name, DiscoveryMethod::Arp, None);
            ctx.note_skipped(probe, parsed.warnings.len());
            parsed.facts
        }
        Err(e) if e.is_command_missing() => {
            ctx.unavailable(probe);
            Vec::new()
        }
        Err(e) => {
            ctx.probe_failed(probe, &e);
            Vec::new()
        }
    }
}

/// Active probing only touches interfaces that are administratively up and
/// have an Ethernet address; nothing is configured on the remote host.
async fn probe_active(ctx: &mut ProbeContext<'_>, interfaces: &[InterfaceFact]) -> Vec<NeighborObservation> {
    let probe = ProbeKind::Neighbors(DiscoveryMethod::Probe);
    let mut observations = Vec::new();
    let mut skipped = 0;

    let candidates = interfaces
        .iter()
        .filter(|i| i.admin_up && i.mac.is_some() && is_safe_ifname(&i.name));

    for iface in candidates {
        match ctx.run(&probe_command(&iface.name)).await {
            Ok(output) => {
                let parsed =
                    parse_neighbor_table(&output, &ctx.host.name, DiscoveryMethod::Probe, Some(&iface.name));
                skipped += parsed.warnings.len();
                observations.extend(parsed.facts);
            }
            Err(e) if e.is_command_missing() => {
                info!("{}: ping not available, skipping active probing", ctx.host.name);
                ctx.unavailable(probe);
                return Vec::new();
            }
            Err(e) if e.is_host_level() => {
                ctx.probe_failed(probe, &e);
                break;
            }
            Err(e) => ctx.probe_failed(probe, &e),
        }
    }

    ctx.note_skipped(probe, skipped);
    observations
}
