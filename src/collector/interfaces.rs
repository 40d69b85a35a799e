//! Interface inventory probe.
//!
//! Parses `ip -o link show`, `ip -o addr show`, `ethtool <if>` and
//! `ethtool -i <if>` output into [`InterfaceFact`]s.

use std::collections::HashMap;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::parse::{base_ifname, content_lines, is_safe_ifname, Parsed};
use super::types::{InterfaceFact, OperState, ProbeKind};
use super::ProbeContext;
use crate::transport::ExecError;

pub const LINK_COMMAND: &str = "ip -o link show";
pub const ADDR_COMMAND: &str = "ip -o addr show";

/// Compiled regex patterns for interface output
struct InterfacePatterns {
    /// Match: "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ..."
    link_line: Regex,
    mtu: Regex,
    state: Regex,
    /// Match: "link/ether 52:54:00:12:34:56"
    ether: Regex,
    /// Match: "2: eth0    inet 192.168.1.10/24 brd ..."
    addr_line: Regex,
    speed: Regex,
    duplex: Regex,
    link_detected: Regex,
    driver: Regex,
}

impl InterfacePatterns {
    fn new() -> Self {
        Self {
            link_line: Regex::new(r"^\d+:\s+([^:\s]+):\s+<([^>]*)>(.*)$").expect("Invalid link_line regex"),
            mtu: Regex::new(r"\bmtu\s+(\d+)").expect("Invalid mtu regex"),
            state: Regex::new(r"\bstate\s+(\S+)").expect("Invalid state regex"),
            ether: Regex::new(r"link/ether\s+([0-9a-fA-F:]{17})").expect("Invalid ether regex"),
            addr_line: Regex::new(r"^\d+:\s+(\S+)\s+(inet6?)\s+([0-9a-fA-F.:]+/\d+)").expect("Invalid addr_line regex"),
            speed: Regex::new(r"(?m)^\s*Speed:\s*(\S+)").expect("Invalid speed regex"),
            duplex: Regex::new(r"(?m)^\s*Duplex:\s*(\S+)").expect("Invalid duplex regex"),
            link_detected: Regex::new(r"(?m)^\s*Link detected:\s*(\S+)").expect("Invalid link_detected regex"),
            driver: Regex::new(r"(?m)^driver:\s*(\S+)").expect("Invalid driver regex"),
        }
    }
}

static PATTERNS: LazyLock<InterfacePatterns> = LazyLock::new(InterfacePatterns::new);

/// Parse `ip -o link show` into bare interface facts (no addresses, no ethtool data)
pub fn parse_link_list(output: &str) -> Parsed<InterfaceFact> {
    let mut parsed = Parsed::default();

    for (line_no, line) in content_lines(output) {
        let Some(caps) = PATTERNS.link_line.captures(line) else {
            parsed.skip(line_no, line, "not an ip link record");
            continue;
        };

        let name = base_ifname(&caps[1]).to_string();
        let flags: Vec<&str> = caps[2].split(',').collect();
        let rest = &caps[3];

        let mut fact = InterfaceFact::new(name);
        fact.admin_up = flags.contains(&"UP");
        fact.mtu = PATTERNS.mtu.captures(rest).and_then(|c| c[1].parse().ok());
        fact.oper_state = PATTERNS
            .state
            .captures(rest)
            .and_then(|c| OperState::parse(&c[1]))
            .unwrap_or_default();
        if let Some(c) = PATTERNS.ether.captures(rest) {
            fact.mac = crate::utils::normalize_mac(&c[1]);
        }

        parsed.push(fact);
    }

    parsed
}

/// One address binding from `ip -o addr show`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub interface: String,
    pub ipv6: bool,
    pub address: String,
}

/// Parse `ip -o addr show`
pub fn parse_addr_list(output: &str) -> Parsed<AddressRecord> {
    let mut parsed = Parsed::default();

    for (line_no, line) in content_lines(output) {
        let Some(caps) = PATTERNS.addr_line.captures(line) else {
            parsed.skip(line_no, line, "not an ip addr record");
            continue;
        };
        parsed.push(AddressRecord {
            interface: base_ifname(&caps[1]).to_string(),
            ipv6: &caps[2] == "inet6",
            address: caps[3].to_string(),
        });
    }

    parsed
}

/// Attributes taken from `ethtool <if>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EthtoolInfo {
    pub speed: Option<String>,
    pub duplex: Option<String>,
    pub link_detected: Option<bool>,
}

/// ethtool prints "Unknown!" for values the driver does not report
fn known_value(raw: &str) -> Option<String> {
    if raw.starts_with("Unknown") {
        None
    } else {
        Some(raw.to_string())
    }
}

pub fn parse_ethtool(output: &str) -> EthtoolInfo {
    EthtoolInfo {
        speed: PATTERNS.speed.captures(output).and_then(|c| known_value(&c[1])),
        duplex: PATTERNS
            .duplex
            .captures(output)
            .and_then(|c| known_value(&c[1]))
            .map(|d| d.to_lowercase()),
        link_detected: PATTERNS
            .link_detected
            .captures(output)
            .map(|c| c[1].eq_ignore_ascii_case("yes")),
    }
}

pub fn parse_ethtool_driver(output: &str) -> Option<String> {
    PATTERNS.driver.captures(output).map(|c| c[1].to_string())
}

/// Attach addresses to their interfaces; IPv6 link-local addresses are left out
fn attach_addresses(interfaces: &mut [InterfaceFact], records: Vec<AddressRecord>) {
    let by_name: HashMap<String, usize> = interfaces
        .iter()
        .enumerate()
        .map(|(idx, i)| (i.name.clone(), idx))
        .collect();

    for record in records {
        let Some(&idx) = by_name.get(&record.interface) else {
            continue;
        };
        let fact = &mut interfaces[idx];
        if record.ipv6 {
            if !record.address.to_ascii_lowercase().starts_with("fe80:") {
                fact.ipv6_addresses.push(record.address);
            }
        } else {
            fact.ipv4_addresses.push(record.address);
        }
    }
}

/// Run the interface probe. An error means the listing itself failed and the
/// host has no usable data.
pub(super) async fn probe_interfaces(ctx: &mut ProbeContext<'_>) -> Result<Vec<InterfaceFact>, ExecError> {
    let output = ctx.run(LINK_COMMAND).await?;
    let parsed = parse_link_list(&output);
    ctx.note_skipped(ProbeKind::Interfaces, parsed.warnings.len());

    let mut interfaces: Vec<InterfaceFact> = parsed
        .facts
        .into_iter()
        .filter(|i| !ctx.exclusions.is_excluded(&i.name))
        .collect();

    match ctx.run(ADDR_COMMAND).await {
        Ok(output) => {
            let parsed = parse_addr_list(&output);
            ctx.note_skipped(ProbeKind::Addresses, parsed.warnings.len());
            attach_addresses(&mut interfaces, parsed.facts);
        }
        Err(e) => ctx.probe_failed(ProbeKind::Addresses, &e),
    }

    probe_ethtool(ctx, &mut interfaces).await;

    Ok(interfaces)
}

/// Fill speed, duplex, link-detected and driver from ethtool.
/// A missing ethtool leaves the fields empty; it does not degrade the host.
async fn probe_ethtool(ctx: &mut ProbeContext<'_>, interfaces: &mut [InterfaceFact]) {
    for fact in interfaces.iter_mut() {
        if !is_safe_ifname(&fact.name) {
            debug!("{}: not querying ethtool for unusual interface name {:?}", ctx.host.name, fact.name);
            continue;
        }

        match ctx.run(&format!("ethtool {}", fact.name)).await {
            Ok(output) => {
                let info = parse_ethtool(&output);
                fact.speed = info.speed;
                fact.duplex = info.duplex;
                fact.link_detected = info.link_detected;
            }
            Err(e) if e.is_command_missing() => {
                ctx.unavailable(ProbeKind::Ethtool);
                return;
            }
            Err(e) if e.is_host_level() => {
                ctx.probe_failed(ProbeKind::Ethtool, &e);
                return;
            }
            // Virtual interfaces routinely refuse ethtool queries
            Err(e) => debug!("{}: ethtool {} failed: {}", ctx.host.name, fact.name, e),
        }

        match ctx.run(&format!("ethtool -i {}", fact.name)).await {
            Ok(output) => fact.driver = parse_ethtool_driver(&output),
            Err(e) if e.is_host_level() => {
                ctx.probe_failed(ProbeKind::Ethtool, &e);
                return;
            }
            Err(e) => debug!("{}: ethtool -i {} failed: {}", ctx.host.name, fact.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP_LINK: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT group default qlen 1000\\    link/ether 52:54:00:12:34:56 brd ff:ff:ff:ff:ff:ff
3: eth1: <BROADCAST,MULTICAST> mtu 9000 qdisc noop state DOWN mode DEFAULT group default qlen 1000\\    link/ether 52:54:00:12:34:57 brd ff:ff:ff:ff:ff:ff
garbage line without structure
4: eth1.100@eth1: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP mode DEFAULT group default qlen 1000\\    link/ether 52:54:00:12:34:57 brd ff:ff:ff:ff:ff:ff
";

    #[test]
    fn test_parse_link_list() {
        let parsed = parse_link_list(IP_LINK);

        assert_eq!(parsed.facts.len(), 4);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line_no, 4);

        let lo = &parsed.facts[0];
        assert_eq!(lo.name, "lo");
        assert_eq!(lo.mac, None);
        assert_eq!(lo.mtu, Some(65536));
        assert_eq!(lo.oper_state, OperState::Unknown);

        let eth0 = &parsed.facts[1];
        assert_eq!(eth0.mac.as_deref(), Some("52:54:00:12:34:56"));
        assert!(eth0.admin_up);
        assert_eq!(eth0.oper_state, OperState::Up);

        let eth1 = &parsed.facts[2];
        assert!(!eth1.admin_up);
        assert_eq!(eth1.oper_state, OperState::Down);
        assert_eq!(eth1.mtu, Some(9000));

        assert_eq!(parsed.facts[3].name, "eth1.100");
    }

    #[test]
    fn test_parse_addr_list_and_attach() {
        let output = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 192.168.10.11/24 brd 192.168.10.255 scope global eth0\\       valid_lft forever preferred_lft forever
2: eth0    inet6 2001:db8::11/64 scope global \\       valid_lft forever preferred_lft forever
2: eth0    inet6 fe80::5054:ff:fe12:3456/64 scope link \\       valid_lft forever preferred_lft forever
not an address
";
        let parsed = parse_addr_list(output);
        assert_eq!(parsed.facts.len(), 4);
        assert_eq!(parsed.warnings.len(), 1);

        let mut interfaces = vec![InterfaceFact::new("eth0")];
        attach_addresses(&mut interfaces, parsed.facts);

        assert_eq!(interfaces[0].ipv4_addresses, vec!["192.168.10.11/24".to_string()]);
        assert_eq!(interfaces[0].ipv6_addresses, vec!["2001:db8::11/64".to_string()]);
    }

    #[test]
    fn test_parse_ethtool() {
        let output = "\
Settings for eth0:
\tSupported ports: [ TP ]
\tSpeed: 1000Mb/s
\tDuplex: Full
\tAuto-negotiation: on
\tLink detected: yes
";
        let info = parse_ethtool(output);
        assert_eq!(info.speed.as_deref(), Some("1000Mb/s"));
        assert_eq!(info.duplex.as_deref(), Some("full"));
        assert_eq!(info.link_detected, Some(true));
    }

    #[test]
    fn test_parse_ethtool_unknown_values() {
        let output = "Settings for eth1:\n\tSpeed: Unknown!\n\tDuplex: Unknown! (255)\n\tLink detected: no\n";
        let info = parse_ethtool(output);
        assert_eq!(info.speed, None);
        assert_eq!(info.duplex, None);
        assert_eq!(info.link_detected, Some(false));
    }

    #[test]
    fn test_parse_driver() {
        let output = "driver: virtio_net\nversion: 1.0.0\nbus-info: 0000:00:03.0\n";
        assert_eq!(parse_ethtool_driver(output).as_deref(), Some("virtio_net"));
        assert_eq!(parse_ethtool_driver(""), None);
    }
}
