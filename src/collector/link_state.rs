//! Link-state probe.
//!
//! Reads operstate, carrier and traffic counters for every interface in a
//! single round trip, by grepping the sysfs attribute files. Each output line
//! looks like `eth0/statistics/rx_bytes:123456`.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::parse::{content_lines, Parsed};
use super::types::{InterfaceFact, LinkStateFact, OperState, ProbeKind};
use super::ProbeContext;

/// Counter files are listed one by one; brace expansion is not POSIX sh.
pub const LINK_STATE_COMMAND: &str = "cd /sys/class/net && grep -H . \
*/operstate */carrier \
*/statistics/rx_bytes */statistics/rx_packets */statistics/rx_errors */statistics/rx_dropped \
*/statistics/tx_bytes */statistics/tx_packets */statistics/tx_errors */statistics/tx_dropped \
2>/dev/null; [ -d /sys/class/net ]";

static SYSFS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^/\s]+)/(?:statistics/)?([a-z_]+):(.*)$").expect("Invalid sysfs line regex")
});

/// Parse the sysfs dump into one fact per interface, sorted by name
pub fn parse_link_state(output: &str) -> Parsed<LinkStateFact> {
    let mut parsed: Parsed<LinkStateFact> = Parsed::default();
    let mut states: BTreeMap<String, LinkStateFact> = BTreeMap::new();

    for (line_no, line) in content_lines(output) {
        let Some(caps) = SYSFS_LINE.captures(line) else {
            parsed.skip(line_no, line, "not a sysfs attribute line");
            continue;
        };

        let interface = &caps[1];
        let attribute = &caps[2];
        let value = caps[3].trim();

        let state = states
            .entry(interface.to_string())
            .or_insert_with(|| LinkStateFact::new(interface));

        match attribute {
            "operstate" => match OperState::parse(value) {
                Some(op) => state.oper_state = op,
                None => parsed.skip(line_no, line, "unknown operstate"),
            },
            "carrier" => match value {
                "1" => state.carrier = true,
                "0" => state.carrier = false,
                _ => parsed.skip(line_no, line, "carrier is not 0 or 1"),
            },
            counter => {
                let Ok(n) = value.parse::<u64>() else {
                    parsed.skip(line_no, line, "counter is not a number");
                    continue;
                };
                let c = &mut state.counters;
                match counter {
                    "rx_bytes" => c.rx_bytes = n,
                    "rx_packets" => c.rx_packets = n,
                    "rx_errors" => c.rx_errors = n,
                    "rx_dropped" => c.rx_dropped = n,
                    "tx_bytes" => c.tx_bytes = n,
                    "tx_packets" => c.tx_packets = n,
                    "tx_errors" => c.tx_errors = n,
                    "tx_dropped" => c.tx_dropped = n,
                    _ => parsed.skip(line_no, line, "unknown attribute"),
                }
            }
        }
    }

    parsed.facts = states.into_values().collect();
    parsed
}

/// Run the link-state probe for the interfaces found by the interface probe.
/// Sysfs entries for interfaces outside that list are dropped.
pub(super) async fn probe_link_state(ctx: &mut ProbeContext<'_>, interfaces: &[InterfaceFact]) -> Vec<LinkStateFact> {
    let output = match ctx.run(LINK_STATE_COMMAND).await {
        Ok(output) => output,
        Err(e) => {
            ctx.probe_failed(ProbeKind::LinkState, &e);
            return Vec::new();
        }
    };

    let parsed = parse_link_state(&output);
    ctx.note_skipped(ProbeKind::LinkState, parsed.warnings.len());

    let listed: HashMap<&str, &InterfaceFact> = interfaces.iter().map(|i| (i.name.as_str(), i)).collect();
    let mut states = Vec::with_capacity(listed.len());

    for mut state in parsed.facts {
        if ctx.exclusions.is_excluded(&state.interface) {
            continue;
        }
        match listed.get(state.interface.as_str()) {
            Some(iface) => {
                // ethtool's "Link detected" reads the same carrier bit; fall
                // back to sysfs when ethtool gave nothing.
                state.link_detected = iface.link_detected.unwrap_or(state.carrier);
                states.push(state);
            }
            None => ctx.unlisted(ProbeKind::LinkState, &state.interface),
        }
    }

    states
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSFS: &str = "\
eth0/operstate:up
eth0/carrier:1
eth0/statistics/rx_bytes:1048576
eth0/statistics/rx_packets:2048
eth0/statistics/rx_errors:3
eth0/statistics/rx_dropped:0
eth0/statistics/tx_bytes:524288
eth0/statistics/tx_packets:1024
eth0/statistics/tx_errors:0
eth0/statistics/tx_dropped:7
eth1/operstate:down
eth1/carrier:0
eth1/statistics/rx_bytes:not-a-number
grep: eth2/carrier: Invalid argument
lo/operstate:unknown
";

    #[test]
    fn test_parse_link_state() {
        let parsed = parse_link_state(SYSFS);

        let names: Vec<&str> = parsed.facts.iter().map(|s| s.interface.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth1", "lo"]);

        let eth0 = &parsed.facts[0];
        assert!(eth0.carrier);
        assert_eq!(eth0.oper_state, OperState::Up);
        assert_eq!(eth0.counters.rx_bytes, 1_048_576);
        assert_eq!(eth0.counters.rx_errors, 3);
        assert_eq!(eth0.counters.tx_dropped, 7);

        let eth1 = &parsed.facts[1];
        assert!(!eth1.carrier);
        assert_eq!(eth1.oper_state, OperState::Down);
        assert_eq!(eth1.counters.rx_bytes, 0);

        // Bad counter and the grep error line are skipped individually
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn test_parse_link_state_empty() {
        let parsed = parse_link_state("");
        assert!(parsed.facts.is_empty());
        assert!(parsed.warnings.is_empty());
    }
}
