//! Per-host fact types produced by the collector.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::ExclusionSet;

/// A host as known to the orchestrator (inventory name plus address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub address: String,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self { name: name.into(), address: address.into() }
    }
}

/// Neighbor discovery method.
///
/// Variants are declared weakest first so the derived ordering is the
/// confidence ranking: `Lldp > Arp > Probe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    /// Active probing (multicast echo, then neighbor cache)
    Probe,
    /// ARP / neighbor table inspection
    Arp,
    /// Link Layer Discovery Protocol via lldpd
    Lldp,
}

impl DiscoveryMethod {
    pub const ALL: [DiscoveryMethod; 3] = [DiscoveryMethod::Lldp, DiscoveryMethod::Arp, DiscoveryMethod::Probe];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::Lldp => "lldp",
            DiscoveryMethod::Arp => "arp",
            DiscoveryMethod::Probe => "probe",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 2863 operational state as exposed by `/sys/class/net/<if>/operstate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    Up,
    Down,
    #[default]
    Unknown,
    Dormant,
    NotPresent,
    LowerLayerDown,
    Testing,
}

impl OperState {
    /// Parse the kernel's spelling, case-insensitively (`ip link` prints upper case)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(OperState::Up),
            "down" => Some(OperState::Down),
            "unknown" => Some(OperState::Unknown),
            "dormant" => Some(OperState::Dormant),
            "notpresent" => Some(OperState::NotPresent),
            "lowerlayerdown" => Some(OperState::LowerLayerDown),
            "testing" => Some(OperState::Testing),
            _ => None,
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperState::Up => "up",
            OperState::Down => "down",
            OperState::Unknown => "unknown",
            OperState::Dormant => "dormant",
            OperState::NotPresent => "notpresent",
            OperState::LowerLayerDown => "lowerlayerdown",
            OperState::Testing => "testing",
        };
        f.write_str(s)
    }
}

/// Static description of one network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceFact {
    pub name: String,
    /// Lower-case colon-separated MAC; `None` for interfaces without an Ethernet address
    pub mac: Option<String>,
    /// Administrative state (`UP` flag)
    pub admin_up: bool,
    pub oper_state: OperState,
    pub mtu: Option<u32>,
    pub speed: Option<String>,
    pub duplex: Option<String>,
    pub driver: Option<String>,
    pub ipv4_addresses: Vec<String>,
    pub ipv6_addresses: Vec<String>,
    /// `Link detected` from ethtool, when ethtool reported it
    pub link_detected: Option<bool>,
}

impl InterfaceFact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: None,
            admin_up: false,
            oper_state: OperState::Unknown,
            mtu: None,
            speed: None,
            duplex: None,
            driver: None,
            ipv4_addresses: Vec::new(),
            ipv6_addresses: Vec::new(),
            link_detected: None,
        }
    }

    pub fn with_mac(mut self, mac: &str) -> Self {
        self.mac = crate::utils::normalize_mac(mac);
        self
    }
}

/// Traffic counters from `/sys/class/net/<if>/statistics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

/// Dynamic link-layer state of one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStateFact {
    pub interface: String,
    pub carrier: bool,
    pub oper_state: OperState,
    pub link_detected: bool,
    pub counters: LinkCounters,
}

impl LinkStateFact {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            carrier: false,
            oper_state: OperState::Unknown,
            link_detected: false,
            counters: LinkCounters::default(),
        }
    }
}

/// One piece of evidence that a local interface is wired to some remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeighborObservation {
    pub method: DiscoveryMethod,
    pub local_host: String,
    pub local_interface: String,
    pub remote_mac: Option<String>,
    pub remote_host: Option<String>,
    pub remote_interface: Option<String>,
    pub remote_ip: Option<String>,
}

impl NeighborObservation {
    pub fn new(method: DiscoveryMethod, local_host: impl Into<String>, local_interface: impl Into<String>) -> Self {
        Self {
            method,
            local_host: local_host.into(),
            local_interface: local_interface.into(),
            remote_mac: None,
            remote_host: None,
            remote_interface: None,
            remote_ip: None,
        }
    }

    pub fn with_remote_mac(mut self, mac: &str) -> Self {
        self.remote_mac = crate::utils::normalize_mac(mac);
        self
    }

    pub fn with_remote_identity(mut self, host: impl Into<String>, interface: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self.remote_interface = Some(interface.into());
        self
    }

    pub fn with_remote_ip(mut self, ip: impl Into<String>) -> Self {
        self.remote_ip = Some(ip.into());
        self
    }
}

/// Collection outcome for one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Succeeded,
    /// Partial data: at least one probe failed
    Degraded,
    /// No usable data
    Failed,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostStatus::Succeeded => "succeeded",
            HostStatus::Degraded => "degraded",
            HostStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a host ended up `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Connection or authentication failure
    Unreachable,
    /// Per-host timeout or run deadline expired
    Timeout,
    /// Host answered but the interface listing could not be obtained
    NoUsableData,
    /// The collection task terminated abnormally
    Aborted,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCause::Unreachable => "unreachable",
            FailureCause::Timeout => "timeout",
            FailureCause::NoUsableData => "no usable data",
            FailureCause::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFailure {
    pub cause: FailureCause,
    pub detail: String,
}

/// Which remote probe a diagnostic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Identity,
    Interfaces,
    Addresses,
    Ethtool,
    LinkState,
    Neighbors(DiscoveryMethod),
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Identity => f.write_str("identity"),
            ProbeKind::Interfaces => f.write_str("interfaces"),
            ProbeKind::Addresses => f.write_str("addresses"),
            ProbeKind::Ethtool => f.write_str("ethtool"),
            ProbeKind::LinkState => f.write_str("link-state"),
            ProbeKind::Neighbors(method) => write!(f, "neighbors/{}", method),
        }
    }
}

/// Non-fatal collection event recorded for operator review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Lines of a probe's output that could not be parsed
    SkippedLines { probe: ProbeKind, count: usize },
    /// The tool behind a probe is not installed on the host
    Unavailable { probe: ProbeKind },
    /// A probe's command failed; its contribution is empty
    ProbeFailed { probe: ProbeKind, error: String },
    /// A probe reported an interface the interface listing did not
    UnlistedInterface { probe: ProbeKind, interface: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SkippedLines { probe, count } => write!(f, "{}: skipped {} unparseable line(s)", probe, count),
            Diagnostic::Unavailable { probe } => write!(f, "{}: tool not available", probe),
            Diagnostic::ProbeFailed { probe, error } => write!(f, "{}: probe failed: {}", probe, error),
            Diagnostic::UnlistedInterface { probe, interface } => {
                write!(f, "{}: dropped facts for unlisted interface {}", probe, interface)
            }
        }
    }
}

/// Everything collected from one host in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostFactSet {
    pub host: Host,
    pub status: HostStatus,
    pub failure: Option<HostFailure>,
    /// Kernel hostname reported by the host, if it could be read
    pub system_name: Option<String>,
    pub interfaces: Vec<InterfaceFact>,
    pub link_states: Vec<LinkStateFact>,
    pub neighbors: Vec<NeighborObservation>,
    pub diagnostics: Vec<Diagnostic>,
    /// Interface patterns this host's facts were filtered with. Fusion uses
    /// them to drop peers' observations that name an excluded interface.
    #[serde(default, skip_serializing_if = "ExclusionSet::is_empty")]
    pub exclusions: ExclusionSet,
    /// Wall time spent on this host
    pub elapsed_ms: u64,
}

impl HostFactSet {
    /// A terminal failure carrying no facts
    pub fn failed(host: Host, cause: FailureCause, detail: impl Into<String>) -> Self {
        Self {
            host,
            status: HostStatus::Failed,
            failure: Some(HostFailure { cause, detail: detail.into() }),
            system_name: None,
            interfaces: Vec::new(),
            link_states: Vec::new(),
            neighbors: Vec::new(),
            diagnostics: Vec::new(),
            exclusions: ExclusionSet::default(),
            elapsed_ms: 0,
        }
    }

    pub fn with_exclusions(mut self, exclusions: &ExclusionSet) -> Self {
        self.exclusions = exclusions.clone();
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == HostStatus::Failed
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceFact> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn link_state(&self, name: &str) -> Option<&LinkStateFact> {
        self.link_states.iter().find(|s| s.interface == name)
    }
}
