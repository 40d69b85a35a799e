//! Topology type definitions.
//!
//! A [`Topology`] is the fused view of one collection run: every host with
//! its interfaces, the undirected [`Link`]s between interfaces, the
//! [`Conflict`]s found while fusing, and the observations that could not be
//! attached to any link.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collector::{
    DiscoveryMethod, HostFailure, HostStatus, InterfaceFact, LinkStateFact, NeighborObservation,
};

/// One side of a link: an interface on a host
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub interface: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, interface: impl Into<String>) -> Self {
        Self { host: host.into(), interface: interface.into() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.interface)
    }
}

/// A registered interface with its link state attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceNode {
    pub fact: InterfaceFact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_state: Option<LinkStateFact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNode {
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<HostFailure>,
    /// Interfaces keyed by name
    pub interfaces: BTreeMap<String, InterfaceNode>,
}

/// Marks a link whose endpoints also appear in competing links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConflict {
    /// The endpoints of this link at which evidence disagreed
    pub at: BTreeSet<Endpoint>,
}

/// An undirected, fused edge between two interfaces.
///
/// Endpoints are stored in order (`a < b`) so each pair has one spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
    /// Strongest method supporting the link
    pub confidence: DiscoveryMethod,
    pub methods: BTreeSet<DiscoveryMethod>,
    /// Two or more independent methods agree
    pub high_confidence: bool,
    /// Endpoints whose host reported this link
    pub observed_from: BTreeSet<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<LinkConflict>,
}

impl Link {
    /// Both ends reported each other
    pub fn is_bidirectional(&self) -> bool {
        self.observed_from.contains(&self.a) && self.observed_from.contains(&self.b)
    }

    pub fn is_conflicting(&self) -> bool {
        self.conflict.is_some()
    }

    pub fn touches(&self, endpoint: &Endpoint) -> bool {
        &self.a == endpoint || &self.b == endpoint
    }

    /// The end opposite `endpoint`, if `endpoint` is on this link
    pub fn peer_of(&self, endpoint: &Endpoint) -> Option<&Endpoint> {
        if &self.a == endpoint {
            Some(&self.b)
        } else if &self.b == endpoint {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// One competing peer at a conflicting endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictCandidate {
    pub peer: Endpoint,
    pub methods: BTreeSet<DiscoveryMethod>,
}

/// An interface that evidence connects to more than one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub endpoint: Endpoint,
    pub candidates: Vec<ConflictCandidate>,
}

/// Why an observation did not become part of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingReason {
    /// The observing interface is not registered (excluded or unlisted)
    UnknownLocalInterface,
    /// The claimed MAC belongs to no registered interface
    UnknownMac,
    /// The claimed MAC belongs to several registered interfaces
    AmbiguousMac,
    /// The named remote host is known but reported no such interface, and no
    /// MAC was claimed
    UnknownRemoteInterface,
    /// Neither a known remote host nor a MAC was claimed
    NoIdentity,
    /// The remote endpoint is on the observing host
    SelfReference,
}

impl fmt::Display for DanglingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DanglingReason::UnknownLocalInterface => "unknown local interface",
            DanglingReason::UnknownMac => "unknown MAC",
            DanglingReason::AmbiguousMac => "ambiguous MAC",
            DanglingReason::UnknownRemoteInterface => "unknown remote interface",
            DanglingReason::NoIdentity => "no remote identity",
            DanglingReason::SelfReference => "self reference",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DanglingObservation {
    pub observation: NeighborObservation,
    pub reason: DanglingReason,
}

/// Fused network graph for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub hosts: BTreeMap<String, HostNode>,
    pub links: Vec<Link>,
    pub conflicts: Vec<Conflict>,
    pub dangling: Vec<DanglingObservation>,
}

impl Topology {
    pub fn interface(&self, endpoint: &Endpoint) -> Option<&InterfaceNode> {
        self.hosts.get(&endpoint.host)?.interfaces.get(&endpoint.interface)
    }

    pub fn interface_count(&self) -> usize {
        self.hosts.values().map(|h| h.interfaces.len()).sum()
    }

    pub fn links_at<'a>(&'a self, endpoint: &'a Endpoint) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.touches(endpoint))
    }

    /// The link between two endpoints, in either order
    pub fn link_between(&self, x: &Endpoint, y: &Endpoint) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| (&l.a == x && &l.b == y) || (&l.a == y && &l.b == x))
    }

    pub fn conflict_at(&self, endpoint: &Endpoint) -> Option<&Conflict> {
        self.conflicts.iter().find(|c| &c.endpoint == endpoint)
    }
}
