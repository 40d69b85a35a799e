//! Topology fusion.
//!
//! Turns the per-host fact sets of a run into one [`Topology`]:
//!
//! 1. Every interface of every host is registered; link state attaches to it.
//! 2. Each neighbor observation is resolved to a remote endpoint, first by the
//!    claimed host/interface identity, then by the claimed MAC. Observations
//!    that resolve nowhere are kept as dangling.
//! 3. Resolved observations are grouped by unordered endpoint pair; each
//!    group is one link, ranked by its strongest method.
//! 4. An endpoint that ends up on more than one link is a conflict. All of
//!    its links are kept and flagged.
//!
//! Inputs are sorted and every intermediate collection is ordered, so the
//! result does not depend on the order of hosts or observations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;

use log::{debug, info, warn};

use super::types::{
    Conflict, ConflictCandidate, DanglingObservation, DanglingReason, Endpoint, HostNode, InterfaceNode, Link,
    LinkConflict, Topology,
};
use crate::collector::{DiscoveryMethod, HostFactSet, NeighborObservation};
use crate::utils::ExclusionSet;

/// Evidence gathered for one unordered endpoint pair
#[derive(Default)]
struct Candidate {
    methods: BTreeSet<DiscoveryMethod>,
    observed_from: BTreeSet<Endpoint>,
}

/// Lookup tables over the registered interfaces
struct ResolutionIndex<'a> {
    registered: BTreeSet<Endpoint>,
    by_mac: HashMap<String, Vec<Endpoint>>,
    /// Lower-cased alias -> host names carrying it
    aliases: HashMap<String, BTreeSet<String>>,
    exclusions: HashMap<&'a str, &'a ExclusionSet>,
}

impl<'a> ResolutionIndex<'a> {
    fn build(hosts: &BTreeMap<String, HostNode>, sets: &[&'a HostFactSet]) -> Self {
        let mut registered = BTreeSet::new();
        let mut by_mac: HashMap<String, Vec<Endpoint>> = HashMap::new();
        let mut aliases: HashMap<String, BTreeSet<String>> = HashMap::new();

        for host in hosts.values() {
            let mut add_alias = |alias: &str| {
                let alias = alias.trim().to_lowercase();
                if !alias.is_empty() {
                    aliases.entry(alias).or_default().insert(host.name.clone());
                }
            };

            add_alias(&host.address);
            for name in std::iter::once(&host.name).chain(host.system_name.as_ref()) {
                add_alias(name);
                if name.parse::<IpAddr>().is_err() {
                    if let Some((short, _)) = name.split_once('.') {
                        add_alias(short);
                    }
                }
            }

            for (if_name, node) in &host.interfaces {
                let endpoint = Endpoint::new(&host.name, if_name);
                if let Some(mac) = &node.fact.mac {
                    by_mac.entry(mac.clone()).or_default().push(endpoint.clone());
                }
                registered.insert(endpoint);
            }
        }

        let mut exclusions = HashMap::new();
        for set in sets.iter().copied() {
            exclusions.entry(set.host.name.as_str()).or_insert(&set.exclusions);
        }

        Self { registered, by_mac, aliases, exclusions }
    }

    /// The single host an alias names, if it names exactly one
    fn host_by_alias(&self, alias: &str) -> Option<&str> {
        let hosts = self.aliases.get(&alias.trim().to_lowercase())?;
        if hosts.len() == 1 {
            hosts.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Known hosts the observation's remote host name or address points at
    fn named_hosts<'o>(&'o self, obs: &'o NeighborObservation) -> impl Iterator<Item = &'o str> + 'o {
        obs.remote_host
            .iter()
            .chain(obs.remote_ip.iter())
            .filter_map(|alias| self.host_by_alias(alias))
    }

    fn by_identity(&self, obs: &NeighborObservation) -> Option<Endpoint> {
        let interface = obs.remote_interface.as_deref()?;
        self.named_hosts(obs)
            .map(|host| Endpoint::new(host, interface))
            .find(|endpoint| self.registered.contains(endpoint))
    }

    fn is_excluded(&self, host: &str, interface: &str) -> bool {
        self.exclusions.get(host).is_some_and(|set| set.is_excluded(interface))
    }

    /// The observation names an interface that its own host or the named
    /// remote host excludes
    fn names_excluded(&self, obs: &NeighborObservation) -> bool {
        if self.is_excluded(&obs.local_host, &obs.local_interface) {
            return true;
        }
        match obs.remote_interface.as_deref() {
            Some(interface) => self.named_hosts(obs).any(|host| self.is_excluded(host, interface)),
            None => false,
        }
    }

    fn by_mac(&self, mac: &str) -> Result<Endpoint, DanglingReason> {
        match self.by_mac.get(mac).map(Vec::as_slice) {
            Some([only]) => Ok(only.clone()),
            Some(owners) if owners.len() > 1 => Err(DanglingReason::AmbiguousMac),
            _ => Err(DanglingReason::UnknownMac),
        }
    }

    /// Resolve an observation to its (local, remote) endpoints
    fn resolve(&self, obs: &NeighborObservation) -> Result<(Endpoint, Endpoint), DanglingReason> {
        let local = Endpoint::new(&obs.local_host, &obs.local_interface);
        if !self.registered.contains(&local) {
            return Err(DanglingReason::UnknownLocalInterface);
        }

        let remote = match self.by_identity(obs) {
            Some(endpoint) => endpoint,
            None => match obs.remote_mac.as_deref() {
                Some(mac) => self.by_mac(mac)?,
                None if obs.remote_interface.is_some() && self.named_hosts(obs).next().is_some() => {
                    return Err(DanglingReason::UnknownRemoteInterface)
                }
                None => return Err(DanglingReason::NoIdentity),
            },
        };

        if remote.host == local.host {
            return Err(DanglingReason::SelfReference);
        }
        Ok((local, remote))
    }
}

fn register_hosts(fact_sets: &[&HostFactSet]) -> BTreeMap<String, HostNode> {
    let mut hosts = BTreeMap::new();

    for set in fact_sets {
        if hosts.contains_key(&set.host.name) {
            warn!("Duplicate fact set for host {}, keeping the first", set.host.name);
            continue;
        }

        let interfaces = set
            .interfaces
            .iter()
            .map(|fact| {
                let node = InterfaceNode { fact: fact.clone(), link_state: set.link_state(&fact.name).cloned() };
                (fact.name.clone(), node)
            })
            .collect();

        hosts.insert(
            set.host.name.clone(),
            HostNode {
                name: set.host.name.clone(),
                address: set.host.address.clone(),
                system_name: set.system_name.clone(),
                status: set.status,
                failure: set.failure.clone(),
                interfaces,
            },
        );
    }

    hosts
}

/// Order the pair so (x, y) and (y, x) share one key
fn pair_key(x: Endpoint, y: Endpoint) -> (Endpoint, Endpoint) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

/// Fuse the fact sets of one run into a topology. Pure and deterministic.
pub fn fuse(fact_sets: &[HostFactSet]) -> Topology {
    let mut sets: Vec<&HostFactSet> = fact_sets.iter().collect();
    sets.sort_by(|x, y| x.host.name.cmp(&y.host.name));

    let hosts = register_hosts(&sets);
    let index = ResolutionIndex::build(&hosts, &sets);

    let mut observations: Vec<&NeighborObservation> = sets.iter().flat_map(|s| s.neighbors.iter()).collect();
    observations.sort();
    observations.dedup();

    let mut candidates: BTreeMap<(Endpoint, Endpoint), Candidate> = BTreeMap::new();
    let mut dangling = Vec::new();

    let mut excluded = 0usize;

    for obs in observations {
        if index.names_excluded(obs) {
            excluded += 1;
            continue;
        }
        match index.resolve(obs) {
            Ok((local, remote)) => {
                let candidate = candidates.entry(pair_key(local.clone(), remote)).or_default();
                candidate.methods.insert(obs.method);
                candidate.observed_from.insert(local);
            }
            Err(reason) => {
                debug!("Unresolved {} observation on {}:{}: {}", obs.method, obs.local_host, obs.local_interface, reason);
                dangling.push(DanglingObservation { observation: obs.clone(), reason });
            }
        }
    }

    // Every endpoint with the peers evidence connects it to
    let mut peers: BTreeMap<&Endpoint, Vec<ConflictCandidate>> = BTreeMap::new();
    for ((a, b), candidate) in &candidates {
        peers
            .entry(a)
            .or_default()
            .push(ConflictCandidate { peer: b.clone(), methods: candidate.methods.clone() });
        peers
            .entry(b)
            .or_default()
            .push(ConflictCandidate { peer: a.clone(), methods: candidate.methods.clone() });
    }

    let conflicts: Vec<Conflict> = peers
        .into_iter()
        .filter(|(_, competing)| competing.len() > 1)
        .map(|(endpoint, mut competing)| {
            competing.sort();
            Conflict { endpoint: endpoint.clone(), candidates: competing }
        })
        .collect();
    let conflicted: BTreeSet<&Endpoint> = conflicts.iter().map(|c| &c.endpoint).collect();

    let links: Vec<Link> = candidates
        .iter()
        .filter_map(|((a, b), candidate)| {
            // A candidate always carries at least the method that created it
            let confidence = *candidate.methods.iter().next_back()?;
            let at: BTreeSet<Endpoint> = [a, b].into_iter().filter(|e| conflicted.contains(e)).cloned().collect();
            Some(Link {
                a: a.clone(),
                b: b.clone(),
                confidence,
                methods: candidate.methods.clone(),
                high_confidence: candidate.methods.len() >= 2,
                observed_from: candidate.observed_from.clone(),
                conflict: if at.is_empty() { None } else { Some(LinkConflict { at }) },
            })
        })
        .collect();

    dangling.sort();
    dangling.dedup();

    if excluded > 0 {
        debug!("Dropped {} observations naming excluded interfaces", excluded);
    }

    info!(
        "Fused topology: {} hosts, {} interfaces, {} links, {} conflicts, {} dangling observations",
        hosts.len(),
        hosts.values().map(|h| h.interfaces.len()).sum::<usize>(),
        links.len(),
        conflicts.len(),
        dangling.len()
    );

    Topology { hosts, links, conflicts, dangling }
}
