//! Remote fact collection for a single host.
//!
//! [`collect_host`] runs the interface, link-state and neighbor probes against
//! one [`CommandExecutor`] and folds the results into a [`HostFactSet`].
//! Probes never abort the collection: a failing probe leaves a
//! [`Diagnostic`] behind and the host ends up `degraded`. Only a failed
//! interface listing marks the host `failed`.

pub mod interfaces;
pub mod link_state;
pub mod neighbors;
pub mod parse;
pub mod types;

pub use parse::{ParseWarning, Parsed};
pub use types::{
    Diagnostic, DiscoveryMethod, FailureCause, Host, HostFactSet, HostFailure, HostStatus, InterfaceFact,
    LinkCounters, LinkStateFact, NeighborObservation, OperState, ProbeKind,
};

use std::collections::BTreeSet;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::transport::{CommandExecutor, ExecError};
use crate::utils::ExclusionSet;

const IDENTITY_COMMAND: &str = "hostname";

/// Which neighbor methods to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorOptions {
    pub methods: BTreeSet<DiscoveryMethod>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self::with_methods([DiscoveryMethod::Lldp, DiscoveryMethod::Arp])
    }
}

impl CollectorOptions {
    pub fn with_methods(methods: impl IntoIterator<Item = DiscoveryMethod>) -> Self {
        Self { methods: methods.into_iter().collect() }
    }
}

/// State shared by the probes of one collection: the host, its executor and
/// the diagnostics recorded so far.
pub struct ProbeContext<'a> {
    pub host: &'a Host,
    pub exclusions: &'a ExclusionSet,
    executor: &'a dyn CommandExecutor,
    diagnostics: Vec<Diagnostic>,
    /// Set once the connection is gone; later commands fail fast with it
    lost: Option<ExecError>,
}

impl<'a> ProbeContext<'a> {
    fn new(host: &'a Host, executor: &'a dyn CommandExecutor, exclusions: &'a ExclusionSet) -> Self {
        Self { host, exclusions, executor, diagnostics: Vec::new(), lost: None }
    }

    async fn run(&mut self, command: &str) -> Result<String, ExecError> {
        if let Some(err) = &self.lost {
            return Err(err.clone());
        }
        debug!("{}: $ {}", self.host.name, command);
        let result = self.executor.execute(command).await;
        if let Err(e) = &result {
            if e.is_host_level() {
                self.lost = Some(e.clone());
            }
        }
        result
    }

    fn note_skipped(&mut self, probe: ProbeKind, count: usize) {
        if count > 0 {
            debug!("{}: {} skipped {} line(s)", self.host.name, probe, count);
            self.diagnostics.push(Diagnostic::SkippedLines { probe, count });
        }
    }

    fn probe_failed(&mut self, probe: ProbeKind, error: &ExecError) {
        warn!("{}: {} probe failed: {}", self.host.name, probe, error);
        self.diagnostics.push(Diagnostic::ProbeFailed { probe, error: error.to_string() });
    }

    fn unavailable(&mut self, probe: ProbeKind) {
        let diagnostic = Diagnostic::Unavailable { probe };
        if !self.diagnostics.contains(&diagnostic) {
            info!("{}: {} not available", self.host.name, probe);
            self.diagnostics.push(diagnostic);
        }
    }

    fn unlisted(&mut self, probe: ProbeKind, interface: &str) {
        debug!("{}: {} reported unlisted interface {}", self.host.name, probe, interface);
        self.diagnostics.push(Diagnostic::UnlistedInterface { probe, interface: interface.to_string() });
    }
}

/// Collect every fact the enabled probes can gather from one host.
///
/// Never returns an error: unreachable hosts come back `failed`, partial
/// collections come back `degraded`.
pub async fn collect_host(
    host: &Host,
    executor: &dyn CommandExecutor,
    exclusions: &ExclusionSet,
    options: &CollectorOptions,
) -> HostFactSet {
    let started = Instant::now();
    let mut ctx = ProbeContext::new(host, executor, exclusions);

    let interfaces = match interfaces::probe_interfaces(&mut ctx).await {
        Ok(interfaces) => interfaces,
        Err(e) => {
            let cause = match e {
                ExecError::Connection { .. } => FailureCause::Unreachable,
                ExecError::Timeout { .. } => FailureCause::Timeout,
                ExecError::CommandFailed { .. } => FailureCause::NoUsableData,
            };
            warn!("{}: interface listing failed ({}): {}", host.name, cause, e);
            let mut set = HostFactSet::failed(host.clone(), cause, e.to_string()).with_exclusions(exclusions);
            set.diagnostics = ctx.diagnostics;
            set.elapsed_ms = started.elapsed().as_millis() as u64;
            return set;
        }
    };

    let system_name = probe_identity(&mut ctx).await;
    let link_states = link_state::probe_link_state(&mut ctx, &interfaces).await;
    let neighbors = neighbors::probe_neighbors(&mut ctx, &interfaces, &options.methods).await;

    let status = host_status(&ctx.diagnostics, &options.methods);
    info!(
        "{}: {} ({} interfaces, {} neighbor observations)",
        host.name,
        status,
        interfaces.len(),
        neighbors.len()
    );

    HostFactSet {
        host: host.clone(),
        status,
        failure: None,
        system_name,
        interfaces,
        link_states,
        neighbors,
        diagnostics: ctx.diagnostics,
        exclusions: exclusions.clone(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Kernel hostname, used as an extra alias when resolving LLDP system names
async fn probe_identity(ctx: &mut ProbeContext<'_>) -> Option<String> {
    match ctx.run(IDENTITY_COMMAND).await {
        Ok(output) => output.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string),
        Err(e) => {
            ctx.probe_failed(ProbeKind::Identity, &e);
            None
        }
    }
}

/// `degraded` when any data-bearing probe failed, or when no enabled neighbor
/// method was available at all.
fn host_status(diagnostics: &[Diagnostic], methods: &BTreeSet<DiscoveryMethod>) -> HostStatus {
    let probe_failed = diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ProbeFailed { probe, .. } if *probe != ProbeKind::Identity));

    let unavailable = methods
        .iter()
        .filter(|m| diagnostics.contains(&Diagnostic::Unavailable { probe: ProbeKind::Neighbors(**m) }))
        .count();
    let no_neighbor_source = !methods.is_empty() && unavailable == methods.len();

    if probe_failed || no_neighbor_source {
        HostStatus::Degraded
    } else {
        HostStatus::Succeeded
    }
}
