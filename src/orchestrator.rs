//! Fan-out collection orchestrator.
//!
//! Runs one [`run_session`] per host on the tokio runtime, at most
//! `concurrency` at a time, and gathers every outcome through a single
//! channel. Individual hosts never fail the run; only a structurally invalid
//! host list does.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::collector::{CollectorOptions, FailureCause, HostFactSet, HostStatus};
use crate::session::{run_session, CollectionTarget};

/// Default number of hosts collected at once
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Default per-host time budget
pub const DEFAULT_HOST_TIMEOUT: Duration = Duration::from_secs(60);

/// Scheduling parameters for one run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    pub host_timeout: Duration,
    /// Optional budget for the whole run; hosts still running are failed when it expires
    pub run_deadline: Option<Duration>,
    pub collector: CollectorOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            host_timeout: DEFAULT_HOST_TIMEOUT,
            run_deadline: None,
            collector: CollectorOptions::default(),
        }
    }
}

/// Errors that prevent a run from starting
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RunError {
    #[error("inventory contains no hosts")]
    EmptyInventory,

    #[error("host '{0}' appears more than once in the inventory")]
    DuplicateHost(String),

    #[error("concurrency limit must be at least 1")]
    InvalidConcurrency,
}

/// Outcome of one collection run: one fact set per host, in inventory order
#[derive(Debug, Clone)]
pub struct CollectionRun {
    pub hosts: Vec<HostFactSet>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl CollectionRun {
    pub fn count(&self, status: HostStatus) -> usize {
        self.hosts.iter().filter(|h| h.status == status).count()
    }

    /// True when every host failed. The run still completed; callers decide
    /// how loudly to report it.
    pub fn nothing_reachable(&self) -> bool {
        !self.hosts.is_empty() && self.hosts.iter().all(HostFactSet::is_failed)
    }
}

fn validate_targets(targets: &[CollectionTarget], config: &OrchestratorConfig) -> Result<(), RunError> {
    if targets.is_empty() {
        return Err(RunError::EmptyInventory);
    }
    if config.concurrency == 0 {
        return Err(RunError::InvalidConcurrency);
    }

    let mut seen = HashSet::new();
    for target in targets {
        if !seen.insert(target.host.name.as_str()) {
            return Err(RunError::DuplicateHost(target.host.name.clone()));
        }
    }
    Ok(())
}

/// Move every result already sitting in the channel into its slot
fn take_ready(rx: &mut mpsc::UnboundedReceiver<(usize, HostFactSet)>, results: &mut [Option<HostFactSet>]) -> usize {
    let mut taken = 0;
    while let Ok((index, set)) = rx.try_recv() {
        if let Some(slot) = results.get_mut(index) {
            if slot.is_none() {
                *slot = Some(set);
                taken += 1;
            }
        }
    }
    taken
}

/// Collect facts from every target.
///
/// Each host is attempted exactly once. The returned run holds a terminal
/// fact set for every host, in the order the targets were given.
pub async fn collect_all(targets: Vec<CollectionTarget>, config: &OrchestratorConfig) -> Result<CollectionRun, RunError> {
    validate_targets(&targets, config)?;

    let started_at = Utc::now();
    let started = Instant::now();
    let deadline = config.run_deadline.map(|d| started + d);

    info!(
        "Collecting from {} host(s), concurrency {}, host timeout {}",
        targets.len(),
        config.concurrency,
        humantime::format_duration(config.host_timeout)
    );

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, HostFactSet)>();
    let mut tasks = JoinSet::new();

    for (index, target) in targets.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let timeout = config.host_timeout;
        let options = config.collector.clone();

        tasks.spawn(async move {
            // The semaphore is never closed, so acquiring only waits
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            debug!("{}: session started", target.host.name);
            let set = run_session(&target, timeout, &options).await;
            // The receiver outlives every worker unless the run deadline hit
            let _ = tx.send((index, set));
        });
    }
    drop(tx);

    let mut results: Vec<Option<HostFactSet>> = vec![None; targets.len()];
    let gather = async {
        while let Some((index, set)) = rx.recv().await {
            results[index] = Some(set);
        }
    };

    let deadline_expired = match deadline {
        Some(at) => tokio::time::timeout_at(at, gather).await.is_err(),
        None => {
            gather.await;
            false
        }
    };

    if deadline_expired {
        warn!("Run deadline expired; aborting unfinished hosts");
        tasks.abort_all();
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                warn!("Collection task panicked: {}", e);
            }
        }
    }
    // Hosts that finished as the deadline hit are already queued
    let late = take_ready(&mut rx, &mut results);
    if late > 0 {
        debug!("{} host(s) finished at the run deadline", late);
    }

    let hosts: Vec<HostFactSet> = results
        .into_iter()
        .zip(targets)
        .map(|(result, target)| match result {
            Some(set) => set,
            None if deadline_expired => {
                HostFactSet::failed(target.host, FailureCause::Timeout, "run deadline expired before the host finished")
                    .with_exclusions(&target.exclusions)
            }
            None => HostFactSet::failed(target.host, FailureCause::Aborted, "collection task terminated abnormally")
                .with_exclusions(&target.exclusions),
        })
        .collect();

    let run = CollectionRun { hosts, started_at, elapsed: started.elapsed() };

    info!(
        "Collection finished in {}: {} succeeded, {} degraded, {} failed",
        humantime::format_duration(Duration::from_millis(run.elapsed.as_millis() as u64)),
        run.count(HostStatus::Succeeded),
        run.count(HostStatus::Degraded),
        run.count(HostStatus::Failed)
    );
    if run.nothing_reachable() {
        warn!("No host could be reached; the topology will be empty");
    }

    Ok(run)
}
