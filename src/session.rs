//! Per-host collection session: one collector run under a time budget.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::Instant;

use crate::collector::{collect_host, CollectorOptions, FailureCause, Host, HostFactSet};
use crate::transport::CommandExecutor;
use crate::utils::ExclusionSet;

/// Everything needed to collect one host
#[derive(Clone)]
pub struct CollectionTarget {
    pub host: Host,
    pub executor: Arc<dyn CommandExecutor>,
    pub exclusions: ExclusionSet,
}

impl CollectionTarget {
    pub fn new(host: Host, executor: Arc<dyn CommandExecutor>, exclusions: ExclusionSet) -> Self {
        Self { host, executor, exclusions }
    }
}

impl std::fmt::Debug for CollectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionTarget")
            .field("host", &self.host)
            .field("exclusions", &self.exclusions.len())
            .finish_non_exhaustive()
    }
}

/// Run the collector for `target`, giving up after `timeout`.
///
/// On expiry the collector future is dropped, which cancels the in-flight
/// remote call, and whatever it had gathered is discarded: the host comes back
/// `failed` with no facts.
pub async fn run_session(target: &CollectionTarget, timeout: Duration, options: &CollectorOptions) -> HostFactSet {
    let started = Instant::now();
    let collect = collect_host(&target.host, target.executor.as_ref(), &target.exclusions, options);

    let mut set = match tokio::time::timeout(timeout, collect).await {
        Ok(set) => set,
        Err(_) => {
            warn!("{}: collection timed out after {}", target.host.name, humantime::format_duration(timeout));
            HostFactSet::failed(
                target.host.clone(),
                FailureCause::Timeout,
                format!("host timeout of {} expired", humantime::format_duration(timeout)),
            )
            .with_exclusions(&target.exclusions)
        }
    };

    set.elapsed_ms = started.elapsed().as_millis() as u64;
    set
}
