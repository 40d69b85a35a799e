//! In-memory lab hosts for integration tests.
//!
//! A [`FakeHost`] answers the collector's commands with output shaped like
//! the real tools', built from a small description of the host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use linkscope::collector::interfaces::{ADDR_COMMAND, LINK_COMMAND};
use linkscope::collector::link_state::LINK_STATE_COMMAND;
use linkscope::collector::neighbors::{ARP_COMMAND, LLDP_COMMAND};
use linkscope::collector::Host;
use linkscope::session::CollectionTarget;
use linkscope::transport::{CommandExecutor, ExecError};
use linkscope::utils::ExclusionSet;

/// Records when each host's session was busy, from its first command
/// starting to its last command finishing.
#[derive(Debug, Default)]
pub struct SessionLog {
    spans: Mutex<HashMap<String, (Instant, Instant)>>,
}

impl SessionLog {
    fn started(&self, host: &str, at: Instant) {
        let mut spans = self.spans.lock().unwrap();
        spans.entry(host.to_string()).or_insert((at, at));
    }

    fn finished(&self, host: &str, at: Instant) {
        let mut spans = self.spans.lock().unwrap();
        let span = spans.entry(host.to_string()).or_insert((at, at));
        span.1 = span.1.max(at);
    }

    pub fn sessions(&self) -> usize {
        self.spans.lock().unwrap().len()
    }

    /// Largest number of sessions open at the same instant. A session that
    /// ends exactly when another starts does not overlap it.
    pub fn max_overlap(&self) -> usize {
        let spans = self.spans.lock().unwrap();
        let mut events: Vec<(Instant, i32)> = spans
            .values()
            .flat_map(|&(start, end)| [(start, 1), (end, -1)])
            .collect();
        events.sort();

        let mut open = 0i32;
        let mut max = 0i32;
        for (_, delta) in events {
            open += delta;
            max = max.max(open);
        }
        max as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    pub name: String,
    pub interfaces: Vec<(String, String)>,
    /// `None` means lldpcli is not installed
    pub lldp: Option<String>,
    pub arp: String,
    /// Interface -> `ip -6 neigh show dev <if>` output after the multicast ping
    pub probe: HashMap<String, String>,
    /// Latency of every command
    pub delay: Duration,
    pub unreachable: bool,
    /// Every command after the interface listing hangs
    pub hang: bool,
    pub sessions: Option<Arc<SessionLog>>,
}

impl FakeHost {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), lldp: Some(String::new()), ..Self::default() }
    }

    pub fn interface(mut self, name: &str, mac: &str) -> Self {
        self.interfaces.push((name.to_string(), mac.to_string()));
        self
    }

    /// Add an LLDP neighbor block seen on `local`
    pub fn lldp_neighbor(mut self, local: &str, sys_name: &str, port: &str) -> Self {
        let block = format!(
            "-------------------------------------------------------------------------------\n\
             Interface:    {}, via: LLDP, RID: 1, Time: 0 day, 00:00:10\n\
             \x20 Chassis:\n\
             \x20   SysName:      {}\n\
             \x20 Port:\n\
             \x20   PortID:       ifname {}\n",
            local, sys_name, port
        );
        self.lldp.get_or_insert_with(String::new).push_str(&block);
        self
    }

    pub fn without_lldp(mut self) -> Self {
        self.lldp = None;
        self
    }

    pub fn arp_entry(mut self, local: &str, ip: &str, mac: &str) -> Self {
        self.arp.push_str(&format!("{} dev {} lladdr {} REACHABLE\n", ip, local, mac));
        self
    }

    pub fn probe_reply(mut self, local: &str, mac: &str) -> Self {
        self.probe
            .entry(local.to_string())
            .or_default()
            .push_str(&format!("fe80::1 lladdr {} router REACHABLE\n", mac));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn session_log(mut self, log: &Arc<SessionLog>) -> Self {
        self.sessions = Some(Arc::clone(log));
        self
    }

    pub fn target(self, exclusions: &[&str]) -> CollectionTarget {
        let host = Host::new(&self.name, format!("{}.lab", self.name));
        let exclusions = ExclusionSet::compile(exclusions).expect("test exclusion patterns compile");
        CollectionTarget::new(host, Arc::new(self), exclusions)
    }

    fn ip_link(&self) -> String {
        self.interfaces
            .iter()
            .enumerate()
            .map(|(i, (name, mac))| {
                format!(
                    "{}: {}: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT group default qlen 1000\\    link/ether {} brd ff:ff:ff:ff:ff:ff\n",
                    i + 2,
                    name,
                    mac
                )
            })
            .collect()
    }

    fn sysfs(&self) -> String {
        self.interfaces
            .iter()
            .map(|(name, _)| format!("{0}/operstate:up\n{0}/carrier:1\n{0}/statistics/rx_bytes:4096\n", name))
            .collect()
    }

    fn not_found() -> ExecError {
        ExecError::CommandFailed { exit_code: 127, stderr: "command not found".to_string() }
    }
}

#[async_trait]
impl CommandExecutor for FakeHost {
    async fn execute(&self, command: &str) -> Result<String, ExecError> {
        if let Some(log) = &self.sessions {
            log.started(&self.name, Instant::now());
        }
        let output = self.respond(command).await;
        if let Some(log) = &self.sessions {
            log.finished(&self.name, Instant::now());
        }
        output
    }
}

impl FakeHost {
    async fn respond(&self, command: &str) -> Result<String, ExecError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable {
            return Err(ExecError::Connection { host: self.name.clone(), reason: "connection refused".to_string() });
        }
        if command == LINK_COMMAND {
            return Ok(self.ip_link());
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }

        match command {
            ADDR_COMMAND => Ok(String::new()),
            "hostname" => Ok(format!("{}\n", self.name)),
            LINK_STATE_COMMAND => Ok(self.sysfs()),
            LLDP_COMMAND => self.lldp.clone().ok_or_else(Self::not_found),
            ARP_COMMAND => Ok(self.arp.clone()),
            probe if probe.contains("ff02::1%") => {
                let output = self
                    .probe
                    .iter()
                    .find(|(iface, _)| probe.contains(&format!("ff02::1%{} ", iface)))
                    .map(|(_, out)| out.clone())
                    .unwrap_or_default();
                Ok(output)
            }
            _ => Err(Self::not_found()),
        }
    }
}
