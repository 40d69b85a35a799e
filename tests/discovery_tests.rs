//! End-to-end discovery: fake hosts -> orchestrator -> fusion.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeHost, SessionLog};
use linkscope::collector::{DiscoveryMethod, FailureCause, HostFactSet, HostStatus};
use linkscope::orchestrator::{collect_all, OrchestratorConfig};
use linkscope::session::CollectionTarget;
use linkscope::topology::{fuse, Endpoint, Topology};

const MAC_A0: &str = "52:54:00:00:0a:00";
const MAC_B0: &str = "52:54:00:00:0b:00";
const MAC_B1: &str = "52:54:00:00:0b:01";
const MAC_C0: &str = "52:54:00:00:0c:00";

fn config() -> OrchestratorConfig {
    OrchestratorConfig { host_timeout: Duration::from_secs(30), ..OrchestratorConfig::default() }
}

fn probe_config() -> OrchestratorConfig {
    let mut config = config();
    config.collector.methods.insert(DiscoveryMethod::Probe);
    config
}

async fn discover(targets: Vec<CollectionTarget>, config: &OrchestratorConfig) -> (Vec<HostFactSet>, Topology) {
    let run = collect_all(targets, config).await.expect("run starts");
    let topology = fuse(&run.hosts);
    (run.hosts, topology)
}

fn ep(host: &str, interface: &str) -> Endpoint {
    Endpoint::new(host, interface)
}

/// a.eth0 <-> b.eth0 cabled, both sides run lldpd, ARP agrees
fn cabled_pair() -> (FakeHost, FakeHost) {
    let a = FakeHost::new("a")
        .interface("eth0", MAC_A0)
        .lldp_neighbor("eth0", "b", "eth0")
        .arp_entry("eth0", "192.168.1.2", MAC_B0);
    let b = FakeHost::new("b")
        .interface("eth0", MAC_B0)
        .interface("eth1", MAC_B1)
        .lldp_neighbor("eth0", "a", "eth0")
        .arp_entry("eth0", "192.168.1.1", MAC_A0);
    (a, b)
}

#[tokio::test]
async fn test_two_methods_make_one_link_with_higher_confidence() {
    let (a, b) = cabled_pair();
    let (_, topology) = discover(vec![a.target(&[]), b.target(&[])], &config()).await;

    assert_eq!(topology.links.len(), 1);
    let link = &topology.links[0];
    assert_eq!((&link.a, &link.b), (&ep("a", "eth0"), &ep("b", "eth0")));
    assert_eq!(link.confidence, DiscoveryMethod::Lldp);
    assert_eq!(link.methods.len(), 2);
    assert!(link.high_confidence);
    assert!(link.is_bidirectional());
    assert!(topology.conflicts.is_empty());
    assert!(topology.dangling.is_empty());
}

#[tokio::test]
async fn test_excluded_interfaces_never_surface() {
    let (a, b) = cabled_pair();
    let a = a
        .interface("docker0", "02:42:ac:11:00:01")
        .arp_entry("docker0", "172.17.0.2", MAC_B1)
        .lldp_neighbor("docker0", "b", "eth1");
    let b = b.arp_entry("eth1", "172.17.0.1", "02:42:ac:11:00:01");

    let (hosts, topology) = discover(vec![a.target(&["docker"]), b.target(&[])], &config()).await;

    let a_facts = &hosts[0];
    assert!(a_facts.interface("docker0").is_none());
    assert!(a_facts.link_state("docker0").is_none());
    assert!(a_facts.neighbors.iter().all(|n| n.local_interface != "docker0"));

    let json = serde_json::to_string(&topology).unwrap();
    assert!(!json.contains("docker0"));
    assert!(topology.links.iter().all(|l| !l.touches(&ep("a", "docker0"))));
    assert_eq!(topology.links.len(), 1);
}

#[tokio::test]
async fn test_peer_view_of_excluded_interface_never_surfaces() {
    // b hides its docker bridge; a still hears LLDP from it
    let (a, b) = cabled_pair();
    let a = a.interface("eth1", "52:54:00:00:0a:01").lldp_neighbor("eth1", "b", "docker0");
    let b = b.interface("docker0", "02:42:ac:11:00:01");

    let (hosts, topology) = discover(vec![a.target(&[]), b.target(&["docker"])], &config()).await;

    assert!(hosts[1].interface("docker0").is_none());
    assert!(hosts[0]
        .neighbors
        .iter()
        .any(|n| n.remote_interface.as_deref() == Some("docker0")));

    let json = serde_json::to_string(&topology).unwrap();
    assert!(!json.contains("docker0"), "excluded interface leaked: {}", json);
    assert!(topology.dangling.is_empty());
    assert_eq!(topology.links.len(), 1);
}

#[tokio::test]
async fn test_fusion_is_idempotent_and_order_independent() {
    let (a, b) = cabled_pair();
    let c = FakeHost::new("c").interface("eth0", MAC_C0).probe_reply("eth0", MAC_B1);
    let (hosts, topology) = discover(vec![a.target(&[]), b.target(&[]), c.target(&[])], &probe_config()).await;

    assert_eq!(fuse(&hosts), topology);

    let mut reversed = hosts.clone();
    reversed.reverse();
    for set in &mut reversed {
        set.neighbors.reverse();
        set.interfaces.reverse();
    }
    assert_eq!(fuse(&reversed), topology);
}

#[tokio::test(start_paused = true)]
async fn test_failing_host_does_not_change_other_hosts() {
    let (a, b) = cabled_pair();
    let (baseline_hosts, baseline) = discover(vec![a.clone().target(&[]), b.clone().target(&[])], &config()).await;

    let down = FakeHost::new("down").interface("eth0", MAC_C0).unreachable();
    let slow = FakeHost::new("slow").interface("eth0", "52:54:00:00:0d:00").hanging();
    let (hosts, topology) = discover(
        vec![down.target(&[]), a.target(&[]), slow.target(&[]), b.target(&[])],
        &config(),
    )
    .await;

    assert_eq!(hosts[0].status, HostStatus::Failed);
    assert_eq!(hosts[0].failure.as_ref().map(|f| f.cause), Some(FailureCause::Unreachable));
    assert_eq!(hosts[2].status, HostStatus::Failed);
    assert_eq!(hosts[2].failure.as_ref().map(|f| f.cause), Some(FailureCause::Timeout));
    assert!(hosts[2].interfaces.is_empty());

    for (with_failures, alone) in [(&hosts[1], &baseline_hosts[0]), (&hosts[3], &baseline_hosts[1])] {
        assert_eq!(with_failures.status, alone.status);
        assert_eq!(with_failures.interfaces, alone.interfaces);
        assert_eq!(with_failures.link_states, alone.link_states);
        assert_eq!(with_failures.neighbors, alone.neighbors);
    }
    assert_eq!(topology.links, baseline.links);
    assert_eq!(topology.conflicts, baseline.conflicts);

    // Failed hosts stay visible
    assert!(topology.hosts.contains_key("down"));
    assert!(topology.hosts.contains_key("slow"));
}

#[tokio::test]
async fn test_asymmetric_probe_sighting_is_one_link_without_conflict() {
    let a = FakeHost::new("a").interface("eth0", MAC_A0).probe_reply("eth0", MAC_B0).without_lldp();
    let b = FakeHost::new("b").interface("eth0", MAC_B0).without_lldp();

    let (hosts, topology) = discover(vec![a.target(&[]), b.target(&[])], &probe_config()).await;

    assert!(hosts.iter().all(|h| h.status == HostStatus::Succeeded));
    assert_eq!(topology.links.len(), 1);
    let link = &topology.links[0];
    assert_eq!(link.confidence, DiscoveryMethod::Probe);
    assert!(!link.is_bidirectional());
    assert!(!link.is_conflicting());
    assert!(topology.conflicts.is_empty());
}

#[tokio::test]
async fn test_lldp_and_arp_disagreement_is_a_conflict() {
    // LLDP on a.eth0 names b.eth1, ARP on the same port resolves to c.eth0
    let a = FakeHost::new("a")
        .interface("eth0", MAC_A0)
        .lldp_neighbor("eth0", "b", "eth1")
        .arp_entry("eth0", "192.168.1.3", MAC_C0);
    let b = FakeHost::new("b").interface("eth1", MAC_B1);
    let c = FakeHost::new("c").interface("eth0", MAC_C0);

    let (_, topology) = discover(vec![a.target(&[]), b.target(&[]), c.target(&[])], &config()).await;

    assert_eq!(topology.links.len(), 2);
    assert!(topology.links.iter().all(|l| l.is_conflicting()));

    assert_eq!(topology.conflicts.len(), 1);
    let conflict = &topology.conflicts[0];
    assert_eq!(conflict.endpoint, ep("a", "eth0"));
    let peers: Vec<&Endpoint> = conflict.candidates.iter().map(|c| &c.peer).collect();
    assert_eq!(peers, vec![&ep("b", "eth1"), &ep("c", "eth0")]);

    let lldp_link = topology.link_between(&ep("a", "eth0"), &ep("b", "eth1")).unwrap();
    assert_eq!(lldp_link.confidence, DiscoveryMethod::Lldp);
    let arp_link = topology.link_between(&ep("c", "eth0"), &ep("a", "eth0")).unwrap();
    assert_eq!(arp_link.confidence, DiscoveryMethod::Arp);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling_is_honoured() {
    let log = Arc::new(SessionLog::default());
    let targets: Vec<CollectionTarget> = (0..10)
        .map(|i| {
            FakeHost::new(&format!("h{}", i))
                .interface("eth0", &format!("52:54:00:00:10:{:02x}", i))
                .delay(Duration::from_millis(200))
                .session_log(&log)
                .target(&[])
        })
        .collect();

    let config = OrchestratorConfig { concurrency: 3, ..config() };
    let run = collect_all(targets, &config).await.unwrap();

    assert_eq!(run.hosts.len(), 10);
    assert!(run.hosts.iter().all(|h| h.status == HostStatus::Succeeded));
    assert_eq!(log.sessions(), 10);
    assert!(log.max_overlap() <= 3, "saw {} sessions at once", log.max_overlap());
    assert!(log.max_overlap() > 1);

    let names: Vec<String> = run.hosts.iter().map(|h| h.host.name.clone()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("h{}", i)).collect();
    assert_eq!(names, expected);
}

#[tokio::test(start_paused = true)]
async fn test_run_deadline_fails_unfinished_hosts() {
    let (a, b) = cabled_pair();
    let stuck = FakeHost::new("stuck").interface("eth0", MAC_C0).hanging();

    let config = OrchestratorConfig {
        host_timeout: Duration::from_secs(3600),
        run_deadline: Some(Duration::from_secs(60)),
        ..OrchestratorConfig::default()
    };
    let run = collect_all(vec![a.target(&[]), stuck.target(&[]), b.target(&[])], &config)
        .await
        .unwrap();

    assert_eq!(run.hosts[0].status, HostStatus::Succeeded);
    assert_eq!(run.hosts[2].status, HostStatus::Succeeded);
    assert_eq!(run.hosts[1].status, HostStatus::Failed);
    assert_eq!(run.hosts[1].failure.as_ref().map(|f| f.cause), Some(FailureCause::Timeout));
    assert!(!run.nothing_reachable());

    let topology = fuse(&run.hosts);
    assert_eq!(topology.links.len(), 1);
}

#[tokio::test]
async fn test_missing_lldp_with_arp_enabled_is_not_degraded() {
    let (a, b) = cabled_pair();
    let a = a.without_lldp();

    let (hosts, topology) = discover(vec![a.target(&[]), b.target(&[])], &config()).await;

    assert_eq!(hosts[0].status, HostStatus::Succeeded);
    // b's LLDP plus both ARP directions still make the link
    assert_eq!(topology.links.len(), 1);
    assert_eq!(topology.links[0].confidence, DiscoveryMethod::Lldp);
}
