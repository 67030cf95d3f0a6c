//! Integration tests for [`RaftNode`] exercising it the way [`Server`](crate::server::Server)
//! does: through [`dispatch`](RaftNode::dispatch) with raw RESP request bytes in, a
//! [`RedisResponse`](crate::protocol::response::RedisResponse) out.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::tempdir;

use crate::cluster::codec::EntryType;
use crate::cluster::membership::RaftCfgChange;
use crate::cluster::{RaftNode, RaftNodeConfig};
use crate::storage::in_memory::InMemoryStorage;
use crate::storage::Storage;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    pred()
}

/// Scenario 1 of the testable properties: a single-node cluster started with `init=true` elects
/// itself leader uncontested and commits both its own membership entry and a subsequent write.
#[test]
fn single_node_init_commits_self_and_accepts_writes() {
    let dir = tempdir().unwrap();
    let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, free_port());
    let storage = Arc::new(Mutex::new(InMemoryStorage::default()));
    let config = RaftNodeConfig::init(1, addr, dir.path());

    let node = RaftNode::start(config, storage).expect("node should start");

    let response = node.dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    assert!(!response.is_error(), "SET should be accepted by the bootstrapped leader");

    let info = String::from_utf8(node.info().reply()).unwrap();
    assert!(info.contains("role:leader"), "info was: {}", info);
    assert!(info.contains("node_id:1"), "info was: {}", info);

    node.stop();
}

/// A fresh log reopened with [`StartupMode::Rejoin`](super::StartupMode::Rejoin) restores the
/// header's `current_term` and replays already-committed entries rather than re-running them
/// (P6: a crash-and-restart never loses a persisted term or commit index).
#[test]
fn rejoin_restores_persisted_header_across_restart() {
    let dir = tempdir().unwrap();
    let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, free_port());

    {
        let storage = Arc::new(Mutex::new(InMemoryStorage::default()));
        let config = RaftNodeConfig::init(7, addr, dir.path());
        let node = RaftNode::start(config, storage).expect("node should start");
        let response = node.dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
        assert!(!response.is_error());
        node.stop();
    }

    let storage = Arc::new(Mutex::new(InMemoryStorage::default()));
    let config = RaftNodeConfig::rejoin(7, addr, dir.path());
    let node = RaftNode::start(config, storage.clone()).expect("node should reopen its log");

    let caught_up = wait_until(
        || {
            let info = String::from_utf8(node.info().reply()).unwrap();
            info.lines()
                .find_map(|l| l.strip_prefix("current_term:"))
                .and_then(|term| term.parse::<u64>().ok())
                .map(|term| term >= 1)
                .unwrap_or(false)
        },
        Duration::from_secs(2),
    );
    assert!(caught_up, "rejoined node never reported a restored term");

    let value = storage.lock().unwrap().read(b"k").map(|v| v.to_vec());
    assert_eq!(value.as_deref(), Some(&b"v"[..]));

    node.stop();
}

fn info_field(info: &str, key: &str) -> Option<String> {
    info.lines()
        .find_map(|l| l.strip_prefix(&format!("{}:", key)))
        .map(str::to_string)
}

/// Scenario 2 of the testable properties: a three-node cluster brought up by joining two nodes to
/// a single-node leader, promoted to voting members via `AddNonVotingNode` followed by the
/// automatic `AddNode` promotion ([`replication::propose_caught_up_promotions`](super::replication)),
/// replicates a write to every member and redirects a write submitted to a non-leader.
#[test]
fn three_node_cluster_replicates_writes_and_redirects_non_leader() {
    let dir1 = tempdir().unwrap();
    let dir2 = tempdir().unwrap();
    let dir3 = tempdir().unwrap();
    let addr1 = SocketAddrV4::new(Ipv4Addr::LOCALHOST, free_port());
    let addr2 = SocketAddrV4::new(Ipv4Addr::LOCALHOST, free_port());
    let addr3 = SocketAddrV4::new(Ipv4Addr::LOCALHOST, free_port());

    let storage1 = Arc::new(Mutex::new(InMemoryStorage::default()));
    let storage2 = Arc::new(Mutex::new(InMemoryStorage::default()));
    let storage3 = Arc::new(Mutex::new(InMemoryStorage::default()));

    let leader = RaftNode::start(RaftNodeConfig::init(1, addr1, dir1.path()), storage1)
        .expect("leader should start");
    let follower2 = RaftNode::start(
        RaftNodeConfig::join(2, addr2, (1, addr1), dir2.path()),
        storage2.clone(),
    )
    .expect("follower 2 should start");
    let follower3 = RaftNode::start(
        RaftNodeConfig::join(3, addr3, (1, addr1), dir3.path()),
        storage3.clone(),
    )
    .expect("follower 3 should start");

    // The operator-driven half of joining: propose each new node as non-voting from the leader.
    // Promotion to voting happens automatically once the leader observes it's caught up.
    assert!(!leader
        .submit_cfg_change(EntryType::AddNonVotingNode, RaftCfgChange::new(2, addr2))
        .is_error());
    assert!(!leader
        .submit_cfg_change(EntryType::AddNonVotingNode, RaftCfgChange::new(3, addr3))
        .is_error());

    let all_voting = wait_until(
        || {
            let info = String::from_utf8(leader.info().reply()).unwrap();
            info_field(&info, "num_voting_nodes").as_deref() == Some("3")
        },
        Duration::from_secs(10),
    );
    assert!(all_voting, "both joiners should be promoted to voting members");

    let write = leader.dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\n1\r\n");
    assert!(!write.is_error(), "write through the leader should succeed");

    for storage in [&storage2, &storage3] {
        let replicated = wait_until(
            || storage.lock().unwrap().read(b"x").map(|v| v.to_vec()) == Some(b"1".to_vec()),
            Duration::from_secs(5),
        );
        assert!(replicated, "write should replicate to every voting member");
    }

    let redirect = follower2.dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\n2\r\n");
    assert!(redirect.is_error());
    let redirect_msg = String::from_utf8(redirect.reply()).unwrap();
    assert!(
        redirect_msg.contains(&format!("LEADERIS {}", addr1)),
        "non-leader write should redirect to the leader's address, got: {}",
        redirect_msg
    );

    leader.stop();
    follower2.stop();
    follower3.stop();
}

/// Brings up a 3-node cluster the same way
/// [`three_node_cluster_replicates_writes_and_redirects_non_leader`] does, promoting both joiners
/// to voting members before returning, so the scenario/property tests below don't have to repeat
/// the join-and-promote dance. `nodes[0]`/`addrs[0]` is the bootstrapped node (id 1), `nodes[1]`/
/// `nodes[2]` are the two joiners (ids 2 and 3); by the time this returns any of the three may be
/// leader, since promotion itself requires committing entries that go through a leader.
struct ThreeNodeCluster {
    // Held only to keep the temp directories alive for the cluster's lifetime.
    _dirs: Vec<tempfile::TempDir>,
    nodes: Vec<RaftNode>,
    storages: Vec<Arc<Mutex<InMemoryStorage>>>,
    addrs: Vec<SocketAddrV4>,
}

impl ThreeNodeCluster {
    fn stop_all(self) {
        for node in self.nodes {
            node.stop();
        }
    }
}

fn start_three_node_cluster() -> ThreeNodeCluster {
    let dirs: Vec<_> = (0..3).map(|_| tempdir().unwrap()).collect();
    let addrs: Vec<_> = (0..3)
        .map(|_| SocketAddrV4::new(Ipv4Addr::LOCALHOST, free_port()))
        .collect();
    let storages: Vec<_> = (0..3)
        .map(|_| Arc::new(Mutex::new(InMemoryStorage::default())))
        .collect();

    let leader = RaftNode::start(RaftNodeConfig::init(1, addrs[0], dirs[0].path()), storages[0].clone())
        .expect("leader should start");
    let follower2 = RaftNode::start(
        RaftNodeConfig::join(2, addrs[1], (1, addrs[0]), dirs[1].path()),
        storages[1].clone(),
    )
    .expect("follower 2 should start");
    let follower3 = RaftNode::start(
        RaftNodeConfig::join(3, addrs[2], (1, addrs[0]), dirs[2].path()),
        storages[2].clone(),
    )
    .expect("follower 3 should start");

    assert!(!leader
        .submit_cfg_change(EntryType::AddNonVotingNode, RaftCfgChange::new(2, addrs[1]))
        .is_error());
    assert!(!leader
        .submit_cfg_change(EntryType::AddNonVotingNode, RaftCfgChange::new(3, addrs[2]))
        .is_error());

    let all_voting = wait_until(
        || {
            let info = String::from_utf8(leader.info().reply()).unwrap();
            info_field(&info, "num_voting_nodes").as_deref() == Some("3")
        },
        Duration::from_secs(10),
    );
    assert!(all_voting, "both joiners should be promoted to voting members");

    ThreeNodeCluster {
        _dirs: dirs,
        nodes: vec![leader, follower2, follower3],
        storages,
        addrs,
    }
}

fn role_and_term(node: &RaftNode) -> (String, u64) {
    let info = String::from_utf8(node.info().reply()).unwrap();
    let role = info_field(&info, "role").unwrap_or_default();
    let term = info_field(&info, "current_term")
        .and_then(|t| t.parse::<u64>().ok())
        .unwrap_or_default();
    (role, term)
}

/// Scenario 3 of the testable properties: killing the current leader causes a remaining node to
/// win a new election, reported with a strictly higher `current_term`, and new writes submitted to
/// it succeed.
#[test]
fn leader_failure_triggers_reelection_with_a_higher_term() {
    let cluster = start_three_node_cluster();
    let ThreeNodeCluster { _dirs: _kept_dirs, mut nodes, .. } = cluster;

    let leader_index = nodes
        .iter()
        .position(|node| role_and_term(node).0 == "leader")
        .expect("cluster must have a leader before it can be killed");
    let original_term = role_and_term(&nodes[leader_index]).1;

    let leader = nodes.remove(leader_index);
    leader.stop();
    let remaining = nodes;

    let reelected = wait_until(
        || {
            remaining.iter().any(|node| {
                let (role, term) = role_and_term(node);
                role == "leader" && term > original_term
            })
        },
        Duration::from_secs(15),
    );
    assert!(
        reelected,
        "a remaining node should become leader with a higher term once the old leader is killed"
    );

    let new_leader = remaining
        .iter()
        .find(|node| role_and_term(node).0 == "leader")
        .expect("one remaining node must report itself leader");

    let write = new_leader.dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\ny\r\n$1\r\n9\r\n");
    assert!(!write.is_error(), "the new leader should accept writes after the re-election");

    for node in remaining {
        node.stop();
    }
}

/// Scenario 6 of the testable properties: the leader proposes `CFGCHANGE_REMOVENODE` targeting its
/// own id. The entry commits, the removed node's replication thread exits
/// ([`reconcile_peer_links`](super::handlers::reconcile_peer_links)'s `self_removed` path), and the
/// remaining two nodes elect a new leader and keep accepting writes.
#[test]
fn self_remove_leader_elects_new_leader_and_continues_accepting_writes() {
    let cluster = start_three_node_cluster();
    let ThreeNodeCluster { _dirs: _kept_dirs, mut nodes, .. } = cluster;

    let leader_index = nodes
        .iter()
        .position(|node| role_and_term(node).0 == "leader")
        .expect("cluster must have a leader before it can remove itself");
    let leader_id = nodes[leader_index].node_id();

    let removal = nodes[leader_index].submit_cfg_change(
        EntryType::RemoveNode,
        RaftCfgChange::new(leader_id, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
    );
    assert!(!removal.is_error(), "self-removal should commit");

    let leader = nodes.remove(leader_index);
    leader.stop();
    let remaining = nodes;

    let reelected = wait_until(
        || remaining.iter().any(|node| role_and_term(node).0 == "leader"),
        Duration::from_secs(15),
    );
    assert!(reelected, "the remaining two nodes should elect a new leader");

    let new_leader = remaining
        .iter()
        .find(|node| role_and_term(node).0 == "leader")
        .expect("one remaining node must report itself leader");

    let write = new_leader.dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\nz\r\n$1\r\n3\r\n");
    assert!(!write.is_error(), "the surviving cluster should keep accepting writes");

    for node in remaining {
        node.stop();
    }
}

/// P3 (agreement): once a write has replicated, every live node's storage holds the byte-identical
/// value for that key — not just "some value", the same one the leader committed.
#[test]
fn property_agreement_replicated_storage_is_byte_identical_across_nodes() {
    let cluster = start_three_node_cluster();

    let leader_index = cluster
        .nodes
        .iter()
        .position(|node| role_and_term(node).0 == "leader")
        .expect("cluster must have a leader");

    let write = cluster.nodes[leader_index].dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$2\r\nhi\r\n");
    assert!(!write.is_error());

    for storage in &cluster.storages {
        let replicated = wait_until(
            || storage.lock().unwrap().read(b"a").map(|v| v.to_vec()) == Some(b"hi".to_vec()),
            Duration::from_secs(5),
        );
        assert!(replicated, "every node's storage should hold the identical committed value");
    }

    let values: Vec<Option<Vec<u8>>> = cluster
        .storages
        .iter()
        .map(|s| s.lock().unwrap().read(b"a").map(|v| v.to_vec()))
        .collect();
    assert!(values.iter().all(|v| v == &values[0]), "all nodes must agree byte-for-byte: {:?}", values);

    cluster.stop_all();
}

/// P4 (leader uniqueness per term): no two nodes in a stable cluster report `role:leader` for the
/// same `current_term`.
#[test]
fn property_no_two_nodes_share_a_leader_term() {
    let cluster = start_three_node_cluster();

    wait_until(
        || cluster.nodes.iter().any(|node| role_and_term(node).0 == "leader"),
        Duration::from_secs(10),
    );

    let leader_terms: Vec<u64> = cluster
        .nodes
        .iter()
        .filter(|node| role_and_term(node).0 == "leader")
        .map(|node| role_and_term(node).1)
        .collect();

    assert_eq!(
        leader_terms.len(),
        1,
        "exactly one node should report itself leader in a stable cluster, got terms: {:?}",
        leader_terms
    );

    let mut terms_seen = std::collections::HashSet::new();
    for node in &cluster.nodes {
        let (role, term) = role_and_term(node);
        if role == "leader" {
            assert!(terms_seen.insert(term), "two nodes reported leader for the same term {}", term);
        }
    }

    cluster.stop_all();
}

/// P5 (no uncommitted application): by the time [`RaftNode::dispatch`] returns a reply for a write,
/// the value is already visible in the replying (leader's) storage — a reply is never observed
/// before the entry backing it has actually been applied.
#[test]
fn property_reply_is_never_observed_before_the_entry_is_applied() {
    let cluster = start_three_node_cluster();

    let leader_index = cluster
        .nodes
        .iter()
        .position(|node| role_and_term(node).0 == "leader")
        .expect("cluster must have a leader");

    let write = cluster.nodes[leader_index].dispatch(b"*3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n5\r\n");
    assert!(!write.is_error());

    // No wait_until here: apply_committed only replies to the pending request *after* writing to
    // storage (handlers::apply_committed), so the value must already be visible the instant the
    // blocking dispatch call above returns.
    let value = cluster.storages[leader_index]
        .lock()
        .unwrap()
        .read(b"b")
        .map(|v| v.to_vec());
    assert_eq!(value.as_deref(), Some(&b"5"[..]), "reply observed before the entry was applied to storage");

    cluster.stop_all();
}

/// P7 (liveness): with a stable majority, every accepted write gets a reply within a bounded number
/// of ticks, not just eventually.
#[test]
fn property_writes_complete_within_bounded_ticks() {
    let cluster = start_three_node_cluster();

    let leader_index = cluster
        .nodes
        .iter()
        .position(|node| role_and_term(node).0 == "leader")
        .expect("cluster must have a leader");

    let deadline = Duration::from_secs(5);
    for i in 0..10 {
        let started = Instant::now();
        let key = format!("k{}", i);
        let request = format!("*3\r\n$3\r\nSET\r\n${}\r\n{}\r\n$1\r\n1\r\n", key.len(), key);
        let write = cluster.nodes[leader_index].dispatch(request.as_bytes());
        assert!(!write.is_error(), "write {} should be accepted", i);
        assert!(
            started.elapsed() < deadline,
            "write {} took {:?}, exceeding the bounded-ticks deadline of {:?}",
            i,
            started.elapsed(),
            deadline
        );
    }

    cluster.stop_all();
}
