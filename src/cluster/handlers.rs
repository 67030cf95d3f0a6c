//! Dispatch for the two things the replication thread reacts to: a freshly submitted client
//! request (append it to the log, or redirect/refuse if this node isn't leader), and a freshly
//! committed log entry (apply it, and reply to whoever's still waiting on it).

use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex};

use log::error;
use raft::log::Log;
use raft::message::LogIndex;
use raft::node::AppendError;

use crate::command::command_error::RedisCommandError;
use crate::cluster::codec::{decode_argv, decode_entry, encode_entry, EntryType};
use crate::cluster::membership::{node_id_of, NodeId, RaftCfgChange};
use crate::cluster::node::RaftEngine;
use crate::cluster::peer::{self, PeerLink};
use crate::cluster::queue::{PendingCommits, RaftReq};
use crate::protocol::response::RedisResponse;
use crate::storage::Storage;

/// Appends `req` to the log if this node is leader, otherwise replies immediately with a redirect
/// to the known leader (or a bare refusal if no leader is known yet).
///
/// Returns `true` if the entry was appended and `req`'s client is now parked in `pending` awaiting
/// commit, `false` if a reply was already sent.
pub fn handle_client_request(
    engine: &mut RaftEngine,
    mut req: RaftReq,
    pending: &mut PendingCommits,
    addr_book: &HashMap<NodeId, SocketAddrV4>,
    peers: &HashMap<NodeId, PeerLink>,
) -> bool {
    if !engine.is_leader() {
        let (leader, _term) = engine.leader();
        let leader_addr = leader.and_then(|id| addr_book.get(id)).copied();
        req.into_client()
            .reply(RedisResponse::error(RedisCommandError::NotLeader(leader_addr)));
        return false;
    }

    let payload = match req.entry_payload() {
        Ok(payload) => payload,
        Err(err) => {
            error!("failed to encode entry payload: {}", err);
            req.into_client()
                .reply(RedisResponse::error(RedisCommandError::InvalidCommand));
            return false;
        }
    };

    let encoded = encode_entry(req.entry_type(), &payload);

    match engine.append(encoded) {
        Ok(messages) => {
            peer::dispatch(peers, messages);
            let index = engine.log_mut().last_index();
            req.mark_pending();
            pending.insert(index, req);
            true
        }
        Err(AppendError::Cancelled { .. }) => {
            req.into_client()
                .reply(RedisResponse::error(RedisCommandError::RaftCancelled));
            false
        }
        Err(AppendError::LogErr(err)) => {
            error!("fatal raft log append error: {}", err);
            req.into_client()
                .reply(RedisResponse::error(RedisCommandError::RaftCancelled));
            false
        }
    }
}

/// Applies every newly committed entry to `storage`, replying to whichever client (if any) is
/// still waiting on it in `pending`. Membership entries additionally mutate `engine`'s own peer set
/// and `addr_book`; the caller is responsible for reconciling the `peers` link table against the
/// returned [`MembershipEvent`]s.
pub fn apply_committed<T: Storage>(
    engine: &mut RaftEngine,
    storage: &Arc<Mutex<T>>,
    pending: &mut PendingCommits,
    last_applied: &mut LogIndex,
    addr_book: &mut HashMap<NodeId, SocketAddrV4>,
    skip_until: LogIndex,
) -> Vec<MembershipEvent> {
    let entries: Vec<_> = engine.take_committed().collect();
    let mut events = Vec::new();

    for entry in entries {
        *last_applied = *last_applied + 1;
        let index = *last_applied;

        // After a restart, `Node`'s own `commit_idx` starts at zero and is only relearned once a
        // leader sends a fresh `AppendRequest`; everything up to the index we'd already applied
        // and persisted before the crash is re-delivered here and must be skipped rather than
        // re-applied, since commands like INCR aren't idempotent.
        if index.id <= skip_until.id {
            continue;
        }

        let decoded = match decode_entry(&entry.data) {
            Ok(decoded) => decoded,
            Err(err) => {
                error!("failed to decode committed entry at {}: {}", index, err);
                continue;
            }
        };

        match decoded {
            (EntryType::Normal, payload) => {
                let response = match decode_argv(payload)
                    .map_err(|_| RedisCommandError::CommandNotFound)
                    .and_then(crate::command::command_from_argv)
                {
                    Ok(command) => crate::server::util::run_command(storage, command),
                    Err(err) => RedisResponse::error(err),
                };
                if let Some(req) = pending.take(index) {
                    req.into_client().reply(response);
                }
            }
            (entry_type @ (EntryType::AddNode | EntryType::AddNonVotingNode), payload) => {
                match RaftCfgChange::decode(payload) {
                    Ok(change) => {
                        addr_book.insert(change.id, change.addr);
                        let voting = entry_type == EntryType::AddNode;
                        if voting {
                            engine.add_peer(change.id);
                        }
                        events.push(MembershipEvent::Added { change, voting });
                        if let Some(req) = pending.take(index) {
                            req.into_client().reply(RedisResponse::okay());
                        }
                    }
                    Err(err) => error!("failed to decode membership entry at {}: {}", index, err),
                }
            }
            (EntryType::RemoveNode, payload) => match node_id_of(payload) {
                Ok(id) => {
                    engine.remove_peer(&id);
                    addr_book.remove(&id);
                    events.push(MembershipEvent::Removed { id });
                    if let Some(req) = pending.take(index) {
                        req.into_client().reply(RedisResponse::okay());
                    }
                }
                Err(err) => error!("failed to decode membership entry at {}: {}", index, err),
            },
        }
    }

    events
}

/// Builds the bulk-string reply for `RAFT.INFO`: a `# Nodes` section with this node's role, leader,
/// term, and one `node<i>:id=…` line per known cluster member (voting and non-voting), followed by
/// a `# Log` section of entry/index counters.
pub fn format_info(
    engine: &RaftEngine,
    addr_book: &HashMap<NodeId, SocketAddrV4>,
    non_voting: &HashMap<NodeId, LogIndex>,
    last_applied: LogIndex,
) -> String {
    let self_id = *engine.node_id();
    let (leader_id, term) = engine.leader();
    let role = if engine.is_leader() {
        "leader"
    } else if leader_id.is_some() {
        "follower"
    } else {
        "candidate"
    };

    let voting = engine.peers();
    let num_voting_nodes = voting.len();
    let num_nodes = num_voting_nodes + non_voting.len();

    let mut out = String::new();
    let _ = writeln!(out, "# Nodes");
    let _ = writeln!(out, "node_id:{}", self_id);
    let _ = writeln!(out, "role:{}", role);
    let _ = writeln!(
        out,
        "leader_id:{}",
        leader_id.map(u64::to_string).unwrap_or_default()
    );
    let _ = writeln!(out, "current_term:{}", term.id);
    let _ = writeln!(out, "num_voting_nodes:{}", num_voting_nodes);
    let _ = writeln!(out, "num_nodes:{}", num_nodes);

    let mut index = 0usize;
    for id in voting {
        let addr = addr_book.get(id).copied();
        let _ = writeln!(
            out,
            "node{}:id={},state=voting,addr={},port={}",
            index,
            id,
            addr.map(|a| a.ip().to_string()).unwrap_or_default(),
            addr.map(|a| a.port().to_string()).unwrap_or_default(),
        );
        index += 1;
    }
    for id in non_voting.keys() {
        let addr = addr_book.get(id).copied();
        let _ = writeln!(
            out,
            "node{}:id={},state=non-voting,addr={},port={}",
            index,
            id,
            addr.map(|a| a.ip().to_string()).unwrap_or_default(),
            addr.map(|a| a.port().to_string()).unwrap_or_default(),
        );
        index += 1;
    }

    let log = engine.log();
    let log_entries = log.last_index().id.saturating_sub(log.prev_index().id);
    let _ = writeln!(out, "# Log");
    let _ = writeln!(out, "log_entries:{}", log_entries);
    let _ = writeln!(out, "current_index:{}", log.last_index().id);
    let _ = writeln!(out, "commit_index:{}", engine.last_committed_log_index().id);
    let _ = writeln!(out, "last_applied_index:{}", last_applied.id);

    out
}

/// A membership change just applied to the committed log, for the replication loop to reconcile
/// its table of live [`PeerLink`]s against.
pub enum MembershipEvent {
    Added { change: RaftCfgChange, voting: bool },
    Removed { id: NodeId },
}

/// Reconciles the live [`PeerLink`] table against membership changes just applied to the committed
/// log. Returns `true` if `self_node_id` itself was removed from the cluster, which the caller
/// should treat as a signal to stop the replication thread: a node that isn't a member anymore has
/// nothing left to replicate.
pub fn reconcile_peer_links(
    self_node_id: NodeId,
    peers: &mut HashMap<NodeId, PeerLink>,
    non_voting: &mut HashMap<NodeId, LogIndex>,
    inbound: &crossbeam_channel::Sender<(NodeId, raft::message::Message)>,
    events: Vec<MembershipEvent>,
) -> bool {
    let mut self_removed = false;
    for event in events {
        match event {
            MembershipEvent::Added { change, voting } => {
                if change.id != self_node_id {
                    peers.entry(change.id).or_insert_with(|| {
                        PeerLink::connect(change.id, change.addr, self_node_id, inbound.clone())
                    });
                }
                if voting {
                    non_voting.remove(&change.id);
                } else if change.id != self_node_id {
                    non_voting.entry(change.id).or_insert_with(LogIndex::default);
                }
            }
            MembershipEvent::Removed { id } => {
                non_voting.remove(&id);
                if let Some(link) = peers.remove(&id) {
                    link.shutdown();
                }
                if id == self_node_id {
                    self_removed = true;
                }
            }
        }
    }
    self_removed
}
