//! The single thread allowed to drive the Raft [`Node`](raft::node::Node): ticks its timer, drains
//! the client [`RequestQueue`](super::queue::RequestQueue) and the peer inbound channel, applies
//! newly committed entries, and persists the header whenever it changes.
//!
//! Non-voting members are a deliberate exception to "the Raft node is the only source of truth
//! about peers": `raft::node::Node::peers` drives both replication targets and quorum counting, so
//! a node added there counts toward elections immediately. A node still catching up shouldn't. This
//! loop instead tracks non-voting peers' `match_idx` itself and drives `AppendRequest`s to them
//! directly via their `PeerLink`, built from the log's own public accessors rather than the
//! library's (private, voting-peer-only) replication machinery. Once caught up to the commit index,
//! it proposes promoting them with a regular `AddNode` entry, which *does* go through `Node::add_peer`.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{error, info};
use raft::log::Log;
use raft::message::{AppendRequest, LogIndex, Message, Rpc};

use crate::cluster::callbacks;
use crate::cluster::codec::{encode_entry, EntryType};
use crate::cluster::handlers::{apply_committed, format_info, handle_client_request, reconcile_peer_links};
use crate::cluster::log::LogHeader;
use crate::cluster::membership::{NodeId, RaftCfgChange};
use crate::cluster::node::RaftEngine;
use crate::cluster::peer::{self, PeerLink};
use crate::cluster::queue::{PendingCommits, RaftReq};
use crate::storage::Storage;

/// How often `timer_tick` is driven. `raft::node::Config`'s tick-based timeouts are expressed
/// relative to this; 500ms matches the upstream library's documented tick resolution.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Everything the replication thread owns for the lifetime of a [`RaftNode`](super::RaftNode).
pub struct ReplicationContext<T: Storage> {
    pub engine: RaftEngine,
    pub storage: Arc<Mutex<T>>,
    pub requests: Receiver<RaftReq>,
    pub inbound_rx: Receiver<(NodeId, Message)>,
    pub inbound_tx: Sender<(NodeId, Message)>,
    pub peers: HashMap<NodeId, PeerLink>,
    pub addr_book: HashMap<NodeId, SocketAddrV4>,
    pub header_path: PathBuf,
    pub running: Arc<AtomicBool>,
    /// The commit index recorded in the header at startup; entries at or below it were already
    /// applied in a previous run and must not be re-applied once `commit_idx` is relearned.
    pub restored_commit_idx: LogIndex,
}

/// Runs the replication loop until `ctx.running` is cleared. Intended to be the body of its own
/// dedicated thread; see [`RaftNode::start`](super::RaftNode::start).
pub fn run<T: Storage>(mut ctx: ReplicationContext<T>) {
    let mut pending = PendingCommits::new();
    let mut non_voting_match_idx: HashMap<NodeId, LogIndex> = HashMap::new();
    let mut last_header = LogHeader::default();
    let mut last_applied = LogIndex::default();

    info!("replication thread started for node {}", ctx.engine.node_id());

    while ctx.running.load(Ordering::SeqCst) {
        crossbeam_channel::select! {
            recv(ctx.requests) -> req => {
                if let Ok(req) = req {
                    match req {
                        RaftReq::Info { client } => {
                            let info = format_info(&ctx.engine, &ctx.addr_book, &non_voting_match_idx, last_applied);
                            client.reply(crate::protocol::response::RedisResponse::single(
                                crate::protocol::response::RedisResponseType::BulkString(info.into_bytes()),
                            ));
                        }
                        other => {
                            handle_client_request(
                                &mut ctx.engine,
                                other,
                                &mut pending,
                                &ctx.addr_book,
                                &ctx.peers,
                            );
                        }
                    }
                }
            }
            recv(ctx.inbound_rx) -> msg => {
                if let Ok((from, message)) = msg {
                    on_inbound_message(&mut ctx, from, message, &mut non_voting_match_idx);
                }
            }
            default(TICK_INTERVAL) => {
                let messages = ctx.engine.timer_tick();
                peer::dispatch(&ctx.peers, messages);
                catch_up_non_voting(&mut ctx.engine, &ctx.peers, &mut non_voting_match_idx);
                propose_caught_up_promotions(&mut ctx, &mut non_voting_match_idx);
            }
        }

        let events = apply_committed(
            &mut ctx.engine,
            &ctx.storage,
            &mut pending,
            &mut last_applied,
            &mut ctx.addr_book,
            ctx.restored_commit_idx,
        );
        let self_id = *ctx.engine.node_id();
        let self_removed = reconcile_peer_links(
            self_id,
            &mut ctx.peers,
            &mut non_voting_match_idx,
            &ctx.inbound_tx,
            events,
        );
        if self_removed {
            info!("node {} removed from cluster, stopping replication thread", self_id);
            ctx.running.store(false, Ordering::SeqCst);
            break;
        }
        reap_cancelled(&mut ctx.engine, &mut pending);

        if let Err(err) = callbacks::persist_state(&ctx.engine, &ctx.header_path, &mut last_header) {
            error!("fatal: failed to persist raft header, stopping replication thread: {}", err);
            ctx.running.store(false, Ordering::SeqCst);
            break;
        }
    }

    info!("replication thread stopped for node {}", ctx.engine.node_id());
}

fn on_inbound_message<T: Storage>(
    ctx: &mut ReplicationContext<T>,
    from: NodeId,
    message: Message,
    non_voting_match_idx: &mut HashMap<NodeId, LogIndex>,
) {
    if let Some(match_idx) = non_voting_match_idx.get_mut(&from) {
        // `Node::receive` rejects messages from ids outside its own `peers` set, which a
        // non-voting catch-up target always is; handle its AppendResponse by hand instead.
        if let Some(Rpc::AppendResponse(resp)) = &message.rpc {
            if resp.success {
                *match_idx = resp.match_idx;
            }
        }
        return;
    }

    if ctx.peers.contains_key(&from) {
        let messages = ctx.engine.receive(message, from);
        peer::dispatch(&ctx.peers, messages);
    }
}

/// Sends each non-voting peer an `AppendRequest` carrying whatever entries it's missing, built
/// directly from the log's public accessors since it's not a member `Node` will replicate to on
/// its own.
fn catch_up_non_voting(
    engine: &mut RaftEngine,
    peers: &HashMap<NodeId, PeerLink>,
    non_voting_match_idx: &mut HashMap<NodeId, LogIndex>,
) {
    if !engine.is_leader() || non_voting_match_idx.is_empty() {
        return;
    }

    let term = *engine.current_term();
    let leader_commit = engine.last_committed_log_index();
    let last_index = engine.log().last_index();
    let ids: Vec<NodeId> = non_voting_match_idx.keys().copied().collect();

    for id in ids {
        let link = match peers.get(&id) {
            Some(link) => link,
            None => continue,
        };

        let match_idx = non_voting_match_idx.get(&id).copied().unwrap_or_default();
        let next_idx = match_idx + 1;
        let prev_idx = LogIndex {
            id: next_idx.id.saturating_sub(1),
        };

        let log = engine.log_mut();
        let prev_term = log.get_term(prev_idx).unwrap_or_else(|| log.prev_term());

        let mut entries = Vec::new();
        let mut idx = next_idx;
        while idx <= last_index {
            if let Some(entry) = log.get(idx) {
                entries.push(entry);
            }
            idx = idx + 1;
        }

        let message = Message {
            term,
            rpc: Some(Rpc::AppendRequest(AppendRequest {
                prev_log_idx: prev_idx,
                prev_log_term: prev_term,
                leader_commit,
                entries,
            })),
        };
        link.send(message);
    }
}

/// Once a non-voting peer's `match_idx` has caught up to the commit index, proposes promoting it
/// to a full voting member via a regular `AddNode` entry, the same path a client-submitted
/// membership change takes.
fn propose_caught_up_promotions<T: Storage>(
    ctx: &mut ReplicationContext<T>,
    non_voting_match_idx: &mut HashMap<NodeId, LogIndex>,
) {
    if !ctx.engine.is_leader() {
        return;
    }

    let commit_idx = ctx.engine.last_committed_log_index();
    let ready: Vec<NodeId> = non_voting_match_idx
        .iter()
        .filter(|(_, match_idx)| match_idx.id >= commit_idx.id)
        .map(|(id, _)| *id)
        .collect();

    for id in ready {
        let addr = match ctx.addr_book.get(&id) {
            Some(addr) => *addr,
            None => continue,
        };
        let change = RaftCfgChange::new(id, addr);
        let payload = match change.encode() {
            Ok(payload) => payload,
            Err(err) => {
                error!("failed to encode promotion entry for node {}: {}", id, err);
                continue;
            }
        };

        let encoded = encode_entry(EntryType::AddNode, &payload);

        match ctx.engine.append(encoded) {
            Ok(messages) => {
                peer::dispatch(&ctx.peers, messages);
                info!("proposing promotion of caught-up node {} to voting member", id);
            }
            Err(err) => {
                info!("deferring promotion of node {}: {}", id, describe_append_err(err));
            }
        }
        // Stop tracking it manually regardless of outcome: if the append was cancelled, the node
        // stays non-voting and will be picked up again once it next reports a qualifying match_idx.
        non_voting_match_idx.remove(&id);
    }
}

fn describe_append_err<E: std::fmt::Display>(err: raft::node::AppendError<E>) -> String {
    match err {
        raft::node::AppendError::Cancelled { .. } => "cancelled before commit".to_string(),
        raft::node::AppendError::LogErr(e) => e.to_string(),
    }
}

/// Replies with [`RaftCancelled`](crate::command::command_error::RedisCommandError::RaftCancelled)
/// to every pending request whose entry no longer exists in the log, because a conflicting
/// `AppendRequest` truncated it out before it could commit.
fn reap_cancelled(engine: &mut RaftEngine, pending: &mut PendingCommits) {
    if pending.is_empty() {
        return;
    }
    let tail = engine.log_mut().last_index();
    let cancelled = pending.take_cancelled_from(LogIndex { id: tail.id + 1 });
    for req in cancelled {
        req.into_client().reply(crate::protocol::response::RedisResponse::error(
            crate::command::command_error::RedisCommandError::RaftCancelled,
        ));
    }
}
