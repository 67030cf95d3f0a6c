//! The FIFO hand-off between connection-handling threads and the single thread allowed to drive
//! the Raft [`Node`](raft::node::Node).
//!
//! `Node` is not `Sync`: every tick, append, and receive must happen on one thread. Client threads
//! that want to propose a write don't get to call into it directly. Instead they build a
//! [`RaftReq`], hand it to the [`RequestQueue`], and block on the [`BlockedClient`] half of a
//! rendezvous channel until the replication thread (see
//! [`replication`](super::replication)) commits or rejects it.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use raft::message::LogIndex;

use crate::cluster::codec::EntryType;
use crate::cluster::membership::RaftCfgChange;
use crate::protocol::response::RedisResponse;

/// The client-side half of a blocking request: a connection-handling thread parks on
/// [`wait`](Self::wait) after submitting a [`RaftReq`], and is woken once the replication thread
/// calls [`reply`](BlockedClient::reply).
pub struct BlockedClient {
    reply_tx: Sender<RedisResponse>,
}

impl BlockedClient {
    /// Creates a rendezvous pair: the `BlockedClient` half to hand to a [`RaftReq`], and the
    /// receiving half for the submitting thread to block on.
    pub fn pair() -> (Self, Receiver<RedisResponse>) {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        (Self { reply_tx }, reply_rx)
    }

    /// Delivers `response` to whichever thread is waiting on the other half of this pair. No-op if
    /// that thread gave up waiting (e.g. the client disconnected).
    pub fn reply(self, response: RedisResponse) {
        let _ = self.reply_tx.send(response);
    }
}

/// One unit of work submitted to the replication thread, awaiting a decision from the Raft log.
pub enum RaftReq {
    /// A client write command, carrying its argv already encoded (see
    /// [`codec::encode_argv`](crate::cluster::codec::encode_argv)) into the bytes that become the
    /// committed entry's payload verbatim.
    Command {
        payload: Vec<u8>,
        client: BlockedClient,
        /// Set once this request's entry has been appended locally and is waiting on commit,
        /// so a response arriving for an index already retired doesn't get replied to twice.
        pending_commit: bool,
    },
    /// A membership change: add a voting or non-voting node, or remove one.
    CfgChange {
        entry_type: EntryType,
        change: RaftCfgChange,
        client: BlockedClient,
        pending_commit: bool,
    },
    /// A status query. Answered directly out of the replication thread's in-memory view, never
    /// goes anywhere near the log.
    Info { client: BlockedClient },
}

impl RaftReq {
    pub fn mark_pending(&mut self) {
        match self {
            Self::Command { pending_commit, .. } => *pending_commit = true,
            Self::CfgChange { pending_commit, .. } => *pending_commit = true,
            Self::Info { .. } => {}
        }
    }

    pub fn is_pending(&self) -> bool {
        match self {
            Self::Command { pending_commit, .. } => *pending_commit,
            Self::CfgChange { pending_commit, .. } => *pending_commit,
            Self::Info { .. } => false,
        }
    }

    pub fn into_client(self) -> BlockedClient {
        match self {
            Self::Command { client, .. } => client,
            Self::CfgChange { client, .. } => client,
            Self::Info { client } => client,
        }
    }

    /// The bytes to append to the Raft log for this request: the already argv-encoded command for
    /// `Command`, or the bincode-encoded [`RaftCfgChange`] for a membership change.
    pub fn entry_payload(&self) -> Result<Vec<u8>, crate::cluster::error::CodecError> {
        match self {
            Self::Command { payload, .. } => Ok(payload.clone()),
            Self::CfgChange { change, .. } => change.encode(),
            Self::Info { .. } => unreachable!("Info requests are answered before reaching the log path"),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Command { .. } => EntryType::Normal,
            Self::CfgChange { entry_type, .. } => *entry_type,
            Self::Info { .. } => unreachable!("Info requests are answered before reaching the log path"),
        }
    }
}

/// The sending half handed to connection threads; the matching [`Receiver`] is drained by the
/// replication thread.
#[derive(Clone)]
pub struct RequestQueue {
    tx: Sender<RaftReq>,
}

impl RequestQueue {
    pub fn new() -> (Self, Receiver<RaftReq>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Enqueues `req` for the replication thread. Never blocks: the queue is unbounded, since
    /// backpressure is better applied at the Raft log itself (an overloaded leader simply falls
    /// behind on `commit_idx`) than by refusing to accept client connections.
    pub fn submit(&self, req: RaftReq) {
        let _ = self.tx.send(req);
    }
}

/// Tracks requests whose entry has been appended to the local log but not yet committed, keyed by
/// the log index the entry was appended at. Populated by the node that originally proposed the
/// entry; a follower applying an entry proposed elsewhere will find no pending request for it and
/// simply takes the side effect without replying to anyone.
#[derive(Default)]
pub struct PendingCommits {
    by_index: HashMap<u64, RaftReq>,
}

impl PendingCommits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: LogIndex, req: RaftReq) {
        self.by_index.insert(index.id, req);
    }

    pub fn take(&mut self, index: LogIndex) -> Option<RaftReq> {
        self.by_index.remove(&index.id)
    }

    /// Removes and returns every pending request at or after `from`, in increasing index order, so
    /// callers can reply `-NOLEADER` style errors to clients whose entries were just cancelled by a
    /// [`log_pop`](crate::cluster::callbacks) truncation.
    pub fn take_cancelled_from(&mut self, from: LogIndex) -> Vec<RaftReq> {
        let mut indices: Vec<u64> = self
            .by_index
            .keys()
            .copied()
            .filter(|id| *id >= from.id)
            .collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|id| self.by_index.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}
