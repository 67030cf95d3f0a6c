//! `RaftNode`: the coordinator that owns one node's Raft engine, durable log, peer links, and
//! request queue, and exposes the handful of entry points a [`Server`](crate::server::Server)
//! needs to route client traffic through it — submitting a data command, proposing a membership
//! change, or answering an `INFO` query — without ever touching the engine itself off the
//! replication thread.
//!
//! Everything that actually drives the Raft state machine lives in the private submodules below;
//! this module is wiring: constructing a fresh or reopened node from a [`RaftNodeConfig`], and
//! dispatching client requests to the queue the replication thread drains.

mod callbacks;
pub mod codec;
pub mod error;
mod handlers;
pub mod log;
pub mod membership;
pub mod node;
pub mod peer;
mod queue;
mod replication;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::OsRng;
use raft::log::Log;
use raft::message::{LogIndex, TermId};

use crate::command::command_error::RedisCommandError;
use crate::command::Command;
use crate::protocol::response::RedisResponse;
use crate::storage::Storage;

use codec::{decode_entry, EntryType};
pub use membership::NodeId;
use membership::RaftCfgChange;
use node::RaftEngine;
use queue::{BlockedClient, RaftReq, RequestQueue};
use replication::ReplicationContext;

/// Tick timeouts, expressed the way `raft::node::Config` wants them: a number of
/// [`replication::TICK_INTERVAL`]-spaced ticks rather than a wall-clock duration.
const ELECTION_TIMEOUT_TICKS: u32 = 10;
const HEARTBEAT_INTERVAL_TICKS: u32 = 2;
/// Matches `FileLog`'s framing overhead closely enough that a chunk rarely spans more than a
/// couple of entries; the `raft` crate only uses this to cap how much unacknowledged replication
/// data it queues per peer between ticks.
const REPLICATION_CHUNK_SIZE: usize = 64 * 1024;
/// How long [`RaftNode::start`] waits between retries while bootstrapping a fresh single-node
/// cluster (see [`RaftNode::bootstrap_self`]) before the node has won its first election.
const BOOTSTRAP_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// How a [`RaftNode`] should come up: starting a brand-new single-node cluster, joining an
/// existing one, or reopening a log left behind by a previous run of the same node.
pub enum StartupMode {
    /// Starts a fresh log, becomes the sole voting member, and is expected to win the first
    /// election uncontested.
    Init,
    /// Starts a fresh log and dials `contact` (the id and address of any existing cluster member)
    /// so it can receive the `AddNonVotingNode` entry an operator issues for it from that side,
    /// and everything replicated after. Not part of spec.md's literal `{node_id, address, init,
    /// join}` startup shape: that shape alone gives a joining node no way to discover the address
    /// of anything to dial, so without an operator-supplied contact point the peer link that
    /// would carry the leader's first `AppendEntries` never gets opened. The rest of the cluster
    /// is still discovered organically afterward, via replicated `AddNode`/`AddNonVotingNode`
    /// history, same as every other peer.
    Join { contact: (NodeId, SocketAddrV4) },
    /// Reopens the log and header left behind at `RaftNodeConfig::data_dir`, replaying already
    /// committed membership and data entries before rejoining replication.
    Rejoin,
}

/// Everything needed to construct or reopen a [`RaftNode`].
pub struct RaftNodeConfig {
    pub node_id: NodeId,
    pub address: SocketAddrV4,
    pub mode: StartupMode,
    /// Directory holding this node's log (`redisraft-log-<id>.db`) and header
    /// (`redisraft-log-<id>.header`) files.
    pub data_dir: PathBuf,
}

impl RaftNodeConfig {
    pub fn init(node_id: NodeId, address: SocketAddrV4, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            node_id,
            address,
            mode: StartupMode::Init,
            data_dir: data_dir.into(),
        }
    }

    pub fn join(
        node_id: NodeId,
        address: SocketAddrV4,
        contact: (NodeId, SocketAddrV4),
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            node_id,
            address,
            mode: StartupMode::Join { contact },
            data_dir: data_dir.into(),
        }
    }

    pub fn rejoin(node_id: NodeId, address: SocketAddrV4, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            node_id,
            address,
            mode: StartupMode::Rejoin,
            data_dir: data_dir.into(),
        }
    }

    fn log_path(&self) -> PathBuf {
        self.data_dir.join(format!("redisraft-log-{}.db", self.node_id))
    }

    fn header_path(&self) -> PathBuf {
        self.data_dir.join(format!("redisraft-log-{}.header", self.node_id))
    }
}

/// A running Raft-replicated node: a handle `Server` holds to submit client work to, backed by a
/// dedicated replication thread and peer listener thread.
pub struct RaftNode {
    node_id: NodeId,
    address: SocketAddrV4,
    queue: RequestQueue,
    running: Arc<AtomicBool>,
    replication_handle: Mutex<Option<JoinHandle<()>>>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RaftNode {
    /// Builds the engine, log, and peer links described by `config`, spawns the replication and
    /// peer-listener threads, and — for [`StartupMode::Init`] — blocks until this node has won its
    /// first election and committed its own membership entry.
    pub fn start<T: Storage + Send + 'static>(
        config: RaftNodeConfig,
        storage: Arc<Mutex<T>>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let log_path = config.log_path();
        let header_path = config.header_path();

        let file_log = log::FileLog::open(&log_path)?;
        let header = log::LogHeader::load(&header_path)?;
        let is_init = matches!(config.mode, StartupMode::Init);

        let mut addr_book = HashMap::new();
        addr_book.insert(config.node_id, config.address);

        let raft_config = raft::node::Config {
            election_timeout_ticks: ELECTION_TIMEOUT_TICKS,
            heartbeat_interval_ticks: HEARTBEAT_INTERVAL_TICKS,
            replication_chunk_size: REPLICATION_CHUNK_SIZE,
        };

        let mut engine: RaftEngine =
            raft::node::Node::new(config.node_id, BTreeSet::new(), file_log, OsRng, raft_config);

        let restored_commit_idx = if let StartupMode::Rejoin = config.mode {
            engine.restore_vote(TermId { id: header.current_term }, header.voted_for);
            let commit_idx = LogIndex { id: header.commit_idx };
            replay_membership(&mut engine, &storage, &mut addr_book, commit_idx);
            commit_idx
        } else {
            LogIndex::default()
        };

        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let mut peers: HashMap<NodeId, peer::PeerLink> = HashMap::new();

        match config.mode {
            StartupMode::Join { contact: (contact_id, contact_addr) } => {
                addr_book.insert(contact_id, contact_addr);
                peers.insert(
                    contact_id,
                    peer::PeerLink::connect(contact_id, contact_addr, config.node_id, inbound_tx.clone()),
                );
            }
            // `replay_membership` just restored every previously-committed member into
            // `addr_book`, but a fresh process has no live `PeerLink`s for any of them — without
            // this, `peer::dispatch` silently drops every outbound message to a peer this node
            // can't look up, and a restarted node can never vote or replicate again.
            StartupMode::Rejoin => {
                for (&id, &addr) in addr_book.iter() {
                    if id != config.node_id {
                        peers.insert(id, peer::PeerLink::connect(id, addr, config.node_id, inbound_tx.clone()));
                    }
                }
            }
            StartupMode::Init => {}
        }

        let running = Arc::new(AtomicBool::new(true));
        let listener_handle =
            peer::spawn_listener(config.node_id, config.address, inbound_tx.clone(), running.clone())?;

        let (queue, requests) = RequestQueue::new();

        let ctx = ReplicationContext {
            engine,
            storage,
            requests,
            inbound_rx,
            inbound_tx,
            peers,
            addr_book,
            header_path,
            running: running.clone(),
            restored_commit_idx,
        };

        let replication_handle = thread::Builder::new()
            .name(format!("raft-replication-{}", config.node_id))
            .spawn(move || replication::run(ctx))
            .expect("failed to spawn replication thread");

        let node = RaftNode {
            node_id: config.node_id,
            address: config.address,
            queue,
            running,
            replication_handle: Mutex::new(Some(replication_handle)),
            listener_handle: Mutex::new(Some(listener_handle)),
        };

        if is_init {
            node.bootstrap_self();
        }

        Ok(node)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn address(&self) -> SocketAddrV4 {
        self.address
    }

    /// Parses `request` as a RESP command and routes it: `RAFT.ADDNODE`/`RAFT.REMOVENODE` become
    /// membership proposals, `RAFT.INFO` is answered from the replication thread's in-memory view,
    /// `QUIT` is handled locally (it's a connection directive, not cluster state), and everything
    /// else has its argv (§4.1) extracted and submitted as a `Normal` log entry. Every reply is only
    /// observed once the corresponding entry (if any) is committed, per the same ordering guarantee
    /// a standalone `Server` gives within a single process.
    pub fn dispatch(&self, request: &[u8]) -> RedisResponse {
        match crate::server::util::get_command(request) {
            Ok(Command::RaftAddNode(id, addr)) => {
                self.submit_cfg_change(EntryType::AddNonVotingNode, RaftCfgChange::new(id, addr))
            }
            Ok(Command::RaftRemoveNode(id)) => {
                let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
                self.submit_cfg_change(EntryType::RemoveNode, RaftCfgChange::new(id, addr))
            }
            Ok(Command::RaftInfo) => self.info(),
            Ok(Command::Quit) => RedisResponse::quit(),
            Ok(_) => match codec::request_to_argv(request) {
                Ok(argv) => self.submit_command(codec::encode_argv(&argv)),
                Err(_) => RedisResponse::error(RedisCommandError::CommandNotFound),
            },
            Err(err) => RedisResponse::error(err),
        }
    }

    pub fn submit_command(&self, payload: Vec<u8>) -> RedisResponse {
        let (client, rx) = BlockedClient::pair();
        self.queue.submit(RaftReq::Command {
            payload,
            client,
            pending_commit: false,
        });
        rx.recv()
            .unwrap_or_else(|_| RedisResponse::error(RedisCommandError::RaftCancelled))
    }

    pub fn submit_cfg_change(&self, entry_type: EntryType, change: RaftCfgChange) -> RedisResponse {
        let (client, rx) = BlockedClient::pair();
        self.queue.submit(RaftReq::CfgChange {
            entry_type,
            change,
            client,
            pending_commit: false,
        });
        rx.recv()
            .unwrap_or_else(|_| RedisResponse::error(RedisCommandError::RaftCancelled))
    }

    pub fn info(&self) -> RedisResponse {
        let (client, rx) = BlockedClient::pair();
        self.queue.submit(RaftReq::Info { client });
        rx.recv()
            .unwrap_or_else(|_| RedisResponse::error(RedisCommandError::RaftCancelled))
    }

    /// Retries a self-`AddNode` proposal until it commits, i.e. until this node has won its first
    /// election. Only meaningful for [`StartupMode::Init`], where nothing else will ever propose
    /// this node's own membership entry.
    fn bootstrap_self(&self) {
        let change = RaftCfgChange::new(self.node_id, self.address);
        loop {
            let response = self.submit_cfg_change(EntryType::AddNode, change);
            if !response.is_error() {
                return;
            }
            thread::sleep(BOOTSTRAP_RETRY_INTERVAL);
        }
    }

    /// Stops the replication and peer-listener threads, blocking until both have exited.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.replication_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.listener_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Reapplies already-committed entries up to `up_to` to `storage` and `engine`'s own peer set on
/// startup, since `FileLog` persists entries but not `Node`'s in-memory `peers`/`commit_idx`, and
/// `InMemoryStorage` persists nothing at all across a restart. Bypasses `Node::take_committed`
/// (and its own `last_taken` counter) entirely, reading directly off the log via
/// [`Log::get`](raft::log::Log::get) so the live replication loop's later redelivery of this same
/// range (which does go through `take_committed`) is recognized and skipped via
/// `restored_commit_idx`, rather than applied twice.
fn replay_membership<T: Storage>(
    engine: &mut RaftEngine,
    storage: &Arc<Mutex<T>>,
    addr_book: &mut HashMap<NodeId, SocketAddrV4>,
    up_to: LogIndex,
) {
    let mut idx = LogIndex { id: 1 };
    while idx.id <= up_to.id {
        let entry = match engine.log_mut().get(idx) {
            Some(entry) => entry,
            None => break,
        };

        if let Ok((entry_type, payload)) = decode_entry(&entry.data) {
            match entry_type {
                EntryType::Normal => {
                    if let Ok(command) =
                        codec::decode_argv(payload).and_then(|argv| {
                            crate::command::command_from_argv(argv)
                                .map_err(|_| error::CodecError::NotArgv)
                        })
                    {
                        let _ = crate::server::util::run_command(storage, command);
                    }
                }
                EntryType::AddNode | EntryType::AddNonVotingNode => {
                    if let Ok(change) = RaftCfgChange::decode(payload) {
                        addr_book.insert(change.id, change.addr);
                        if entry_type == EntryType::AddNode {
                            engine.add_peer(change.id);
                        }
                    }
                }
                EntryType::RemoveNode => {
                    if let Ok(id) = membership::node_id_of(payload) {
                        engine.remove_peer(&id);
                        addr_book.remove(&id);
                    }
                }
            }
        }

        idx = idx + 1;
    }
}
