//! The concrete instantiation of `raft`'s generic [`Node`](raft::node::Node) used throughout the
//! cluster module: a file-backed log, the OS random source for election timeouts, and [`NodeId`] as
//! the peer identifier.

use rand::rngs::OsRng;
use raft::node::Node;

use crate::cluster::log::FileLog;

pub use crate::cluster::membership::NodeId;

/// The Raft state machine this coordinator drives. Never exposed outside `cluster`: all access
/// goes through [`RaftNode`](super::RaftNode) and the replication thread that owns it.
pub type RaftEngine = Node<FileLog, OsRng, NodeId>;
