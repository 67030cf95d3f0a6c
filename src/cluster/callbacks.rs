//! The handful of places the replication thread must reach past `raft::node::Node`'s own API to
//! keep this node's durable state consistent: persisting `current_term` / `voted_for` /
//! `commit_idx` whenever any of them advance, and resolving a [`NodeId`] for an entry used in a
//! membership change.
//!
//! `raft::node::Node` is a pure state machine with no callback surface of its own — every mutating
//! call (`append`, `receive`, `timer_tick`) simply returns messages to send. These functions are
//! what a C `willemt/raft`-style callback table would have invoked inline; here they're just
//! called by hand around each `Node` call from [`replication::run`](super::replication::run).

use std::path::Path;

use log::debug;

use crate::cluster::log::LogHeader;
use crate::cluster::node::RaftEngine;

/// Flushes the header file if `current_term`, `voted_for`, or `commit_idx` changed since `last`,
/// updating `last` in place. Returns whether a flush happened.
///
/// Checking after every call to `append`/`receive`/`timer_tick` rather than threading a callback
/// through each of `Node`'s internal transitions is a deliberate simplification: it costs one extra
/// header flush on ticks that both start an election and commit an entry, in exchange for never
/// having to mirror `Node`'s internal control flow here.
pub fn persist_state(
    node: &RaftEngine,
    header_path: &Path,
    last: &mut LogHeader,
) -> std::io::Result<bool> {
    let current = LogHeader {
        current_term: node.current_term().id,
        voted_for: node.voted_for().copied(),
        commit_idx: node.last_committed_log_index().id,
    };

    if current == *last {
        return Ok(false);
    }

    current.flush(header_path)?;
    debug!(
        "persisted raft header: term={} voted_for={:?} commit_idx={}",
        current.current_term, current.voted_for, current.commit_idx
    );
    *last = current;
    Ok(true)
}
