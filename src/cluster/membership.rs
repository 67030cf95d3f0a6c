//! Types describing a change to cluster membership: who is being added or removed, and at what
//! address. A [`RaftCfgChange`] is what actually rides inside an `AddNode` / `AddNonVotingNode` /
//! `RemoveNode` log entry, bincode-encoded the same way the rest of the coordinator's small
//! internal structs are.

use std::net::SocketAddrV4;

use serde::{Deserialize, Serialize};

use super::error::CodecError;

pub type NodeId = u64;

/// Describes one member of the cluster as it exists in an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftCfgChange {
    pub id: NodeId,
    pub addr: SocketAddrV4,
}

impl RaftCfgChange {
    pub fn new(id: NodeId, addr: SocketAddrV4) -> Self {
        Self { id, addr }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Prost(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Prost(e.to_string()))
    }
}

/// Decodes just the node id out of a membership entry's payload, for call sites that only need to
/// know who the entry is about (e.g. a removal, which has no address left to track afterward).
pub fn node_id_of(payload: &[u8]) -> Result<NodeId, CodecError> {
    RaftCfgChange::decode(payload).map(|change| change.id)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn cfg_change_round_trips() {
        let change = RaftCfgChange::new(3, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 7001));
        let encoded = change.encode().unwrap();
        let decoded = RaftCfgChange::decode(&encoded).unwrap();
        assert_eq!(change, decoded);
    }

    #[test]
    fn node_id_of_extracts_id_without_full_decode() {
        let change = RaftCfgChange::new(9, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 7002));
        let encoded = change.encode().unwrap();
        assert_eq!(node_id_of(&encoded).unwrap(), 9);
    }
}
