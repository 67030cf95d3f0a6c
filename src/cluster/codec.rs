//! Framing for the two byte streams the cluster deals in: what goes *inside* a Raft
//! [`LogEntry`](raft::message::LogEntry)'s opaque `data`, and what goes *over the wire* between
//! peers.
//!
//! The `raft` crate's [`LogEntry`] only carries a `term` and a `data: Bytes` blob, with no room for
//! the kind of entry a coordinator needs to apply it or reassemble a client reply. Rather than fork
//! the library's wire struct, every entry we append carries a one-byte [`EntryType`] tag prepended
//! to `data`.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message as ProstMessage;
use raft::message::Message;

use crate::protocol::{parser::RedisProtocolParser, Resp};

use super::error::CodecError;

/// Tag byte identifying what an entry's payload means to [`crate::cluster::replication::apply_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// A client write command, to be applied to the key/value store and replied to.
    Normal = 0,
    /// Adds a voting member, carrying a bincode-encoded [`RaftCfgChange`](super::membership::RaftCfgChange).
    AddNode = 1,
    /// Adds a non-voting member, carrying a bincode-encoded `RaftCfgChange`.
    AddNonVotingNode = 2,
    /// Removes a member, carrying a bincode-encoded `RaftCfgChange`.
    RemoveNode = 3,
}

impl EntryType {
    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Self::Normal),
            1 => Ok(Self::AddNode),
            2 => Ok(Self::AddNonVotingNode),
            3 => Ok(Self::RemoveNode),
            other => Err(CodecError::BadEntryType(other)),
        }
    }
}

/// Prepends the `{entry_type}` tag to `payload`, producing the bytes to hand to
/// [`Node::append`](raft::node::Node::append).
pub fn encode_entry(entry_type: EntryType, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(entry_type as u8);
    buf.put_slice(payload);
    buf.freeze()
}

/// Splits a committed entry's `data` back into its envelope tag and payload.
pub fn decode_entry(data: &[u8]) -> Result<(EntryType, &[u8]), CodecError> {
    if data.is_empty() {
        return Err(CodecError::Truncated);
    }
    let entry_type = EntryType::from_tag(data[0])?;
    Ok((entry_type, &data[1..]))
}

/// Encodes a command's argv as `u64 argc` followed by `argc` repetitions of `u64 len; bytes[len]`,
/// all little-endian. This is the payload carried by every `Normal` entry: [`RaftReq::Command`]
/// encodes into it at proposal time (see `RaftNode::dispatch`) and `apply_committed`/
/// `replay_membership` decode back out of it before executing, per the argv wire format.
pub fn encode_argv(argv: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = argv.iter().map(|arg| 8 + arg.len()).sum();
    let mut buf = Vec::with_capacity(8 + payload_len);
    buf.extend_from_slice(&(argv.len() as u64).to_le_bytes());
    for arg in argv {
        buf.extend_from_slice(&(arg.len() as u64).to_le_bytes());
        buf.extend_from_slice(arg);
    }
    buf
}

/// Decodes the argv encoding produced by [`encode_argv`], rejecting any buffer truncated relative
/// to its declared lengths.
pub fn decode_argv(data: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
    let mut cursor = data;
    let argc = read_u64_le(&mut cursor)? as usize;
    let mut argv = Vec::with_capacity(argc.min(4096));
    for _ in 0..argc {
        let len = read_u64_le(&mut cursor)? as usize;
        if cursor.len() < len {
            return Err(CodecError::Truncated);
        }
        let (arg, rest) = cursor.split_at(len);
        argv.push(arg.to_vec());
        cursor = rest;
    }
    Ok(argv)
}

/// Parses a raw RESP request into its argv: the ordered list of opaque byte-strings a command
/// consists of (spec.md §4.1). Every command a client sends arrives as a RESP array of bulk
/// strings, which is exactly the shape [`encode_argv`] expects.
pub fn request_to_argv(request: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
    match RedisProtocolParser::parse(request) {
        Ok((Resp::Array(items), _)) => items
            .into_iter()
            .map(|item| match item {
                Resp::BulkString(bytes) => Ok(bytes.to_vec()),
                _ => Err(CodecError::NotArgv),
            })
            .collect(),
        _ => Err(CodecError::NotArgv),
    }
}

fn read_u64_le(cursor: &mut &[u8]) -> Result<u64, CodecError> {
    if cursor.len() < 8 {
        return Err(CodecError::Truncated);
    }
    let (head, rest) = cursor.split_at(8);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(head);
    *cursor = rest;
    Ok(u64::from_le_bytes(bytes))
}

/// Writes the one-time handshake a [`PeerLink`](super::peer::PeerLink) sends right after dialing:
/// its own node id, so the accepting side (which a bare [`Message`] carries no sender field for)
/// knows who it's talking to.
pub fn write_handshake<W: Write>(writer: &mut W, node_id: u64) -> Result<(), CodecError> {
    writer.write_all(&node_id.to_be_bytes()).map_err(io_to_codec)
}

/// Reads the handshake written by [`write_handshake`]. Returns `Ok(None)` if the peer closed the
/// connection before sending one.
pub fn read_handshake<R: Read>(reader: &mut R) -> Result<Option<u64>, CodecError> {
    let mut buf = [0u8; 8];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u64::from_be_bytes(buf))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(io_to_codec(e)),
    }
}

/// Encodes a Raft protocol [`Message`] as a length-prefixed protobuf frame for sending over a
/// [`PeerLink`](super::peer::PeerLink)'s `TcpStream`.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, CodecError> {
    let len = message.encoded_len();
    let mut framed = Vec::with_capacity(4 + len);
    framed.put_u32(len as u32);
    message.encode(&mut framed)?;
    Ok(framed)
}

/// Reads one length-prefixed [`Message`] frame from `reader`, blocking until the whole frame has
/// arrived. Returns `Ok(None)` if the peer closed the connection cleanly before sending a length
/// prefix.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Message>, CodecError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_to_codec(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).map_err(io_to_codec)?;
    let message = Message::decode(Bytes::from(body))?;
    Ok(Some(message))
}

/// Writes one length-prefixed [`Message`] frame to `writer`.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), CodecError> {
    let framed = encode_message(message)?;
    writer.write_all(&framed).map_err(io_to_codec)
}

fn io_to_codec(err: io::Error) -> CodecError {
    // Framing errors surface to callers as truncation; the originating io::Error is logged by the
    // caller, which has the peer address this function doesn't.
    let _ = err;
    CodecError::Truncated
}

#[cfg(test)]
mod tests {
    use raft::message::{Rpc, TermId, VoteRequest};

    use super::*;

    #[test]
    fn entry_envelope_round_trips() {
        let encoded = encode_entry(EntryType::Normal, b"SET foo bar");
        let (entry_type, payload) = decode_entry(&encoded).unwrap();
        assert_eq!(entry_type, EntryType::Normal);
        assert_eq!(payload, b"SET foo bar");
    }

    #[test]
    fn rejects_truncated_entry() {
        assert!(decode_entry(&[]).is_err());
    }

    #[test]
    fn rejects_unknown_entry_type() {
        let encoded = encode_entry(EntryType::Normal, b"x");
        let mut bad = encoded.to_vec();
        bad[0] = 99;
        assert!(decode_entry(&bad).is_err());
    }

    #[test]
    fn argv_round_trips_including_empty_and_binary_args() {
        let argv: Vec<Vec<u8>> = vec![
            b"SET".to_vec(),
            b"".to_vec(),
            b"binary\x00\x01".to_vec(),
        ];
        let encoded = encode_argv(&argv);
        let decoded = decode_argv(&encoded).unwrap();
        assert_eq!(decoded, argv);
    }

    #[test]
    fn argv_round_trips_empty_command() {
        let argv: Vec<Vec<u8>> = vec![];
        let encoded = encode_argv(&argv);
        let decoded = decode_argv(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn request_to_argv_extracts_bulk_strings_from_a_resp_array() {
        let argv = request_to_argv(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n").unwrap();
        assert_eq!(argv, vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
    }

    #[test]
    fn request_to_argv_rejects_non_array_requests() {
        assert!(request_to_argv(b"+OK\r\n").is_err());
    }

    #[test]
    fn argv_rejects_truncated_buffer() {
        let encoded = encode_argv(&[b"SET".to_vec(), b"foo".to_vec()]);
        assert!(decode_argv(&encoded[..encoded.len() - 2]).is_err());
        assert!(decode_argv(&[]).is_err());
    }

    #[test]
    fn handshake_round_trips() {
        let mut buf = Vec::new();
        write_handshake(&mut buf, 42).unwrap();
        let mut cursor = &buf[..];
        assert_eq!(read_handshake(&mut cursor).unwrap(), Some(42));
    }

    #[test]
    fn handshake_on_empty_stream_is_none() {
        let mut cursor: &[u8] = &[];
        assert_eq!(read_handshake(&mut cursor).unwrap(), None);
    }

    #[test]
    fn message_frame_round_trips() {
        let message = Message {
            term: TermId { id: 7 },
            rpc: Some(Rpc::VoteRequest(VoteRequest {
                last_log_idx: Default::default(),
                last_log_term: TermId { id: 6 },
            })),
        };

        let framed = encode_message(&message).unwrap();
        let mut cursor = &framed[..];
        let decoded = read_message(&mut cursor).unwrap().unwrap();
        assert!(decoded == message);
    }
}
