//! A persistent link to one Raft peer: a supervisor thread that keeps a `TcpStream` connected,
//! with a reader and writer thread spawned over it for as long as the connection lasts.
//!
//! There's no async runtime anywhere else in this crate, so a peer link is plain
//! thread-per-connection like [`server::util::handle_request`](crate::server::util::handle_request)
//! is for clients: a writer thread drains an outbound channel and writes length-prefixed
//! [`Message`] frames, a reader thread blocks on `read_message` and forwards whatever arrives to
//! the replication thread's inbound channel. If either side errors, both are torn down and the
//! supervisor retries the connection after a short backoff.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use raft::message::{Message, MessageDestination, SendableMessage};

use crate::cluster::codec::{read_handshake, read_message, write_handshake, write_message};
use crate::cluster::membership::NodeId;

/// Routes every message in `messages` to the right [`PeerLink`], broadcasting to all known peers or
/// sending to one by id per each message's own [`MessageDestination`].
pub fn dispatch(peers: &HashMap<NodeId, PeerLink>, messages: impl Iterator<Item = SendableMessage<NodeId>>) {
    for sendable in messages {
        match sendable.dest {
            MessageDestination::Broadcast => {
                for link in peers.values() {
                    link.send(sendable.message.clone());
                }
            }
            MessageDestination::To(id) => {
                if let Some(link) = peers.get(&id) {
                    link.send(sendable.message);
                }
            }
        }
    }
}

const RECONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// A handle to a background connection to one peer. Dropping it (via [`shutdown`](Self::shutdown))
/// stops the supervisor thread and closes the connection.
pub struct PeerLink {
    peer_id: NodeId,
    outbound: Sender<Message>,
    running: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
}

impl PeerLink {
    /// Spawns the supervisor thread connecting to `addr`. Inbound messages are forwarded to
    /// `inbound`, tagged with `peer_id` so the replication thread knows who sent them.
    ///
    /// `self_node_id` is sent as a handshake right after the connection is established, since a
    /// bare [`Message`] carries no sender field for the accepting side to learn it from.
    pub fn connect(
        peer_id: NodeId,
        addr: SocketAddrV4,
        self_node_id: NodeId,
        inbound: Sender<(NodeId, Message)>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded::<Message>();
        let running = Arc::new(AtomicBool::new(true));

        let supervisor = {
            let running = running.clone();
            thread::Builder::new()
                .name(format!("raft-peer-{}", peer_id))
                .spawn(move || supervisor_loop(peer_id, addr, self_node_id, outbound_rx, inbound, running))
                .expect("failed to spawn peer link thread")
        };

        Self {
            peer_id,
            outbound: outbound_tx,
            running,
            supervisor: Some(supervisor),
        }
    }

    pub fn peer_id(&self) -> NodeId {
        self.peer_id
    }

    /// Queues `message` for delivery. Never blocks, and silently drops the message if the link has
    /// been shut down; a dropped unicast message is simply retransmitted on the next replication
    /// tick, per the delivery guarantees `raft::node::Node` already assumes.
    pub fn send(&self, message: Message) {
        let _ = self.outbound.send(message);
    }

    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn supervisor_loop(
    peer_id: NodeId,
    addr: SocketAddrV4,
    self_node_id: NodeId,
    outbound: Receiver<Message>,
    inbound: Sender<(NodeId, Message)>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let mut stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(err) => {
                debug!("peer {} ({}) not reachable yet: {}", peer_id, addr, err);
                thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        if let Err(err) = write_handshake(&mut stream, self_node_id) {
            debug!("handshake to peer {} ({}) failed: {}", peer_id, addr, err);
            thread::sleep(RECONNECT_BACKOFF);
            continue;
        }
        debug!("connected to peer {} at {}", peer_id, addr);

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(err) => {
                warn!("failed to clone stream for peer {}: {}", peer_id, err);
                thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        };

        let conn_running = Arc::new(AtomicBool::new(true));

        let reader = {
            let conn_running = conn_running.clone();
            let inbound = inbound.clone();
            let mut reader_stream = reader_stream;
            thread::Builder::new()
                .name(format!("raft-peer-{}-rx", peer_id))
                .spawn(move || {
                    while conn_running.load(Ordering::SeqCst) {
                        match read_message(&mut reader_stream) {
                            Ok(Some(message)) => {
                                if inbound.send((peer_id, message)).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                debug!("peer {} read error: {}", peer_id, err);
                                break;
                            }
                        }
                    }
                    conn_running.store(false, Ordering::SeqCst);
                })
                .expect("failed to spawn peer reader thread")
        };

        let mut writer_stream = stream;
        while conn_running.load(Ordering::SeqCst) && running.load(Ordering::SeqCst) {
            match outbound.recv_timeout(Duration::from_millis(100)) {
                Ok(message) => {
                    if let Err(err) = write_message(&mut writer_stream, &message) {
                        debug!("peer {} write error: {}", peer_id, err);
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        conn_running.store(false, Ordering::SeqCst);
        let _ = writer_stream.shutdown(std::net::Shutdown::Both);
        let _ = reader.join();

        if running.load(Ordering::SeqCst) {
            thread::sleep(RECONNECT_BACKOFF);
        }
    }
}

/// Accepts inbound connections dialed by peers' own [`PeerLink::connect`], identifies each one via
/// its handshake, and forwards whatever it reads into `inbound`. Never writes anything back: the
/// reverse direction travels over the peer's corresponding outbound [`PeerLink`] to this node, not
/// over the connection accepted here.
pub fn spawn_listener(
    node_id: NodeId,
    bind_addr: SocketAddrV4,
    inbound: Sender<(NodeId, Message)>,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    Ok(thread::Builder::new()
        .name(format!("raft-listener-{}", node_id))
        .spawn(move || {
            while running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, peer_addr)) => {
                        let inbound = inbound.clone();
                        thread::spawn(move || accept_connection(stream, peer_addr, inbound));
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(err) => {
                        warn!("raft peer listener accept error: {}", err);
                        thread::sleep(Duration::from_millis(50));
                    }
                }
            }
        })
        .expect("failed to spawn raft peer listener thread"))
}

fn accept_connection(mut stream: TcpStream, peer_addr: SocketAddr, inbound: Sender<(NodeId, Message)>) {
    let _ = stream.set_nodelay(true);
    let peer_id = match read_handshake(&mut stream) {
        Ok(Some(id)) => id,
        Ok(None) => return,
        Err(err) => {
            debug!("handshake from {} failed: {}", peer_addr, err);
            return;
        }
    };

    loop {
        match read_message(&mut stream) {
            Ok(Some(message)) => {
                if inbound.send((peer_id, message)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!("peer {} ({}) read error: {}", peer_id, peer_addr, err);
                break;
            }
        }
    }
}
