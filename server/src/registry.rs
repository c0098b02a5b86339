//! Server-side directory of live connections
//!
//! This module tracks every connected peer and its connection pump:
//! - Registration wraps a freshly upgraded WebSocket in a pump and starts it
//! - Every peer's inbound frames land in one shared queue tagged with their origin
//! - Broadcast writes a frame to every live peer's outbound queue
//! - Peers whose pump stops (read or write error) are evicted automatically
//!
//! All operations take `&self` and are safe to call from any task; the
//! registry is cheap to clone and every clone shares the same peers.

use log::info;
use parking_lot::Mutex;
use shared::{Pump, Queue};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

/// Unique peer identifier assigned by the registry, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// A raw frame together with the peer it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMessage {
    pub origin: PeerId,
    pub message: String,
}

struct Inner {
    /// Live peers indexed by their id
    peers: Mutex<HashMap<PeerId, Pump>>,
    /// Next id handed out by `register`
    next_peer_id: AtomicU32,
    /// Frames from every peer, interleaved in arrival order
    inbound: Arc<Queue<PeerMessage>>,
    /// Peers removed since the last `drain_departed`
    departed: Queue<PeerId>,
}

/// Tracks live connections and fans their traffic in and out
#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<Inner>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                peers: Mutex::new(HashMap::new()),
                next_peer_id: AtomicU32::new(1),
                inbound: Arc::new(Queue::new()),
                departed: Queue::new(),
            }),
        }
    }

    /// Wraps the connection in a pump, stores it and starts pumping.
    ///
    /// A watcher task unregisters the peer as soon as its pump stops, so a
    /// transport error never needs handling by the caller.
    pub fn register<S>(&self, ws: WebSocketStream<S>) -> PeerId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer_id = PeerId(self.inner.next_peer_id.fetch_add(1, Ordering::Relaxed));

        let pump = Pump::spawn(
            peer_id.to_string(),
            ws,
            Arc::clone(&self.inner.inbound),
            move |message| PeerMessage {
                origin: peer_id,
                message,
            },
        );

        self.inner.peers.lock().insert(peer_id, pump.clone());
        info!("{} registered", peer_id);

        let registry = self.clone();
        tokio::spawn(async move {
            pump.closed().await;
            registry.unregister(peer_id);
        });

        peer_id
    }

    /// Stops and discards the peer's pump. Returns false if it was already gone.
    pub fn unregister(&self, peer_id: PeerId) -> bool {
        let removed = self.inner.peers.lock().remove(&peer_id);

        match removed {
            Some(pump) => {
                pump.close();
                self.inner.departed.enqueue(peer_id);
                info!("{} unregistered", peer_id);
                true
            }
            None => false,
        }
    }

    /// Writes the frame to every registered peer. Best effort, never blocks on a slow peer.
    pub fn broadcast(&self, message: &str) {
        let peers = self.inner.peers.lock();
        for pump in peers.values() {
            pump.write(message);
        }
    }

    /// Writes the frame to a single peer. Returns false if the peer is not registered.
    pub fn send_to(&self, peer_id: PeerId, message: &str) -> bool {
        match self.inner.peers.lock().get(&peer_id) {
            Some(pump) => {
                pump.write(message);
                true
            }
            None => false,
        }
    }

    /// Takes everything every peer said since the last call, in arrival order
    pub fn read_all(&self) -> Vec<PeerMessage> {
        self.inner.inbound.drain_all()
    }

    /// Takes the ids of peers that left since the last call
    pub fn drain_departed(&self) -> Vec<PeerId> {
        self.inner.departed.drain_all()
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.inner.peers.lock().contains_key(&peer_id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.inner.peers.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Returns the number of currently registered peers
    pub fn len(&self) -> usize {
        self.inner.peers.lock().len()
    }

    /// Returns true if no peers are currently registered
    pub fn is_empty(&self) -> bool {
        self.inner.peers.lock().is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
