//! # Replica Sync Server Library
//!
//! The authoritative side of the state-sync layer. It accepts WebSocket
//! connections, keeps the canonical copy of every replicated entity and
//! broadcasts each change to every connected peer.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Reconciliation
//! Clients own their Avatar's motion and report it; the server merges those
//! reports, owns Pickups and Projectiles outright, and decides collisions,
//! scoring and deletions. Every decision is broadcast as an ordinary entity
//! frame, so clients need no separate event channel.
//!
//! ### Peer Management
//! Handles the lifecycle of peer connections:
//! - WebSocket upgrade on a single configured path (anything else gets a 404)
//! - One connection pump per peer, inbound frames tagged with their origin
//! - Eviction on transport error and deletion of the avatars the peer introduced
//!
//! ### Relay
//! Avatar updates are re-broadcast verbatim to every peer, sender included,
//! after being merged into the canonical state.
//!
//! ## Architecture Design
//!
//! ### Single Reconciliation Loop
//! All world state is owned by one loop that ticks at a fixed rate. Network
//! tasks never touch the world: they only fill queues that the loop drains at
//! the start of each tick. Messages are applied in arrival order, and a tick
//! that runs late is logged rather than skipped.
//!
//! ### Text Frames
//! Every message is one JSON object per WebSocket text frame, identified by
//! an `id`, a `class_name` kind tag and an optional `action` verb.
//!
//! ## Module Organization
//!
//! - `config`: bind address, endpoint path, tick rate and pickup settings
//! - `registry`: live peers, broadcast and origin-tagged inbound queue
//! - `game`: the authoritative world and its per-tick reconciliation
//! - `network`: TCP listener, WebSocket handshake and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Listen on ws://127.0.0.1:8080/ws and tick at 60 Hz
//!     let config = ServerConfig::new("127.0.0.1", 8080, "/ws", 60);
//!     let mut server = Server::new(config).await?;
//!
//!     // Accepts peers in the background and runs the reconciliation loop forever
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod network;
pub mod registry;
