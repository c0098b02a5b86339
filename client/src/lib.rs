//! # Replica Sync Client Library
//!
//! The client side of the state-sync layer. A client holds one connection to
//! the server, controls exactly one Avatar and keeps a best-effort replica of
//! every other entity the server broadcasts.
//!
//! ## Architecture Overview
//!
//! ### Local Prediction
//! The local avatar is advanced from input every tick without waiting for the
//! server. A frame goes out only when the input actually changed its heading,
//! speed or weapon, which bounds the client's upstream bandwidth.
//!
//! ### Dead Reckoning
//! When the server echoes the local avatar back, the client takes the fields
//! the server owns (score, speed, weapon cooldowns) and keeps its own position
//! unless the two disagree by more than a fixed distance. Small jitter is
//! ignored; a large correction snaps immediately.
//!
//! ### Replica Maps
//! Remote entities are kept per kind, each map paired with an ordered id
//! sequence so iteration is reproducible. Known entities are fully replaced by
//! each incoming frame, unknown ones are created, and deletions are final.
//!
//! ## Module Organization
//!
//! - `input`: held controls, how they steer the avatar, and a scripted autopilot
//! - `game`: the replica and its reconciliation rules
//! - `network`: the server connection and the headless tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::Autopilot;
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pilot = Box::new(Autopilot::new());
//!     let mut client = Client::new("ws://127.0.0.1:8080/ws", 60, pilot).await?;
//!
//!     // Fly around for ten seconds, then disconnect
//!     client.run(Some(Duration::from_secs(10))).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
