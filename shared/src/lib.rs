//! # Shared Replication Library
//!
//! Everything the server and the clients must agree on: the wire envelope and
//! entity schemas, the motion and collision geometry both sides simulate, and
//! the connection plumbing that moves text frames between processes.
//!
//! ## Modules
//!
//! - `queue`: mutex-guarded FIFO used to decouple I/O tasks from the tick loop
//! - `pump`: per-connection receive/send loop pair over a WebSocket
//! - `envelope`: identity header, kind/action tags and the two-phase decoder
//! - `entity`: Avatar, Pickup and Projectile state plus their motion rules
//! - `geometry`: 2D vectors and axis-aligned bounding boxes
//! - `order`: deterministic iteration order over id-keyed maps
//! - `timing`: nominal frame duration, frame scaling and interval timers
//!
//! ## Wire format
//!
//! One JSON object per text frame:
//!
//! ```text
//! {"id":"<uuid>","class_name":"Avatar","action":"Update","position":{"x":1.0,"y":2.0},...}
//! ```
//!
//! An empty or missing `action` means a plain state update.

pub mod entity;
pub mod envelope;
pub mod geometry;
pub mod order;
pub mod pump;
pub mod queue;
pub mod timing;

pub use entity::{Avatar, Pickup, Projectile, Synced};
pub use envelope::{decode, encode, peek, Action, DecodeError, Entity, EntityKind, Envelope};
pub use geometry::{Rect, Vector2};
pub use order::ordered_ids;
pub use pump::{Pump, Shutdown};
pub use queue::Queue;

use std::time::Duration;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const TARGET_TPS: f32 = 60.0;

pub const AVATAR_WIDTH: f32 = 38.0;
pub const AVATAR_HEIGHT: f32 = 30.0;
pub const ROTATION_PER_SECOND: f32 = std::f32::consts::PI;
/// Speed change per frame while accelerating or braking
pub const SPEED_STEP: f32 = 0.1;
pub const MAX_HEAT: i64 = 100;
pub const FIRE_HEAT: i64 = 30;
pub const FIRE_LOAD: i64 = 30;
pub const HIT_PENALTY: i32 = 10;

pub const MUZZLE_DISTANCE: f32 = 40.0;
pub const PROJECTILE_SIZE: f32 = 10.0;
pub const PROJECTILE_SPEED_PER_SECOND: f32 = 400.0;
pub const PROJECTILE_LIFE: i32 = 60;

pub const PICKUP_SIZE: f32 = 32.0;
pub const PICKUP_CAP: usize = 20;
pub const PICKUP_SPAWN_INTERVAL: Duration = Duration::from_secs(1);

/// Local prediction is kept unless the server disagrees by more than this
pub const DEAD_RECKONING_THRESHOLD: f32 = 100.0;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PATH: &str = "/ws";
pub const SEND_TICK: Duration = Duration::from_millis(1);
