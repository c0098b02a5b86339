//! Entity kinds that are replicated between server and clients.
//!
//! Each kind embeds the identity [`Envelope`] and carries its own mutable
//! state. Motion is frame-rate independent: displacement constants are per
//! nominal frame and get scaled by the wall-clock time that actually passed.

use crate::envelope::{Envelope, EntityKind};
use crate::geometry::{Rect, Vector2};
use crate::timing::frame_factor;
use crate::{
    AVATAR_HEIGHT, AVATAR_WIDTH, FIRE_HEAT, FIRE_LOAD, HIT_PENALTY, MAX_HEAT, MUZZLE_DISTANCE,
    PICKUP_SIZE, PROJECTILE_LIFE, PROJECTILE_SIZE, PROJECTILE_SPEED_PER_SECOND, TARGET_TPS,
    WORLD_HEIGHT, WORLD_WIDTH,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Behaviour shared by every replicated entity kind
pub trait Synced: Clone {
    fn envelope(&self) -> &Envelope;

    fn envelope_mut(&mut self) -> &mut Envelope;

    /// Full-state replace of every mutable field from an incoming copy
    fn copy_from(&mut self, other: &Self);

    fn collider(&self) -> Rect;

    fn id(&self) -> Uuid {
        self.envelope().id
    }
}

/// A player-controlled ship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Top-left corner of the collider
    #[serde(default)]
    pub position: Vector2,
    /// Heading in radians, 0 facing up, growing clockwise
    #[serde(default)]
    pub rotation: f32,
    /// Displacement per nominal frame along the heading
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub score: i32,
    /// Weapon heat; firing is refused at or above [`MAX_HEAT`]
    #[serde(default)]
    pub heat: i64,
    /// Frames left before the weapon is reloaded
    #[serde(default)]
    pub load: i64,
}

impl Avatar {
    pub fn new(position: Vector2) -> Self {
        Self {
            envelope: Envelope::spawn(EntityKind::Avatar),
            position,
            rotation: 0.0,
            speed: 0.0,
            score: 0,
            heat: 0,
            load: 0,
        }
    }

    /// Avatar placed in the middle of the world
    pub fn centered() -> Self {
        Self::new(Vector2::new(
            (WORLD_WIDTH - AVATAR_WIDTH) / 2.0,
            (WORLD_HEIGHT - AVATAR_HEIGHT) / 2.0,
        ))
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new(
            self.position.x + AVATAR_WIDTH / 2.0,
            self.position.y + AVATAR_HEIGHT / 2.0,
        )
    }

    /// Advances position along the heading and cools the weapon by one frame
    pub fn update(&mut self, elapsed: Duration) {
        let step = Vector2::from_heading(self.rotation).scale(self.speed * frame_factor(elapsed));
        self.position = self.position.add(&step);

        if self.heat > 0 {
            self.heat -= 1;
        }
        if self.load > 0 {
            self.load -= 1;
        }
    }

    pub fn can_fire(&self) -> bool {
        self.heat < MAX_HEAT && self.load == 0
    }

    /// Loads the weapon after a shot
    pub fn discharge(&mut self) {
        self.load = FIRE_LOAD;
        self.heat += FIRE_HEAT;
    }

    /// Point and heading a projectile leaves from
    pub fn muzzle(&self) -> (Vector2, f32) {
        let offset = Vector2::from_heading(self.rotation).scale(MUZZLE_DISTANCE);
        (self.center().add(&offset), self.rotation)
    }

    /// Applies a projectile hit: the avatar stops and pays the penalty
    pub fn hit(&mut self) {
        self.speed = 0.0;
        self.score -= HIT_PENALTY;
    }

    /// Copies the fields a client is allowed to dictate, leaving the score untouched
    pub fn merge_motion(&mut self, other: &Avatar) {
        self.envelope.action = other.envelope.action;
        self.position = other.position;
        self.rotation = other.rotation;
        self.speed = other.speed;
        self.heat = other.heat;
        self.load = other.load;
    }
}

impl Synced for Avatar {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn copy_from(&mut self, other: &Self) {
        self.merge_motion(other);
        self.score = other.score;
    }

    fn collider(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, AVATAR_WIDTH, AVATAR_HEIGHT)
    }
}

/// A stationary collectible worth one point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub position: Vector2,
}

impl Pickup {
    pub fn new(position: Vector2) -> Self {
        Self {
            envelope: Envelope::spawn(EntityKind::Pickup),
            position,
        }
    }
}

impl Synced for Pickup {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn copy_from(&mut self, other: &Self) {
        self.envelope.action = other.envelope.action;
        self.position = other.position;
    }

    fn collider(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, PICKUP_SIZE, PICKUP_SIZE)
    }
}

/// A shot travelling in a straight line until it hits or its life runs out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub position: Vector2,
    #[serde(default)]
    pub rotation: f32,
    /// Remaining ticks
    #[serde(default)]
    pub life: i32,
}

impl Projectile {
    /// Creates a projectile centred on `center`
    pub fn new(center: Vector2, rotation: f32) -> Self {
        Self {
            envelope: Envelope::spawn(EntityKind::Projectile),
            position: Vector2::new(
                center.x - PROJECTILE_SIZE / 2.0,
                center.y - PROJECTILE_SIZE / 2.0,
            ),
            rotation,
            life: PROJECTILE_LIFE,
        }
    }

    pub fn update(&mut self, elapsed: Duration) {
        let speed = PROJECTILE_SPEED_PER_SECOND / TARGET_TPS;
        let step = Vector2::from_heading(self.rotation).scale(speed * frame_factor(elapsed));
        self.position = self.position.add(&step);
        self.life -= 1;
    }

    pub fn is_expired(&self) -> bool {
        self.life <= 0
    }
}

impl Synced for Projectile {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn copy_from(&mut self, other: &Self) {
        self.envelope.action = other.envelope.action;
        self.position = other.position;
        self.rotation = other.rotation;
        self.life = other.life;
    }

    fn collider(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            PROJECTILE_SIZE,
            PROJECTILE_SIZE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Action;
    use crate::timing::NOMINAL_FRAME;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_avatar_creation() {
        let avatar = Avatar::new(Vector2::new(100.0, 200.0));
        assert_eq!(avatar.envelope.class_name, EntityKind::Avatar);
        assert_eq!(avatar.envelope.action, Action::Spawn);
        assert_eq!(avatar.position, Vector2::new(100.0, 200.0));
        assert_eq!(avatar.score, 0);
        assert!(avatar.can_fire());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Avatar::centered();
        let b = Avatar::centered();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_motion_scales_with_elapsed_time() {
        let mut one_frame = Avatar::new(Vector2::new(100.0, 100.0));
        one_frame.speed = 2.0;
        one_frame.update(NOMINAL_FRAME);
        assert_approx_eq!(one_frame.position.x, 100.0, 1e-4);
        assert_approx_eq!(one_frame.position.y, 98.0, 1e-4);

        let mut two_frames = Avatar::new(Vector2::new(100.0, 100.0));
        two_frames.speed = 2.0;
        two_frames.rotation = FRAC_PI_2;
        two_frames.update(NOMINAL_FRAME * 2);
        assert_approx_eq!(two_frames.position.x, 104.0, 1e-3);
        assert_approx_eq!(two_frames.position.y, 100.0, 1e-3);
    }

    #[test]
    fn test_weapon_cooldown() {
        let mut avatar = Avatar::centered();
        avatar.discharge();
        assert_eq!(avatar.load, FIRE_LOAD);
        assert_eq!(avatar.heat, FIRE_HEAT);
        assert!(!avatar.can_fire());

        for _ in 0..FIRE_LOAD {
            avatar.update(NOMINAL_FRAME);
        }
        assert_eq!(avatar.load, 0);
        assert_eq!(avatar.heat, 0);
        assert!(avatar.can_fire());
    }

    #[test]
    fn test_overheated_weapon_refuses() {
        let mut avatar = Avatar::centered();
        avatar.heat = MAX_HEAT;
        assert!(!avatar.can_fire());
    }

    #[test]
    fn test_hit_stops_and_penalizes() {
        let mut avatar = Avatar::centered();
        avatar.speed = 3.5;
        avatar.score = 4;
        avatar.hit();
        assert_eq!(avatar.speed, 0.0);
        assert_eq!(avatar.score, 4 - HIT_PENALTY);
    }

    #[test]
    fn test_muzzle_is_ahead_of_center() {
        let avatar = Avatar::new(Vector2::new(100.0, 100.0));
        let (muzzle, rotation) = avatar.muzzle();
        let center = avatar.center();
        assert_eq!(rotation, 0.0);
        assert_approx_eq!(muzzle.x, center.x, 1e-4);
        assert_approx_eq!(muzzle.y, center.y - MUZZLE_DISTANCE, 1e-4);

        // A fresh shot does not overlap its shooter
        let projectile = Projectile::new(muzzle, rotation);
        assert!(!projectile.collider().intersects(&avatar.collider()));
    }

    #[test]
    fn test_merge_motion_keeps_score() {
        let mut canonical = Avatar::centered();
        canonical.score = 7;

        let mut incoming = canonical.clone();
        incoming.position = Vector2::new(5.0, 6.0);
        incoming.speed = 1.5;
        incoming.score = 0;

        canonical.merge_motion(&incoming);
        assert_eq!(canonical.position, Vector2::new(5.0, 6.0));
        assert_eq!(canonical.speed, 1.5);
        assert_eq!(canonical.score, 7);

        canonical.copy_from(&incoming);
        assert_eq!(canonical.score, 0);
    }

    #[test]
    fn test_projectile_life() {
        let mut projectile = Projectile::new(Vector2::new(50.0, 50.0), 0.0);
        let half = PROJECTILE_SIZE / 2.0;
        assert_eq!(projectile.position, Vector2::new(50.0 - half, 50.0 - half));

        let start_y = projectile.position.y;
        for _ in 0..PROJECTILE_LIFE - 1 {
            projectile.update(NOMINAL_FRAME);
        }
        assert!(!projectile.is_expired());
        projectile.update(NOMINAL_FRAME);
        assert!(projectile.is_expired());

        let travelled = start_y - projectile.position.y;
        let expected = PROJECTILE_SPEED_PER_SECOND / TARGET_TPS * PROJECTILE_LIFE as f32;
        assert_approx_eq!(travelled, expected, 0.1);
    }

    #[test]
    fn test_pickup_collider() {
        let pickup = Pickup::new(Vector2::new(10.0, 20.0));
        let collider = pickup.collider();
        assert_eq!(collider, Rect::new(10.0, 20.0, PICKUP_SIZE, PICKUP_SIZE));
    }
}
