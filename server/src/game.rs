//! Authoritative world state
//!
//! The server owns Pickups and Projectiles outright and keeps the canonical
//! copy of every Avatar. Each tick drains everything peers sent since the
//! previous tick, applies it, simulates one step and resolves collisions.
//! Every resulting state change is returned as an encoded frame for the
//! caller to broadcast.

use crate::registry::{PeerId, PeerMessage};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use shared::timing::Timer;
use shared::{
    decode, encode, ordered_ids, Action, Avatar, Entity, Pickup, Projectile, Rect, Synced,
    Vector2, PICKUP_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

/// Candidate positions tried before a pickup is placed on an occupied spot anyway
const SPAWN_ATTEMPTS: usize = 8;

pub struct ServerWorld {
    pub tick: u64,
    pub avatars: HashMap<Uuid, Avatar>,
    pub pickups: HashMap<Uuid, Pickup>,
    pub projectiles: HashMap<Uuid, Projectile>,
    /// Avatars introduced by each peer, removed when the peer leaves
    owners: HashMap<PeerId, HashSet<Uuid>>,
    /// Ids that were deleted; later messages about them are ignored
    deleted: HashSet<Uuid>,
    /// Peers already removed; frames still queued from them are dropped
    departed: HashSet<PeerId>,
    pickup_timer: Timer,
    pickup_cap: usize,
    rng: StdRng,
    /// Frames produced during the current tick
    outbox: Vec<String>,
}

impl ServerWorld {
    pub fn new(pickup_cap: usize, pickup_interval: Duration) -> Self {
        Self::with_rng(pickup_cap, pickup_interval, StdRng::from_entropy())
    }

    /// World with a reproducible pickup placement sequence
    pub fn with_seed(pickup_cap: usize, pickup_interval: Duration, seed: u64) -> Self {
        Self::with_rng(pickup_cap, pickup_interval, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pickup_cap: usize, pickup_interval: Duration, rng: StdRng) -> Self {
        Self {
            tick: 0,
            avatars: HashMap::new(),
            pickups: HashMap::new(),
            projectiles: HashMap::new(),
            owners: HashMap::new(),
            deleted: HashSet::new(),
            departed: HashSet::new(),
            pickup_timer: Timer::new(pickup_interval),
            pickup_cap,
            rng,
            outbox: Vec::new(),
        }
    }

    /// Runs one reconciliation pass and returns the frames to broadcast, in order.
    ///
    /// Every inbound message is applied in arrival order, then departures,
    /// then pickup spawning, motion, collisions and expiry. A departed peer's
    /// last frames are therefore applied before its avatars are deleted.
    pub fn tick(
        &mut self,
        inbound: Vec<PeerMessage>,
        departed: &[PeerId],
        elapsed: Duration,
    ) -> Vec<String> {
        self.tick += 1;

        for message in inbound {
            self.dispatch(message);
        }

        for peer_id in departed {
            self.remove_peer(*peer_id);
        }

        self.spawn_pickups(elapsed);
        self.advance(elapsed);
        self.resolve_projectile_hits();
        self.resolve_pickup_collection();
        self.expire_projectiles();

        std::mem::take(&mut self.outbox)
    }

    pub fn is_deleted(&self, id: &Uuid) -> bool {
        self.deleted.contains(id)
    }

    fn dispatch(&mut self, PeerMessage { origin, message }: PeerMessage) {
        if self.departed.contains(&origin) {
            debug!("Dropping frame from departed {}", origin);
            return;
        }

        let entity = match decode(&message) {
            Ok(entity) => entity,
            Err(e) => {
                warn!("Dropping frame from {}: {} ({})", origin, e, message);
                return;
            }
        };

        let id = entity.id();
        if self.deleted.contains(&id) {
            debug!("Ignoring {:?} for deleted entity {}", entity.action(), id);
            return;
        }

        match entity {
            Entity::Avatar(avatar) => match avatar.envelope.action {
                Action::Spawn | Action::Update | Action::Score => {
                    self.upsert_avatar(origin, avatar, message)
                }
                Action::Fire => self.fire(origin, avatar),
                Action::Delete => self.delete_avatar(id, message),
                Action::Edit | Action::Submit => warn!(
                    "No rule for {:?} on Avatar {} from {}, dropping",
                    avatar.envelope.action, id, origin
                ),
            },
            other => warn!(
                "{} {} from {} is server-owned, dropping",
                other.kind(),
                id,
                origin
            ),
        }
    }

    /// Merges a client's avatar state and relays the frame untouched
    fn upsert_avatar(&mut self, origin: PeerId, avatar: Avatar, raw: String) {
        let id = avatar.id();
        match self.avatars.get_mut(&id) {
            Some(canonical) => canonical.merge_motion(&avatar),
            None => {
                info!("Avatar {} joined through {}", id, origin);
                self.avatars.insert(id, avatar);
            }
        }

        self.owners.entry(origin).or_default().insert(id);
        self.outbox.push(raw);
    }

    /// Spawns a projectile at the shooter's muzzle. The Fire frame itself is not relayed.
    fn fire(&mut self, origin: PeerId, avatar: Avatar) {
        let id = avatar.id();
        let shooter = self.avatars.entry(id).or_insert_with(|| avatar.clone());
        shooter.merge_motion(&avatar);
        shooter.envelope.action = Action::Update;
        let (muzzle, rotation) = shooter.muzzle();

        self.owners.entry(origin).or_default().insert(id);

        let projectile = Projectile::new(muzzle, rotation);
        debug!("Avatar {} fired projectile {}", id, projectile.id());
        emit(&mut self.outbox, &projectile);
        self.projectiles.insert(projectile.id(), projectile);
    }

    fn delete_avatar(&mut self, id: Uuid, raw: String) {
        if self.avatars.remove(&id).is_some() {
            info!("Avatar {} deleted by its owner", id);
        }
        for owned in self.owners.values_mut() {
            owned.remove(&id);
        }
        self.deleted.insert(id);
        self.outbox.push(raw);
    }

    /// Deletes every avatar a departed peer introduced
    fn remove_peer(&mut self, peer_id: PeerId) {
        self.departed.insert(peer_id);

        let Some(owned) = self.owners.remove(&peer_id) else {
            return;
        };

        let mut owned: Vec<Uuid> = owned.into_iter().collect();
        owned.sort_by_cached_key(|id| id.to_string());

        for id in owned {
            if let Some(mut avatar) = self.avatars.remove(&id) {
                info!("Avatar {} left with {}", id, peer_id);
                avatar.envelope.action = Action::Delete;
                self.deleted.insert(id);
                emit(&mut self.outbox, &avatar);
            }
        }
    }

    fn spawn_pickups(&mut self, elapsed: Duration) {
        if !self.pickup_timer.advance(elapsed) || self.pickups.len() >= self.pickup_cap {
            return;
        }

        let pickup = Pickup::new(self.free_pickup_position());
        debug!(
            "Spawned pickup {} at ({:.1}, {:.1})",
            pickup.id(),
            pickup.position.x,
            pickup.position.y
        );
        emit(&mut self.outbox, &pickup);
        self.pickups.insert(pickup.id(), pickup);
    }

    fn free_pickup_position(&mut self) -> Vector2 {
        let mut candidate = Vector2::default();

        for _ in 0..SPAWN_ATTEMPTS {
            candidate = Vector2::new(
                self.rng.gen_range(0.0..WORLD_WIDTH - PICKUP_SIZE),
                self.rng.gen_range(0.0..WORLD_HEIGHT - PICKUP_SIZE),
            );
            let area = Rect::new(candidate.x, candidate.y, PICKUP_SIZE, PICKUP_SIZE);

            let occupied = self
                .avatars
                .values()
                .any(|avatar| avatar.collider().intersects(&area))
                || self
                    .pickups
                    .values()
                    .any(|pickup| pickup.collider().intersects(&area));
            if !occupied {
                break;
            }
        }

        candidate
    }

    fn advance(&mut self, elapsed: Duration) {
        for avatar in self.avatars.values_mut() {
            avatar.update(elapsed);
        }
        for projectile in self.projectiles.values_mut() {
            projectile.update(elapsed);
        }
    }

    /// Each avatar takes at most one hit per tick; the projectile is consumed
    fn resolve_projectile_hits(&mut self) {
        let projectile_ids = ordered_ids(&self.projectiles);

        for avatar_id in ordered_ids(&self.avatars) {
            let Some(hitbox) = self.avatars.get(&avatar_id).map(Synced::collider) else {
                continue;
            };

            let hit = projectile_ids.iter().copied().find(|projectile_id| {
                self.projectiles
                    .get(projectile_id)
                    .map_or(false, |projectile| projectile.collider().intersects(&hitbox))
            });

            if let Some(projectile_id) = hit {
                if let Some(avatar) = self.avatars.get_mut(&avatar_id) {
                    avatar.hit();
                    avatar.envelope.action = Action::Score;
                    info!(
                        "Avatar {} hit by {}, score {}",
                        avatar_id, projectile_id, avatar.score
                    );
                    emit(&mut self.outbox, &*avatar);
                }
                self.delete_projectile(projectile_id);
            }
        }
    }

    /// Each avatar collects at most one pickup per tick
    fn resolve_pickup_collection(&mut self) {
        let pickup_ids = ordered_ids(&self.pickups);

        for avatar_id in ordered_ids(&self.avatars) {
            let Some(hitbox) = self.avatars.get(&avatar_id).map(Synced::collider) else {
                continue;
            };

            let collected = pickup_ids.iter().copied().find(|pickup_id| {
                self.pickups
                    .get(pickup_id)
                    .map_or(false, |pickup| pickup.collider().intersects(&hitbox))
            });

            let Some(pickup_id) = collected else {
                continue;
            };

            if let Some(mut pickup) = self.pickups.remove(&pickup_id) {
                pickup.envelope.action = Action::Delete;
                self.deleted.insert(pickup_id);
                emit(&mut self.outbox, &pickup);
            }

            if let Some(avatar) = self.avatars.get_mut(&avatar_id) {
                avatar.score += 1;
                avatar.envelope.action = Action::Score;
                debug!("Avatar {} collected {}, score {}", avatar_id, pickup_id, avatar.score);
                emit(&mut self.outbox, &*avatar);
            }
        }
    }

    fn expire_projectiles(&mut self) {
        for projectile_id in ordered_ids(&self.projectiles) {
            let expired = self
                .projectiles
                .get(&projectile_id)
                .map_or(false, Projectile::is_expired);
            if expired {
                self.delete_projectile(projectile_id);
            }
        }
    }

    fn delete_projectile(&mut self, projectile_id: Uuid) {
        if let Some(mut projectile) = self.projectiles.remove(&projectile_id) {
            projectile.envelope.action = Action::Delete;
            self.deleted.insert(projectile_id);
            emit(&mut self.outbox, &projectile);
        }
    }
}

fn emit<T: Serialize>(outbox: &mut Vec<String>, entity: &T) {
    match encode(entity) {
        Ok(frame) => outbox.push(frame),
        Err(e) => error!("Failed to encode outgoing frame: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::timing::NOMINAL_FRAME;
    use shared::{EntityKind, HIT_PENALTY, PROJECTILE_SIZE};

    fn world() -> ServerWorld {
        ServerWorld::with_seed(20, Duration::from_secs(1), 7)
    }

    fn from<T: Serialize>(peer: u32, entity: &T) -> PeerMessage {
        raw_from(peer, &encode(entity).unwrap())
    }

    fn raw_from(peer: u32, message: &str) -> PeerMessage {
        PeerMessage {
            origin: PeerId(peer),
            message: message.to_string(),
        }
    }

    fn decoded(frames: &[String]) -> Vec<Entity> {
        frames.iter().map(|frame| decode(frame).unwrap()).collect()
    }

    fn add_avatar(world: &mut ServerWorld, x: f32, y: f32) -> Uuid {
        let avatar = Avatar::new(Vector2::new(x, y));
        let id = avatar.id();
        world.avatars.insert(id, avatar);
        id
    }

    #[test]
    fn test_update_merges_and_relays_verbatim() {
        let mut world = world();
        let id = add_avatar(&mut world, 100.0, 100.0);

        let raw = format!(
            r#"{{"id":"{}","class_name":"Avatar","action":"","position":{{"x":105.0,"y":100.0}}}}"#,
            id
        );
        let out = world.tick(vec![raw_from(1, &raw)], &[], Duration::ZERO);

        assert_eq!(world.avatars[&id].position, Vector2::new(105.0, 100.0));
        assert_eq!(out, vec![raw]);
    }

    #[test]
    fn test_update_keeps_canonical_score() {
        let mut world = world();
        let id = add_avatar(&mut world, 100.0, 100.0);
        world.avatars.get_mut(&id).unwrap().score = 5;

        let mut incoming = world.avatars[&id].clone();
        incoming.envelope.action = Action::Update;
        incoming.score = 99;
        incoming.speed = 1.0;
        world.tick(vec![from(1, &incoming)], &[], Duration::ZERO);

        assert_eq!(world.avatars[&id].score, 5);
        assert_eq!(world.avatars[&id].speed, 1.0);
    }

    #[test]
    fn test_same_update_twice_is_idempotent() {
        let mut world = world();
        let mut avatar = Avatar::new(Vector2::new(50.0, 60.0));
        avatar.rotation = 1.0;
        let message = from(1, &avatar);

        world.tick(vec![message.clone()], &[], Duration::ZERO);
        let once = world.avatars[&avatar.id()].clone();
        world.tick(vec![message], &[], Duration::ZERO);

        assert_eq!(world.avatars[&avatar.id()], once);
        assert_eq!(world.avatars.len(), 1);
    }

    #[test]
    fn test_new_avatar_is_inserted() {
        let mut world = world();
        let avatar = Avatar::new(Vector2::new(10.0, 10.0));

        let out = world.tick(vec![from(3, &avatar)], &[], Duration::ZERO);

        assert!(world.avatars.contains_key(&avatar.id()));
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).unwrap().id(), avatar.id());
    }

    #[test]
    fn test_projectile_hit_penalizes_and_deletes() {
        let mut world = world();
        let id = add_avatar(&mut world, 100.0, 100.0);
        {
            let avatar = world.avatars.get_mut(&id).unwrap();
            avatar.speed = 2.0;
            avatar.score = 3;
        }
        let projectile = Projectile::new(world.avatars[&id].center(), 0.0);
        let projectile_id = projectile.id();
        world.projectiles.insert(projectile_id, projectile);

        let out = decoded(&world.tick(Vec::new(), &[], Duration::ZERO));

        assert!(world.projectiles.is_empty());
        assert!(world.is_deleted(&projectile_id));
        assert_eq!(world.avatars[&id].speed, 0.0);
        assert_eq!(world.avatars[&id].score, 3 - HIT_PENALTY);

        assert!(out
            .iter()
            .any(|e| e.id() == projectile_id && e.action() == Action::Delete));
        assert!(out.iter().any(|e| matches!(
            e,
            Entity::Avatar(a) if a.id() == id
                && a.score == 3 - HIT_PENALTY
                && a.envelope.action == Action::Score
        )));
    }

    #[test]
    fn test_one_hit_per_avatar_per_tick() {
        let mut world = world();
        let id = add_avatar(&mut world, 100.0, 100.0);
        let center = world.avatars[&id].center();
        for _ in 0..2 {
            let projectile = Projectile::new(center, 0.0);
            world.projectiles.insert(projectile.id(), projectile);
        }

        world.tick(Vec::new(), &[], Duration::ZERO);

        assert_eq!(world.projectiles.len(), 1);
        assert_eq!(world.avatars[&id].score, -HIT_PENALTY);
    }

    #[test]
    fn test_pickup_collection_scores() {
        let mut world = world();
        let id = add_avatar(&mut world, 200.0, 200.0);
        let pickup = Pickup::new(Vector2::new(210.0, 205.0));
        let pickup_id = pickup.id();
        world.pickups.insert(pickup_id, pickup);

        let out = decoded(&world.tick(Vec::new(), &[], Duration::ZERO));

        assert!(world.pickups.is_empty());
        assert_eq!(world.avatars[&id].score, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), pickup_id);
        assert_eq!(out[0].action(), Action::Delete);
        assert_eq!(out[1].id(), id);
        assert_eq!(out[1].action(), Action::Score);
    }

    #[test]
    fn test_fire_spawns_projectile_without_relay() {
        let mut world = world();
        let mut avatar = Avatar::new(Vector2::new(300.0, 300.0));
        avatar.envelope.action = Action::Fire;

        let out = decoded(&world.tick(vec![from(1, &avatar)], &[], Duration::ZERO));

        assert_eq!(world.projectiles.len(), 1);
        assert_eq!(out.len(), 1);
        let Entity::Projectile(projectile) = &out[0] else {
            panic!("expected a projectile, got {:?}", out[0]);
        };
        assert_eq!(projectile.envelope.action, Action::Spawn);
        assert_eq!(projectile.envelope.class_name, EntityKind::Projectile);

        let (muzzle, _) = avatar.muzzle();
        assert_approx_eq!(projectile.position.x, muzzle.x - PROJECTILE_SIZE / 2.0, 1e-3);
        assert_approx_eq!(projectile.position.y, muzzle.y - PROJECTILE_SIZE / 2.0, 1e-3);

        // The shooter becomes known to the world
        assert_eq!(world.avatars[&avatar.id()].envelope.action, Action::Update);
    }

    #[test]
    fn test_projectile_expires() {
        let mut world = world();
        let mut projectile = Projectile::new(Vector2::new(400.0, 300.0), 0.0);
        projectile.life = 1;
        let projectile_id = projectile.id();
        world.projectiles.insert(projectile_id, projectile);

        let out = decoded(&world.tick(Vec::new(), &[], NOMINAL_FRAME));

        assert!(world.projectiles.is_empty());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), projectile_id);
        assert_eq!(out[0].action(), Action::Delete);
    }

    #[test]
    fn test_deleted_id_is_ignored() {
        let mut world = world();
        let mut avatar = Avatar::new(Vector2::new(10.0, 10.0));
        world.tick(vec![from(1, &avatar)], &[], Duration::ZERO);

        avatar.envelope.action = Action::Delete;
        let out = world.tick(vec![from(1, &avatar)], &[], Duration::ZERO);
        assert_eq!(out.len(), 1);
        assert!(world.avatars.is_empty());

        avatar.envelope.action = Action::Update;
        let out = world.tick(vec![from(1, &avatar)], &[], Duration::ZERO);
        assert!(out.is_empty());
        assert!(world.avatars.is_empty());
    }

    #[test]
    fn test_bad_frames_are_dropped_and_stream_continues() {
        let mut world = world();
        let avatar = Avatar::new(Vector2::new(10.0, 10.0));
        let unknown_kind = format!(r#"{{"id":"{}","class_name":"Ghost"}}"#, Uuid::new_v4());
        let unknown_action = format!(
            r#"{{"id":"{}","class_name":"Avatar","action":"Dance"}}"#,
            Uuid::new_v4()
        );

        let out = world.tick(
            vec![
                raw_from(1, "not json"),
                raw_from(1, &unknown_kind),
                raw_from(1, &unknown_action),
                from(1, &avatar),
            ],
            &[],
            Duration::ZERO,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(world.avatars.len(), 1);
        assert!(world.avatars.contains_key(&avatar.id()));
    }

    #[test]
    fn test_client_cannot_spawn_server_owned_kinds() {
        let mut world = world();
        let pickup = Pickup::new(Vector2::new(10.0, 10.0));
        let projectile = Projectile::new(Vector2::new(10.0, 10.0), 0.0);

        let out = world.tick(
            vec![from(1, &pickup), from(1, &projectile)],
            &[],
            Duration::ZERO,
        );

        assert!(out.is_empty());
        assert!(world.pickups.is_empty());
        assert!(world.projectiles.is_empty());
    }

    #[test]
    fn test_edit_and_submit_are_dropped() {
        let mut world = world();
        let mut avatar = Avatar::new(Vector2::new(10.0, 10.0));
        avatar.envelope.action = Action::Edit;
        let mut submitted = avatar.clone();
        submitted.envelope.action = Action::Submit;

        let out = world.tick(
            vec![from(1, &avatar), from(1, &submitted)],
            &[],
            Duration::ZERO,
        );

        assert!(out.is_empty());
        assert!(world.avatars.is_empty());
    }

    #[test]
    fn test_departed_peer_avatar_is_deleted() {
        let mut world = world();
        let mine = Avatar::new(Vector2::new(10.0, 10.0));
        let theirs = Avatar::new(Vector2::new(400.0, 400.0));
        world.tick(vec![from(1, &mine), from(2, &theirs)], &[], Duration::ZERO);

        let out = decoded(&world.tick(Vec::new(), &[PeerId(1)], Duration::ZERO));

        assert!(!world.avatars.contains_key(&mine.id()));
        assert!(world.avatars.contains_key(&theirs.id()));
        assert!(world.is_deleted(&mine.id()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), mine.id());
        assert_eq!(out[0].action(), Action::Delete);
    }

    #[test]
    fn test_spawn_and_departure_in_same_tick() {
        let mut world = world();
        let avatar = Avatar::new(Vector2::new(10.0, 10.0));

        let out = decoded(&world.tick(vec![from(1, &avatar)], &[PeerId(1)], Duration::ZERO));

        assert!(world.avatars.is_empty());
        assert!(world.is_deleted(&avatar.id()));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].action(), Action::Spawn);
        assert_eq!(out[1].id(), avatar.id());
        assert_eq!(out[1].action(), Action::Delete);

        for _ in 0..10 {
            world.tick(Vec::new(), &[], NOMINAL_FRAME);
        }
        assert!(world.avatars.is_empty());
    }

    #[test]
    fn test_frames_after_departure_are_dropped() {
        let mut world = world();
        world.tick(Vec::new(), &[PeerId(1)], Duration::ZERO);

        let late = Avatar::new(Vector2::new(10.0, 10.0));
        let out = world.tick(vec![from(1, &late)], &[], Duration::ZERO);

        assert!(out.is_empty());
        assert!(world.avatars.is_empty());
    }

    #[test]
    fn test_pickups_spawn_on_interval_up_to_cap() {
        let mut world = ServerWorld::with_seed(2, Duration::from_secs(1), 42);

        let out = world.tick(Vec::new(), &[], Duration::from_millis(500));
        assert!(out.is_empty());

        let mut spawned = 0;
        for _ in 0..4 {
            let out = decoded(&world.tick(Vec::new(), &[], Duration::from_secs(1)));
            spawned += out
                .iter()
                .filter(|e| e.kind() == EntityKind::Pickup && e.action() == Action::Spawn)
                .count();
        }

        assert_eq!(spawned, 2);
        assert_eq!(world.pickups.len(), 2);
        for pickup in world.pickups.values() {
            assert!(pickup.position.x >= 0.0 && pickup.position.x <= WORLD_WIDTH - PICKUP_SIZE);
            assert!(pickup.position.y >= 0.0 && pickup.position.y <= WORLD_HEIGHT - PICKUP_SIZE);
        }
    }

    #[test]
    fn test_motion_between_updates() {
        let mut world = world();
        let id = add_avatar(&mut world, 100.0, 100.0);
        world.avatars.get_mut(&id).unwrap().speed = 3.0;

        world.tick(Vec::new(), &[], NOMINAL_FRAME);

        assert_approx_eq!(world.avatars[&id].position.y, 97.0, 1e-3);
        assert_eq!(world.tick, 1);
    }
}
