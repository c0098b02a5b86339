//! Client-side replica of the world
//!
//! The client owns exactly one entity, its local avatar, and predicts it from
//! input every tick. Everything else is a best-effort mirror of what the
//! server broadcasts, extrapolated between messages.

use crate::input::{steer, Command, InputState};
use log::{debug, error, info, warn};
use shared::{
    decode, encode, ordered_ids, Action, Avatar, DecodeError, Entity, EntityKind, Pickup,
    Projectile, Synced, DEAD_RECKONING_THRESHOLD,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

/// Entities of one kind plus their derived iteration order
#[derive(Debug, Clone)]
pub struct ReplicaSet<T> {
    entities: HashMap<Uuid, T>,
    order: Vec<Uuid>,
}

impl<T: Synced> ReplicaSet<T> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&T> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ids in their stable order
    pub fn order(&self) -> &[Uuid] {
        &self.order
    }

    /// Entities in their stable order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Full-state replace of a known entity, or insertion of a new one
    fn upsert(&mut self, incoming: T) {
        let id = incoming.id();
        match self.entities.get_mut(&id) {
            Some(existing) => existing.copy_from(&incoming),
            None => {
                self.entities.insert(id, incoming);
                self.order = ordered_ids(&self.entities);
            }
        }
    }

    fn remove(&mut self, id: &Uuid) -> Option<T> {
        let removed = self.entities.remove(id);
        if removed.is_some() {
            self.order = ordered_ids(&self.entities);
        }
        removed
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.entities.values_mut()
    }
}

impl<T: Synced> Default for ReplicaSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Replica {
    pub tick: u64,
    /// The avatar this client controls
    pub local: Avatar,
    pub avatars: ReplicaSet<Avatar>,
    pub pickups: ReplicaSet<Pickup>,
    pub projectiles: ReplicaSet<Projectile>,
    deleted: HashSet<Uuid>,
    /// Whether the local avatar's Spawn has gone out
    announced: bool,
}

impl Replica {
    pub fn new(local: Avatar) -> Self {
        Self {
            tick: 0,
            local,
            avatars: ReplicaSet::new(),
            pickups: ReplicaSet::new(),
            projectiles: ReplicaSet::new(),
            deleted: HashSet::new(),
            announced: false,
        }
    }

    pub fn local_id(&self) -> Uuid {
        self.local.id()
    }

    pub fn is_deleted(&self, id: &Uuid) -> bool {
        self.deleted.contains(id)
    }

    /// Applies every frame in order, logging and skipping the ones that fail to decode.
    /// Returns how many were applied.
    pub fn apply_all(&mut self, frames: Vec<String>) -> usize {
        let mut applied = 0;
        for frame in frames {
            match self.apply(&frame) {
                Ok(()) => applied += 1,
                Err(e) => warn!("Dropping frame: {} ({})", e, frame),
            }
        }
        applied
    }

    /// Merges one authoritative frame into the replica
    pub fn apply(&mut self, raw: &str) -> Result<(), DecodeError> {
        let entity = decode(raw)?;
        let id = entity.id();

        if id == self.local.id() {
            match entity {
                Entity::Avatar(avatar) if avatar.envelope.action != Action::Delete => {
                    self.reconcile_local(&avatar)
                }
                other => debug!("Ignoring {:?} for the local avatar", other.action()),
            }
            return Ok(());
        }

        if self.deleted.contains(&id) {
            debug!("Ignoring {:?} for deleted entity {}", entity.action(), id);
            return Ok(());
        }

        if entity.action() == Action::Delete {
            self.deleted.insert(id);
            let removed = match entity.kind() {
                EntityKind::Avatar => self.avatars.remove(&id).is_some(),
                EntityKind::Pickup => self.pickups.remove(&id).is_some(),
                EntityKind::Projectile => self.projectiles.remove(&id).is_some(),
            };
            debug!("{} {} deleted (known: {})", entity.kind(), id, removed);
            return Ok(());
        }

        match entity {
            Entity::Avatar(avatar) => self.avatars.upsert(avatar),
            Entity::Pickup(pickup) => self.pickups.upsert(pickup),
            Entity::Projectile(projectile) => self.projectiles.upsert(projectile),
        }

        Ok(())
    }

    /// Takes the server-owned fields from server decisions and corrects
    /// position only on large drift.
    ///
    /// Frames this client sent come back relayed with state that is one round
    /// trip old, so only `Score` frames (pickups and hits) update score and
    /// cooldowns. Speed is taken only when the score dropped, which is a hit.
    fn reconcile_local(&mut self, authoritative: &Avatar) {
        if authoritative.envelope.action == Action::Score {
            if authoritative.score < self.local.score {
                self.local.speed = authoritative.speed;
            }
            if authoritative.score != self.local.score {
                info!("Score {} -> {}", self.local.score, authoritative.score);
            }
            self.local.score = authoritative.score;
            self.local.heat = authoritative.heat;
            self.local.load = authoritative.load;
        }

        let drift = self.local.position.distance(&authoritative.position);
        if drift > DEAD_RECKONING_THRESHOLD {
            info!("Local avatar drifted {:.1} units, snapping to server", drift);
            self.local.position = authoritative.position;
        }
    }

    /// Predicts the local avatar from input and returns the frame to send, if any.
    ///
    /// The first call always announces the avatar with a Spawn; after that a
    /// frame goes out only when the input changed something.
    pub fn control(&mut self, input: &InputState, elapsed: Duration) -> Option<String> {
        let command = steer(&mut self.local, input, elapsed);
        self.local.update(elapsed);

        let action = if !self.announced {
            Action::Spawn
        } else {
            match command {
                Command::Idle => return None,
                Command::Steer => Action::Update,
                Command::Fire => Action::Fire,
            }
        };

        self.local.envelope.action = action;
        let frame = match encode(&self.local) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode local avatar: {}", e);
                return None;
            }
        };
        self.local.envelope.action = Action::Update;
        self.announced = true;

        Some(frame)
    }

    /// Extrapolates remote entities and expires projectiles whose life ran out
    pub fn advance(&mut self, elapsed: Duration) {
        self.tick += 1;

        for avatar in self.avatars.values_mut() {
            avatar.update(elapsed);
        }
        for projectile in self.projectiles.values_mut() {
            projectile.update(elapsed);
        }

        let expired: Vec<Uuid> = self
            .projectiles
            .iter()
            .filter(|projectile| projectile.is_expired())
            .map(Synced::id)
            .collect();
        for id in expired {
            self.projectiles.remove(&id);
            self.deleted.insert(id);
        }
    }
}
