//! Identity envelope carried by every wire message, and the two-phase decoder
//! that routes a raw frame to the schema of its entity kind.
//!
//! Phase one reads only `id`, `class_name` and `action`, tolerating any other
//! fields. Phase two decodes the whole frame with the schema picked by the
//! kind tag. Unknown kinds and actions surface as [`DecodeError`] values so
//! the caller can log and drop the frame without tearing down the stream.

use crate::entity::{Avatar, Pickup, Projectile};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Closed set of entity schemas that can travel on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Avatar,
    Pickup,
    Projectile,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Avatar => "Avatar",
            EntityKind::Pickup => "Pickup",
            EntityKind::Projectile => "Projectile",
        }
    }
}

impl FromStr for EntityKind {
    type Err = DecodeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Avatar" => Ok(EntityKind::Avatar),
            "Pickup" => Ok(EntityKind::Pickup),
            "Projectile" => Ok(EntityKind::Projectile),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic intent of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    Spawn,
    /// Plain state update; also what an empty or missing action means
    #[default]
    Update,
    Fire,
    Delete,
    Score,
    Edit,
    Submit,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Spawn => "Spawn",
            Action::Update => "Update",
            Action::Fire => "Fire",
            Action::Delete => "Delete",
            Action::Score => "Score",
            Action::Edit => "Edit",
            Action::Submit => "Submit",
        }
    }
}

impl FromStr for Action {
    type Err = DecodeError;

    /// Case-insensitive; older peers send `FIRE`, `DELETE` and `NONE`
    fn from_str(verb: &str) -> Result<Self, Self::Err> {
        match verb.to_ascii_lowercase().as_str() {
            "" | "none" | "update" => Ok(Action::Update),
            "spawn" => Ok(Action::Spawn),
            "fire" => Ok(Action::Fire),
            "delete" => Ok(Action::Delete),
            "score" => Ok(Action::Score),
            "edit" => Ok(Action::Edit),
            "submit" => Ok(Action::Submit),
            _ => Err(DecodeError::UnknownAction(verb.to_string())),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let verb = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        verb.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity header shared by every entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Assigned once at creation, never reused
    pub id: Uuid,
    pub class_name: EntityKind,
    #[serde(default)]
    pub action: Action,
}

impl Envelope {
    /// Fresh identity for a newly created entity of `kind`
    pub fn spawn(kind: EntityKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_name: kind,
            action: Action::Spawn,
        }
    }
}

/// Errors produced while decoding a wire frame. None of them are fatal to a connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown entity kind `{0}`")]
    UnknownKind(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    id: Uuid,
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    action: Option<String>,
}

/// Phase one: decodes only the identity envelope
pub fn peek(raw: &str) -> Result<Envelope, DecodeError> {
    let header: RawEnvelope = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let class_name = header.class_name.parse()?;
    let action = header.action.as_deref().unwrap_or_default().parse()?;

    Ok(Envelope {
        id: header.id,
        class_name,
        action,
    })
}

/// Decodes a frame into the entity schema selected by its kind tag
pub fn decode(raw: &str) -> Result<Entity, DecodeError> {
    let envelope = peek(raw)?;
    let kind = envelope.class_name;
    let payload = |source| DecodeError::Payload { kind, source };

    let entity = match kind {
        EntityKind::Avatar => Entity::Avatar(serde_json::from_str(raw).map_err(payload)?),
        EntityKind::Pickup => Entity::Pickup(serde_json::from_str(raw).map_err(payload)?),
        EntityKind::Projectile => {
            Entity::Projectile(serde_json::from_str(raw).map_err(payload)?)
        }
    };

    Ok(entity)
}

/// A decoded message, one variant per entity kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Avatar(Avatar),
    Pickup(Pickup),
    Projectile(Projectile),
}

impl Entity {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Entity::Avatar(avatar) => &avatar.envelope,
            Entity::Pickup(pickup) => &pickup.envelope,
            Entity::Projectile(projectile) => &projectile.envelope,
        }
    }

    pub fn id(&self) -> Uuid {
        self.envelope().id
    }

    pub fn kind(&self) -> EntityKind {
        self.envelope().class_name
    }

    pub fn action(&self) -> Action {
        self.envelope().action
    }
}

/// Encodes any entity (or [`Entity`]) as one text frame
pub fn encode<T: Serialize>(entity: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(entity)
}
