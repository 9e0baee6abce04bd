//! Network message types and serialization.
//!
//! All messages are serialized with [`postcard`] and prefixed with a protocol
//! version byte. Use [`serialize_message`] and [`deserialize_message`] for
//! encoding/decoding.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::ids::{NetworkId, SessionId};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Top-level network message. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    // --- Owner → server ---
    /// Raw movement input plus the owner's resulting local state.
    MovementUpdate(MovementUpdate),
    /// Look input plus the owner's resulting pitch/yaw.
    LookUpdate(LookUpdate),
    /// Owner-positioned held gun transform.
    GunTransform(GunTransform),
    /// Request to spawn a projectile.
    FireCommand(FireCommand),
    /// Client-side damage report, re-routed through the authoritative path.
    DamageRequest(DamageRequest),

    // --- Server → sessions ---
    /// Sent once to a freshly-connected session.
    Welcome(Welcome),
    /// A replicated entity came into existence.
    SpawnEntity(SpawnEntity),
    /// Periodic authoritative avatar state.
    AvatarSnapshot(AvatarSnapshot),
    /// Authoritative look rotation for non-owners.
    LookSnapshot(LookSnapshot),
    /// Authoritative gun transform for non-owners.
    GunSnapshot(GunTransform),
    /// Sent to the owner when its reported movement was rejected.
    MovementCorrection(MovementCorrection),
    /// Periodic authoritative projectile state.
    ProjectileSnapshot(ProjectileSnapshot),
    /// A projectile resolved; play the effect.
    TerminalEvent(TerminalEvent),
    /// A replicated entity was removed.
    DespawnEntity(DespawnEntity),
    /// A shot was fired; play the muzzle effect.
    MuzzleFlash(MuzzleFlash),
    /// Replicated health value changed.
    HealthChanged(HealthUpdate),
    /// Enable or disable local input on every session.
    InputEnabled(bool),
    /// An avatar died; the respawn sequence is underway.
    PlayerDied(PlayerDied),
    /// Every avatar returns to its side's spawn point.
    RespawnAll,
    /// Start the 3-2-1-GO countdown locally.
    CountdownStart,
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Movement input and the owner's predicted result for one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementUpdate {
    /// Avatar being driven.
    pub entity: NetworkId,
    /// Owner-side sequence number (one per tick).
    pub sequence: u32,
    /// Raw movement axes (x = strafe, y = forward).
    pub input: Vec2,
    /// Jump held this tick.
    pub jump: bool,
    /// Orientation yaw (degrees) used for the movement basis.
    pub yaw_deg: f32,
    /// Owner's resulting position.
    pub position: Vec3,
    /// Owner's resulting velocity.
    pub velocity: Vec3,
}

/// Look input and the owner's resulting rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookUpdate {
    /// Avatar whose camera is turning.
    pub entity: NetworkId,
    /// Owner-side sequence number.
    pub sequence: u32,
    /// Raw look delta.
    pub input: Vec2,
    /// Resulting pitch in degrees.
    pub pitch_deg: f32,
    /// Resulting yaw in degrees.
    pub yaw_deg: f32,
}

/// Held gun transform (owner → server, server → non-owners).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GunTransform {
    /// The gun entity.
    pub entity: NetworkId,
    /// Sequence number (owner-side or server tick).
    pub sequence: u32,
    /// World position.
    pub position: Vec3,
    /// World rotation.
    pub rotation: Quat,
}

/// Fire command: origin, direction and up vector of the shot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FireCommand {
    /// The gun firing.
    pub gun: NetworkId,
    /// Muzzle position.
    pub origin: Vec3,
    /// Normalized shot direction (spread already applied).
    pub direction: Vec3,
    /// Camera up vector, used for the upward impulse.
    pub up: Vec3,
}

/// Damage reported by a client against an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DamageRequest {
    /// Entity to damage.
    pub target: NetworkId,
    /// Damage amount.
    pub amount: f32,
}

/// Connection acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Welcome {
    /// The session's stable identity.
    pub session: SessionId,
    /// Whether this session shares the process with the server.
    pub is_server: bool,
    /// Current server tick.
    pub server_tick: u64,
}

/// What kind of entity a [`SpawnEntity`] describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntityKind {
    /// A player body.
    Avatar,
    /// A held gun attached to an avatar.
    Gun,
    /// A projectile in flight.
    Projectile {
        /// Area-of-effect (`true`) or direct-hit (`false`).
        explosive: bool,
    },
}

/// A replicated entity came into existence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnEntity {
    /// The entity's network identifier.
    pub entity: NetworkId,
    /// Entity kind.
    pub kind: EntityKind,
    /// Owning session (none for projectiles).
    pub owner: Option<SessionId>,
    /// Initial position.
    pub position: Vec3,
    /// Initial rotation.
    pub rotation: Quat,
    /// Initial velocity.
    pub velocity: Vec3,
}

/// Authoritative avatar state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvatarSnapshot {
    /// The avatar.
    pub entity: NetworkId,
    /// Sequence of the server's transform field. Readers drop snapshots
    /// older than the one they show.
    pub tick: u64,
    /// Position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Body rotation (yaw only).
    pub rotation: Quat,
}

/// Authoritative look rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookSnapshot {
    /// The avatar.
    pub entity: NetworkId,
    /// Owner sequence of the look it forwards.
    pub tick: u64,
    /// Pitch in degrees.
    pub pitch_deg: f32,
    /// Yaw in degrees.
    pub yaw_deg: f32,
}

/// Server correction of a rejected owner movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementCorrection {
    /// The avatar.
    pub entity: NetworkId,
    /// The owner sequence this correction answers.
    pub sequence: u32,
    /// Authoritative position.
    pub position: Vec3,
    /// Authoritative velocity.
    pub velocity: Vec3,
}

/// Authoritative projectile state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectileSnapshot {
    /// The projectile.
    pub entity: NetworkId,
    /// Server tick.
    pub tick: u64,
    /// Position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Rotation (aligned with the flight direction).
    pub rotation: Quat,
}

/// Terminal transition kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TerminalKind {
    /// Detonated on contact or after too many bounces.
    Exploded,
    /// Direct hit on a body or a blocking surface.
    HitTarget,
    /// Lifetime ran out.
    Expired {
        /// Explosive projectiles still detonate on expiry.
        detonated: bool,
    },
}

/// A projectile reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalEvent {
    /// The projectile.
    pub entity: NetworkId,
    /// How it resolved.
    pub kind: TerminalKind,
    /// Impact (or expiry) point.
    pub point: Vec3,
}

/// A replicated entity was removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DespawnEntity {
    /// The entity's network identifier.
    pub entity: NetworkId,
}

/// Muzzle effect broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MuzzleFlash {
    /// The session that fired.
    pub shooter: SessionId,
    /// The gun that fired.
    pub gun: NetworkId,
    /// Muzzle position.
    pub position: Vec3,
    /// Muzzle rotation.
    pub rotation: Quat,
}

/// Replicated health value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthUpdate {
    /// The avatar.
    pub entity: NetworkId,
    /// Sequence of the health field.
    pub tick: u64,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max: f32,
}

/// Death notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDied {
    /// The avatar that died.
    pub victim: NetworkId,
}

impl Message {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Message::MovementUpdate(_) => "MovementUpdate",
            Message::LookUpdate(_) => "LookUpdate",
            Message::GunTransform(_) => "GunTransform",
            Message::FireCommand(_) => "FireCommand",
            Message::DamageRequest(_) => "DamageRequest",
            Message::Welcome(_) => "Welcome",
            Message::SpawnEntity(_) => "SpawnEntity",
            Message::AvatarSnapshot(_) => "AvatarSnapshot",
            Message::LookSnapshot(_) => "LookSnapshot",
            Message::GunSnapshot(_) => "GunSnapshot",
            Message::MovementCorrection(_) => "MovementCorrection",
            Message::ProjectileSnapshot(_) => "ProjectileSnapshot",
            Message::TerminalEvent(_) => "TerminalEvent",
            Message::DespawnEntity(_) => "DespawnEntity",
            Message::MuzzleFlash(_) => "MuzzleFlash",
            Message::HealthChanged(_) => "HealthChanged",
            Message::InputEnabled(_) => "InputEnabled",
            Message::PlayerDied(_) => "PlayerDied",
            Message::RespawnAll => "RespawnAll",
            Message::CountdownStart => "CountdownStart",
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during message deserialization.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload had no version byte.
    #[error("empty payload: no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The body failed to decode.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a [`Message`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded Message]`
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`Message`].
pub fn deserialize_message(data: &[u8]) -> Result<Message, MessageError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(MessageError::EmptyPayload);
    };
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
