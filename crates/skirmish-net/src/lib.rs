//! Session-addressed messaging: identifiers, wire messages, the versioned
//! codec, and an in-process loopback hub.

pub mod hub;
pub mod ids;
pub mod messages;

pub use hub::{Envelope, HubError, HubStats, LoopbackHub, Origin, Target};
pub use ids::{NetworkId, SessionId};
pub use messages::{
    AvatarSnapshot, DamageRequest, DespawnEntity, EntityKind, FireCommand, GunTransform,
    HealthUpdate, LookSnapshot, LookUpdate, Message, MessageError, MovementCorrection,
    MovementUpdate, MuzzleFlash, PROTOCOL_VERSION, PlayerDied, ProjectileSnapshot, SpawnEntity,
    TerminalEvent, TerminalKind, Welcome, deserialize_message, serialize_message,
};
