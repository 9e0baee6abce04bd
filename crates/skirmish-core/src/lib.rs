//! Server-authoritative state replication for a two-team arena shooter:
//! ownership and write permissions, owner-side prediction with server
//! validation, remote interpolation, projectiles that resolve exactly once,
//! replicated health, and the death and respawn countdown.

pub mod authority;
pub mod client;
pub mod collision;
pub mod death;
pub mod field;
pub mod harness;
pub mod health;
pub mod interpolation;
pub mod movement;
pub mod prediction;
pub mod projectile;
pub mod reconciliation;
pub mod registry;
pub mod schedule;
pub mod server;
pub mod session;
pub mod weapon;

pub use authority::{AuthorityResolver, Role};
pub use client::{ClientEffect, ClientSim, EYE_HEIGHT, FrameInput, RemoteAvatar};
pub use collision::{ArenaWorld, CollisionQuery, Contact, SurfaceTag};
pub use death::{CountdownCue, CountdownSequence, DeathDirector, DeathPhase, SpawnSide};
pub use field::{FieldError, ReplicatedField, SubscriptionId, WritePolicy};
pub use harness::LoopbackMatch;
pub use health::{DamageOutcome, Health, HealthError, LifeState};
pub use interpolation::{ProjectileObserver, RemoteGun, RemoteLook, RemoteTransform};
pub use movement::{MoveInput, MoveState};
pub use prediction::{CorrectionSmoothing, GunFollower, LookState, OwnerAvatar};
pub use projectile::{Projectile, ProjectilePhase, StepOutcome};
pub use reconciliation::{MoveVerdict, MovementValidator};
pub use registry::{EntityRegistry, NetTransform, Transform};
pub use schedule::{Scheduler, TickSchedule};
pub use server::{Aim, MatchStats, ServerSim};
pub use session::{GateAction, MatchGate, SessionInfo, SessionTable};
pub use weapon::{TriggerInput, WeaponEvent, WeaponState};
