//! Authoritative health.
//!
//! Health is a server-written [`ReplicatedField`] clamped to `[0, max]`.
//! Each life sees exactly one alive → dead edge; damage arriving after it is
//! a no-op until [`Health::reset`] starts the next life.

use bevy_ecs::prelude::*;
use skirmish_net::NetworkId;

use crate::authority::{AuthorityResolver, Role};
use crate::field::{FieldError, ReplicatedField, WritePolicy};
use crate::registry::EntityRegistry;

/// Errors from the authoritative damage path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HealthError {
    /// Damage was requested on a process that is not the server.
    #[error("damage can only be applied on the server")]
    NotAuthoritative,
    /// No such entity.
    #[error("unknown entity {0}")]
    UnknownEntity(NetworkId),
    /// The field rejected the write.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Life of the current health record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    /// Health above zero.
    Alive,
    /// The death edge has fired for this life.
    Dead,
}

/// Result of one damage application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Health dropped but stayed above zero.
    Applied {
        /// Health after the hit.
        health: f32,
    },
    /// This hit crossed the alive → dead edge.
    Died,
    /// The target was already dead.
    AlreadyDead,
    /// Non-positive or non-finite amount.
    Ignored,
    /// The target carries no health.
    NoHealth,
}

impl DamageOutcome {
    /// Returns `true` if health changed.
    pub fn landed(&self) -> bool {
        matches!(self, DamageOutcome::Applied { .. } | DamageOutcome::Died)
    }
}

/// Per-avatar health record.
#[derive(Component, Debug)]
pub struct Health {
    value: ReplicatedField<f32>,
    max: f32,
    life: LifeState,
}

impl Health {
    /// Full health.
    pub fn new(max: f32) -> Self {
        let max = max.max(0.0);
        Self {
            value: ReplicatedField::new(max, WritePolicy::ServerOnly),
            max,
            life: LifeState::Alive,
        }
    }

    /// Current health.
    pub fn current(&self) -> f32 {
        *self.value.get()
    }

    /// Maximum health.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Life state.
    pub fn life(&self) -> LifeState {
        self.life
    }

    /// Returns `true` while alive.
    pub fn is_alive(&self) -> bool {
        self.life == LifeState::Alive
    }

    /// Sequence of the last change, carried by health broadcasts.
    pub fn sequence(&self) -> u64 {
        self.value.sequence()
    }

    /// The replicated field, for change subscriptions.
    pub fn field_mut(&mut self) -> &mut ReplicatedField<f32> {
        &mut self.value
    }

    /// Subtracts `amount`, clamped to `[0, max]`.
    pub fn apply_damage(&mut self, role: Role, amount: f32) -> Result<DamageOutcome, FieldError> {
        self.check_writer(role)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Ok(DamageOutcome::Ignored);
        }
        if self.life == LifeState::Dead {
            return Ok(DamageOutcome::AlreadyDead);
        }
        let health = (self.current() - amount).clamp(0.0, self.max);
        self.value.set(role, health)?;
        if health <= 0.0 {
            self.life = LifeState::Dead;
            Ok(DamageOutcome::Died)
        } else {
            Ok(DamageOutcome::Applied { health })
        }
    }

    /// Adds `amount`, clamped to `max`. The dead stay dead until reset.
    pub fn heal(&mut self, role: Role, amount: f32) -> Result<f32, FieldError> {
        self.check_writer(role)?;
        if self.life == LifeState::Alive && amount.is_finite() && amount > 0.0 {
            let health = (self.current() + amount).clamp(0.0, self.max);
            self.value.set(role, health)?;
        }
        Ok(self.current())
    }

    /// Restores full health and starts a new life.
    pub fn reset(&mut self, role: Role) -> Result<(), FieldError> {
        self.check_writer(role)?;
        self.value.set(role, self.max)?;
        self.life = LifeState::Alive;
        Ok(())
    }

    /// Applies a broadcast value on a reading session. Returns `false` for
    /// stale updates.
    pub fn apply_remote(&mut self, sequence: u64, health: f32, max: f32) -> bool {
        if !health.is_finite() || !max.is_finite() {
            return false;
        }
        if !self.value.apply_remote(sequence, health.clamp(0.0, max.max(0.0))) {
            return false;
        }
        self.max = max.max(0.0);
        self.life = if self.current() > 0.0 {
            LifeState::Alive
        } else {
            LifeState::Dead
        };
        true
    }

    fn check_writer(&self, role: Role) -> Result<(), FieldError> {
        if self.value.policy().permits(role) {
            Ok(())
        } else {
            Err(FieldError::WriteDenied {
                policy: self.value.policy(),
                role,
            })
        }
    }
}

/// The only entry point for damage: callable on the server, from projectile
/// resolution or a routed client request.
pub fn take_damage_on_server(
    authority: &AuthorityResolver,
    registry: &mut EntityRegistry,
    target: NetworkId,
    amount: f32,
) -> Result<DamageOutcome, HealthError> {
    if !authority.is_authoritative() {
        return Err(HealthError::NotAuthoritative);
    }
    if !registry.contains(target) {
        return Err(HealthError::UnknownEntity(target));
    }
    let Some(mut health) = registry.get_mut::<Health>(target) else {
        tracing::debug!(%target, "damage on entity without health");
        return Ok(DamageOutcome::NoHealth);
    };
    let outcome = health.apply_damage(Role::SERVER, amount)?;
    if outcome == DamageOutcome::Died {
        tracing::info!(%target, "avatar died");
    }
    Ok(outcome)
}
