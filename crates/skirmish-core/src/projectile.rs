//! Projectile lifecycle: spawn, flight, one terminal transition, despawn.
//!
//! Only the server steps a [`Projectile`]. Each step sweeps the flight path
//! so fast projectiles cannot tunnel, reports damage for the server to apply,
//! and emits periodic snapshots while in flight. Terminal transitions are
//! guarded by the [`ProjectilePhase`] itself: once a projectile has left
//! `InFlight` every further contact is ignored, so at most one of exploded,
//! hit or expired ever happens and despawn happens exactly once.

use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use rustc_hash::FxHashSet;
use skirmish_config::ProjectileConfig;
use skirmish_net::{NetworkId, ProjectileSnapshot, TerminalEvent, TerminalKind};

use crate::collision::{CollisionQuery, Contact, QueryFilter};

/// Gap kept between a bounced projectile and the surface.
const BOUNCE_SKIN: f32 = 0.01;

/// Area damage at `distance` from an explosion: `base × clamp(1 − d/r, 0, 1)`.
pub fn explosion_damage(base: f32, distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    base * (1.0 - distance / radius).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Phase & outputs
// ---------------------------------------------------------------------------

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectilePhase {
    /// Created, impulse not yet applied.
    Spawned,
    /// Integrating and sweeping each step.
    InFlight,
    /// Resolved; waiting out the despawn delay.
    Terminal {
        /// How it resolved.
        kind: TerminalKind,
        /// Where.
        point: Vec3,
        /// Seconds until despawn.
        despawn_in: f32,
    },
    /// Gone.
    Despawned,
}

/// Damage the server must apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    /// Entity to damage.
    pub target: NetworkId,
    /// Amount.
    pub amount: f32,
}

/// What one contact did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactResult {
    /// The projectile was no longer in flight.
    Ignored,
    /// A penetrating projectile passed through a body.
    PassThrough,
    /// Bounced off the surface.
    Bounced,
    /// Caused the terminal transition.
    Resolved,
}

/// Everything one step produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// Damage to apply, in contact order.
    pub damage: Vec<DamageEvent>,
    /// The terminal transition, at most once per projectile.
    pub terminal: Option<TerminalEvent>,
    /// Observer snapshot due this step.
    pub snapshot: Option<ProjectileSnapshot>,
    /// The projectile must be despawned now.
    pub despawn: bool,
}

// ---------------------------------------------------------------------------
// Projectile
// ---------------------------------------------------------------------------

/// Server-side projectile state.
#[derive(Component, Debug, Clone)]
pub struct Projectile {
    id: NetworkId,
    config: ProjectileConfig,
    shooter: Option<NetworkId>,
    position: Vec3,
    velocity: Vec3,
    age: f32,
    collisions: u32,
    since_sync: f32,
    damaged: FxHashSet<NetworkId>,
    phase: ProjectilePhase,
}

impl Projectile {
    /// A projectile at rest at `position`. `shooter` is the firing avatar,
    /// which the flight sweep never touches.
    pub fn new(
        id: NetworkId,
        config: ProjectileConfig,
        position: Vec3,
        shooter: Option<NetworkId>,
    ) -> Self {
        Self {
            id,
            config,
            shooter,
            position,
            velocity: Vec3::ZERO,
            age: 0.0,
            collisions: 0,
            since_sync: 0.0,
            damaged: FxHashSet::default(),
            phase: ProjectilePhase::Spawned,
        }
    }

    /// Applies the launch impulse and enters flight. Only the first call
    /// has any effect.
    pub fn launch(&mut self, impulse: Vec3) -> bool {
        if self.phase != ProjectilePhase::Spawned {
            return false;
        }
        self.velocity += impulse;
        self.phase = ProjectilePhase::InFlight;
        true
    }

    /// Network id.
    pub fn id(&self) -> NetworkId {
        self.id
    }

    /// Tuning.
    pub fn config(&self) -> &ProjectileConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn phase(&self) -> ProjectilePhase {
        self.phase
    }

    /// Position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Velocity.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Contacts counted so far.
    pub fn collisions(&self) -> u32 {
        self.collisions
    }

    /// Rotation aligned with the flight direction.
    pub fn rotation(&self) -> Quat {
        let dir = self.velocity.normalize_or_zero();
        if dir == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::Z, dir)
        }
    }

    /// How it resolved, once it has.
    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        match self.phase {
            ProjectilePhase::Terminal { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Returns `true` once the projectile has left flight.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.phase,
            ProjectilePhase::Terminal { .. } | ProjectilePhase::Despawned
        )
    }

    /// Advances one server step.
    pub fn step(
        &mut self,
        dt: f32,
        gravity: f32,
        tick: u64,
        world: &dyn CollisionQuery,
    ) -> StepOutcome {
        let mut out = StepOutcome::default();
        match self.phase {
            ProjectilePhase::Spawned | ProjectilePhase::Despawned => {}
            ProjectilePhase::InFlight => self.fly(dt, gravity, tick, world, &mut out),
            ProjectilePhase::Terminal { .. } => {
                if let ProjectilePhase::Terminal { despawn_in, .. } = &mut self.phase {
                    *despawn_in -= dt;
                    if *despawn_in <= 0.0 {
                        self.phase = ProjectilePhase::Despawned;
                        out.despawn = true;
                        tracing::trace!(projectile = %self.id, "despawned");
                    }
                }
            }
        }
        out
    }

    fn fly(
        &mut self,
        dt: f32,
        gravity: f32,
        tick: u64,
        world: &dyn CollisionQuery,
        out: &mut StepOutcome,
    ) {
        self.age += dt;
        if self.age >= self.config.lifetime_secs {
            let kind = TerminalKind::Expired {
                detonated: self.config.explosive,
            };
            self.terminate(kind, self.position, world, out);
            return;
        }

        if self.config.use_gravity {
            self.velocity.y += gravity * dt;
        }
        let from = self.position;
        let to = from + self.velocity * dt;
        let filter = self
            .shooter
            .map_or(QueryFilter::ALL, QueryFilter::excluding);

        let mut bounced = false;
        for contact in world.sweep_sphere(from, to, self.config.collider_radius, filter) {
            match self.handle_contact(&contact, world, out) {
                ContactResult::Bounced => {
                    bounced = true;
                    break;
                }
                ContactResult::Ignored
                | ContactResult::PassThrough
                | ContactResult::Resolved => {}
            }
        }

        if self.phase != ProjectilePhase::InFlight {
            return;
        }
        if !bounced {
            self.position = to;
        }

        self.since_sync += dt;
        let interval = 1.0 / self.config.sync_rate_hz.max(1e-3);
        if self.since_sync >= interval {
            self.since_sync = 0.0;
            out.snapshot = Some(ProjectileSnapshot {
                entity: self.id,
                tick,
                position: self.position,
                velocity: self.velocity,
                rotation: self.rotation(),
            });
        }
    }

    /// Resolves one contact. Contacts arriving after the terminal transition
    /// are ignored.
    pub fn handle_contact(
        &mut self,
        contact: &Contact,
        world: &dyn CollisionQuery,
        out: &mut StepOutcome,
    ) -> ContactResult {
        if self.phase != ProjectilePhase::InFlight {
            return ContactResult::Ignored;
        }

        if self.config.explosive {
            self.collisions += 1;
            let touched_body = contact.tag.body().is_some();
            if (self.config.explode_on_touch && touched_body)
                || self.collisions >= self.config.max_collisions
            {
                self.terminate(TerminalKind::Exploded, contact.point, world, out);
                return ContactResult::Resolved;
            }
            let n = contact.normal;
            self.velocity = (self.velocity - 2.0 * self.velocity.dot(n) * n) * self.config.bounce;
            self.position = contact.point + n * (self.config.collider_radius + BOUNCE_SKIN);
            return ContactResult::Bounced;
        }

        match contact.tag.body() {
            Some(body) => {
                if self.damaged.insert(body) {
                    out.damage.push(DamageEvent {
                        target: body,
                        amount: self.config.damage,
                    });
                }
                if self.config.penetrate {
                    return ContactResult::PassThrough;
                }
                self.terminate(TerminalKind::HitTarget, contact.point, world, out);
                ContactResult::Resolved
            }
            None => {
                self.terminate(TerminalKind::HitTarget, contact.point, world, out);
                ContactResult::Resolved
            }
        }
    }

    fn terminate(
        &mut self,
        kind: TerminalKind,
        point: Vec3,
        world: &dyn CollisionQuery,
        out: &mut StepOutcome,
    ) -> bool {
        if self.phase != ProjectilePhase::InFlight {
            return false;
        }
        self.phase = ProjectilePhase::Terminal {
            kind,
            point,
            despawn_in: self.config.despawn_delay_secs,
        };
        self.position = point;
        self.velocity = Vec3::ZERO;

        let detonates = matches!(
            kind,
            TerminalKind::Exploded | TerminalKind::Expired { detonated: true }
        );
        if detonates {
            for overlap in world.overlap_sphere(point, self.config.explosion_radius) {
                let amount = explosion_damage(
                    self.config.damage,
                    overlap.distance,
                    self.config.explosion_radius,
                );
                if amount > 0.0 {
                    out.damage.push(DamageEvent {
                        target: overlap.body,
                        amount,
                    });
                }
            }
        }

        tracing::debug!(projectile = %self.id, ?kind, ?point, "terminal transition");
        out.terminal = Some(TerminalEvent {
            entity: self.id,
            kind,
            point,
        });
        true
    }
}

#[cfg(test)]
#[path = "projectile_tests.rs"]
mod tests;
