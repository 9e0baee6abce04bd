//! The authoritative match simulation.
//!
//! [`ServerSim`] owns every ServerOnly value: avatar transforms after
//! validation, projectiles, health, and the death sequence. It consumes
//! owner messages through [`ServerSim::handle`], advances one fixed step per
//! [`ServerSim::simulate_tick`], and queues everything it wants delivered in
//! an outbox the transport drains.

use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use serde::Serialize;
use skirmish_config::Config;
use skirmish_net::{
    AvatarSnapshot, DespawnEntity, EntityKind, FireCommand, GunTransform, HealthUpdate,
    LookSnapshot, LookUpdate, Message, MovementCorrection, MovementUpdate, MuzzleFlash, NetworkId,
    PlayerDied, SessionId, SpawnEntity, Target, Welcome,
};

use crate::authority::{AuthorityResolver, Role};
use crate::collision::{ArenaWorld, Body};
use crate::death::{DeathDirector, DeathPhase, SpawnSide, countdown_length};
use crate::field::{ReplicatedField, SubscriptionId, WritePolicy};
use crate::health::{DamageOutcome, Health, HealthError, take_damage_on_server};
use crate::movement::{BODY_RADIUS, MoveState};
use crate::prediction::LookState;
use crate::projectile::Projectile;
use crate::reconciliation::{
    MovementValidator, reconcile_movement, sanitize_look, sanitize_rotation,
};
use crate::registry::{EntityRegistry, Kind, NetTransform, Owner, Transform, Velocity};
use crate::schedule::Scheduler;
use crate::session::{GateAction, MatchGate, SessionTable};

// ---------------------------------------------------------------------------
// Server-only components
// ---------------------------------------------------------------------------

/// Authoritative movement state of an avatar.
#[derive(Component, Debug, Clone, Copy)]
pub struct Motion(pub MoveState);

/// Look angles of an avatar. The owner writes them; the server applies the
/// owner's updates in sequence order and drops older ones.
#[derive(Component, Debug)]
pub struct Aim(pub ReplicatedField<LookState>);

impl Default for Aim {
    fn default() -> Self {
        Self(ReplicatedField::new(LookState::default(), WritePolicy::OwnerOnly))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerEvent {
    /// The initial spawn delay of a session elapsed.
    Settled(SessionId),
    /// The death grace delay elapsed.
    Respawn,
    /// A countdown finished playing.
    CountdownDone { after_death: bool },
}

/// Counters reported at the end of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    /// Projectiles spawned.
    pub shots: u32,
    /// Damage applications that changed health.
    pub hits: u32,
    /// Deaths.
    pub deaths: u32,
    /// Movement updates that failed validation.
    pub rejected_moves: u32,
}

// ---------------------------------------------------------------------------
// ServerSim
// ---------------------------------------------------------------------------

/// Authoritative simulation of one match.
pub struct ServerSim {
    config: Config,
    authority: AuthorityResolver,
    registry: EntityRegistry,
    sessions: SessionTable,
    world: ArenaWorld,
    validator: MovementValidator,
    events: Scheduler<ServerEvent>,
    deaths: DeathDirector,
    gate: MatchGate,
    input_enabled: bool,
    tick: u64,
    since_snapshot: f32,
    outbox: Vec<(Target, Message)>,
    stats: MatchStats,
}

impl ServerSim {
    /// Server for the standard arena.
    pub fn new(config: Config) -> Self {
        Self::with_world(config, ArenaWorld::arena())
    }

    /// Server over custom static geometry.
    pub fn with_world(config: Config, world: ArenaWorld) -> Self {
        Self {
            authority: AuthorityResolver::server(Some(SessionId::HOST)),
            registry: EntityRegistry::new(),
            sessions: SessionTable::new(),
            world,
            validator: MovementValidator::from_config(&config),
            events: Scheduler::new(),
            deaths: DeathDirector::new(),
            gate: MatchGate::new(config.match_rules.min_players),
            input_enabled: false,
            tick: 0,
            since_snapshot: 0.0,
            outbox: Vec::new(),
            stats: MatchStats::default(),
            config,
        }
    }

    // -- accessors ----------------------------------------------------------

    /// Ticks simulated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Match counters.
    pub fn stats(&self) -> MatchStats {
        self.stats
    }

    /// Connected sessions.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Entity registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Authority lookups.
    pub fn authority(&self) -> &AuthorityResolver {
        &self.authority
    }

    /// Whether sessions may currently act.
    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Phase of the death sequence.
    pub fn death_phase(&self) -> DeathPhase {
        self.deaths.phase()
    }

    /// Authoritative position of an entity.
    pub fn position(&self, entity: NetworkId) -> Option<Vec3> {
        self.registry.get::<NetTransform>(entity).map(NetTransform::position)
    }

    /// Authoritative transform of an entity.
    pub fn transform(&self, entity: NetworkId) -> Option<Transform> {
        self.registry.get::<NetTransform>(entity).map(NetTransform::transform)
    }

    /// Last look accepted from the owner of `entity`.
    pub fn look(&self, entity: NetworkId) -> Option<LookState> {
        self.registry.get::<Aim>(entity).map(|aim| *aim.0.get())
    }

    /// Registers `callback(old, new)` on the authoritative transform of
    /// `entity`. Returns `None` for unknown entities.
    pub fn subscribe_transform(
        &mut self,
        entity: NetworkId,
        callback: impl FnMut(&Transform, &Transform) + Send + Sync + 'static,
    ) -> Option<SubscriptionId> {
        let mut net = self.registry.get_mut::<NetTransform>(entity)?;
        Some(net.field_mut().subscribe(callback))
    }

    /// Authoritative health of an avatar.
    pub fn health(&self, entity: NetworkId) -> Option<f32> {
        self.registry.get::<Health>(entity).map(Health::current)
    }

    /// Takes every queued message.
    pub fn drain_outbox(&mut self) -> Vec<(Target, Message)> {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, target: Target, message: Message) {
        self.outbox.push((target, message));
    }

    // -- sessions -----------------------------------------------------------

    /// Registers a session, spawns its avatar and gun at its side's spawn
    /// point and sends it the current world.
    pub fn connect(&mut self, is_server: bool) -> SessionId {
        let session = self.sessions.connect(is_server);
        let spawn = SpawnSide::for_session(session).spawn_point(&self.config.match_rules);

        let avatar = self.registry.allocate_id();
        self.registry.spawn(
            avatar,
            (
                Kind(EntityKind::Avatar),
                Owner(session),
                NetTransform::at(spawn),
                Velocity::default(),
                Motion(MoveState::at(spawn)),
                Aim::default(),
                Health::new(self.config.match_rules.max_health),
            ),
        );
        self.authority.register(avatar, Some(session));

        let gun = self.registry.allocate_id();
        self.registry
            .spawn(gun, (Kind(EntityKind::Gun), Owner(session), NetTransform::at(spawn)));
        self.authority.register(gun, Some(session));

        if let Some(info) = self.sessions.get_mut(session) {
            info.avatar = Some(avatar);
            info.gun = Some(gun);
        }

        self.send(
            Target::Session(session),
            Message::Welcome(Welcome {
                session,
                is_server,
                server_tick: self.tick,
            }),
        );
        for id in self.registry.ids() {
            if id == avatar || id == gun {
                continue;
            }
            if let Some(spawn) = self.spawn_message(id) {
                self.send(Target::Session(session), Message::SpawnEntity(spawn));
            }
            if let Some(update) = self.health_message(id) {
                self.send(Target::Session(session), Message::HealthChanged(update));
            }
        }
        for id in [avatar, gun] {
            if let Some(spawn) = self.spawn_message(id) {
                self.send(Target::All, Message::SpawnEntity(spawn));
            }
        }
        if let Some(update) = self.health_message(avatar) {
            self.send(Target::All, Message::HealthChanged(update));
        }
        self.send(
            Target::Session(session),
            Message::InputEnabled(self.input_enabled),
        );

        self.events.schedule_after(
            self.config.match_rules.initial_spawn_delay_secs,
            ServerEvent::Settled(session),
        );
        session
    }

    /// Removes a session and despawns its avatar and gun.
    pub fn disconnect(&mut self, session: SessionId) {
        let Some(info) = self.sessions.disconnect(session) else {
            return;
        };
        for id in [info.avatar, info.gun].into_iter().flatten() {
            self.despawn(id);
        }
    }

    fn despawn(&mut self, id: NetworkId) {
        if self.registry.despawn(id) {
            self.authority.unregister(id);
            self.send(
                Target::All,
                Message::DespawnEntity(DespawnEntity { entity: id }),
            );
        }
    }

    fn write_transform(&mut self, id: NetworkId, transform: Transform) {
        let role = self.authority.role(id);
        let Some(mut net) = self.registry.get_mut::<NetTransform>(id) else {
            return;
        };
        if let Err(err) = net.write(role, transform) {
            tracing::warn!(entity = %id, %err, "transform write rejected");
        }
    }

    fn spawn_message(&self, id: NetworkId) -> Option<SpawnEntity> {
        if self
            .registry
            .get::<Projectile>(id)
            .is_some_and(Projectile::is_resolved)
        {
            return None;
        }
        let kind = self.registry.get::<Kind>(id)?.0;
        let transform = self.registry.get::<NetTransform>(id)?.transform();
        Some(SpawnEntity {
            entity: id,
            kind,
            owner: self.registry.get::<Owner>(id).map(|o| o.0),
            position: transform.position,
            rotation: transform.rotation,
            velocity: self
                .registry
                .get::<Velocity>(id)
                .map_or(Vec3::ZERO, |v| v.0),
        })
    }

    fn health_message(&self, id: NetworkId) -> Option<HealthUpdate> {
        let health = self.registry.get::<Health>(id)?;
        Some(HealthUpdate {
            entity: id,
            tick: health.sequence(),
            health: health.current(),
            max: health.max(),
        })
    }

    // -- inbound ------------------------------------------------------------

    /// Handles one message from `from`.
    pub fn handle(&mut self, from: SessionId, message: Message) {
        match message {
            Message::MovementUpdate(update) => self.on_movement(from, update),
            Message::LookUpdate(look) => self.on_look(from, look),
            Message::GunTransform(gun) => self.on_gun(from, gun),
            Message::FireCommand(fire) => self.on_fire(from, fire),
            Message::DamageRequest(request) => {
                if let Err(err) = self.take_damage(request.target, request.amount) {
                    tracing::debug!(session = %from, %err, "damage request dropped");
                }
            }
            other => {
                tracing::debug!(session = %from, message = other.name(), "unexpected message");
            }
        }
    }

    fn owns(&self, from: SessionId, entity: NetworkId, what: &'static str) -> bool {
        let owned = self.authority.is_owned_by(entity, from);
        if !owned {
            tracing::debug!(session = %from, %entity, what, "update from non-owner ignored");
        }
        owned
    }

    fn on_movement(&mut self, from: SessionId, update: MovementUpdate) {
        let entity = update.entity;
        if !self.owns(from, entity, "movement") {
            return;
        }
        if !self.input_enabled {
            tracing::trace!(%entity, "movement while frozen dropped");
            return;
        }
        let Some(&Motion(state)) = self.registry.get::<Motion>(entity) else {
            return;
        };

        let (next, verdict) =
            reconcile_movement(&state, &update, &self.validator, &self.config, &self.world);
        let yaw = if update.yaw_deg.is_finite() {
            update.yaw_deg
        } else {
            self.look(entity).map_or(0.0, |look| look.yaw_deg)
        };

        if let Some(mut motion) = self.registry.get_mut::<Motion>(entity) {
            motion.0 = next;
        }
        self.write_transform(
            entity,
            Transform {
                position: next.position,
                rotation: Quat::from_rotation_y(yaw.to_radians()),
            },
        );
        if let Some(mut velocity) = self.registry.get_mut::<Velocity>(entity) {
            velocity.0 = next.velocity;
        }

        if !verdict.is_accepted() {
            self.stats.rejected_moves += 1;
            self.send(
                Target::Session(from),
                Message::MovementCorrection(MovementCorrection {
                    entity,
                    sequence: update.sequence,
                    position: next.position,
                    velocity: next.velocity,
                }),
            );
        }
    }

    fn on_look(&mut self, from: SessionId, look: LookUpdate) {
        if !self.owns(from, look.entity, "look") {
            return;
        }
        let Some((pitch_deg, yaw_deg)) = sanitize_look(
            look.pitch_deg,
            look.yaw_deg,
            self.config.look.pitch_limit_deg,
        ) else {
            tracing::debug!(entity = %look.entity, "non-finite look ignored");
            return;
        };
        let sequence = u64::from(look.sequence);
        let accepted = LookState { pitch_deg, yaw_deg };
        let applied = self
            .registry
            .get_mut::<Aim>(look.entity)
            .is_some_and(|mut aim| aim.0.apply_remote(sequence, accepted));
        if !applied {
            tracing::trace!(entity = %look.entity, sequence, "stale look dropped");
            return;
        }
        self.send(
            Target::AllExcept(from),
            Message::LookSnapshot(LookSnapshot {
                entity: look.entity,
                tick: sequence,
                pitch_deg,
                yaw_deg,
            }),
        );
    }

    fn on_gun(&mut self, from: SessionId, gun: GunTransform) {
        if !self.owns(from, gun.entity, "gun") {
            return;
        }
        let Some(rotation) = sanitize_rotation(gun.rotation) else {
            tracing::debug!(entity = %gun.entity, "invalid gun rotation ignored");
            return;
        };
        if !gun.position.is_finite() {
            return;
        }
        self.write_transform(
            gun.entity,
            Transform {
                position: gun.position,
                rotation,
            },
        );
        self.send(
            Target::AllExcept(from),
            Message::GunSnapshot(GunTransform { rotation, ..gun }),
        );
    }

    fn on_fire(&mut self, from: SessionId, fire: FireCommand) {
        if !self.owns(from, fire.gun, "fire") {
            return;
        }
        if !self.input_enabled {
            tracing::debug!(session = %from, "fire while frozen dropped");
            return;
        }
        let direction = fire.direction.normalize_or_zero();
        if !fire.origin.is_finite() || direction == Vec3::ZERO || !direction.is_finite() {
            tracing::debug!(session = %from, "malformed fire command ignored");
            return;
        }
        let up = if fire.up.is_finite() {
            fire.up.normalize_or_zero()
        } else {
            Vec3::ZERO
        };

        let preset = if self.config.gun.fires_rockets {
            self.config.projectiles.rocket.clone()
        } else {
            self.config.projectiles.bullet.clone()
        };
        let explosive = preset.explosive;
        let shooter = self.sessions.get(from).and_then(|s| s.avatar);

        let id = self.registry.allocate_id();
        let mut projectile = Projectile::new(id, preset, fire.origin, shooter);
        let impulse = direction * self.config.gun.fire_force + up * self.config.gun.upward_force;
        projectile.launch(impulse);
        let rotation = projectile.rotation();
        let velocity = projectile.velocity();

        let kind = EntityKind::Projectile { explosive };
        self.registry.spawn(
            id,
            (
                Kind(kind),
                NetTransform::new(Transform {
                    position: fire.origin,
                    rotation,
                }),
                Velocity(velocity),
                projectile,
            ),
        );
        self.authority.register(id, None);
        self.stats.shots += 1;
        tracing::debug!(session = %from, projectile = %id, explosive, "projectile spawned");

        self.send(
            Target::All,
            Message::SpawnEntity(SpawnEntity {
                entity: id,
                kind,
                owner: None,
                position: fire.origin,
                rotation,
                velocity,
            }),
        );
        self.send(
            Target::All,
            Message::MuzzleFlash(MuzzleFlash {
                shooter: from,
                gun: fire.gun,
                position: fire.origin,
                rotation: Quat::from_rotation_arc(Vec3::Z, direction),
            }),
        );
    }

    // -- damage & death -----------------------------------------------------

    /// Applies damage through the authoritative path and broadcasts the
    /// result. A death starts the death sequence unless one is running.
    pub fn take_damage(
        &mut self,
        target: NetworkId,
        amount: f32,
    ) -> Result<DamageOutcome, HealthError> {
        let outcome = take_damage_on_server(&self.authority, &mut self.registry, target, amount)?;
        if outcome.landed() {
            self.stats.hits += 1;
            if let Some(update) = self.health_message(target) {
                self.send(Target::All, Message::HealthChanged(update));
            }
        } else {
            tracing::debug!(%target, ?outcome, "damage had no effect");
        }
        if outcome == DamageOutcome::Died {
            self.stats.deaths += 1;
            self.begin_death(target);
        }
        Ok(outcome)
    }

    fn begin_death(&mut self, victim: NetworkId) {
        if !self.deaths.begin(victim) {
            return;
        }
        self.set_input(false);
        self.events
            .schedule_after(self.config.match_rules.death_grace_secs, ServerEvent::Respawn);
    }

    fn is_dead(&self, entity: NetworkId) -> bool {
        self.registry
            .get::<Health>(entity)
            .is_some_and(|health| !health.is_alive())
    }

    fn respawn_all(&mut self) {
        let Some(victim) = self.deaths.respawning() else {
            return;
        };
        self.send(Target::All, Message::PlayerDied(PlayerDied { victim }));

        let rules = &self.config.match_rules;
        let placements: Vec<(NetworkId, Vec3)> = self
            .sessions
            .iter()
            .filter_map(|s| Some((s.avatar?, s.side.spawn_point(rules))))
            .collect();
        for (avatar, spawn) in placements {
            if let Some(mut motion) = self.registry.get_mut::<Motion>(avatar) {
                motion.0 = MoveState::at(spawn);
            }
            let rotation = self.transform(avatar).map_or(Quat::IDENTITY, |t| t.rotation);
            self.write_transform(
                avatar,
                Transform {
                    position: spawn,
                    rotation,
                },
            );
            if let Some(mut velocity) = self.registry.get_mut::<Velocity>(avatar) {
                velocity.0 = Vec3::ZERO;
            }
            if let Some(mut health) = self.registry.get_mut::<Health>(avatar)
                && let Err(err) = health.reset(Role::SERVER)
            {
                tracing::warn!(%avatar, %err, "health reset failed");
            }
            if let Some(update) = self.health_message(avatar) {
                self.send(Target::All, Message::HealthChanged(update));
            }
        }

        self.send(Target::All, Message::RespawnAll);
        self.start_countdown(true);
    }

    fn start_countdown(&mut self, after_death: bool) {
        self.send(Target::All, Message::CountdownStart);
        self.events.schedule_after(
            countdown_length(&self.config.match_rules),
            ServerEvent::CountdownDone { after_death },
        );
    }

    fn set_input(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        tracing::info!(enabled, tick = self.tick, "input toggled");
        self.send(Target::All, Message::InputEnabled(enabled));
    }

    fn on_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Settled(session) => {
                if self.sessions.get(session).is_none() {
                    return;
                }
                match self.gate.evaluate(self.sessions.len()) {
                    GateAction::Hold => self.set_input(false),
                    GateAction::Open => self.start_countdown(false),
                    GateAction::AlreadyOpen => self.send(
                        Target::Session(session),
                        Message::InputEnabled(self.input_enabled),
                    ),
                }
            }
            ServerEvent::Respawn => self.respawn_all(),
            ServerEvent::CountdownDone { after_death } => {
                if after_death {
                    self.deaths.finish();
                    if let Some(victim) = self.deaths.take_pending()
                        && self.is_dead(victim)
                    {
                        self.begin_death(victim);
                        return;
                    }
                    self.set_input(true);
                } else if !self.deaths.is_running() {
                    self.set_input(true);
                }
            }
        }
    }

    // -- tick ---------------------------------------------------------------

    /// Advances the match by one fixed step.
    pub fn simulate_tick(&mut self, dt: f32) {
        self.tick += 1;

        let bodies: Vec<Body> = self
            .sessions
            .iter()
            .filter_map(|s| s.avatar)
            .filter_map(|id| {
                Some(Body {
                    id,
                    center: self.position(id)?,
                    radius: BODY_RADIUS,
                })
            })
            .collect();
        self.world.set_bodies(bodies);

        self.step_projectiles(dt);

        for (_, event) in self.events.advance(dt) {
            self.on_event(event);
        }

        self.broadcast_snapshots(dt);
    }

    fn step_projectiles(&mut self, dt: f32) {
        let gravity = self.config.simulation.gravity;
        for id in self.registry.ids_with::<Projectile>() {
            let (outcome, position, rotation, velocity) = {
                let Some(mut projectile) = self.registry.get_mut::<Projectile>(id) else {
                    continue;
                };
                let outcome = projectile.step(dt, gravity, self.tick, &self.world);
                (
                    outcome,
                    projectile.position(),
                    projectile.rotation(),
                    projectile.velocity(),
                )
            };
            self.write_transform(id, Transform { position, rotation });
            if let Some(mut v) = self.registry.get_mut::<Velocity>(id) {
                v.0 = velocity;
            }

            if let Some(event) = outcome.terminal {
                self.send(Target::All, Message::TerminalEvent(event));
            }
            for damage in outcome.damage {
                if let Err(err) = self.take_damage(damage.target, damage.amount) {
                    tracing::debug!(projectile = %id, %err, "projectile damage dropped");
                }
            }
            if let Some(snapshot) = outcome.snapshot {
                self.send(Target::All, Message::ProjectileSnapshot(snapshot));
            }
            if outcome.despawn {
                self.despawn(id);
            }
        }
    }

    fn broadcast_snapshots(&mut self, dt: f32) {
        self.since_snapshot += dt;
        let interval = 1.0 / self.config.network.snapshot_rate_hz.max(1) as f32;
        if self.since_snapshot < interval {
            return;
        }
        self.since_snapshot = 0.0;

        let snapshots: Vec<(SessionId, AvatarSnapshot)> = self
            .sessions
            .iter()
            .filter_map(|s| {
                let entity = s.avatar?;
                let net = self.registry.get::<NetTransform>(entity)?;
                let transform = net.transform();
                Some((
                    s.id,
                    AvatarSnapshot {
                        entity,
                        tick: net.sequence(),
                        position: transform.position,
                        velocity: self
                            .registry
                            .get::<Velocity>(entity)
                            .map_or(Vec3::ZERO, |v| v.0),
                        rotation: transform.rotation,
                    },
                ))
            })
            .collect();
        for (owner, snapshot) in snapshots {
            self.send(Target::AllExcept(owner), Message::AvatarSnapshot(snapshot));
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
