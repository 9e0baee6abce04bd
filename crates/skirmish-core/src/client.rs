//! One session's view of the match.
//!
//! [`ClientSim`] predicts its own avatar, gun and weapon, interpolates every
//! entity it does not own, and dead-reckons projectiles between snapshots.
//! It never decides outcomes: damage, deaths and projectile resolution all
//! arrive from the server and are only played back here.

use glam::{Quat, Vec2, Vec3};
use rustc_hash::FxHashMap;
use skirmish_config::Config;
use skirmish_net::{
    DamageRequest, EntityKind, FireCommand, HealthUpdate, Message, NetworkId, SessionId,
    SpawnEntity, TerminalKind,
};

use crate::authority::AuthorityResolver;
use crate::collision::ArenaWorld;
use crate::death::{CountdownCue, CountdownSequence, SpawnSide};
use crate::field::{ReplicatedField, WritePolicy};
use crate::health::Health;
use crate::interpolation::{ProjectileObserver, RemoteGun, RemoteLook, RemoteTransform};
use crate::prediction::{GunFollower, LookState, OwnerAvatar};
use crate::registry::Transform;
use crate::schedule::TickSchedule;
use crate::weapon::{TriggerInput, WeaponEvent, WeaponState};

/// Camera height above the avatar center (m).
pub const EYE_HEIGHT: f32 = 0.6;

/// Input sampled for one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    /// Strafe (x) and forward (y) axes.
    pub axes: Vec2,
    /// Jump held.
    pub jump: bool,
    /// Mouse delta.
    pub look: Vec2,
    /// Trigger state.
    pub trigger: TriggerInput,
}

/// Something the presentation layer should play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientEffect {
    /// A shot was fired somewhere.
    MuzzleFlash {
        /// Who fired.
        shooter: SessionId,
        /// Muzzle position.
        position: Vec3,
    },
    /// A projectile resolved.
    Impact {
        /// The projectile.
        entity: NetworkId,
        /// How.
        kind: TerminalKind,
        /// Where.
        point: Vec3,
    },
    /// An avatar died.
    PlayerDied {
        /// The avatar.
        victim: NetworkId,
    },
    /// A countdown cue, with its offset from the countdown start.
    Countdown {
        /// Scheduled offset (seconds).
        at: f64,
        /// The cue.
        cue: CountdownCue,
    },
    /// Trigger pulled on an empty magazine.
    EmptyClick,
    /// Reload began.
    Reloading,
}

/// Interpolated state of an avatar this session does not own.
///
/// `pose` and `aim` replicate the writers' fields; a snapshot older than
/// either is dropped before it reaches the interpolators.
#[derive(Debug)]
pub struct RemoteAvatar {
    /// Body transform.
    pub transform: RemoteTransform,
    /// Look angles.
    pub look: RemoteLook,
    /// Replica of the server's transform field.
    pub pose: ReplicatedField<Transform>,
    /// Replica of the owner's look field.
    pub aim: ReplicatedField<LookState>,
}

impl RemoteAvatar {
    /// Avatar first seen at `position`.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            transform: RemoteTransform::new(position, rotation),
            look: RemoteLook::default(),
            pose: ReplicatedField::new(
                Transform { position, rotation },
                WritePolicy::ServerOnly,
            ),
            aim: ReplicatedField::new(LookState::default(), WritePolicy::OwnerOnly),
        }
    }
}

/// A session's local simulation.
pub struct ClientSim {
    config: Config,
    session: SessionId,
    authority: AuthorityResolver,
    world: ArenaWorld,
    ticks: TickSchedule,
    avatar: Option<OwnerAvatar>,
    gun: Option<GunFollower>,
    weapon: WeaponState,
    remote_avatars: FxHashMap<NetworkId, RemoteAvatar>,
    remote_guns: FxHashMap<NetworkId, RemoteGun>,
    projectiles: FxHashMap<NetworkId, ProjectileObserver>,
    health: FxHashMap<NetworkId, Health>,
    input_enabled: bool,
    countdown: Option<CountdownSequence>,
    effects: Vec<ClientEffect>,
    outbox: Vec<Message>,
}

impl ClientSim {
    /// Session `session`; `is_server` marks the host sharing the server's
    /// process. `seed` drives weapon spread.
    pub fn new(session: SessionId, is_server: bool, config: Config, seed: u64) -> Self {
        Self {
            authority: AuthorityResolver::session(session, is_server),
            world: ArenaWorld::arena(),
            ticks: TickSchedule::with_tick_rate(config.simulation.tick_rate_hz),
            avatar: None,
            gun: None,
            weapon: WeaponState::new(config.gun.clone(), seed),
            remote_avatars: FxHashMap::default(),
            remote_guns: FxHashMap::default(),
            projectiles: FxHashMap::default(),
            health: FxHashMap::default(),
            input_enabled: false,
            countdown: None,
            effects: Vec::new(),
            outbox: Vec::new(),
            session,
            config,
        }
    }

    // -- accessors ----------------------------------------------------------

    /// This session's id.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Authority lookups as seen by this session.
    pub fn authority(&self) -> &AuthorityResolver {
        &self.authority
    }

    /// The predicted own avatar.
    pub fn avatar(&self) -> Option<&OwnerAvatar> {
        self.avatar.as_ref()
    }

    /// The own gun.
    pub fn gun(&self) -> Option<&GunFollower> {
        self.gun.as_ref()
    }

    /// Weapon state.
    pub fn weapon(&self) -> &WeaponState {
        &self.weapon
    }

    /// Interpolated avatar of another session.
    pub fn remote_avatar(&self, entity: NetworkId) -> Option<&RemoteAvatar> {
        self.remote_avatars.get(&entity)
    }

    /// Interpolated gun of another session.
    pub fn remote_gun(&self, entity: NetworkId) -> Option<&RemoteGun> {
        self.remote_guns.get(&entity)
    }

    /// Observer copy of a projectile.
    pub fn projectile(&self, entity: NetworkId) -> Option<&ProjectileObserver> {
        self.projectiles.get(&entity)
    }

    /// Rendered position of any avatar, own or remote.
    pub fn avatar_position(&self, entity: NetworkId) -> Option<Vec3> {
        match &self.avatar {
            Some(own) if own.entity == entity => Some(own.render_position()),
            _ => self.remote_avatars.get(&entity).map(|r| r.transform.position),
        }
    }

    /// Replicated health of an avatar.
    pub fn health(&self, entity: NetworkId) -> Option<&Health> {
        self.health.get(&entity)
    }

    /// Replicated transform of another session's avatar, for change
    /// subscriptions.
    pub fn remote_pose_mut(
        &mut self,
        entity: NetworkId,
    ) -> Option<&mut ReplicatedField<Transform>> {
        self.remote_avatars.get_mut(&entity).map(|remote| &mut remote.pose)
    }

    /// Replicated health field of an avatar, for change subscriptions.
    pub fn health_field_mut(&mut self, entity: NetworkId) -> Option<&mut ReplicatedField<f32>> {
        self.health.get_mut(&entity).map(Health::field_mut)
    }

    /// Whether local input currently drives anything.
    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Returns `true` while a countdown is playing.
    pub fn countdown_active(&self) -> bool {
        self.countdown.is_some()
    }

    /// Effects played so far.
    pub fn effects(&self) -> &[ClientEffect] {
        &self.effects
    }

    /// Takes the effects played so far.
    pub fn take_effects(&mut self) -> Vec<ClientEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Takes every message queued for the server.
    pub fn drain_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Reports damage. The request goes to the server, which applies it
    /// through the authoritative path; nothing changes locally.
    pub fn take_damage(&mut self, target: NetworkId, amount: f32) {
        self.outbox
            .push(Message::DamageRequest(DamageRequest { target, amount }));
    }

    // -- inbound ------------------------------------------------------------

    /// Applies one message from the server.
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Welcome(welcome) => {
                if welcome.session != self.session {
                    tracing::warn!(
                        expected = %self.session,
                        got = %welcome.session,
                        "welcome for another session"
                    );
                }
                tracing::debug!(session = %self.session, tick = welcome.server_tick, "welcomed");
            }
            Message::SpawnEntity(spawn) => self.on_spawn(spawn),
            Message::AvatarSnapshot(snapshot) => {
                let Some(remote) = self.remote_avatars.get_mut(&snapshot.entity) else {
                    return;
                };
                let pose = Transform {
                    position: snapshot.position,
                    rotation: snapshot.rotation,
                };
                if !remote.pose.apply_remote(snapshot.tick, pose) {
                    tracing::trace!(
                        entity = %snapshot.entity,
                        tick = snapshot.tick,
                        "stale snapshot dropped"
                    );
                    return;
                }
                remote
                    .transform
                    .set_target(snapshot.position, snapshot.velocity, snapshot.rotation);
            }
            Message::LookSnapshot(snapshot) => {
                let Some(remote) = self.remote_avatars.get_mut(&snapshot.entity) else {
                    return;
                };
                let look = LookState {
                    pitch_deg: snapshot.pitch_deg,
                    yaw_deg: snapshot.yaw_deg,
                };
                if remote.aim.apply_remote(snapshot.tick, look) {
                    remote.look.set_target(snapshot.pitch_deg, snapshot.yaw_deg);
                }
            }
            Message::GunSnapshot(gun) => {
                if let Some(remote) = self.remote_guns.get_mut(&gun.entity) {
                    remote.set_target(gun.position, gun.rotation);
                }
            }
            Message::MovementCorrection(correction) => {
                // The host's avatar is already authoritative in this process.
                if self.authority.is_authoritative() {
                    return;
                }
                if let Some(avatar) = &mut self.avatar {
                    avatar.apply_correction(&correction);
                }
            }
            Message::ProjectileSnapshot(snapshot) => {
                if let Some(observer) = self.projectiles.get_mut(&snapshot.entity) {
                    observer.on_snapshot(snapshot.position, snapshot.velocity, snapshot.rotation);
                }
            }
            Message::TerminalEvent(event) => {
                if let Some(observer) = self.projectiles.get_mut(&event.entity) {
                    observer.freeze(event.point);
                }
                self.effects.push(ClientEffect::Impact {
                    entity: event.entity,
                    kind: event.kind,
                    point: event.point,
                });
            }
            Message::DespawnEntity(despawn) => self.on_despawn(despawn.entity),
            Message::MuzzleFlash(flash) => self.effects.push(ClientEffect::MuzzleFlash {
                shooter: flash.shooter,
                position: flash.position,
            }),
            Message::HealthChanged(update) => self.on_health(update),
            Message::InputEnabled(enabled) => {
                tracing::debug!(session = %self.session, enabled, "input toggled");
                self.input_enabled = enabled;
            }
            Message::PlayerDied(died) => {
                self.effects
                    .push(ClientEffect::PlayerDied { victim: died.victim });
            }
            Message::RespawnAll => self.respawn(),
            Message::CountdownStart => {
                self.countdown = Some(CountdownSequence::start(&self.config.match_rules));
            }
            other => {
                tracing::debug!(
                    session = %self.session,
                    message = other.name(),
                    "unexpected message on client"
                );
            }
        }
    }

    fn on_spawn(&mut self, spawn: SpawnEntity) {
        self.authority.register(spawn.entity, spawn.owner);
        let own = spawn.owner == Some(self.session);
        match spawn.kind {
            EntityKind::Avatar if own => {
                let role = self.authority.role(spawn.entity);
                self.avatar = Some(OwnerAvatar::new(spawn.entity, spawn.position, role));
            }
            EntityKind::Avatar => {
                self.remote_avatars.insert(
                    spawn.entity,
                    RemoteAvatar::new(spawn.position, spawn.rotation),
                );
            }
            EntityKind::Gun if own => {
                self.gun = Some(GunFollower::new(spawn.entity, spawn.position, spawn.rotation));
            }
            EntityKind::Gun => {
                let mut gun = RemoteGun::default();
                gun.set_target(spawn.position, spawn.rotation);
                self.remote_guns.insert(spawn.entity, gun);
            }
            EntityKind::Projectile { explosive } => {
                let preset = if explosive {
                    &self.config.projectiles.rocket
                } else {
                    &self.config.projectiles.bullet
                };
                self.projectiles.insert(
                    spawn.entity,
                    ProjectileObserver::new(spawn.position, spawn.velocity, spawn.rotation, preset),
                );
            }
        }
    }

    fn on_despawn(&mut self, entity: NetworkId) {
        self.authority.unregister(entity);
        self.remote_avatars.remove(&entity);
        self.remote_guns.remove(&entity);
        self.projectiles.remove(&entity);
        self.health.remove(&entity);
        if self.avatar.as_ref().is_some_and(|a| a.entity == entity) {
            self.avatar = None;
        }
        if self.gun.as_ref().is_some_and(|g| g.entity == entity) {
            self.gun = None;
        }
    }

    fn on_health(&mut self, update: HealthUpdate) {
        let health = self
            .health
            .entry(update.entity)
            .or_insert_with(|| Health::new(update.max));
        if !health.apply_remote(update.tick, update.health, update.max) {
            tracing::trace!(entity = %update.entity, tick = update.tick, "stale health dropped");
        }
    }

    fn respawn(&mut self) {
        let spawn = SpawnSide::for_session(self.session).spawn_point(&self.config.match_rules);
        if let Some(avatar) = &mut self.avatar {
            avatar.teleport(spawn);
            if let Some(gun) = &mut self.gun {
                gun.snap_to(
                    spawn + Vec3::Y * EYE_HEIGHT,
                    avatar.look().camera_rotation(),
                    &self.config.gun,
                );
            }
        }
        tracing::debug!(session = %self.session, ?spawn, "respawned");
    }

    // -- frame --------------------------------------------------------------

    /// Advances one rendered frame of `dt` seconds.
    pub fn render(&mut self, dt: f32, input: FrameInput) {
        self.advance_countdown(dt);

        let ticks = self.ticks.accumulate(f64::from(dt));
        if self.input_enabled {
            self.predict(ticks, &input);
        }
        if let Some(avatar) = &mut self.avatar {
            avatar.update_smoothing(dt);
        }
        self.update_gun(dt);
        if self.input_enabled {
            self.update_weapon(dt, input.trigger);
        }
        self.interpolate(dt);
    }

    fn advance_countdown(&mut self, dt: f32) {
        let Some(countdown) = &mut self.countdown else {
            return;
        };
        for (at, cue) in countdown.advance(dt) {
            tracing::debug!(session = %self.session, label = %cue.label(), "countdown");
            self.effects.push(ClientEffect::Countdown { at, cue });
        }
        if countdown.is_finished() {
            self.countdown = None;
        }
    }

    fn predict(&mut self, ticks: u32, input: &FrameInput) {
        let Some(avatar) = &mut self.avatar else {
            return;
        };
        if ticks == 0 {
            avatar.turn(input.look, &self.config.look);
            return;
        }
        let step = self.config.tick_interval();
        // The mouse delta belongs to the frame, so only the first tick sees it.
        let mut look_delta = input.look;
        for _ in 0..ticks {
            let (movement, look) = avatar.predict(
                input.axes,
                input.jump,
                look_delta,
                &self.config,
                &self.world,
                step,
            );
            look_delta = Vec2::ZERO;
            self.outbox.push(Message::MovementUpdate(movement));
            if let Some(look) = look {
                self.outbox.push(Message::LookUpdate(look));
            }
        }
    }

    fn update_gun(&mut self, dt: f32) {
        let (Some(avatar), Some(gun)) = (&self.avatar, &mut self.gun) else {
            return;
        };
        let eye = avatar.render_position() + Vec3::Y * EYE_HEIGHT;
        let camera = avatar.look().camera_rotation();
        if let Some(transform) = gun.update(eye, camera, &self.config.gun, dt) {
            self.outbox.push(Message::GunTransform(transform));
        }
    }

    fn update_weapon(&mut self, dt: f32, trigger: TriggerInput) {
        let Some(gun) = &self.gun else {
            return;
        };
        let (origin, _) = gun.muzzle();
        let up = gun.rotation * Vec3::Y;
        for event in self.weapon.tick(dt, trigger, gun.rotation) {
            match event {
                WeaponEvent::Fired { direction } => {
                    self.outbox.push(Message::FireCommand(FireCommand {
                        gun: gun.entity,
                        origin,
                        direction,
                        up,
                    }));
                }
                WeaponEvent::EmptyClick => self.effects.push(ClientEffect::EmptyClick),
                WeaponEvent::ReloadStarted => self.effects.push(ClientEffect::Reloading),
                WeaponEvent::ReloadFinished => {}
            }
        }
    }

    fn interpolate(&mut self, dt: f32) {
        let observed_speed = self.config.movement.move_speed + self.config.movement.jump_force;
        for remote in self.remote_avatars.values_mut() {
            remote
                .transform
                .update(dt, observed_speed, &self.config.interpolation);
            remote.look.update(dt, self.config.look.smooth_rate);
        }
        for gun in self.remote_guns.values_mut() {
            gun.update(dt, &self.config.gun);
        }
        let gravity = self.config.simulation.gravity;
        for observer in self.projectiles.values_mut() {
            observer.step(dt, gravity);
        }
    }
}

impl std::fmt::Debug for ClientSim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSim")
            .field("session", &self.session)
            .field("input_enabled", &self.input_enabled)
            .field("remote_avatars", &self.remote_avatars.len())
            .field("projectiles", &self.projectiles.len())
            .finish_non_exhaustive()
    }
}
