//! Owner-side prediction: immediate local application of input.
//!
//! The owning session applies its own movement, look and held-gun updates
//! to local state every frame without waiting for the server, then sends the
//! raw input plus the resulting state in one message. Server corrections are
//! absorbed through [`CorrectionSmoothing`] so the rendered body does not pop.

use glam::{EulerRot, Quat, Vec2, Vec3};
use skirmish_config::{Config, GunConfig, LookConfig};
use skirmish_net::{GunTransform, LookUpdate, MovementCorrection, MovementUpdate, NetworkId};

use crate::authority::Role;
use crate::collision::CollisionQuery;
use crate::field::{ReplicatedField, WritePolicy};
use crate::movement::{self, MoveInput, MoveState};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Corrections shorter than this are smoothed; longer ones snap (m).
pub const SMALL_CORRECTION_THRESHOLD: f32 = 0.5;

/// Default exponential decay rate for the visual offset (per second).
pub const DEFAULT_DECAY_RATE: f32 = 10.0;

/// Scale applied to raw look deltas before sensitivity.
pub const LOOK_SCALE: f32 = 0.001;

/// Offsets below this magnitude are zeroed (m).
const MIN_OFFSET_MAGNITUDE: f32 = 0.001;

// ---------------------------------------------------------------------------
// CorrectionSmoothing
// ---------------------------------------------------------------------------

/// Hides small server corrections from the camera.
///
/// The predicted state jumps to the corrected position at once. The body is
/// drawn at `position + visual_offset`, and the offset shrinks toward zero
/// every frame.
#[derive(Debug, Clone)]
pub struct CorrectionSmoothing {
    /// Current visual offset from the logical position.
    pub visual_offset: Vec3,
    /// Fraction of the offset lost per second, as an exponent.
    pub decay_rate: f32,
}

impl Default for CorrectionSmoothing {
    fn default() -> Self {
        Self {
            visual_offset: Vec3::ZERO,
            decay_rate: DEFAULT_DECAY_RATE,
        }
    }
}

impl CorrectionSmoothing {
    /// Smoothing with no pending offset.
    pub fn new(decay_rate: f32) -> Self {
        Self {
            decay_rate,
            ..Default::default()
        }
    }

    /// Records a correction `delta = new - old`. Small corrections accumulate
    /// an offset that decays over time; large ones snap.
    pub fn apply_correction(&mut self, delta: Vec3) {
        if delta.length() < SMALL_CORRECTION_THRESHOLD {
            self.visual_offset -= delta;
        } else {
            self.visual_offset = Vec3::ZERO;
        }
    }

    /// Shrinks the offset by `dt` seconds worth of decay.
    pub fn update(&mut self, dt: f32) {
        self.visual_offset *= (-self.decay_rate * dt).exp();
        if self.visual_offset.length() < MIN_OFFSET_MAGNITUDE {
            self.visual_offset = Vec3::ZERO;
        }
    }

    /// Drops any pending offset.
    pub fn clear(&mut self) {
        self.visual_offset = Vec3::ZERO;
    }

    /// `true` once the offset has settled.
    pub fn is_zero(&self) -> bool {
        self.visual_offset == Vec3::ZERO
    }
}

// ---------------------------------------------------------------------------
// Look
// ---------------------------------------------------------------------------

/// Camera pitch and yaw in degrees. Positive pitch looks down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LookState {
    /// Pitch, clamped to the configured limit.
    pub pitch_deg: f32,
    /// Yaw, unbounded.
    pub yaw_deg: f32,
}

impl LookState {
    /// Applies a raw look delta (x turns, y tilts).
    pub fn apply_input(&mut self, delta: Vec2, cfg: &LookConfig) {
        self.yaw_deg += delta.x * cfg.x_sensitivity * LOOK_SCALE;
        self.pitch_deg -= delta.y * cfg.y_sensitivity * LOOK_SCALE;
        self.pitch_deg = self.pitch_deg.clamp(-cfg.pitch_limit_deg, cfg.pitch_limit_deg);
    }

    /// Full camera rotation.
    pub fn camera_rotation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.yaw_deg.to_radians(),
            self.pitch_deg.to_radians(),
            0.0,
        )
    }

    /// Yaw-only body orientation.
    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw_deg.to_radians())
    }
}

// ---------------------------------------------------------------------------
// OwnerAvatar
// ---------------------------------------------------------------------------

/// Locally predicted avatar of the owning session.
///
/// The camera look is an owner-written [`ReplicatedField`]; `role` is the
/// local role for this avatar and every look write is checked against it.
#[derive(Debug)]
pub struct OwnerAvatar {
    /// The avatar.
    pub entity: NetworkId,
    /// Logical predicted state.
    pub state: MoveState,
    /// Visual correction offset.
    pub smoothing: CorrectionSmoothing,
    look: ReplicatedField<LookState>,
    role: Role,
    sequence: u32,
    sent_look: Option<u64>,
}

impl OwnerAvatar {
    /// Avatar resting at `position`, driven by a session holding `role`.
    pub fn new(entity: NetworkId, position: Vec3, role: Role) -> Self {
        Self {
            entity,
            state: MoveState::at(position),
            smoothing: CorrectionSmoothing::default(),
            look: ReplicatedField::new(LookState::default(), WritePolicy::OwnerOnly),
            role,
            sequence: 0,
            sent_look: None,
        }
    }

    /// Current camera look.
    pub fn look(&self) -> LookState {
        *self.look.get()
    }

    /// The look field, for change subscriptions.
    pub fn look_field_mut(&mut self) -> &mut ReplicatedField<LookState> {
        &mut self.look
    }

    /// Applies a raw look delta. Returns `false` if the local role may not
    /// write the look.
    pub fn turn(&mut self, delta: Vec2, cfg: &LookConfig) -> bool {
        let mut next = self.look();
        next.apply_input(delta, cfg);
        match self.look.set(self.role, next) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(entity = %self.entity, %err, "look write rejected");
                false
            }
        }
    }

    /// Applies one frame of input locally and returns the movement message
    /// (always) and a look message (only when the look changed).
    pub fn predict(
        &mut self,
        axes: Vec2,
        jump: bool,
        look_delta: Vec2,
        config: &Config,
        world: &dyn CollisionQuery,
        dt: f32,
    ) -> (MovementUpdate, Option<LookUpdate>) {
        self.turn(look_delta, &config.look);
        let look = self.look();
        let input = MoveInput {
            axes: axes.clamp(Vec2::NEG_ONE, Vec2::ONE),
            jump,
            yaw_deg: look.yaw_deg,
        };
        self.state = movement::step(
            &self.state,
            &input,
            &config.movement,
            config.simulation.gravity,
            dt,
            world,
        );
        self.sequence = self.sequence.wrapping_add(1);

        let movement = MovementUpdate {
            entity: self.entity,
            sequence: self.sequence,
            input: input.axes,
            jump,
            yaw_deg: input.yaw_deg,
            position: self.state.position,
            velocity: self.state.velocity,
        };

        let look_sequence = self.look.sequence();
        let look = (self.sent_look != Some(look_sequence)).then(|| {
            self.sent_look = Some(look_sequence);
            LookUpdate {
                entity: self.entity,
                sequence: self.sequence,
                input: look_delta,
                pitch_deg: look.pitch_deg,
                yaw_deg: look.yaw_deg,
            }
        });

        (movement, look)
    }

    /// Adopts a server correction. Returns `false` for corrections addressed
    /// to another entity.
    pub fn apply_correction(&mut self, correction: &MovementCorrection) -> bool {
        if correction.entity != self.entity {
            return false;
        }
        let delta = correction.position - self.state.position;
        self.smoothing.apply_correction(delta);
        self.state.position = correction.position;
        self.state.velocity = correction.velocity;
        tracing::debug!(
            entity = %self.entity,
            sequence = correction.sequence,
            distance = delta.length(),
            "movement corrected"
        );
        true
    }

    /// Moves the avatar without smoothing (respawn).
    pub fn teleport(&mut self, position: Vec3) {
        self.state = MoveState::at(position);
        self.smoothing.clear();
    }

    /// Position to draw this frame.
    pub fn render_position(&self) -> Vec3 {
        self.state.position + self.smoothing.visual_offset
    }

    /// Decays the correction offset.
    pub fn update_smoothing(&mut self, dt: f32) {
        self.smoothing.update(dt);
    }
}

// ---------------------------------------------------------------------------
// GunFollower
// ---------------------------------------------------------------------------

/// Owner-positioned held gun that trails the camera.
#[derive(Debug, Clone)]
pub struct GunFollower {
    /// The gun.
    pub entity: NetworkId,
    /// Current position.
    pub position: Vec3,
    /// Current rotation.
    pub rotation: Quat,
    sequence: u32,
    last_sent: Option<(Vec3, Quat)>,
}

impl GunFollower {
    /// Gun starting at `position`.
    pub fn new(entity: NetworkId, position: Vec3, rotation: Quat) -> Self {
        Self {
            entity,
            position,
            rotation,
            sequence: 0,
            last_sent: None,
        }
    }

    /// Where the gun wants to be for a camera at `eye` with `camera` rotation.
    pub fn target(eye: Vec3, camera: Quat, cfg: &GunConfig) -> (Vec3, Quat) {
        (eye + camera * Vec3::from_array(cfg.offset), camera)
    }

    /// Blends toward the camera-relative target. Returns a transform to send
    /// when the gun moved or turned past the resend thresholds.
    pub fn update(
        &mut self,
        eye: Vec3,
        camera: Quat,
        cfg: &GunConfig,
        dt: f32,
    ) -> Option<GunTransform> {
        let (target_pos, target_rot) = Self::target(eye, camera, cfg);
        let t = (cfg.follow_speed * dt).clamp(0.0, 1.0);
        self.position = self.position.lerp(target_pos, t);
        self.rotation = self.rotation.slerp(target_rot, t).normalize();

        let moved = match self.last_sent {
            None => true,
            Some((pos, rot)) => {
                pos.distance(self.position) > cfg.resend_distance
                    || rot.angle_between(self.rotation).to_degrees() > cfg.resend_angle_deg
            }
        };
        if !moved {
            return None;
        }
        self.last_sent = Some((self.position, self.rotation));
        self.sequence = self.sequence.wrapping_add(1);
        Some(GunTransform {
            entity: self.entity,
            sequence: self.sequence,
            position: self.position,
            rotation: self.rotation,
        })
    }

    /// Places the gun at its target immediately (respawn).
    pub fn snap_to(&mut self, eye: Vec3, camera: Quat, cfg: &GunConfig) {
        (self.position, self.rotation) = Self::target(eye, camera, cfg);
    }

    /// Muzzle position and forward direction.
    pub fn muzzle(&self) -> (Vec3, Vec3) {
        (self.position, self.rotation * Vec3::Z)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
