//! Remote interpolation for entities a session observes but does not own.
//!
//! Observers keep a rendered value and the latest authoritative value. Small
//! errors are closed with an exponential blend; an error beyond
//! `speed × frame_time × snap_factor` is a discontinuity and snaps at once.
//! Angles and rotations always take the shortest arc.

use glam::{Quat, Vec3, Vec4};
use skirmish_config::{GunConfig, InterpolationConfig, ProjectileConfig};

use crate::reconciliation::is_valid_quat;

/// Blend rate observers use toward explosive projectiles (per second).
pub const ROCKET_BLEND_RATE: f32 = 8.0;

/// Blend rate observers use toward direct-hit projectiles (per second).
pub const BULLET_BLEND_RATE: f32 = 12.0;

/// Snap multiplier applied to a projectile's nominal per-frame travel.
pub const PROJECTILE_SNAP_FACTOR: f32 = 3.0;

/// Fraction of the remaining error closed in `dt` at `rate` per second.
pub fn blend_factor(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt).exp()
}

/// Wraps an angle difference into `(-180, 180]` degrees.
pub fn wrap_degrees(delta: f32) -> f32 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

/// Interpolates from `a` toward `b` along the shortest arc.
pub fn lerp_angle_deg(a: f32, b: f32, t: f32) -> f32 {
    a + wrap_degrees(b - a) * t
}

// ---------------------------------------------------------------------------
// RemoteTransform
// ---------------------------------------------------------------------------

/// Rendered transform of a remotely driven entity (avatar body).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTransform {
    /// Rendered position.
    pub position: Vec3,
    /// Rendered rotation.
    pub rotation: Quat,
    target_position: Vec3,
    target_rotation: Quat,
    target_velocity: Vec3,
}

impl RemoteTransform {
    /// Starts rendered and authoritative at the same transform.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        let rotation = if is_valid_quat(rotation) {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self {
            position,
            rotation,
            target_position: position,
            target_rotation: rotation,
            target_velocity: Vec3::ZERO,
        }
    }

    /// Records the latest authoritative value. An invalid rotation keeps the
    /// previous target rotation.
    pub fn set_target(&mut self, position: Vec3, velocity: Vec3, rotation: Quat) {
        if position.is_finite() {
            self.target_position = position;
        }
        if velocity.is_finite() {
            self.target_velocity = velocity;
        }
        if is_valid_quat(rotation) {
            self.target_rotation = rotation.normalize();
        }
    }

    /// Latest authoritative position.
    pub fn target_position(&self) -> Vec3 {
        self.target_position
    }

    /// Latest authoritative velocity.
    pub fn target_velocity(&self) -> Vec3 {
        self.target_velocity
    }

    /// Advances the rendered value one frame. Returns `true` if it snapped.
    pub fn update(&mut self, dt: f32, speed: f32, cfg: &InterpolationConfig) -> bool {
        let error = self.position.distance(self.target_position);
        let threshold = speed * dt * cfg.snap_factor;
        if error > threshold {
            self.position = self.target_position;
            self.rotation = self.target_rotation;
            return true;
        }
        let t = blend_factor(cfg.blend_rate, dt);
        self.position = self.position.lerp(self.target_position, t);
        self.rotation = self.rotation.slerp(self.target_rotation, t).normalize();
        false
    }
}

// ---------------------------------------------------------------------------
// RemoteLook
// ---------------------------------------------------------------------------

/// Rendered pitch/yaw of a remote avatar's camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteLook {
    /// Rendered pitch.
    pub pitch_deg: f32,
    /// Rendered yaw.
    pub yaw_deg: f32,
    target_pitch: f32,
    target_yaw: f32,
}

impl RemoteLook {
    /// Records the latest authoritative angles.
    pub fn set_target(&mut self, pitch_deg: f32, yaw_deg: f32) {
        self.target_pitch = pitch_deg;
        self.target_yaw = yaw_deg;
    }

    /// Blends toward the target at `rate` per second.
    pub fn update(&mut self, dt: f32, rate: f32) {
        let t = blend_factor(rate, dt);
        self.pitch_deg = lerp_angle_deg(self.pitch_deg, self.target_pitch, t);
        self.yaw_deg = lerp_angle_deg(self.yaw_deg, self.target_yaw, t);
    }
}

// ---------------------------------------------------------------------------
// RemoteGun
// ---------------------------------------------------------------------------

/// Rendered transform of a remotely held gun.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteGun {
    rendered: Option<(Vec3, Quat)>,
    target: Option<(Vec3, Quat)>,
}

impl RemoteGun {
    /// Records a networked transform. An all-zero transform is the unset
    /// default and counts as nothing received.
    pub fn set_target(&mut self, position: Vec3, rotation: Quat) {
        let unset = position == Vec3::ZERO && Vec4::from(rotation) == Vec4::ZERO;
        if position.is_finite() && !unset {
            self.target = Some((position, rotation));
        }
    }

    /// Rendered transform, once anything was received.
    pub fn rendered(&self) -> Option<(Vec3, Quat)> {
        self.rendered
    }

    /// Lerps and slerps toward the networked transform when both rotations
    /// are valid; otherwise snaps the position, and the rotation only if the
    /// networked one is valid.
    pub fn update(&mut self, dt: f32, cfg: &GunConfig) {
        let Some((target_pos, target_rot)) = self.target else {
            return;
        };
        let target_valid = is_valid_quat(target_rot);
        match self.rendered {
            Some((pos, rot)) if target_valid && is_valid_quat(rot) => {
                let t = (cfg.follow_speed * dt).clamp(0.0, 1.0);
                self.rendered = Some((
                    pos.lerp(target_pos, t),
                    rot.slerp(target_rot.normalize(), t).normalize(),
                ));
            }
            Some((_, rot)) => {
                let rot = if target_valid { target_rot.normalize() } else { rot };
                self.rendered = Some((target_pos, rot));
            }
            None => {
                let rot = if target_valid {
                    target_rot.normalize()
                } else {
                    Quat::IDENTITY
                };
                self.rendered = Some((target_pos, rot));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectileObserver
// ---------------------------------------------------------------------------

/// Dead-reckoned observer copy of a projectile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileObserver {
    /// Rendered position.
    pub position: Vec3,
    /// Rendered velocity.
    pub velocity: Vec3,
    /// Rendered rotation.
    pub rotation: Quat,
    net_position: Vec3,
    net_velocity: Vec3,
    since_snapshot: f32,
    use_gravity: bool,
    blend_rate: f32,
    nominal_speed: f32,
    last_dt: f32,
    frozen: bool,
}

impl ProjectileObserver {
    /// Observer starting at the spawn transform.
    pub fn new(position: Vec3, velocity: Vec3, rotation: Quat, cfg: &ProjectileConfig) -> Self {
        Self {
            position,
            velocity,
            rotation,
            net_position: position,
            net_velocity: velocity,
            since_snapshot: 0.0,
            use_gravity: cfg.use_gravity,
            blend_rate: if cfg.explosive {
                ROCKET_BLEND_RATE
            } else {
                BULLET_BLEND_RATE
            },
            nominal_speed: cfg.nominal_speed,
            last_dt: 1.0 / 60.0,
            frozen: false,
        }
    }

    /// Applies an authoritative snapshot. Returns `true` if it snapped.
    pub fn on_snapshot(&mut self, position: Vec3, velocity: Vec3, rotation: Quat) -> bool {
        if self.frozen || !position.is_finite() || !velocity.is_finite() {
            return false;
        }
        self.net_position = position;
        self.net_velocity = velocity;
        self.since_snapshot = 0.0;
        if is_valid_quat(rotation) {
            self.rotation = rotation.normalize();
        }
        let threshold = self.nominal_speed * self.last_dt * PROJECTILE_SNAP_FACTOR;
        if self.position.distance(position) > threshold {
            self.position = position;
            self.velocity = velocity;
            return true;
        }
        false
    }

    /// Dead-reckons one frame and blends toward the extrapolated
    /// authoritative position.
    pub fn step(&mut self, dt: f32, gravity: f32) {
        if self.frozen {
            return;
        }
        self.last_dt = dt.max(1e-4);
        self.since_snapshot += dt;
        if self.use_gravity {
            self.velocity.y += gravity * dt;
        }
        self.position += self.velocity * dt;

        let s = self.since_snapshot;
        let mut predicted = self.net_position + self.net_velocity * s;
        if self.use_gravity {
            predicted.y += 0.5 * gravity * s * s;
        }
        let t = (dt * self.blend_rate).clamp(0.0, 1.0);
        self.position = self.position.lerp(predicted, t);
    }

    /// Stops the observer at the impact point.
    pub fn freeze(&mut self, point: Vec3) {
        self.frozen = true;
        self.position = point;
        self.velocity = Vec3::ZERO;
    }

    /// Returns `true` once a terminal event has been applied.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
