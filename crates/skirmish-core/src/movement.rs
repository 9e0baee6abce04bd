//! Avatar movement rule shared by the owner and the server.
//!
//! [`step`] is deterministic for identical inputs and collision geometry,
//! so an honest owner's prediction and the server's own simulation agree.

use glam::{Quat, Vec2, Vec3};
use skirmish_config::MovementConfig;

use crate::collision::{CollisionQuery, QueryFilter, SurfaceTag};

/// Radius of the avatar body sphere (m).
pub const BODY_RADIUS: f32 = 0.5;

/// Extra ray length below the feet used for the grounded test (m).
pub const GROUND_PROBE_SLACK: f32 = 0.3;

/// Force per unit of move speed.
const FORCE_SCALE: f32 = 10.0;

/// Gap kept between the body and a wall after a blocked move.
const SKIN: f32 = 0.01;

/// One tick of movement input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveInput {
    /// Strafe (x) and forward (y) axes, each in `[-1, 1]`.
    pub axes: Vec2,
    /// Jump held.
    pub jump: bool,
    /// Orientation yaw (degrees) defining the movement basis.
    pub yaw_deg: f32,
}

/// Simulated avatar state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveState {
    /// Body center.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Ground check result from the last step.
    pub grounded: bool,
    /// Seconds since the last jump.
    pub since_jump: f32,
}

impl MoveState {
    /// Resting state at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            grounded: false,
            since_jump: f32::INFINITY,
        }
    }
}

/// Unit direction the input asks to move in, on the horizontal plane.
pub fn wish_direction(input: &MoveInput) -> Vec3 {
    let basis = Quat::from_rotation_y(input.yaw_deg.to_radians());
    let forward = basis * Vec3::Z;
    let right = basis * Vec3::X;
    (forward * input.axes.y + right * input.axes.x).normalize_or_zero()
}

/// Returns `true` if ground lies within `player_height + 0.3` below `position`.
pub fn is_grounded(world: &dyn CollisionQuery, position: Vec3, cfg: &MovementConfig) -> bool {
    world
        .raycast(
            position,
            Vec3::NEG_Y,
            cfg.player_height + GROUND_PROBE_SLACK,
            QueryFilter::STATICS,
        )
        .is_some()
}

/// Advances `state` by one step of `dt` seconds.
///
/// Grounded: full force, horizontal drag, no gravity. Airborne: force scaled
/// by the air multiplier, gravity applied. Horizontal speed is clamped to the
/// move speed. Walls stop the body; the ground holds it at `player_height`.
pub fn step(
    state: &MoveState,
    input: &MoveInput,
    cfg: &MovementConfig,
    gravity: f32,
    dt: f32,
    world: &dyn CollisionQuery,
) -> MoveState {
    let mut next = *state;
    next.since_jump += dt;
    next.grounded = is_grounded(world, state.position, cfg);

    let mut force = wish_direction(input) * cfg.move_speed * FORCE_SCALE;
    if !next.grounded {
        force *= cfg.air_multiplier;
    }
    let mut v = state.velocity + force * dt;

    if next.grounded {
        let damp = (1.0 - cfg.ground_drag * dt).max(0.0);
        v.x *= damp;
        v.z *= damp;
        v.y = v.y.max(0.0);
    } else {
        v.y += gravity * dt;
    }

    let flat = Vec3::new(v.x, 0.0, v.z);
    if flat.length() > cfg.move_speed {
        let clamped = flat.normalize() * cfg.move_speed;
        v.x = clamped.x;
        v.z = clamped.z;
    }

    if input.jump && next.grounded && next.since_jump >= cfg.jump_cooldown_secs {
        v.y = cfg.jump_force;
        next.since_jump = 0.0;
    }

    // Horizontal: stop at the first wall.
    let mut pos = state.position;
    let horizontal = Vec3::new(v.x, 0.0, v.z) * dt;
    let travel = horizontal.length();
    if travel > 0.0 {
        let wall = world
            .sweep_sphere(pos, pos + horizontal, BODY_RADIUS, QueryFilter::STATICS)
            .into_iter()
            .find(|c| c.tag != SurfaceTag::Ground);
        match wall {
            Some(contact) => {
                pos += horizontal / travel * (contact.distance - SKIN).max(0.0);
                let into = v.dot(contact.normal);
                if into < 0.0 {
                    v -= contact.normal * into;
                }
            }
            None => pos += horizontal,
        }
    }

    // Vertical: settle onto the ground while grounded or landing.
    let dy = v.y * dt;
    let top = pos;
    pos.y += dy;
    if v.y <= 0.0 {
        let reach = cfg.player_height + GROUND_PROBE_SLACK + (-dy).max(0.0);
        if let Some(hit) = world.raycast(top, Vec3::NEG_Y, reach, QueryFilter::STATICS) {
            let floor = hit.point.y + cfg.player_height;
            if pos.y < floor || next.grounded {
                pos.y = floor;
                v.y = 0.0;
            }
        }
    }

    next.position = pos;
    next.velocity = v;
    next
}
