//! Server reconciliation of owner-reported state.
//!
//! The server re-runs the shared movement rule for every owner update and
//! checks the reported displacement against a coarse speed bound. Inside the
//! bound the owner's transform becomes authoritative; outside it the server
//! keeps its own simulated result and the owner is corrected. There is no
//! rewind of intermediate state: the check is a best-effort sanity bound.
//!
//! Horizontal and vertical displacement are bounded separately. The vertical
//! bound grows with the server's own simulated fall speed, so an honest long
//! fall is not corrected every tick.

use glam::{Quat, Vec3};
use skirmish_config::Config;
use skirmish_net::MovementUpdate;

use crate::collision::CollisionQuery;
use crate::movement::{self, MoveInput, MoveState};

// ---------------------------------------------------------------------------
// MoveVerdict
// ---------------------------------------------------------------------------

/// Outcome of checking one reported movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveVerdict {
    /// The reported transform was adopted.
    Accepted,
    /// The reported transform was discarded.
    Rejected {
        /// Reported displacement (infinite for non-finite reports).
        distance: f32,
        /// Maximum allowed displacement.
        max: f32,
    },
}

impl MoveVerdict {
    /// Returns `true` for [`MoveVerdict::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, MoveVerdict::Accepted)
    }
}

// ---------------------------------------------------------------------------
// MovementValidator
// ---------------------------------------------------------------------------

/// Displacement bound `move_speed × tick_interval × tolerance_factor`, plus
/// a vertical allowance of `fall_speed × tick_interval × tolerance_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementValidator {
    max_step: f32,
    step_scale: f32,
    max_fall_speed: f32,
}

impl MovementValidator {
    /// Validator with an explicit per-update bound and no fall allowance.
    pub fn new(max_step: f32) -> Self {
        Self {
            max_step,
            step_scale: 0.0,
            max_fall_speed: 0.0,
        }
    }

    /// Validator derived from movement tuning and the tick rate.
    pub fn from_config(config: &Config) -> Self {
        let step_scale = config.tick_interval() * config.movement.tolerance_factor;
        Self {
            max_step: config.movement.move_speed * step_scale,
            step_scale,
            max_fall_speed: config.movement.max_fall_speed.max(0.0),
        }
    }

    /// Maximum horizontal displacement accepted per update.
    pub fn max_step(&self) -> f32 {
        self.max_step
    }

    /// Maximum vertical displacement accepted per update while moving
    /// vertically at `vertical_speed`.
    pub fn max_rise(&self, vertical_speed: f32) -> f32 {
        let speed = if vertical_speed.is_finite() {
            vertical_speed.abs().min(self.max_fall_speed)
        } else {
            0.0
        };
        self.max_step + speed * self.step_scale
    }

    /// Checks the displacement from `previous` to `reported` for a body
    /// the server sees moving vertically at `vertical_speed`.
    pub fn check(&self, previous: Vec3, reported: Vec3, vertical_speed: f32) -> MoveVerdict {
        if !reported.is_finite() {
            return MoveVerdict::Rejected {
                distance: f32::INFINITY,
                max: self.max_step,
            };
        }
        let delta = reported - previous;
        let horizontal = Vec3::new(delta.x, 0.0, delta.z).length();
        if horizontal > self.max_step {
            return MoveVerdict::Rejected {
                distance: horizontal,
                max: self.max_step,
            };
        }
        let max_rise = self.max_rise(vertical_speed);
        if delta.y.abs() > max_rise {
            return MoveVerdict::Rejected {
                distance: delta.y.abs(),
                max: max_rise,
            };
        }
        MoveVerdict::Accepted
    }
}

/// Runs the shared movement rule for `update` from the server's own state
/// and decides which result becomes authoritative.
pub fn reconcile_movement(
    authoritative: &MoveState,
    update: &MovementUpdate,
    validator: &MovementValidator,
    config: &Config,
    world: &dyn CollisionQuery,
) -> (MoveState, MoveVerdict) {
    let input = MoveInput {
        axes: update.input,
        jump: update.jump,
        yaw_deg: if update.yaw_deg.is_finite() {
            update.yaw_deg
        } else {
            0.0
        },
    };
    let simulated = movement::step(
        authoritative,
        &input,
        &config.movement,
        config.simulation.gravity,
        config.tick_interval(),
        world,
    );

    let mut verdict = validator.check(
        authoritative.position,
        update.position,
        simulated.velocity.y,
    );
    if verdict.is_accepted() && !update.velocity.is_finite() {
        verdict = MoveVerdict::Rejected {
            distance: f32::INFINITY,
            max: validator.max_step(),
        };
    }

    match verdict {
        MoveVerdict::Accepted => (
            MoveState {
                position: update.position,
                velocity: update.velocity,
                ..simulated
            },
            verdict,
        ),
        MoveVerdict::Rejected { distance, max } => {
            tracing::debug!(
                entity = %update.entity,
                sequence = update.sequence,
                distance,
                max,
                "movement rejected"
            );
            (simulated, verdict)
        }
    }
}

// ---------------------------------------------------------------------------
// Rotation sanity
// ---------------------------------------------------------------------------

/// Returns `true` if `q` is finite and not degenerate.
pub fn is_valid_quat(q: Quat) -> bool {
    q.is_finite() && q.length() > 0.001
}

/// Normalized `q`, or `None` when it must be ignored.
pub fn sanitize_rotation(q: Quat) -> Option<Quat> {
    is_valid_quat(q).then(|| q.normalize())
}

/// Finite look angles with pitch re-clamped, or `None` when they must be
/// ignored.
pub fn sanitize_look(pitch_deg: f32, yaw_deg: f32, pitch_limit_deg: f32) -> Option<(f32, f32)> {
    (pitch_deg.is_finite() && yaw_deg.is_finite())
        .then(|| (pitch_deg.clamp(-pitch_limit_deg, pitch_limit_deg), yaw_deg))
}
