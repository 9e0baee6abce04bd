//! Scripted input for sessions nobody is playing.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skirmish_core::{FrameInput, TriggerInput};

/// Wanders, turns and shoots at random, changing its mind every so often.
pub struct Bot {
    rng: ChaCha8Rng,
    axes: Vec2,
    turn: f32,
    until_change: f32,
}

impl Bot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            axes: Vec2::ZERO,
            turn: 0.0,
            until_change: 0.0,
        }
    }

    /// Input for the next frame of `dt` seconds.
    pub fn next_input(&mut self, dt: f32) -> FrameInput {
        self.until_change -= dt;
        if self.until_change <= 0.0 {
            self.until_change = self.rng.random_range(0.5..1.5);
            self.axes = Vec2::new(
                self.rng.random_range(-1.0..=1.0),
                self.rng.random_range(-1.0..=1.0),
            );
            self.turn = self.rng.random_range(-40.0..=40.0);
        }
        let pressed = self.rng.random_bool(0.02);
        FrameInput {
            axes: self.axes,
            jump: self.rng.random_bool(0.01),
            look: Vec2::new(self.turn, self.rng.random_range(-5.0..=5.0)),
            trigger: TriggerInput {
                pressed,
                held: pressed,
                reload: false,
            },
        }
    }
}
