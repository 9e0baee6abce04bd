//! Death sequence: spawn sides, the shared countdown, and the server guard
//! that starts the sequence once per death.
//!
//! Every session derives its spawn point from its own id and plays the
//! countdown from a timeline built only from [`MatchConfig`], so all
//! sessions compute identical positions and cue times without the server
//! sending either.

use glam::Vec3;
use skirmish_config::MatchConfig;
use skirmish_net::{NetworkId, SessionId};

use crate::schedule::Scheduler;

// ---------------------------------------------------------------------------
// Spawn sides
// ---------------------------------------------------------------------------

/// Which end of the arena a session spawns at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpawnSide {
    /// The host's side.
    A,
    /// Everyone else.
    B,
}

impl SpawnSide {
    /// The first-connected session (the host) takes side A.
    pub fn for_session(session: SessionId) -> Self {
        if session == SessionId::HOST {
            SpawnSide::A
        } else {
            SpawnSide::B
        }
    }

    /// Spawn point for this side.
    pub fn spawn_point(self, rules: &MatchConfig) -> Vec3 {
        match self {
            SpawnSide::A => Vec3::from_array(rules.spawn_a),
            SpawnSide::B => Vec3::from_array(rules.spawn_b),
        }
    }

    /// Team color shown in the lobby.
    pub fn label(self) -> &'static str {
        match self {
            SpawnSide::A => "orange",
            SpawnSide::B => "green",
        }
    }
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// One cue of the freeze countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownCue {
    /// A numeric step, counting down to 1.
    Step(u32),
    /// "GO!"
    Go,
    /// The countdown display clears.
    Done,
}

impl CountdownCue {
    /// Text shown for this cue.
    pub fn label(&self) -> String {
        match self {
            CountdownCue::Step(n) => n.to_string(),
            CountdownCue::Go => "GO!".to_string(),
            CountdownCue::Done => String::new(),
        }
    }
}

/// Cue offsets (seconds from start) for `rules`.
pub fn countdown_timeline(rules: &MatchConfig) -> Vec<(f32, CountdownCue)> {
    let steps = rules.countdown_steps;
    let step = rules.countdown_step_secs.max(0.0);
    let mut timeline: Vec<(f32, CountdownCue)> = (0..steps)
        .map(|i| (i as f32 * step, CountdownCue::Step(steps - i)))
        .collect();
    let go = steps as f32 * step;
    timeline.push((go, CountdownCue::Go));
    timeline.push((go + rules.go_hold_secs.max(0.0), CountdownCue::Done));
    timeline
}

/// Seconds from the first cue to [`CountdownCue::Done`].
pub fn countdown_length(rules: &MatchConfig) -> f32 {
    rules.countdown_steps as f32 * rules.countdown_step_secs.max(0.0)
        + rules.go_hold_secs.max(0.0)
}

/// A running countdown on one session.
#[derive(Debug)]
pub struct CountdownSequence {
    cues: Scheduler<CountdownCue>,
    finished: bool,
}

impl CountdownSequence {
    /// Starts the countdown now. The first cue fires on the next advance.
    pub fn start(rules: &MatchConfig) -> Self {
        let mut cues = Scheduler::new();
        for (offset, cue) in countdown_timeline(rules) {
            cues.schedule_after(offset, cue);
        }
        Self {
            cues,
            finished: false,
        }
    }

    /// Advances by `dt` and returns every cue now due with its scheduled
    /// offset, independent of frame timing.
    pub fn advance(&mut self, dt: f32) -> Vec<(f64, CountdownCue)> {
        let due = self.cues.advance(dt);
        if due.iter().any(|(_, cue)| *cue == CountdownCue::Done) {
            self.finished = true;
        }
        due
    }

    /// Seconds since start.
    pub fn elapsed(&self) -> f64 {
        self.cues.now()
    }

    /// Returns `true` after [`CountdownCue::Done`].
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

// ---------------------------------------------------------------------------
// DeathDirector
// ---------------------------------------------------------------------------

/// Server-side phase of the death sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeathPhase {
    /// No sequence running.
    #[default]
    Idle,
    /// Input frozen; waiting out the grace delay.
    Grace {
        /// Whose death started it.
        victim: NetworkId,
    },
    /// Everyone respawned; the countdown is playing.
    Countdown {
        /// Whose death started it.
        victim: NetworkId,
    },
}

/// Guards the death sequence so it starts once per death and runs to
/// completion before another can start.
///
/// A death during the grace delay is covered by the respawn that ends it.
/// A death during the countdown happened after that respawn, so it is
/// queued and starts the next sequence when the countdown ends.
#[derive(Debug, Clone, Default)]
pub struct DeathDirector {
    phase: DeathPhase,
    pending: Vec<NetworkId>,
}

impl DeathDirector {
    /// Idle director.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> DeathPhase {
        self.phase
    }

    /// Returns `true` while a sequence is running.
    pub fn is_running(&self) -> bool {
        self.phase != DeathPhase::Idle
    }

    /// Starts the sequence for `victim`. Returns `false` while another
    /// sequence is running; a death during its countdown is queued.
    pub fn begin(&mut self, victim: NetworkId) -> bool {
        match self.phase {
            DeathPhase::Idle => {
                tracing::info!(%victim, "death sequence started");
                self.phase = DeathPhase::Grace { victim };
                true
            }
            DeathPhase::Grace { .. } => {
                tracing::debug!(%victim, "death folded into pending respawn");
                false
            }
            DeathPhase::Countdown { .. } => {
                if !self.pending.contains(&victim) {
                    self.pending.push(victim);
                }
                tracing::debug!(
                    %victim,
                    queued = self.pending.len(),
                    "death queued behind countdown"
                );
                false
            }
        }
    }

    /// Deaths waiting for the current countdown to end.
    pub fn pending(&self) -> &[NetworkId] {
        &self.pending
    }

    /// Takes the queued deaths once the director is idle. One respawn
    /// covers all of them, so only the first is returned.
    pub fn take_pending(&mut self) -> Option<NetworkId> {
        if self.is_running() {
            return None;
        }
        let first = self.pending.first().copied();
        self.pending.clear();
        first
    }

    /// Grace delay over: returns the victim and enters the countdown.
    pub fn respawning(&mut self) -> Option<NetworkId> {
        match self.phase {
            DeathPhase::Grace { victim } => {
                self.phase = DeathPhase::Countdown { victim };
                Some(victim)
            }
            _ => None,
        }
    }

    /// Countdown over. Returns `true` if a sequence just completed.
    pub fn finish(&mut self) -> bool {
        match self.phase {
            DeathPhase::Countdown { victim } => {
                tracing::info!(%victim, "death sequence complete");
                self.phase = DeathPhase::Idle;
                true
            }
            _ => false,
        }
    }
}
