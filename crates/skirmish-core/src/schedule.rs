//! Fixed-step tick accumulation and timed continuations.
//!
//! [`TickSchedule`] turns variable frame time into whole simulation ticks.
//! [`Scheduler`] holds events that resume after a delay measured in
//! simulation time, so countdowns and grace periods never stall a tick.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

// ---------------------------------------------------------------------------
// TickSchedule
// ---------------------------------------------------------------------------

/// Fixed-rate tick scheduler for the simulation loop.
///
/// Accumulates real elapsed time and yields discrete ticks at the configured
/// rate.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    accumulator_secs: f64,
    tick_duration_secs: f64,
    total_ticks: u64,
}

impl TickSchedule {
    /// Creates a schedule ticking at `hz` (clamped to at least 1 Hz).
    pub fn with_tick_rate(hz: u32) -> Self {
        Self {
            accumulator_secs: 0.0,
            tick_duration_secs: 1.0 / f64::from(hz.max(1)),
            total_ticks: 0,
        }
    }

    /// Adds a frame of `dt_secs` and returns how many whole ticks are now due.
    pub fn accumulate(&mut self, dt_secs: f64) -> u32 {
        self.accumulator_secs += dt_secs;
        let mut ticks = 0u32;
        while self.accumulator_secs >= self.tick_duration_secs {
            self.accumulator_secs -= self.tick_duration_secs;
            self.total_ticks += 1;
            ticks += 1;
        }
        ticks
    }

    /// Ticks handed out so far.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Length of one tick.
    pub fn tick_duration_secs(&self) -> f64 {
        self.tick_duration_secs
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pending<E> {
    at: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Pending<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Pending<E> {}

impl<E> PartialOrd for Pending<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Pending<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Queue of events due at a future simulation time.
///
/// Events due at the same instant fire in the order they were scheduled.
#[derive(Debug)]
pub struct Scheduler<E> {
    now: f64,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Pending<E>>>,
}

impl<E> Scheduler<E> {
    /// Creates an empty scheduler at time zero.
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Simulation clock, advanced by [`Scheduler::advance`].
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Schedules `event` to fire `delay_secs` from now.
    pub fn schedule_after(&mut self, delay_secs: f32, event: E) {
        let at = self.now + f64::from(delay_secs.max(0.0));
        self.queue.push(Reverse(Pending {
            at,
            seq: self.next_seq,
            event,
        }));
        self.next_seq += 1;
    }

    /// Advances time by `dt_secs` and returns every event now due, paired
    /// with the time it was scheduled for.
    pub fn advance(&mut self, dt_secs: f32) -> Vec<(f64, E)> {
        self.now += f64::from(dt_secs.max(0.0));
        let mut due = Vec::new();
        while self
            .queue
            .peek()
            .is_some_and(|Reverse(p)| p.at <= self.now + 1e-9)
        {
            if let Some(Reverse(p)) = self.queue.pop() {
                due.push((p.at, p.event));
            }
        }
        due
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
