//! Owner-side weapon state: ammo, fire cadence, reload and spread.
//!
//! The weapon only decides *whether* and *in which direction* to fire; the
//! owner turns each [`WeaponEvent::Fired`] into a fire command for the
//! server, which alone spawns projectiles.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skirmish_config::GunConfig;

/// Trigger state for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerInput {
    /// Trigger went down this frame.
    pub pressed: bool,
    /// Trigger is held.
    pub held: bool,
    /// Reload requested.
    pub reload: bool,
}

/// Something the weapon did this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeaponEvent {
    /// One shot left the muzzle.
    Fired {
        /// Unit direction including spread.
        direction: Vec3,
    },
    /// Trigger pulled on an empty magazine.
    EmptyClick,
    /// Reload began.
    ReloadStarted,
    /// Magazine refilled.
    ReloadFinished,
}

/// Ammo, cooldown and reload timer of a held gun.
#[derive(Debug, Clone)]
pub struct WeaponState {
    config: GunConfig,
    ammo: u32,
    cooldown: f32,
    reload_left: Option<f32>,
    rng: ChaCha8Rng,
}

impl WeaponState {
    /// Full magazine; `seed` makes the spread reproducible.
    pub fn new(config: GunConfig, seed: u64) -> Self {
        Self {
            ammo: config.ammo,
            config,
            cooldown: 0.0,
            reload_left: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Rounds left.
    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    /// Returns `true` while reloading.
    pub fn is_reloading(&self) -> bool {
        self.reload_left.is_some()
    }

    /// Advances timers and handles the trigger. `aim` is the muzzle rotation.
    pub fn tick(&mut self, dt: f32, trigger: TriggerInput, aim: Quat) -> Vec<WeaponEvent> {
        let mut events = Vec::new();
        self.cooldown = (self.cooldown - dt).max(0.0);

        if let Some(left) = self.reload_left {
            let left = left - dt;
            if left > 0.0 {
                self.reload_left = Some(left);
                return events;
            }
            self.reload_left = None;
            self.ammo = self.config.ammo;
            events.push(WeaponEvent::ReloadFinished);
        }

        if trigger.reload && self.ammo < self.config.ammo {
            self.start_reload(&mut events);
            return events;
        }

        let wants_fire = trigger.pressed || (self.config.allow_button_hold && trigger.held);
        if !wants_fire || self.cooldown > 0.0 {
            return events;
        }
        if self.ammo == 0 {
            events.push(WeaponEvent::EmptyClick);
            self.start_reload(&mut events);
            return events;
        }

        let burst = self.config.bullets_per_tap.max(1).min(self.ammo);
        for _ in 0..burst {
            let direction = self.spread(aim);
            events.push(WeaponEvent::Fired { direction });
        }
        self.ammo -= burst;
        self.cooldown = self.config.time_between_shots_secs;
        events
    }

    fn start_reload(&mut self, events: &mut Vec<WeaponEvent>) {
        self.reload_left = Some(self.config.reload_secs.max(0.0));
        events.push(WeaponEvent::ReloadStarted);
        tracing::trace!(ammo = self.ammo, "reload started");
    }

    fn spread(&mut self, aim: Quat) -> Vec3 {
        let forward = aim * Vec3::Z;
        let s = self.config.spread.abs();
        if s == 0.0 {
            return forward.normalize_or_zero();
        }
        let x = self.rng.random_range(-s..=s);
        let y = self.rng.random_range(-s..=s);
        (forward + aim * Vec3::new(x, y, 0.0)).normalize_or(forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.02;

    fn pull() -> TriggerInput {
        TriggerInput {
            pressed: true,
            held: true,
            reload: false,
        }
    }

    fn fired(events: &[WeaponEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, WeaponEvent::Fired { .. }))
            .count()
    }

    #[test]
    fn test_cadence() {
        let mut weapon = WeaponState::new(GunConfig::default(), 1);
        assert_eq!(fired(&weapon.tick(DT, pull(), Quat::IDENTITY)), 1);
        // Cooldown of 0.5 s blocks the next pull.
        assert_eq!(fired(&weapon.tick(DT, pull(), Quat::IDENTITY)), 0);
        for _ in 0..30 {
            weapon.tick(DT, TriggerInput::default(), Quat::IDENTITY);
        }
        assert_eq!(fired(&weapon.tick(DT, pull(), Quat::IDENTITY)), 1);
        assert_eq!(weapon.ammo(), 4);
    }

    #[test]
    fn test_hold_requires_button_hold() {
        let held = TriggerInput {
            pressed: false,
            held: true,
            reload: false,
        };
        let mut weapon = WeaponState::new(GunConfig::default(), 1);
        assert!(weapon.tick(DT, held, Quat::IDENTITY).is_empty());

        let config = GunConfig {
            allow_button_hold: true,
            ..GunConfig::default()
        };
        let mut auto = WeaponState::new(config, 1);
        assert_eq!(fired(&auto.tick(DT, held, Quat::IDENTITY)), 1);
    }

    #[test]
    fn test_empty_click_starts_reload() {
        let config = GunConfig {
            ammo: 1,
            time_between_shots_secs: 0.0,
            ..GunConfig::default()
        };
        let reload_secs = config.reload_secs;
        let mut weapon = WeaponState::new(config, 1);
        assert_eq!(fired(&weapon.tick(DT, pull(), Quat::IDENTITY)), 1);
        assert_eq!(
            weapon.tick(DT, pull(), Quat::IDENTITY),
            vec![WeaponEvent::EmptyClick, WeaponEvent::ReloadStarted]
        );
        assert!(weapon.is_reloading());

        let mut finished = false;
        let mut elapsed = 0.0;
        while elapsed < reload_secs + 0.1 {
            elapsed += DT;
            let events = weapon.tick(DT, TriggerInput::default(), Quat::IDENTITY);
            finished |= events.contains(&WeaponEvent::ReloadFinished);
        }
        assert!(finished);
        assert_eq!(weapon.ammo(), 1);
    }

    #[test]
    fn test_burst_limited_by_ammo() {
        let config = GunConfig {
            ammo: 2,
            bullets_per_tap: 3,
            ..GunConfig::default()
        };
        let mut weapon = WeaponState::new(config, 1);
        assert_eq!(fired(&weapon.tick(DT, pull(), Quat::IDENTITY)), 2);
        assert_eq!(weapon.ammo(), 0);
    }

    #[test]
    fn test_spread_is_seeded_and_bounded() {
        let config = GunConfig {
            spread: 0.1,
            ..GunConfig::default()
        };
        let mut a = WeaponState::new(config.clone(), 9);
        let mut b = WeaponState::new(config, 9);
        let aim = Quat::from_rotation_y(0.7);
        let shot_a = a.tick(DT, pull(), aim);
        let shot_b = b.tick(DT, pull(), aim);
        assert_eq!(shot_a, shot_b);

        let WeaponEvent::Fired { direction } = shot_a[0] else {
            panic!("expected a shot");
        };
        assert!((direction.length() - 1.0).abs() < 1e-5);
        assert!(direction.dot(aim * Vec3::Z) > 0.98);
    }
}
