//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level match configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Network/session settings.
    pub network: NetworkConfig,
    /// Fixed-step simulation settings.
    pub simulation: SimulationConfig,
    /// Avatar movement tuning.
    pub movement: MovementConfig,
    /// Look rotation tuning.
    pub look: LookConfig,
    /// Held gun tuning.
    pub gun: GunConfig,
    /// Remote interpolation tuning.
    pub interpolation: InterpolationConfig,
    /// Projectile presets.
    pub projectiles: ProjectilePresets,
    /// Health, death and respawn rules.
    pub match_rules: MatchConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server address.
    pub server_address: String,
    /// Server port.
    pub server_port: u16,
    /// Maximum number of sessions (server only).
    pub max_players: u32,
    /// Avatar snapshot broadcast rate (Hz), independent of the tick rate.
    pub snapshot_rate_hz: u32,
}

/// Fixed-step simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Physics tick rate (Hz).
    pub tick_rate_hz: u32,
    /// Vertical gravity acceleration (m/s², negative = down).
    pub gravity: f32,
}

/// Avatar movement configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Maximum horizontal speed (m/s).
    pub move_speed: f32,
    /// Linear drag applied while grounded.
    pub ground_drag: f32,
    /// Upward velocity added by a jump (m/s).
    pub jump_force: f32,
    /// Minimum seconds between jumps.
    pub jump_cooldown_secs: f32,
    /// Force multiplier while airborne.
    pub air_multiplier: f32,
    /// Server sanity bound multiplier: `move_speed * tick * tolerance_factor`.
    pub tolerance_factor: f32,
    /// Fastest fall the server bound allows for (m/s).
    pub max_fall_speed: f32,
    /// Distance from the avatar origin down to its feet (m).
    pub player_height: f32,
}

/// Look rotation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LookConfig {
    /// Horizontal mouse sensitivity.
    pub x_sensitivity: f32,
    /// Vertical mouse sensitivity.
    pub y_sensitivity: f32,
    /// Pitch clamp in degrees (symmetric).
    pub pitch_limit_deg: f32,
    /// Blend rate non-owners use toward the replicated look (per second).
    pub smooth_rate: f32,
}

/// Held gun configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GunConfig {
    /// Blend rate of the gun toward its target transform (per second).
    pub follow_speed: f32,
    /// Offset from the camera, in camera space.
    pub offset: [f32; 3],
    /// Forward impulse applied to fired projectiles.
    pub fire_force: f32,
    /// Upward impulse applied to fired projectiles.
    pub upward_force: f32,
    /// Random spread added to the fire direction.
    pub spread: f32,
    /// Magazine size.
    pub ammo: u32,
    /// Shots per trigger pull.
    pub bullets_per_tap: u32,
    /// Seconds between shots.
    pub time_between_shots_secs: f32,
    /// Seconds a reload takes.
    pub reload_secs: f32,
    /// Whether holding the trigger keeps firing.
    pub allow_button_hold: bool,
    /// Minimum movement (m) before the owner resends the gun transform.
    pub resend_distance: f32,
    /// Minimum rotation (degrees) before the owner resends the gun transform.
    pub resend_angle_deg: f32,
    /// Which projectile preset this gun fires.
    pub fires_rockets: bool,
}

/// Remote interpolation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Exponential blend rate toward the authoritative value (per second).
    pub blend_rate: f32,
    /// Snap when error exceeds `speed * frame_time * snap_factor`.
    pub snap_factor: f32,
}

/// Tuning for one projectile type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Area-of-effect (`true`) or direct-hit (`false`) damage model.
    pub explosive: bool,
    /// Explosion base damage or direct-hit damage.
    pub damage: f32,
    /// Explosion radius (ignored for direct hits).
    pub explosion_radius: f32,
    /// Explode on the first qualifying contact.
    pub explode_on_touch: bool,
    /// Direct-hit projectiles keep flying after damaging a body.
    pub penetrate: bool,
    /// Seconds before the projectile expires.
    pub lifetime_secs: f32,
    /// Contacts after which the projectile resolves.
    pub max_collisions: u32,
    /// Restitution on non-resolving contacts (0..1).
    pub bounce: f32,
    /// Whether gravity affects the projectile.
    pub use_gravity: bool,
    /// Observer snapshot rate (Hz), independent of the tick rate.
    pub sync_rate_hz: f32,
    /// Delay between the terminal transition and despawn.
    pub despawn_delay_secs: f32,
    /// Collision radius (m).
    pub collider_radius: f32,
    /// Nominal flight speed used for observer snap thresholds (m/s).
    pub nominal_speed: f32,
}

/// The projectile presets a gun can fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectilePresets {
    /// Explosive rocket.
    pub rocket: ProjectileConfig,
    /// Direct-hit bullet.
    pub bullet: ProjectileConfig,
}

/// Health, death and respawn rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchConfig {
    /// Health every avatar spawns with.
    pub max_health: f32,
    /// Seconds between a death and the respawn broadcast.
    pub death_grace_secs: f32,
    /// Numeric countdown steps (3 → "3", "2", "1").
    pub countdown_steps: u32,
    /// Seconds each numeric step is shown.
    pub countdown_step_secs: f32,
    /// Seconds "GO!" is shown before input returns.
    pub go_hold_secs: f32,
    /// Spawn point for side A (first-connected session).
    pub spawn_a: [f32; 3],
    /// Spawn point for side B (everyone else).
    pub spawn_b: [f32; 3],
    /// Sessions required before the match countdown starts.
    pub min_players: u32,
    /// Delay between connect and initial placement at the spawn point.
    pub initial_spawn_delay_secs: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 7777,
            max_players: 8,
            snapshot_rate_hz: 20,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 50,
            gravity: -9.81,
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            ground_drag: 5.0,
            jump_force: 10.0,
            jump_cooldown_secs: 0.2,
            air_multiplier: 0.4,
            tolerance_factor: 4.0,
            max_fall_speed: 50.0,
            player_height: 1.0,
        }
    }
}

impl Default for LookConfig {
    fn default() -> Self {
        Self {
            x_sensitivity: 30.0,
            y_sensitivity: 30.0,
            pitch_limit_deg: 80.0,
            smooth_rate: 15.0,
        }
    }
}

impl Default for GunConfig {
    fn default() -> Self {
        Self {
            follow_speed: 15.0,
            offset: [0.5, -0.3, 0.8],
            fire_force: 30.0,
            upward_force: 2.0,
            spread: 0.02,
            ammo: 6,
            bullets_per_tap: 1,
            time_between_shots_secs: 0.5,
            reload_secs: 1.5,
            allow_button_hold: false,
            resend_distance: 0.01,
            resend_angle_deg: 1.0,
            fires_rockets: true,
        }
    }
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            blend_rate: 15.0,
            snap_factor: 3.0,
        }
    }
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        ProjectilePresets::rocket()
    }
}

impl ProjectilePresets {
    /// The explosive rocket preset.
    pub fn rocket() -> ProjectileConfig {
        ProjectileConfig {
            explosive: true,
            damage: 100.0,
            explosion_radius: 5.0,
            explode_on_touch: true,
            penetrate: false,
            lifetime_secs: 5.0,
            max_collisions: 3,
            bounce: 0.3,
            use_gravity: true,
            sync_rate_hz: 60.0,
            despawn_delay_secs: 0.2,
            collider_radius: 0.15,
            nominal_speed: 30.0,
        }
    }

    /// The direct-hit bullet preset.
    pub fn bullet() -> ProjectileConfig {
        ProjectileConfig {
            explosive: false,
            damage: 50.0,
            explosion_radius: 0.0,
            explode_on_touch: false,
            penetrate: false,
            lifetime_secs: 5.0,
            max_collisions: 3,
            bounce: 0.0,
            use_gravity: false,
            sync_rate_hz: 120.0,
            despawn_delay_secs: 0.1,
            collider_radius: 0.05,
            nominal_speed: 50.0,
        }
    }
}

impl Default for ProjectilePresets {
    fn default() -> Self {
        Self {
            rocket: Self::rocket(),
            bullet: Self::bullet(),
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            death_grace_secs: 3.0,
            countdown_steps: 3,
            countdown_step_secs: 1.0,
            go_hold_secs: 0.5,
            spawn_a: [0.0, 1.0, -12.0],
            spawn_b: [0.0, 1.0, 12.0],
            min_players: 2,
            initial_spawn_delay_secs: 1.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for Skirmish, falling back to the working
/// directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("skirmish"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

/// File name of the persisted config inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Loads `config.ron` from `config_dir`, writing the defaults there first
    /// if it does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            let config = read_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            return Ok(config);
        }
        let config = Config::default();
        config.save(config_dir)?;
        log::info!("Created default config at {}", path.display());
        Ok(config)
    }

    /// Writes the config to `config_dir/config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, serialized).map_err(write_err)
    }

    /// Re-reads the file. Returns `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE))?;
        if &fresh == self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(fresh))
    }

    /// Rejects values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.simulation.tick_rate_hz == 0 {
            return invalid("simulation.tick_rate_hz", "must be positive");
        }
        if self.network.snapshot_rate_hz == 0 {
            return invalid("network.snapshot_rate_hz", "must be positive");
        }
        if !positive(self.match_rules.max_health) {
            return invalid("match_rules.max_health", "must be positive");
        }
        if self.match_rules.min_players == 0 {
            return invalid("match_rules.min_players", "must be at least 1");
        }
        for (field, preset) in [
            ("projectiles.rocket.sync_rate_hz", &self.projectiles.rocket),
            ("projectiles.bullet.sync_rate_hz", &self.projectiles.bullet),
        ] {
            if !positive(preset.sync_rate_hz) {
                return invalid(field, "must be positive");
            }
        }
        if !(self.movement.tolerance_factor.is_finite() && self.movement.tolerance_factor >= 1.0) {
            return invalid("movement.tolerance_factor", "must be at least 1");
        }
        if !(self.movement.max_fall_speed.is_finite() && self.movement.max_fall_speed >= 0.0) {
            return invalid("movement.max_fall_speed", "must not be negative");
        }
        Ok(())
    }

    /// Seconds per physics tick.
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.simulation.tick_rate_hz.max(1) as f32
    }
}
