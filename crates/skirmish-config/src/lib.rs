//! Configuration system for the Skirmish replication core.
//!
//! Provides runtime-configurable tuning (movement, projectiles, match rules)
//! that persists to disk as RON files. Supports CLI overrides via clap and
//! hot-reload detection.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebugConfig, GunConfig, InterpolationConfig, LookConfig, MatchConfig,
    MovementConfig, NetworkConfig, ProjectileConfig, ProjectilePresets, SimulationConfig,
    default_config_dir,
};
pub use error::ConfigError;
