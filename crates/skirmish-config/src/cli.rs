//! Command-line argument parsing for the Skirmish server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Skirmish command-line arguments.
///
/// Every flag left out keeps the value from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "skirmish", about = "Skirmish authoritative match server")]
pub struct CliArgs {
    /// Server address.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Physics tick rate (Hz).
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Avatar snapshot rate (Hz).
    #[arg(long)]
    pub snapshot_rate: Option<u32>,

    /// Sessions that must be connected before the countdown starts.
    #[arg(long)]
    pub players: Option<u32>,

    /// Health every avatar spawns with.
    #[arg(long)]
    pub max_health: Option<f32>,

    /// Tracing filter, e.g. `debug,skirmish_core=trace`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding `config.ron` and `logs/`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Simulated match length in seconds.
    #[arg(long, default_value_t = 30.0)]
    pub duration: f32,

    /// Seed for scripted bot input and weapon spread.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,
}

impl Config {
    /// Overwrites the fields whose flags were given.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(address) = &args.server {
            self.network.server_address.clone_from(address);
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(rate) = args.tick_rate {
            self.simulation.tick_rate_hz = rate;
        }
        if let Some(rate) = args.snapshot_rate {
            self.network.snapshot_rate_hz = rate;
        }
        if let Some(players) = args.players {
            self.match_rules.min_players = players;
        }
        if let Some(health) = args.max_health {
            self.match_rules.max_health = health;
        }
        if let Some(level) = &args.log_level {
            self.debug.log_level.clone_from(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            server: Some("10.1.4.20".to_string()),
            tick_rate: Some(60),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.server_address, "10.1.4.20");
        assert_eq!(config.simulation.tick_rate_hz, 60);
        // untouched
        assert_eq!(config.network.server_port, 7777);
        assert_eq!(config.network.snapshot_rate_hz, 20);
    }

    #[test]
    fn test_empty_args_change_nothing() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["skirmish", "--port", "9000", "--duration", "12.5"]);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.duration, 12.5);
        assert_eq!(args.seed, 7);
    }

    #[test]
    fn test_cli_match_rule_overrides() {
        let args = CliArgs::parse_from(["skirmish", "--players", "4", "--max-health", "250"]);
        let mut config = Config::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.match_rules.min_players, 4);
        assert_eq!(config.match_rules.max_health, 250.0);
    }
}
