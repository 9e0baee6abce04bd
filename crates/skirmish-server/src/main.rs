//! Skirmish match server.
//!
//! Hosts one authoritative match in-process: the host session plus scripted
//! remote sessions, all talking through the loopback hub. Configuration is
//! loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p skirmish-server -- --duration 60 --seed 3`.

mod bot;

use clap::Parser;
use serde::Serialize;
use skirmish_config::{CliArgs, Config, default_config_dir};
use skirmish_core::{FrameInput, LoopbackMatch, MatchStats};
use skirmish_net::{HubError, SessionId};
use tracing::{error, info};

use crate::bot::Bot;

/// Frame length the sessions render at.
const FRAME_SECS: f32 = 1.0 / 60.0;

/// Seconds between progress lines.
const REPORT_EVERY_SECS: f64 = 5.0;

#[derive(Debug, Serialize)]
struct MatchSummary {
    duration_secs: f64,
    sessions: usize,
    server_ticks: u64,
    messages: u64,
    bytes: u64,
    stats: MatchStats,
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Rejected CLI overrides: {e}");
        std::process::exit(2);
    }

    let log_dir = config_dir.join("logs");
    skirmish_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    info!(
        "Skirmish server: tick={}Hz snapshots={}Hz players={} duration={:.1}s seed={}",
        config.simulation.tick_rate_hz,
        config.network.snapshot_rate_hz,
        config.match_rules.min_players,
        args.duration,
        args.seed,
    );

    match run(config, args.duration, args.seed) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => info!("Match finished:\n{json}"),
            Err(e) => error!("Failed to encode summary: {e}"),
        },
        Err(e) => {
            error!("Match aborted: {e}");
            std::process::exit(1);
        }
    }
}

fn run(config: Config, duration: f32, seed: u64) -> Result<MatchSummary, HubError> {
    let players = config.match_rules.min_players.max(2);
    let mut game = LoopbackMatch::new(config);

    let mut bots: Vec<(SessionId, Bot)> = Vec::new();
    for index in 0..players {
        let session_seed = seed.wrapping_add(u64::from(index));
        let session = game.join(index == 0, session_seed)?;
        bots.push((session, Bot::new(session_seed.rotate_left(17))));
    }

    let mut next_report = REPORT_EVERY_SECS;
    let mut inputs: Vec<(SessionId, FrameInput)> = Vec::with_capacity(bots.len());
    while game.elapsed() < f64::from(duration) {
        inputs.clear();
        inputs.extend(
            bots.iter_mut()
                .map(|(session, bot)| (*session, bot.next_input(FRAME_SECS))),
        );
        game.step(FRAME_SECS, &inputs)?;

        if game.elapsed() >= next_report {
            next_report += REPORT_EVERY_SECS;
            let server = game.server();
            info!(
                tick = server.tick(),
                input_enabled = server.input_enabled(),
                phase = ?server.death_phase(),
                shots = server.stats().shots,
                deaths = server.stats().deaths,
                "match progress"
            );
        }
    }

    let hub = game.hub_stats();
    Ok(MatchSummary {
        duration_secs: game.elapsed(),
        sessions: game.sessions().count(),
        server_ticks: game.server().tick(),
        messages: hub.messages,
        bytes: hub.bytes,
        stats: game.server().stats(),
    })
}
