//! End-to-end match flow over the loopback hub: every message crosses the
//! wire codec between the server and two sessions.

use glam::{Vec2, Vec3};
use skirmish_config::Config;
use skirmish_core::{
    ClientEffect, CountdownCue, FrameInput, LoopbackMatch, SpawnSide, TriggerInput,
};
use skirmish_net::{Message, MovementUpdate, NetworkId, SessionId, TerminalKind};

const DT: f32 = 1.0 / 60.0;

fn two_player_match() -> (LoopbackMatch, SessionId, SessionId) {
    let mut game = LoopbackMatch::new(Config::default());
    let host = game.join(true, 11).unwrap();
    let guest = game.join(false, 22).unwrap();
    (game, host, guest)
}

fn started_match() -> (LoopbackMatch, SessionId, SessionId) {
    let (mut game, host, guest) = two_player_match();
    game.run_for(4.8, DT).unwrap();
    (game, host, guest)
}

fn avatar_of(game: &LoopbackMatch, session: SessionId) -> NetworkId {
    game.server()
        .sessions()
        .get(session)
        .and_then(|s| s.avatar)
        .expect("session has an avatar")
}

fn countdown_cues(game: &mut LoopbackMatch, session: SessionId) -> Vec<(f64, CountdownCue)> {
    game.client_mut(session)
        .unwrap()
        .take_effects()
        .into_iter()
        .filter_map(|effect| match effect {
            ClientEffect::Countdown { at, cue } => Some((at, cue)),
            _ => None,
        })
        .collect()
}

fn deaths_seen(game: &LoopbackMatch, session: SessionId, victim: NetworkId) -> usize {
    game.client(session)
        .unwrap()
        .effects()
        .iter()
        .filter(|e| matches!(e, ClientEffect::PlayerDied { victim: v } if *v == victim))
        .count()
}

#[test]
fn test_single_player_never_starts() {
    let mut game = LoopbackMatch::new(Config::default());
    let host = game.join(true, 1).unwrap();
    game.run_for(6.0, DT).unwrap();

    assert!(!game.server().input_enabled());
    assert!(!game.client(host).unwrap().input_enabled());
    assert!(countdown_cues(&mut game, host).is_empty());
}

#[test]
fn test_countdown_identical_on_every_session() {
    let (mut game, host, guest) = started_match();

    let on_host = countdown_cues(&mut game, host);
    let on_guest = countdown_cues(&mut game, guest);
    let cues: Vec<CountdownCue> = on_host.iter().map(|(_, cue)| *cue).collect();
    assert_eq!(
        cues,
        vec![
            CountdownCue::Step(3),
            CountdownCue::Step(2),
            CountdownCue::Step(1),
            CountdownCue::Go,
            CountdownCue::Done,
        ]
    );
    assert_eq!(on_host, on_guest);
    assert!(game.server().input_enabled());
    assert!(game.client(host).unwrap().input_enabled());
    assert!(game.client(guest).unwrap().input_enabled());
}

#[test]
fn test_frozen_sessions_do_not_move() {
    let (mut game, _, guest) = two_player_match();
    let avatar = avatar_of(&game, guest);
    let start = game.server().position(avatar).unwrap();
    let forward = FrameInput {
        axes: Vec2::Y,
        ..Default::default()
    };
    for _ in 0..60 {
        game.step(DT, &[(guest, forward)]).unwrap();
    }
    assert_eq!(game.server().position(avatar), Some(start));
    let own = game.client(guest).unwrap().avatar_position(avatar).unwrap();
    assert!(own.distance(start) < 1e-4);
}

#[test]
fn test_owner_movement_replicates_to_observer() {
    let (mut game, host, guest) = started_match();
    let avatar = avatar_of(&game, guest);
    let start = game.server().position(avatar).unwrap();
    let forward = FrameInput {
        axes: Vec2::Y,
        ..Default::default()
    };
    for _ in 0..60 {
        game.step(DT, &[(guest, forward)]).unwrap();
    }
    for _ in 0..30 {
        game.step(DT, &[]).unwrap();
    }

    let server_pos = game.server().position(avatar).unwrap();
    assert!(server_pos.distance(start) > 1.0);
    assert_eq!(game.server().stats().rejected_moves, 0);
    let observed = game.client(host).unwrap().avatar_position(avatar).unwrap();
    assert!(observed.distance(server_pos) < 0.1);
}

#[test]
fn test_forged_displacement_corrected() {
    let (mut game, _, guest) = started_match();
    let avatar = avatar_of(&game, guest);
    let start = game.server().position(avatar).unwrap();
    let max_step = game.config().movement.move_speed
        * game.config().tick_interval()
        * game.config().movement.tolerance_factor;

    let forged = Message::MovementUpdate(MovementUpdate {
        entity: avatar,
        sequence: 9_999,
        input: Vec2::ZERO,
        jump: false,
        yaw_deg: 0.0,
        position: start + Vec3::Z * max_step * 10.0,
        velocity: Vec3::ZERO,
    });
    game.inject(guest, &forged).unwrap();
    game.pump().unwrap();

    let server_pos = game.server().position(avatar).unwrap();
    assert!(server_pos.distance(start) < max_step);
    assert_eq!(game.server().stats().rejected_moves, 1);
    let own = game.client(guest).unwrap().avatar().unwrap().state.position;
    assert!(own.distance(server_pos) < 1e-4);
}

#[test]
fn test_damage_request_kills_once_and_respawns_everyone() {
    let (mut game, host, guest) = started_match();
    let host_avatar = avatar_of(&game, host);
    let guest_avatar = avatar_of(&game, guest);
    let rules = game.config().match_rules.clone();

    // Walk the host away from its spawn first.
    let forward = FrameInput {
        axes: Vec2::Y,
        ..Default::default()
    };
    for _ in 0..90 {
        game.step(DT, &[(host, forward)]).unwrap();
    }
    let spawn_a = SpawnSide::A.spawn_point(&rules);
    assert!(game.server().position(host_avatar).unwrap().distance(spawn_a) > 1.0);
    for session in [host, guest] {
        game.client_mut(session).unwrap().take_effects();
    }

    // Both requests arrive before the first death is broadcast.
    for _ in 0..2 {
        game.client_mut(guest).unwrap().take_damage(host_avatar, 60.0);
    }
    game.pump().unwrap();
    assert_eq!(game.server().stats().deaths, 1);
    assert!(!game.server().input_enabled());
    assert_eq!(
        game.client(guest).unwrap().health(host_avatar).map(|h| h.current()),
        Some(0.0)
    );

    game.run_for(rules.death_grace_secs + 0.1, DT).unwrap();
    assert_eq!(deaths_seen(&game, host, host_avatar), 1);
    assert_eq!(deaths_seen(&game, guest, host_avatar), 1);
    assert_eq!(game.server().health(host_avatar), Some(rules.max_health));
    for session in [host, guest] {
        let view = game.client(session).unwrap();
        assert_eq!(view.health(host_avatar).map(|h| h.current()), Some(rules.max_health));
        assert!(view.countdown_active());
        assert!(!view.input_enabled());
    }

    // Every session agrees on where each avatar respawned.
    game.run_for(0.5, DT).unwrap();
    let spawn_b = SpawnSide::B.spawn_point(&rules);
    let host_view = game.client(host).unwrap();
    let guest_view = game.client(guest).unwrap();
    assert!(host_view.avatar_position(host_avatar).unwrap().distance(spawn_a) < 1e-3);
    assert!(guest_view.avatar_position(host_avatar).unwrap().distance(spawn_a) < 1e-3);
    assert!(guest_view.avatar_position(guest_avatar).unwrap().distance(spawn_b) < 1e-3);
    assert!(host_view.avatar_position(guest_avatar).unwrap().distance(spawn_b) < 1e-3);

    game.run_for(3.2, DT).unwrap();
    assert!(game.server().input_enabled());
    let on_host = countdown_cues(&mut game, host);
    let on_guest = countdown_cues(&mut game, guest);
    assert_eq!(on_host.len(), 5);
    assert_eq!(on_host, on_guest);
}

#[test]
fn test_fired_projectile_resolves_once_on_every_session() {
    let (mut game, host, guest) = started_match();
    for session in [host, guest] {
        game.client_mut(session).unwrap().take_effects();
    }

    let fire = FrameInput {
        trigger: TriggerInput {
            pressed: true,
            held: true,
            reload: false,
        },
        ..Default::default()
    };
    game.step(DT, &[(host, fire)]).unwrap();
    assert_eq!(game.server().stats().shots, 1);
    game.run_for(6.0, DT).unwrap();

    for session in [host, guest] {
        let effects = game.client(session).unwrap().effects();
        let impacts: Vec<(NetworkId, TerminalKind)> = effects
            .iter()
            .filter_map(|e| match e {
                ClientEffect::Impact { entity, kind, .. } => Some((*entity, *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(impacts.len(), 1, "session {session} saw {impacts:?}");
        assert_eq!(impacts[0].1, TerminalKind::Exploded);
        assert!(game.client(session).unwrap().projectile(impacts[0].0).is_none());
        assert_eq!(
            effects
                .iter()
                .filter(|e| matches!(e, ClientEffect::MuzzleFlash { .. }))
                .count(),
            1
        );
    }
}

#[test]
fn test_late_joiner_catches_up() {
    let (mut game, host, guest) = started_match();
    let late = game.join(false, 33).unwrap();
    game.run_for(1.2, DT).unwrap();

    let view = game.client(late).unwrap();
    assert!(view.input_enabled());
    assert!(view.remote_avatar(avatar_of(&game, host)).is_some());
    assert!(view.remote_avatar(avatar_of(&game, guest)).is_some());
    assert_eq!(
        view.health(avatar_of(&game, host)).map(|h| h.current()),
        Some(game.config().match_rules.max_health)
    );
}
