use super::*;
use glam::Vec2;
use std::sync::{Arc, Mutex};
use skirmish_config::MatchConfig;
use skirmish_net::{DamageRequest, TerminalKind};

fn two_players() -> (ServerSim, SessionId, SessionId) {
    let mut server = ServerSim::new(Config::default());
    let host = server.connect(true);
    let guest = server.connect(false);
    (server, host, guest)
}

fn run(server: &mut ServerSim, secs: f32) -> Vec<(Target, Message)> {
    let dt = server.config.tick_interval();
    let mut sent = server.drain_outbox();
    for _ in 0..(secs / dt).round() as usize {
        server.simulate_tick(dt);
        sent.extend(server.drain_outbox());
    }
    sent
}

fn started() -> (ServerSim, SessionId, SessionId) {
    let (mut server, host, guest) = two_players();
    run(&mut server, 4.7);
    assert!(server.input_enabled());
    (server, host, guest)
}

fn avatar_of(server: &ServerSim, session: SessionId) -> NetworkId {
    server
        .sessions()
        .get(session)
        .and_then(|s| s.avatar)
        .expect("session has an avatar")
}

fn gun_of(server: &ServerSim, session: SessionId) -> NetworkId {
    server
        .sessions()
        .get(session)
        .and_then(|s| s.gun)
        .expect("session has a gun")
}

fn count(sent: &[(Target, Message)], pred: impl Fn(&Message) -> bool) -> usize {
    sent.iter().filter(|(_, m)| pred(m)).count()
}

fn movement(entity: NetworkId, position: Vec3) -> Message {
    Message::MovementUpdate(MovementUpdate {
        entity,
        sequence: 1,
        input: Vec2::ZERO,
        jump: false,
        yaw_deg: 0.0,
        position,
        velocity: Vec3::ZERO,
    })
}

#[test]
fn test_connect_places_sides() {
    let (mut server, host, guest) = two_players();
    let rules = MatchConfig::default();
    assert_eq!(
        server.position(avatar_of(&server, host)),
        Some(Vec3::from_array(rules.spawn_a))
    );
    assert_eq!(
        server.position(avatar_of(&server, guest)),
        Some(Vec3::from_array(rules.spawn_b))
    );

    let sent = server.drain_outbox();
    assert!(sent.iter().any(|(target, m)| *target == Target::Session(guest)
        && matches!(m, Message::Welcome(w) if w.session == guest && !w.is_server)));
    // The guest is told about the host's avatar and gun.
    let catch_up = sent
        .iter()
        .filter(|(target, m)| {
            *target == Target::Session(guest) && matches!(m, Message::SpawnEntity(_))
        })
        .count();
    assert_eq!(catch_up, 2);
}

#[test]
fn test_gate_holds_single_player() {
    let mut server = ServerSim::new(Config::default());
    server.connect(true);
    let sent = run(&mut server, 2.0);
    assert!(!server.input_enabled());
    assert_eq!(count(&sent, |m| *m == Message::CountdownStart), 0);
    assert!(count(&sent, |m| *m == Message::InputEnabled(false)) > 0);
}

#[test]
fn test_gate_opens_with_countdown() {
    let (mut server, _, _) = two_players();
    let sent = run(&mut server, 1.2);
    assert_eq!(count(&sent, |m| *m == Message::CountdownStart), 1);
    assert!(!server.input_enabled());

    let sent = run(&mut server, 3.5);
    assert!(server.input_enabled());
    assert_eq!(count(&sent, |m| *m == Message::InputEnabled(true)), 1);
}

#[test]
fn test_forged_displacement_rejected() {
    let (mut server, _, guest) = started();
    let avatar = avatar_of(&server, guest);
    let start = server.position(avatar).unwrap();
    let jump = 3.0 * server.config.tick_interval() * 10.0;

    server.handle(guest, movement(avatar, start + Vec3::Z * jump));

    let after = server.position(avatar).unwrap();
    assert!((after.z - start.z).abs() < 0.1);
    assert_eq!(server.stats().rejected_moves, 1);
    let sent = server.drain_outbox();
    assert!(sent.iter().any(|(target, m)| *target == Target::Session(guest)
        && matches!(m, Message::MovementCorrection(c) if c.entity == avatar)));
}

#[test]
fn test_honest_movement_adopted() {
    let (mut server, _, guest) = started();
    let avatar = avatar_of(&server, guest);
    let reported = server.position(avatar).unwrap() + Vec3::new(0.0, 0.0, -0.05);

    server.handle(guest, movement(avatar, reported));

    assert_eq!(server.position(avatar), Some(reported));
    assert_eq!(server.stats().rejected_moves, 0);
    assert!(server.drain_outbox().is_empty());
}

#[test]
fn test_non_owner_and_frozen_updates_ignored() {
    let (mut server, host, guest) = two_players();
    let avatar = avatar_of(&server, guest);
    let start = server.position(avatar).unwrap();
    let nudge = start + Vec3::Z * 0.05;

    server.handle(guest, movement(avatar, nudge));
    assert_eq!(server.position(avatar), Some(start));

    run(&mut server, 4.7);
    server.handle(host, movement(avatar, nudge));
    assert_eq!(server.position(avatar), Some(start));
}

#[test]
fn test_look_clamped_and_forwarded() {
    let (mut server, _, guest) = started();
    let avatar = avatar_of(&server, guest);
    server.handle(
        guest,
        Message::LookUpdate(LookUpdate {
            entity: avatar,
            sequence: 1,
            input: Vec2::ZERO,
            pitch_deg: 120.0,
            yaw_deg: 45.0,
        }),
    );
    let sent = server.drain_outbox();
    assert!(sent.iter().any(|(target, m)| *target == Target::AllExcept(guest)
        && matches!(m, Message::LookSnapshot(s) if s.pitch_deg == 80.0 && s.yaw_deg == 45.0)));

    server.handle(
        guest,
        Message::LookUpdate(LookUpdate {
            entity: avatar,
            sequence: 2,
            input: Vec2::ZERO,
            pitch_deg: f32::NAN,
            yaw_deg: 0.0,
        }),
    );
    assert!(server.drain_outbox().is_empty());
}

#[test]
fn test_gun_requires_valid_rotation() {
    let (mut server, host, _) = started();
    let gun = gun_of(&server, host);
    let update = |rotation| {
        Message::GunTransform(GunTransform {
            entity: gun,
            sequence: 1,
            position: Vec3::new(0.5, 1.3, -11.2),
            rotation,
        })
    };

    server.handle(host, update(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)));
    assert!(server.drain_outbox().is_empty());

    server.handle(host, update(Quat::from_rotation_y(0.3)));
    let sent = server.drain_outbox();
    assert_eq!(count(&sent, |m| matches!(m, Message::GunSnapshot(_))), 1);
    assert_eq!(server.position(gun), Some(Vec3::new(0.5, 1.3, -11.2)));
}

#[test]
fn test_projectile_resolves_once() {
    let (mut server, host, _) = started();
    let gun = gun_of(&server, host);
    server.handle(
        host,
        Message::FireCommand(FireCommand {
            gun,
            origin: Vec3::new(0.5, 1.5, -10.0),
            direction: Vec3::Z,
            up: Vec3::Y,
        }),
    );
    assert_eq!(server.stats().shots, 1);

    let sent = run(&mut server, 3.0);
    let terminals: Vec<TerminalKind> = sent
        .iter()
        .filter_map(|(_, m)| match m {
            Message::TerminalEvent(event) => Some(event.kind),
            _ => None,
        })
        .collect();
    assert_eq!(terminals, vec![TerminalKind::Exploded]);
    assert_eq!(count(&sent, |m| matches!(m, Message::DespawnEntity(_))), 1);
    assert!(count(&sent, |m| matches!(m, Message::ProjectileSnapshot(_))) > 0);
    assert!(server.registry().ids_with::<Projectile>().is_empty());
}

#[test]
fn test_fire_while_frozen_dropped() {
    let (mut server, host, _) = two_players();
    let gun = gun_of(&server, host);
    server.handle(
        host,
        Message::FireCommand(FireCommand {
            gun,
            origin: Vec3::ZERO,
            direction: Vec3::Z,
            up: Vec3::Y,
        }),
    );
    assert_eq!(server.stats().shots, 0);
}

#[test]
fn test_death_sequence_runs_once() {
    let (mut server, host, guest) = started();
    let victim = avatar_of(&server, guest);
    let other = avatar_of(&server, host);

    assert_eq!(
        server.take_damage(victim, 60.0),
        Ok(DamageOutcome::Applied { health: 40.0 })
    );
    assert_eq!(server.take_damage(victim, 60.0), Ok(DamageOutcome::Died));
    assert_eq!(server.take_damage(victim, 60.0), Ok(DamageOutcome::AlreadyDead));
    assert!(!server.input_enabled());
    assert_eq!(server.death_phase(), DeathPhase::Grace { victim });

    // A second death while the sequence runs does not start another one.
    server.handle(
        guest,
        Message::DamageRequest(DamageRequest {
            target: other,
            amount: 500.0,
        }),
    );
    assert_eq!(server.stats().deaths, 2);

    let sent = run(&mut server, 3.1);
    assert_eq!(
        count(&sent, |m| matches!(m, Message::PlayerDied(p) if p.victim == victim)),
        1
    );
    assert_eq!(count(&sent, |m| *m == Message::RespawnAll), 1);
    assert_eq!(server.health(victim), Some(100.0));
    assert_eq!(server.health(other), Some(100.0));
    assert_eq!(server.death_phase(), DeathPhase::Countdown { victim });

    let sent = run(&mut server, 3.6);
    assert!(server.input_enabled());
    assert_eq!(server.death_phase(), DeathPhase::Idle);
    assert_eq!(count(&sent, |m| matches!(m, Message::PlayerDied(_))), 0);
}

#[test]
fn test_death_during_countdown_starts_next_sequence() {
    let (mut server, host, guest) = started();
    let first = avatar_of(&server, guest);
    let second = avatar_of(&server, host);

    assert_eq!(server.take_damage(first, 500.0), Ok(DamageOutcome::Died));
    run(&mut server, 3.1);
    assert_eq!(server.death_phase(), DeathPhase::Countdown { victim: first });

    // A projectile still in flight lands after the respawn.
    assert_eq!(server.take_damage(second, 500.0), Ok(DamageOutcome::Died));
    assert_eq!(server.death_phase(), DeathPhase::Countdown { victim: first });

    let sent = run(&mut server, 3.5);
    assert!(!server.input_enabled());
    assert_eq!(server.death_phase(), DeathPhase::Grace { victim: second });
    assert_eq!(count(&sent, |m| *m == Message::InputEnabled(true)), 0);

    let sent = run(&mut server, 3.1);
    assert_eq!(
        count(&sent, |m| matches!(m, Message::PlayerDied(p) if p.victim == second)),
        1
    );
    assert_eq!(count(&sent, |m| *m == Message::RespawnAll), 1);
    assert_eq!(server.health(second), Some(100.0));
    assert_eq!(
        server.take_damage(second, 10.0),
        Ok(DamageOutcome::Applied { health: 90.0 })
    );

    run(&mut server, 3.6);
    assert!(server.input_enabled());
    assert_eq!(server.death_phase(), DeathPhase::Idle);
    assert_eq!(server.stats().deaths, 2);
}

#[test]
fn test_snapshots_carry_transform_sequence() {
    let (mut server, _, guest) = started();
    let avatar = avatar_of(&server, guest);
    let sequence = |server: &ServerSim| {
        server
            .registry()
            .get::<NetTransform>(avatar)
            .map(NetTransform::sequence)
            .unwrap()
    };
    let before = sequence(&server);
    let reported = server.position(avatar).unwrap() + Vec3::new(0.0, 0.0, -0.05);
    server.handle(guest, movement(avatar, reported));
    assert_eq!(sequence(&server), before + 1);

    let sent = run(&mut server, 0.2);
    let ticks: Vec<u64> = sent
        .iter()
        .filter_map(|(_, m)| match m {
            Message::AvatarSnapshot(s) if s.entity == avatar => Some(s.tick),
            _ => None,
        })
        .collect();
    assert!(!ticks.is_empty());
    assert!(ticks.iter().all(|tick| *tick == before + 1));
}

#[test]
fn test_transform_subscribers_see_only_validated_state() {
    let (mut server, _, guest) = started();
    let avatar = avatar_of(&server, guest);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    server
        .subscribe_transform(avatar, move |_, new| sink.lock().unwrap().push(new.position))
        .unwrap();
    assert!(server.subscribe_transform(NetworkId(999), |_, _| {}).is_none());

    let start = server.position(avatar).unwrap();
    let honest = start + Vec3::new(0.0, 0.0, -0.05);
    server.handle(guest, movement(avatar, honest));
    server.handle(guest, movement(avatar, honest + Vec3::Z * 5.0));

    assert_eq!(*seen.lock().unwrap(), vec![honest]);
    assert_eq!(server.position(avatar), Some(honest));
}

#[test]
fn test_stale_look_dropped() {
    let (mut server, _, guest) = started();
    let avatar = avatar_of(&server, guest);
    let look = |sequence, yaw_deg| {
        Message::LookUpdate(LookUpdate {
            entity: avatar,
            sequence,
            input: Vec2::ZERO,
            pitch_deg: 0.0,
            yaw_deg,
        })
    };

    server.handle(guest, look(5, 30.0));
    server.handle(guest, look(3, -30.0));
    let sent = server.drain_outbox();
    let forwarded: Vec<(u64, f32)> = sent
        .iter()
        .filter_map(|(_, m)| match m {
            Message::LookSnapshot(s) => Some((s.tick, s.yaw_deg)),
            _ => None,
        })
        .collect();
    assert_eq!(forwarded, vec![(5, 30.0)]);
    assert_eq!(server.look(avatar).map(|l| l.yaw_deg), Some(30.0));
}

#[test]
fn test_unknown_damage_target() {
    let (mut server, _, _) = started();
    assert_eq!(
        server.take_damage(NetworkId(999), 10.0),
        Err(HealthError::UnknownEntity(NetworkId(999)))
    );
}

#[test]
fn test_disconnect_despawns_avatar_and_gun() {
    let (mut server, _, guest) = two_players();
    let avatar = avatar_of(&server, guest);
    let gun = gun_of(&server, guest);
    server.drain_outbox();

    server.disconnect(guest);
    assert!(!server.registry().contains(avatar));
    assert!(!server.registry().contains(gun));
    assert!(!server.authority().is_registered(avatar));
    let sent = server.drain_outbox();
    assert_eq!(count(&sent, |m| matches!(m, Message::DespawnEntity(_))), 2);
}

#[test]
fn test_snapshots_skip_owner() {
    let (mut server, host, _) = started();
    let host_avatar = avatar_of(&server, host);
    let sent = run(&mut server, 0.5);
    let targets: Vec<Target> = sent
        .iter()
        .filter_map(|(target, m)| match m {
            Message::AvatarSnapshot(s) if s.entity == host_avatar => Some(*target),
            _ => None,
        })
        .collect();
    assert!(!targets.is_empty());
    assert!(targets.iter().all(|t| *t == Target::AllExcept(host)));
}
