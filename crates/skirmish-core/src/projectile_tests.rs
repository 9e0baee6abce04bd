use super::*;
use crate::collision::{ArenaWorld, Body, Shape, SurfaceTag};
use skirmish_config::ProjectilePresets;

const DT: f32 = 0.02;

fn body(id: u64, center: Vec3, radius: f32) -> Body {
    Body {
        id: NetworkId(id),
        center,
        radius,
    }
}

fn weightless(mut config: ProjectileConfig) -> ProjectileConfig {
    config.use_gravity = false;
    config
}

fn launched(config: ProjectileConfig, position: Vec3, velocity: Vec3) -> Projectile {
    let mut projectile = Projectile::new(NetworkId(100), config, position, None);
    assert!(projectile.launch(velocity));
    projectile
}

/// Steps until the projectile is gone, counting terminal events and despawns.
fn run_out(projectile: &mut Projectile, world: &ArenaWorld) -> (usize, usize) {
    let mut terminals = 0;
    let mut despawns = 0;
    for tick in 0..400 {
        let out = projectile.step(DT, -9.81, tick, world);
        terminals += usize::from(out.terminal.is_some());
        despawns += usize::from(out.despawn);
    }
    (terminals, despawns)
}

#[test]
fn test_explosion_damage_falloff() {
    assert_eq!(explosion_damage(100.0, 0.0, 5.0), 100.0);
    assert!((explosion_damage(100.0, 2.5, 5.0) - 50.0).abs() < 1e-4);
    assert_eq!(explosion_damage(100.0, 5.0, 5.0), 0.0);
    assert_eq!(explosion_damage(100.0, 7.0, 5.0), 0.0);
    assert_eq!(explosion_damage(100.0, 1.0, 0.0), 0.0);

    let mut last = f32::INFINITY;
    for step in 0..=10 {
        let damage = explosion_damage(100.0, step as f32 * 0.5, 5.0);
        assert!(damage <= last);
        last = damage;
    }
}

#[test]
fn test_launch_applies_once() {
    let mut projectile = Projectile::new(
        NetworkId(1),
        ProjectilePresets::rocket(),
        Vec3::ZERO,
        None,
    );
    assert_eq!(projectile.phase(), ProjectilePhase::Spawned);
    assert!(projectile.launch(Vec3::Z * 30.0));
    assert!(!projectile.launch(Vec3::Z * 30.0));
    assert_eq!(projectile.velocity(), Vec3::Z * 30.0);
    assert_eq!(projectile.phase(), ProjectilePhase::InFlight);
}

#[test]
fn test_unlaunched_projectile_does_nothing() {
    let world = ArenaWorld::new();
    let mut projectile = Projectile::new(
        NetworkId(1),
        ProjectilePresets::rocket(),
        Vec3::ZERO,
        None,
    );
    let out = projectile.step(DT, -9.81, 0, &world);
    assert_eq!(out, StepOutcome::default());
    assert_eq!(projectile.position(), Vec3::ZERO);
}

#[test]
fn test_two_contacts_one_explosion() {
    let mut world = ArenaWorld::new();
    world.set_bodies([
        body(1, Vec3::new(0.0, 0.0, 1.0), 0.5),
        body(2, Vec3::new(0.0, 0.0, 1.5), 0.5),
    ]);
    let config = weightless(ProjectilePresets::rocket());
    let mut rocket = launched(config, Vec3::ZERO, Vec3::Z * 100.0);

    let out = rocket.step(DT, -9.81, 0, &world);
    let terminal = out.terminal.expect("rocket should explode");
    assert_eq!(terminal.kind, TerminalKind::Exploded);
    assert_eq!(terminal.entity, NetworkId(100));
    assert!((terminal.point.z - 0.5).abs() < 1e-3);

    // Both bodies sit inside the blast radius; each is damaged once.
    assert_eq!(out.damage.len(), 2);
    assert_eq!(out.damage[0].target, NetworkId(1));
    assert!(out.damage[0].amount > out.damage[1].amount);
    assert!(out.snapshot.is_none());

    let (terminals, despawns) = run_out(&mut rocket, &world);
    assert_eq!(terminals, 0);
    assert_eq!(despawns, 1);
    assert_eq!(rocket.phase(), ProjectilePhase::Despawned);
}

#[test]
fn test_contact_after_terminal_is_ignored() {
    let world = ArenaWorld::new();
    let mut rocket = launched(
        weightless(ProjectilePresets::rocket()),
        Vec3::ZERO,
        Vec3::Z * 10.0,
    );
    let contact = Contact {
        point: Vec3::Z,
        normal: Vec3::NEG_Z,
        distance: 1.0,
        tag: SurfaceTag::Body(NetworkId(7)),
    };

    let mut out = StepOutcome::default();
    assert_eq!(
        rocket.handle_contact(&contact, &world, &mut out),
        ContactResult::Resolved
    );
    let mut again = StepOutcome::default();
    assert_eq!(
        rocket.handle_contact(&contact, &world, &mut again),
        ContactResult::Ignored
    );
    assert_eq!(again, StepOutcome::default());
    assert_eq!(rocket.terminal_kind(), Some(TerminalKind::Exploded));
}

#[test]
fn test_bullet_hits_first_body_only() {
    let mut world = ArenaWorld::new();
    world.set_bodies([
        body(1, Vec3::new(0.0, 0.0, 1.0), 0.5),
        body(2, Vec3::new(0.0, 0.0, 1.5), 0.5),
    ]);
    let mut bullet = launched(ProjectilePresets::bullet(), Vec3::ZERO, Vec3::Z * 100.0);

    let out = bullet.step(DT, -9.81, 0, &world);
    assert_eq!(
        out.damage,
        vec![DamageEvent {
            target: NetworkId(1),
            amount: 50.0,
        }]
    );
    assert_eq!(
        out.terminal.map(|t| t.kind),
        Some(TerminalKind::HitTarget)
    );
    assert!(bullet.is_resolved());
}

#[test]
fn test_penetrating_bullet_damages_each_body_once() {
    let mut world = ArenaWorld::new();
    world.set_bodies([
        body(1, Vec3::new(0.0, 0.0, 1.0), 2.0),
        body(2, Vec3::new(0.0, 0.0, 1.5), 0.5),
    ]);
    let mut config = ProjectilePresets::bullet();
    config.penetrate = true;
    let mut bullet = launched(config, Vec3::ZERO, Vec3::Z * 10.0);

    // Starts inside body 1 and reaches body 2 a few steps later.
    let mut hits = Vec::new();
    for tick in 0..10 {
        let out = bullet.step(DT, -9.81, tick, &world);
        assert!(out.terminal.is_none());
        hits.extend(out.damage.into_iter().map(|d| d.target));
    }
    assert_eq!(hits, vec![NetworkId(1), NetworkId(2)]);
    assert_eq!(bullet.phase(), ProjectilePhase::InFlight);
    assert!((bullet.position().z - 2.0).abs() < 1e-4);
}

#[test]
fn test_bullet_stops_on_wall() {
    let mut world = ArenaWorld::new();
    world.add_box(Vec3::new(-1.0, -1.0, 1.0), Vec3::new(1.0, 1.0, 2.0));
    let mut bullet = launched(ProjectilePresets::bullet(), Vec3::ZERO, Vec3::Z * 100.0);

    let out = bullet.step(DT, -9.81, 0, &world);
    assert!(out.damage.is_empty());
    assert_eq!(out.terminal.map(|t| t.kind), Some(TerminalKind::HitTarget));
}

#[test]
fn test_shooter_body_is_skipped() {
    let mut world = ArenaWorld::new();
    world.set_bodies([body(9, Vec3::ZERO, 0.5)]);
    let mut rocket = Projectile::new(
        NetworkId(100),
        weightless(ProjectilePresets::rocket()),
        Vec3::ZERO,
        Some(NetworkId(9)),
    );
    rocket.launch(Vec3::Z * 30.0);

    let out = rocket.step(DT, -9.81, 0, &world);
    assert!(out.terminal.is_none());
    assert!(out.damage.is_empty());
}

#[test]
fn test_rocket_bounces_then_explodes() {
    let mut world = ArenaWorld::new();
    world.add_shape(Shape::Ground { height: 0.0 });
    let mut config = weightless(ProjectilePresets::rocket());
    config.max_collisions = 2;
    let mut rocket = launched(config, Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y * 100.0);

    let out = rocket.step(DT, -9.81, 0, &world);
    assert!(out.terminal.is_none());
    assert_eq!(rocket.collisions(), 1);
    assert!((rocket.velocity().y - 30.0).abs() < 1e-3);
    assert!(rocket.position().y > 0.15);

    // Send it back down for the second contact.
    let mut out = StepOutcome::default();
    let ground = Contact {
        point: Vec3::ZERO,
        normal: Vec3::Y,
        distance: 0.0,
        tag: SurfaceTag::Ground,
    };
    assert_eq!(
        rocket.handle_contact(&ground, &world, &mut out),
        ContactResult::Resolved
    );
    assert_eq!(out.terminal.map(|t| t.kind), Some(TerminalKind::Exploded));
}

#[test]
fn test_explosive_expiry_detonates() {
    let mut world = ArenaWorld::new();
    world.set_bodies([body(1, Vec3::new(2.0, 0.0, 0.0), 0.5)]);
    let mut config = weightless(ProjectilePresets::rocket());
    config.lifetime_secs = 0.1;
    let mut rocket = launched(config, Vec3::ZERO, Vec3::ZERO);

    let mut terminal = None;
    let mut damage = Vec::new();
    for tick in 0..20 {
        let out = rocket.step(DT, -9.81, tick, &world);
        damage.extend(out.damage);
        if let Some(event) = out.terminal {
            assert!(terminal.is_none());
            terminal = Some(event);
        }
    }
    let terminal = terminal.expect("rocket should expire");
    assert_eq!(terminal.kind, TerminalKind::Expired { detonated: true });
    assert_eq!(damage.len(), 1);
    assert!((damage[0].amount - 60.0).abs() < 1e-3);
}

#[test]
fn test_bullet_expiry_is_silent() {
    let mut world = ArenaWorld::new();
    world.set_bodies([body(1, Vec3::new(2.0, 0.0, 0.0), 0.5)]);
    let mut config = ProjectilePresets::bullet();
    config.lifetime_secs = 0.1;
    let mut bullet = launched(config, Vec3::ZERO, Vec3::ZERO);

    let mut kinds = Vec::new();
    for tick in 0..20 {
        let out = bullet.step(DT, -9.81, tick, &world);
        assert!(out.damage.is_empty());
        kinds.extend(out.terminal.map(|t| t.kind));
    }
    assert_eq!(kinds, vec![TerminalKind::Expired { detonated: false }]);
}

#[test]
fn test_snapshots_stop_after_terminal() {
    let mut world = ArenaWorld::new();
    world.add_box(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 6.0));
    let mut rocket = launched(
        weightless(ProjectilePresets::rocket()),
        Vec3::ZERO,
        Vec3::Z * 30.0,
    );

    let mut before = 0;
    let mut after = 0;
    for tick in 0..50 {
        let out = rocket.step(DT, -9.81, tick, &world);
        if out.snapshot.is_some() {
            if rocket.is_resolved() {
                after += 1;
            } else {
                before += 1;
            }
        }
    }
    assert!(rocket.is_resolved());
    assert!(before > 0);
    assert_eq!(after, 0);
}

#[test]
fn test_sync_rate_independent_of_tick() {
    let world = ArenaWorld::new();
    let mut config = weightless(ProjectilePresets::rocket());
    config.sync_rate_hz = 10.0;
    let mut rocket = launched(config, Vec3::ZERO, Vec3::Z);

    let snapshots = (0..20)
        .filter(|&tick| rocket.step(DT, -9.81, tick, &world).snapshot.is_some())
        .count();
    assert!((3..=4).contains(&snapshots));
}

#[test]
fn test_rotation_follows_velocity() {
    let rocket = launched(ProjectilePresets::rocket(), Vec3::ZERO, Vec3::X * 5.0);
    let forward = rocket.rotation() * Vec3::Z;
    assert!((forward - Vec3::X).length() < 1e-4);
}
