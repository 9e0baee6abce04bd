//! Swept-path and overlap queries.
//!
//! The core never talks to a physics engine directly. It asks a
//! [`CollisionQuery`] for the contacts along a swept sphere, the first hit of
//! a ray, or the bodies inside a sphere. [`ArenaWorld`] implements the query
//! over static boxes, a ground plane and per-tick avatar bodies, which is all
//! a match arena needs.

use glam::Vec3;
use skirmish_net::NetworkId;

/// Parametric slack for "starting inside" tests.
const EPSILON: f32 = 1e-6;

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// What a contact touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTag {
    /// An avatar body.
    Body(NetworkId),
    /// Static geometry.
    Wall,
    /// The ground plane.
    Ground,
}

impl SurfaceTag {
    /// The body id, if this is a body.
    pub fn body(self) -> Option<NetworkId> {
        match self {
            SurfaceTag::Body(id) => Some(id),
            _ => None,
        }
    }
}

/// A contact along a swept path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Point on the touched surface.
    pub point: Vec3,
    /// Surface normal at the contact, facing the mover.
    pub normal: Vec3,
    /// Distance travelled along the path before touching (m).
    pub distance: f32,
    /// What was touched.
    pub tag: SurfaceTag,
}

/// A body found by an overlap query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    /// The body.
    pub body: NetworkId,
    /// Distance from the query center to the body center.
    pub distance: f32,
}

/// Which colliders a query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryFilter {
    /// Skip this body (usually the mover itself or the shooter).
    pub ignore_body: Option<NetworkId>,
    /// Skip every body.
    pub statics_only: bool,
}

impl QueryFilter {
    /// Everything.
    pub const ALL: QueryFilter = QueryFilter {
        ignore_body: None,
        statics_only: false,
    };

    /// Static geometry and ground only.
    pub const STATICS: QueryFilter = QueryFilter {
        ignore_body: None,
        statics_only: true,
    };

    /// Everything except `body`.
    pub fn excluding(body: NetworkId) -> Self {
        Self {
            ignore_body: Some(body),
            statics_only: false,
        }
    }

    fn admits(&self, body: NetworkId) -> bool {
        !self.statics_only && self.ignore_body != Some(body)
    }
}

/// The collision primitive the simulation calls once per step.
pub trait CollisionQuery {
    /// Every contact of a sphere of `radius` swept from `from` to `to`,
    /// nearest first.
    fn sweep_sphere(
        &self,
        from: Vec3,
        to: Vec3,
        radius: f32,
        filter: QueryFilter,
    ) -> Vec<Contact>;

    /// Bodies whose centers lie within `radius` of `center`.
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<Overlap>;

    /// First contact of a ray.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Option<Contact> {
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }
        self.sweep_sphere(origin, origin + dir * max_distance, 0.0, filter)
            .into_iter()
            .next()
    }
}

// ---------------------------------------------------------------------------
// ArenaWorld
// ---------------------------------------------------------------------------

/// Static arena geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Axis-aligned box.
    Box {
        /// Minimum corner.
        min: Vec3,
        /// Maximum corner.
        max: Vec3,
    },
    /// Infinite horizontal plane.
    Ground {
        /// Plane height.
        height: f32,
    },
}

/// A spherical avatar body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    /// The avatar.
    pub id: NetworkId,
    /// Sphere center.
    pub center: Vec3,
    /// Sphere radius.
    pub radius: f32,
}

/// Boxes, a ground plane and avatar bodies.
#[derive(Debug, Clone, Default)]
pub struct ArenaWorld {
    statics: Vec<Shape>,
    bodies: Vec<Body>,
}

impl ArenaWorld {
    /// Empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard match arena: ground at `y = 0`, four boundary walls at
    /// ±20 m and one cover block off the center line.
    pub fn arena() -> Self {
        let mut world = Self::new();
        world.add_shape(Shape::Ground { height: 0.0 });
        world.add_box(Vec3::new(-21.0, 0.0, -21.0), Vec3::new(-20.0, 4.0, 21.0));
        world.add_box(Vec3::new(20.0, 0.0, -21.0), Vec3::new(21.0, 4.0, 21.0));
        world.add_box(Vec3::new(-21.0, 0.0, -21.0), Vec3::new(21.0, 4.0, -20.0));
        world.add_box(Vec3::new(-21.0, 0.0, 20.0), Vec3::new(21.0, 4.0, 21.0));
        world.add_box(Vec3::new(-6.0, 0.0, -1.0), Vec3::new(-4.0, 2.0, 1.0));
        world
    }

    /// Adds static geometry.
    pub fn add_shape(&mut self, shape: Shape) {
        self.statics.push(shape);
    }

    /// Adds a static box.
    pub fn add_box(&mut self, min: Vec3, max: Vec3) {
        self.add_shape(Shape::Box {
            min: min.min(max),
            max: min.max(max),
        });
    }

    /// Replaces the body set (called once per tick from avatar transforms).
    pub fn set_bodies(&mut self, bodies: impl IntoIterator<Item = Body>) {
        self.bodies.clear();
        self.bodies.extend(bodies);
    }

    /// Current bodies.
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }
}

impl CollisionQuery for ArenaWorld {
    fn sweep_sphere(
        &self,
        from: Vec3,
        to: Vec3,
        radius: f32,
        filter: QueryFilter,
    ) -> Vec<Contact> {
        let delta = to - from;
        let len = delta.length();
        let dir = if len > EPSILON { delta / len } else { Vec3::ZERO };
        let mut contacts = Vec::new();

        for shape in &self.statics {
            let hit = match *shape {
                Shape::Box { min, max } => sweep_box(from, dir, len, radius, min, max)
                    .map(|(t, n)| (t, n, SurfaceTag::Wall)),
                Shape::Ground { height } => sweep_ground(from, dir, len, radius, height)
                    .map(|(t, n)| (t, n, SurfaceTag::Ground)),
            };
            if let Some((t, normal, tag)) = hit {
                contacts.push(Contact {
                    point: from + dir * t - normal * radius,
                    normal,
                    distance: t,
                    tag,
                });
            }
        }

        for body in self.bodies.iter().filter(|b| filter.admits(b.id)) {
            let combined = radius + body.radius;
            if let Some((t, normal)) = sweep_sphere_vs_sphere(from, dir, len, combined, body.center) {
                contacts.push(Contact {
                    point: from + dir * t - normal * radius,
                    normal,
                    distance: t,
                    tag: SurfaceTag::Body(body.id),
                });
            }
        }

        contacts.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        contacts
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<Overlap> {
        let mut found: Vec<Overlap> = self
            .bodies
            .iter()
            .map(|b| Overlap {
                body: b.id,
                distance: center.distance(b.center),
            })
            .filter(|o| o.distance < radius)
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        found
    }
}

// ---------------------------------------------------------------------------
// Primitive tests
// ---------------------------------------------------------------------------

fn unit_or_up(v: Vec3) -> Vec3 {
    let n = v.normalize_or_zero();
    if n == Vec3::ZERO { Vec3::Y } else { n }
}

/// Segment `from + dir * t, t ∈ [0, len]` against a sphere of `radius`.
fn sweep_sphere_vs_sphere(
    from: Vec3,
    dir: Vec3,
    len: f32,
    radius: f32,
    center: Vec3,
) -> Option<(f32, Vec3)> {
    let m = from - center;
    let c = m.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some((0.0, unit_or_up(m)));
    }
    let b = m.dot(dir);
    if b >= 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t > len {
        return None;
    }
    let t = t.max(0.0);
    Some((t, unit_or_up(from + dir * t - center)))
}

/// Slab test against a box grown by `radius`.
fn sweep_box(
    from: Vec3,
    dir: Vec3,
    len: f32,
    radius: f32,
    min: Vec3,
    max: Vec3,
) -> Option<(f32, Vec3)> {
    let mut t_enter = 0.0_f32;
    let mut t_exit = len;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let lo = min[axis] - radius;
        let hi = max[axis] + radius;
        let o = from[axis];
        let d = dir[axis];
        if d.abs() < EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let mut t1 = (lo - o) / d;
        let mut t2 = (hi - o) / d;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > t_enter {
            t_enter = t1;
            normal = Vec3::ZERO;
            normal[axis] = -d.signum();
        }
        t_exit = t_exit.min(t2);
        if t_enter > t_exit {
            return None;
        }
    }

    if normal == Vec3::ZERO {
        // Started inside.
        return Some((0.0, unit_or_up(-dir)));
    }
    Some((t_enter, normal))
}

fn sweep_ground(from: Vec3, dir: Vec3, len: f32, radius: f32, height: f32) -> Option<(f32, Vec3)> {
    let surface = height + radius;
    if from.y <= surface {
        return Some((0.0, Vec3::Y));
    }
    if dir.y >= 0.0 {
        return None;
    }
    let t = (surface - from.y) / dir.y;
    (t <= len).then_some((t, Vec3::Y))
}
