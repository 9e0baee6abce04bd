//! Entity registry keyed by stable network id.
//!
//! Entities live in a Bevy ECS [`World`]; an index maps each [`NetworkId`]
//! to its ECS [`Entity`] so collaborators are resolved once, by id, instead
//! of searched for.

use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;
use skirmish_net::{EntityKind, NetworkId, SessionId};

use crate::authority::Role;
use crate::field::{FieldError, ReplicatedField, WritePolicy};

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Stable network identity of a replicated entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replicated(pub NetworkId);

/// What the entity is.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind(pub EntityKind);

/// Owning session.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub SessionId);

/// World position and rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position.
    pub position: Vec3,
    /// Rotation.
    pub rotation: Quat,
}

impl Transform {
    /// Transform at `position` with no rotation.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Authoritative transform of a replicated entity.
///
/// Only the server writes it. Snapshots are stamped with the field's
/// sequence so readers can drop anything older than what they show.
#[derive(Component, Debug)]
pub struct NetTransform(ReplicatedField<Transform>);

impl NetTransform {
    /// Field holding `transform`.
    pub fn new(transform: Transform) -> Self {
        Self(ReplicatedField::new(transform, WritePolicy::ServerOnly))
    }

    /// Field at `position` with no rotation.
    pub fn at(position: Vec3) -> Self {
        Self::new(Transform::at(position))
    }

    /// Current transform.
    pub fn transform(&self) -> Transform {
        *self.0.get()
    }

    /// Current position.
    pub fn position(&self) -> Vec3 {
        self.0.get().position
    }

    /// Sequence of the last change.
    pub fn sequence(&self) -> u64 {
        self.0.sequence()
    }

    /// Writes `transform` as `role`. Returns `Ok(true)` if it changed.
    pub fn write(&mut self, role: Role, transform: Transform) -> Result<bool, FieldError> {
        self.0.set(role, transform)
    }

    /// The underlying field, for change subscriptions.
    pub fn field_mut(&mut self) -> &mut ReplicatedField<Transform> {
        &mut self.0
    }
}

/// Linear velocity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity(pub Vec3);

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// ECS world plus a `NetworkId → Entity` index.
pub struct EntityRegistry {
    world: World,
    index: FxHashMap<NetworkId, Entity>,
    next_id: u64,
}

impl EntityRegistry {
    /// Creates an empty registry. Ids start at 1.
    pub fn new() -> Self {
        Self {
            world: World::new(),
            index: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Allocates a fresh, never-reused network id.
    pub fn allocate_id(&mut self) -> NetworkId {
        let id = NetworkId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Spawns `bundle` under `id`, replacing any entity already using it.
    pub fn spawn<B: Bundle>(&mut self, id: NetworkId, bundle: B) -> Entity {
        self.despawn(id);
        let entity = self.world.spawn((Replicated(id), bundle)).id();
        self.index.insert(id, entity);
        entity
    }

    /// Removes `id`. Returns `false` if it was not registered.
    pub fn despawn(&mut self, id: NetworkId) -> bool {
        match self.index.remove(&id) {
            Some(entity) => self.world.despawn(entity),
            None => false,
        }
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: NetworkId) -> bool {
        self.index.contains_key(&id)
    }

    /// The ECS entity behind `id`.
    pub fn entity(&self, id: NetworkId) -> Option<Entity> {
        self.index.get(&id).copied()
    }

    /// Borrows component `T` of `id`.
    pub fn get<T: Component>(&self, id: NetworkId) -> Option<&T> {
        self.world.get::<T>(self.entity(id)?)
    }

    /// Mutably borrows component `T` of `id`.
    pub fn get_mut<T: Component>(&mut self, id: NetworkId) -> Option<Mut<'_, T>> {
        let entity = self.entity(id)?;
        self.world.get_mut::<T>(entity)
    }

    /// Inserts (or overwrites) a component on `id`. Returns `false` if `id`
    /// is not registered.
    pub fn insert<B: Bundle>(&mut self, id: NetworkId, bundle: B) -> bool {
        let Some(entity) = self.entity(id) else {
            return false;
        };
        match self.world.get_entity_mut(entity) {
            Ok(mut entity_mut) => {
                entity_mut.insert(bundle);
                true
            }
            Err(_) => false,
        }
    }

    /// Every registered id, ascending.
    pub fn ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<_> = self.index.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Every registered id carrying component `T`, ascending.
    pub fn ids_with<T: Component>(&self) -> Vec<NetworkId> {
        self.ids()
            .into_iter()
            .filter(|id| self.get::<T>(*id).is_some())
            .collect()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The underlying ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
