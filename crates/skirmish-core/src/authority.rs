//! Who simulates what.
//!
//! Exactly one process is the server. Every replicated entity has at most
//! one owning session, the session whose input drives its predicted state.
//! Both questions are answered by [`AuthorityResolver`], a pure lookup that
//! every other component consults.

use rustc_hash::FxHashMap;
use skirmish_net::{NetworkId, SessionId};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The local process's relationship to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Role {
    /// The local process runs the authoritative simulation.
    pub is_server: bool,
    /// The local session owns the entity.
    pub is_owner: bool,
}

impl Role {
    /// Dedicated authoritative process, owns nothing.
    pub const SERVER: Role = Role {
        is_server: true,
        is_owner: false,
    };

    /// Remote owner.
    pub const OWNER: Role = Role {
        is_server: false,
        is_owner: true,
    };

    /// Neither server nor owner.
    pub const OBSERVER: Role = Role {
        is_server: false,
        is_owner: false,
    };
}

// ---------------------------------------------------------------------------
// AuthorityResolver
// ---------------------------------------------------------------------------

/// Per-process authority and ownership table.
#[derive(Debug, Clone)]
pub struct AuthorityResolver {
    is_server: bool,
    local: Option<SessionId>,
    owners: FxHashMap<NetworkId, Option<SessionId>>,
}

impl AuthorityResolver {
    /// Resolver for the authoritative process. `local` is the session sharing
    /// the process (the host), if any.
    pub fn server(local: Option<SessionId>) -> Self {
        Self {
            is_server: true,
            local,
            owners: FxHashMap::default(),
        }
    }

    /// Resolver for a session. A host session passes `is_server = true`.
    pub fn session(local: SessionId, is_server: bool) -> Self {
        Self {
            is_server,
            local: Some(local),
            owners: FxHashMap::default(),
        }
    }

    /// `true` only on the single server process.
    pub fn is_authoritative(&self) -> bool {
        self.is_server
    }

    /// The session sharing this process.
    pub fn local_session(&self) -> Option<SessionId> {
        self.local
    }

    /// Records `entity` and its owner (none for projectiles).
    pub fn register(&mut self, entity: NetworkId, owner: Option<SessionId>) {
        self.owners.insert(entity, owner);
    }

    /// Forgets `entity`.
    pub fn unregister(&mut self, entity: NetworkId) {
        self.owners.remove(&entity);
    }

    /// Returns `true` if `entity` has been registered.
    pub fn is_registered(&self, entity: NetworkId) -> bool {
        self.owners.contains_key(&entity)
    }

    /// The owning session of `entity`.
    pub fn owner(&self, entity: NetworkId) -> Option<SessionId> {
        self.owners.get(&entity).copied().flatten()
    }

    /// Returns `true` if the local session owns `entity`.
    pub fn is_owner(&self, entity: NetworkId) -> bool {
        self.local.is_some() && self.owner(entity) == self.local
    }

    /// Returns `true` if `session` owns `entity`.
    pub fn is_owned_by(&self, entity: NetworkId, session: SessionId) -> bool {
        self.owner(entity) == Some(session)
    }

    /// The local role for `entity`.
    pub fn role(&self, entity: NetworkId) -> Role {
        Role {
            is_server: self.is_server,
            is_owner: self.is_owner(entity),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
