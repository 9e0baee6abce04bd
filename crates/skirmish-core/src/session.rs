//! Connected sessions and the match start gate.

use std::collections::BTreeMap;

use skirmish_net::{NetworkId, SessionId};

use crate::death::SpawnSide;

/// Server-side record of one connected session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Stable id, assigned in connection order.
    pub id: SessionId,
    /// The session shares the server's process.
    pub is_server: bool,
    /// Spawn side derived from the id.
    pub side: SpawnSide,
    /// The avatar this session drives.
    pub avatar: Option<NetworkId>,
    /// The gun it holds.
    pub gun: Option<NetworkId>,
}

/// All connected sessions, iterated in connection order.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: BTreeMap<SessionId, SessionInfo>,
    next_id: u64,
}

impl SessionTable {
    /// Empty table; the first connection receives [`SessionId::HOST`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its id.
    pub fn connect(&mut self, is_server: bool) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(
            id,
            SessionInfo {
                id,
                is_server,
                side: SpawnSide::for_session(id),
                avatar: None,
                gun: None,
            },
        );
        tracing::info!(session = %id, is_server, "session connected");
        id
    }

    /// Removes a session and returns its record.
    pub fn disconnect(&mut self, id: SessionId) -> Option<SessionInfo> {
        let info = self.sessions.remove(&id);
        if info.is_some() {
            tracing::info!(session = %id, "session disconnected");
        }
        info
    }

    /// Session record.
    pub fn get(&self, id: SessionId) -> Option<&SessionInfo> {
        self.sessions.get(&id)
    }

    /// Mutable session record.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionInfo> {
        self.sessions.get_mut(&id)
    }

    /// Sessions in connection order.
    pub fn iter(&self) -> impl Iterator<Item = &SessionInfo> {
        self.sessions.values()
    }

    /// The session driving `avatar`.
    pub fn owner_of_avatar(&self, avatar: NetworkId) -> Option<SessionId> {
        self.iter()
            .find(|s| s.avatar == Some(avatar))
            .map(|s| s.id)
    }

    /// Number of connected sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MatchGate
// ---------------------------------------------------------------------------

/// What the server does after a session settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Not enough players: keep input frozen.
    Hold,
    /// The threshold was just reached: start the countdown.
    Open,
    /// The match is already running.
    AlreadyOpen,
}

/// Holds the match until `min_players` sessions are connected. Opens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchGate {
    min_players: u32,
    open: bool,
}

impl MatchGate {
    /// Closed gate.
    pub fn new(min_players: u32) -> Self {
        Self {
            min_players,
            open: false,
        }
    }

    /// Returns `true` once opened.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Decides what `connected` sessions mean for the match.
    pub fn evaluate(&mut self, connected: usize) -> GateAction {
        if self.open {
            return GateAction::AlreadyOpen;
        }
        if connected < self.min_players as usize {
            return GateAction::Hold;
        }
        self.open = true;
        tracing::info!(connected, "match gate open");
        GateAction::Open
    }
}
