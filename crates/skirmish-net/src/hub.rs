//! In-process, session-addressed transport.
//!
//! The [`LoopbackHub`] owns one unbounded FIFO per session plus one for the
//! server. Every message is encoded with [`serialize_message`] on send and
//! decoded on receive, so anything that travels through the hub would also
//! survive a real socket. Delivery within one channel is ordered and
//! reliable; nothing orders deliveries across channels.

use std::collections::BTreeMap;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::ids::SessionId;
use crate::messages::{Message, MessageError, deserialize_message, serialize_message};

/// Where a message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The authoritative simulation.
    Server,
    /// One session.
    Session(SessionId),
    /// Every connected session.
    All,
    /// Every connected session except one (usually the owner).
    AllExcept(SessionId),
}

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The authoritative simulation.
    Server,
    /// A session.
    Session(SessionId),
}

/// A decoded message plus its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sender.
    pub from: Origin,
    /// Payload.
    pub message: Message,
}

/// Errors raised by the hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The addressed session never connected or has disconnected.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The message failed to encode.
    #[error("encode error: {0}")]
    Encode(#[from] postcard::Error),

    /// A queued payload failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] MessageError),
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Messages enqueued (a broadcast counts once per recipient).
    pub messages: u64,
    /// Payload bytes enqueued.
    pub bytes: u64,
}

struct Channel {
    tx: Sender<(Origin, Vec<u8>)>,
    rx: Receiver<(Origin, Vec<u8>)>,
}

impl Channel {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    fn drain(&self) -> Result<Vec<Envelope>, HubError> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok((from, bytes)) => out.push(Envelope {
                    from,
                    message: deserialize_message(&bytes)?,
                }),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(out)
    }
}

/// Loopback transport connecting one server with any number of sessions.
pub struct LoopbackHub {
    server: Channel,
    sessions: BTreeMap<SessionId, Channel>,
    stats: HubStats,
}

impl LoopbackHub {
    /// Creates a hub with only the server channel.
    pub fn new() -> Self {
        Self {
            server: Channel::new(),
            sessions: BTreeMap::new(),
            stats: HubStats::default(),
        }
    }

    /// Opens a channel for `session`. Reconnecting an id discards its
    /// undelivered messages.
    pub fn connect(&mut self, session: SessionId) {
        self.sessions.insert(session, Channel::new());
        tracing::debug!(%session, "hub channel opened");
    }

    /// Closes the channel for `session`.
    pub fn disconnect(&mut self, session: SessionId) {
        if self.sessions.remove(&session).is_some() {
            tracing::debug!(%session, "hub channel closed");
        }
    }

    /// Returns the ids of every open session channel, in id order.
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    /// Encodes `message` once and enqueues it for every recipient of `target`.
    pub fn send(
        &mut self,
        from: Origin,
        target: Target,
        message: &Message,
    ) -> Result<(), HubError> {
        let bytes = serialize_message(message)?;
        match target {
            Target::Server => {
                let tx = self.server.tx.clone();
                self.push(&tx, from, &bytes);
            }
            Target::Session(id) => {
                let tx = self
                    .sessions
                    .get(&id)
                    .map(|c| c.tx.clone())
                    .ok_or(HubError::UnknownSession(id))?;
                self.push(&tx, from, &bytes);
            }
            Target::All | Target::AllExcept(_) => {
                let skip = match target {
                    Target::AllExcept(id) => Some(id),
                    _ => None,
                };
                let recipients: Vec<_> = self
                    .sessions
                    .iter()
                    .filter(|(id, _)| Some(**id) != skip)
                    .map(|(_, c)| c.tx.clone())
                    .collect();
                for tx in &recipients {
                    self.push(tx, from, &bytes);
                }
            }
        }
        tracing::trace!(message = message.name(), ?target, "enqueued");
        Ok(())
    }

    fn push(&mut self, tx: &Sender<(Origin, Vec<u8>)>, from: Origin, bytes: &[u8]) {
        // Both ends live in the hub, so the receiver cannot be gone.
        if tx.send((from, bytes.to_vec())).is_ok() {
            self.stats.messages += 1;
            self.stats.bytes += bytes.len() as u64;
        }
    }

    /// Dequeues everything addressed to the server.
    pub fn drain_server(&self) -> Result<Vec<Envelope>, HubError> {
        self.server.drain()
    }

    /// Dequeues everything addressed to `session`.
    pub fn drain_session(&self, session: SessionId) -> Result<Vec<Envelope>, HubError> {
        self.sessions
            .get(&session)
            .ok_or(HubError::UnknownSession(session))?
            .drain()
    }

    /// Delivery counters since creation.
    pub fn stats(&self) -> HubStats {
        self.stats
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NetworkId;
    use crate::messages::{DespawnEntity, PlayerDied};

    fn hub_with(sessions: &[u64]) -> LoopbackHub {
        let mut hub = LoopbackHub::new();
        for id in sessions {
            hub.connect(SessionId(*id));
        }
        hub
    }

    #[test]
    fn test_broadcast_reaches_every_session() {
        let mut hub = hub_with(&[0, 1, 2]);
        hub.send(Origin::Server, Target::All, &Message::RespawnAll)
            .unwrap();
        for id in 0..3 {
            let got = hub.drain_session(SessionId(id)).unwrap();
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].message, Message::RespawnAll);
            assert_eq!(got[0].from, Origin::Server);
        }
        assert_eq!(hub.stats().messages, 3);
    }

    #[test]
    fn test_all_except_skips_owner() {
        let mut hub = hub_with(&[0, 1]);
        hub.send(
            Origin::Server,
            Target::AllExcept(SessionId(1)),
            &Message::CountdownStart,
        )
        .unwrap();
        assert_eq!(hub.drain_session(SessionId(0)).unwrap().len(), 1);
        assert!(hub.drain_session(SessionId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_channel_preserves_order() {
        let mut hub = hub_with(&[0]);
        for id in 0..20 {
            hub.send(
                Origin::Server,
                Target::Session(SessionId(0)),
                &Message::DespawnEntity(DespawnEntity {
                    entity: NetworkId(id),
                }),
            )
            .unwrap();
        }
        let got = hub.drain_session(SessionId(0)).unwrap();
        let ids: Vec<u64> = got
            .iter()
            .map(|e| match &e.message {
                Message::DespawnEntity(d) => d.entity.0,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_server_channel_records_sender() {
        let mut hub = hub_with(&[4]);
        hub.send(
            Origin::Session(SessionId(4)),
            Target::Server,
            &Message::PlayerDied(PlayerDied {
                victim: NetworkId(2),
            }),
        )
        .unwrap();
        let got = hub.drain_server().unwrap();
        assert_eq!(got[0].from, Origin::Session(SessionId(4)));
    }

    #[test]
    fn test_unknown_session_is_an_error() {
        let mut hub = hub_with(&[]);
        let err = hub
            .send(
                Origin::Server,
                Target::Session(SessionId(9)),
                &Message::RespawnAll,
            )
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownSession(SessionId(9))));
    }

    #[test]
    fn test_disconnect_drops_channel() {
        let mut hub = hub_with(&[0, 1]);
        hub.disconnect(SessionId(1));
        assert_eq!(hub.sessions().collect::<Vec<_>>(), vec![SessionId(0)]);
        assert!(hub.drain_session(SessionId(1)).is_err());
    }
}
