//! In-process match: one [`ServerSim`], its sessions' [`ClientSim`]s, and a
//! [`LoopbackHub`] carrying every message between them as encoded bytes.

use std::collections::BTreeMap;

use skirmish_config::Config;
use skirmish_net::{HubError, HubStats, LoopbackHub, Message, Origin, SessionId, Target};

use crate::client::{ClientSim, FrameInput};
use crate::schedule::TickSchedule;
use crate::server::ServerSim;

/// A whole match running in one process.
pub struct LoopbackMatch {
    config: Config,
    hub: LoopbackHub,
    server: ServerSim,
    clients: BTreeMap<SessionId, ClientSim>,
    ticks: TickSchedule,
    elapsed: f64,
}

impl LoopbackMatch {
    /// Empty match.
    pub fn new(config: Config) -> Self {
        Self {
            hub: LoopbackHub::new(),
            server: ServerSim::new(config.clone()),
            clients: BTreeMap::new(),
            ticks: TickSchedule::with_tick_rate(config.simulation.tick_rate_hz),
            elapsed: 0.0,
            config,
        }
    }

    /// Connects a session and delivers its welcome. `seed` drives the
    /// session's weapon spread.
    pub fn join(&mut self, is_server: bool, seed: u64) -> Result<SessionId, HubError> {
        let session = self.server.connect(is_server);
        self.hub.connect(session);
        self.clients.insert(
            session,
            ClientSim::new(session, is_server, self.config.clone(), seed),
        );
        self.pump()?;
        Ok(session)
    }

    /// Disconnects a session. Its entities despawn on every other session.
    pub fn leave(&mut self, session: SessionId) -> Result<(), HubError> {
        self.pump()?;
        self.clients.remove(&session);
        self.hub.disconnect(session);
        self.server.disconnect(session);
        self.pump()
    }

    /// Renders one frame of `dt` seconds on every session, then runs the
    /// server ticks that fit. Sessions without an entry in `inputs` idle.
    pub fn step(&mut self, dt: f32, inputs: &[(SessionId, FrameInput)]) -> Result<(), HubError> {
        for (session, client) in &mut self.clients {
            let input = inputs
                .iter()
                .find(|(id, _)| id == session)
                .map(|(_, input)| *input)
                .unwrap_or_default();
            client.render(dt, input);
        }
        self.pump()?;

        let step = self.config.tick_interval();
        for _ in 0..self.ticks.accumulate(f64::from(dt)) {
            self.server.simulate_tick(step);
        }
        self.elapsed += f64::from(dt);
        self.pump()
    }

    /// Idles every session for `secs` at `dt` per frame.
    pub fn run_for(&mut self, secs: f32, dt: f32) -> Result<(), HubError> {
        let frames = (secs / dt).round() as usize;
        for _ in 0..frames {
            self.step(dt, &[])?;
        }
        Ok(())
    }

    /// Delivers everything queued in either direction.
    pub fn pump(&mut self) -> Result<(), HubError> {
        self.flush_server()?;
        for (session, client) in &mut self.clients {
            for message in client.drain_outbox() {
                self.hub
                    .send(Origin::Session(*session), Target::Server, &message)?;
            }
        }
        for envelope in self.hub.drain_server()? {
            match envelope.from {
                Origin::Session(from) => self.server.handle(from, envelope.message),
                Origin::Server => {
                    tracing::warn!(message = envelope.message.name(), "server sent to itself");
                }
            }
        }
        self.flush_server()?;
        for (session, client) in &mut self.clients {
            for envelope in self.hub.drain_session(*session)? {
                client.handle(envelope.message);
            }
        }
        Ok(())
    }

    fn flush_server(&mut self) -> Result<(), HubError> {
        for (target, message) in self.server.drain_outbox() {
            match self.hub.send(Origin::Server, target, &message) {
                Ok(()) => {}
                Err(HubError::UnknownSession(session)) => {
                    tracing::debug!(
                        %session,
                        message = message.name(),
                        "dropped message for departed session"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // -- accessors ----------------------------------------------------------

    /// The configuration every participant runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server.
    pub fn server(&self) -> &ServerSim {
        &self.server
    }

    /// The server, mutably.
    pub fn server_mut(&mut self) -> &mut ServerSim {
        &mut self.server
    }

    /// A session's client.
    pub fn client(&self, session: SessionId) -> Option<&ClientSim> {
        self.clients.get(&session)
    }

    /// A session's client, mutably.
    pub fn client_mut(&mut self, session: SessionId) -> Option<&mut ClientSim> {
        self.clients.get_mut(&session)
    }

    /// Connected sessions in id order.
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.clients.keys().copied()
    }

    /// Queues a message from `session` to the server, as if its client sent it.
    pub fn inject(&mut self, session: SessionId, message: &Message) -> Result<(), HubError> {
        self.hub.send(Origin::Session(session), Target::Server, message)
    }

    /// Hub delivery counters.
    pub fn hub_stats(&self) -> HubStats {
        self.hub.stats()
    }

    /// Rendered time since creation (seconds).
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_delivers_welcome_and_spawns() {
        let mut game = LoopbackMatch::new(Config::default());
        let host = game.join(true, 1).unwrap();
        let guest = game.join(false, 2).unwrap();

        let host_avatar = game.server().sessions().get(host).and_then(|s| s.avatar).unwrap();
        let guest_view = game.client(guest).unwrap();
        assert!(guest_view.remote_avatar(host_avatar).is_some());
        assert!(guest_view.avatar().is_some());
        assert!(game.hub_stats().messages > 0);
    }

    #[test]
    fn test_leave_despawns_everywhere() {
        let mut game = LoopbackMatch::new(Config::default());
        let host = game.join(true, 1).unwrap();
        let guest = game.join(false, 2).unwrap();
        let guest_avatar = game.server().sessions().get(guest).and_then(|s| s.avatar).unwrap();

        game.leave(guest).unwrap();
        assert!(game.client(guest).is_none());
        assert!(game.client(host).unwrap().remote_avatar(guest_avatar).is_none());
        assert_eq!(game.sessions().collect::<Vec<_>>(), vec![host]);
    }

    #[test]
    fn test_step_advances_server_ticks() {
        let mut game = LoopbackMatch::new(Config::default());
        game.join(true, 1).unwrap();
        game.run_for(1.0, 1.0 / 60.0).unwrap();
        assert!((49..=51).contains(&game.server().tick()));
    }
}
