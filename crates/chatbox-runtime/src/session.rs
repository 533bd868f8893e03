//! One connection session.
//!
//! A session starts on an open connection in the `AwaitingHello` state and
//! ends with the [`SessionError`] that stopped it. While active it alternates
//! between routing inbound frames and running due jobs; the two never
//! overlap.

use std::time::Duration;

use tracing::{debug, info, trace};

use chatbox_core::{
    BoxedConnection, Clock, ConnectionHandle, Dispatcher, Event, Received, Roster, SessionError,
    SessionResult, TickClock,
};

/// Drives a single connection from handshake to teardown.
pub struct Session<'a> {
    dispatcher: &'a Dispatcher,
    clock: &'a dyn Clock,
    receive_timeout: Duration,
    handshake_timeout: Duration,
}

impl<'a> Session<'a> {
    /// A session dispatching through `dispatcher`, with the given receive and
    /// hello timeouts.
    pub fn new(
        dispatcher: &'a Dispatcher,
        clock: &'a dyn Clock,
        receive_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            clock,
            receive_timeout,
            handshake_timeout,
        }
    }

    /// Runs the session until something ends it.
    ///
    /// The roster and tick clock live only as long as this call.
    pub async fn run(&self, conn: &mut BoxedConnection) -> SessionError {
        if let Err(e) = self.await_hello(conn).await {
            return e;
        }

        let handle = conn.handle();
        let mut roster = Roster::new();
        let mut ticks = TickClock::new(self.clock.now());
        info!(last_tick = ticks.last_tick(), "Session active");

        loop {
            if let Err(e) = self.step(conn, &mut roster, &mut ticks, &handle).await {
                debug!(online = roster.len(), "Session loop exited");
                return e;
            }
        }
    }

    /// The first frame must be a hello with `ok = true`.
    async fn await_hello(&self, conn: &mut BoxedConnection) -> SessionResult<()> {
        let raw = match conn.recv(self.handshake_timeout).await? {
            Received::Frame(raw) => raw,
            Received::Idle => return Err(SessionError::HandshakeTimeout),
        };

        match Event::decode(&raw) {
            Ok(Some(Event::Hello { ok: true })) => {
                debug!("Handshake accepted");
                Ok(())
            }
            Ok(Some(Event::Hello { ok: false })) => Err(SessionError::HandshakeRejected),
            Ok(Some(other)) => Err(SessionError::UnexpectedFirstFrame {
                got: other.event_name().to_string(),
            }),
            Ok(None) => Err(SessionError::UnexpectedFirstFrame {
                got: "unrecognised frame".to_string(),
            }),
            Err(e) => Err(SessionError::UnexpectedFirstFrame { got: e.to_string() }),
        }
    }

    /// One bounded wait, then either one frame or one scheduler pass.
    async fn step(
        &self,
        conn: &mut BoxedConnection,
        roster: &mut Roster,
        ticks: &mut TickClock,
        handle: &ConnectionHandle,
    ) -> SessionResult<()> {
        match conn.recv(self.receive_timeout).await? {
            Received::Frame(raw) => {
                trace!(len = raw.len(), "Frame received");
                self.dispatcher.dispatch_frame(&raw, roster, handle).await
            }
            Received::Idle => {
                let now = self.clock.now();
                self.dispatcher
                    .registry()
                    .scheduler()
                    .tick(ticks, now, handle)
                    .await?;
                Ok(())
            }
        }
    }
}
