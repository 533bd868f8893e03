//! Inbound dispatcher.
//!
//! Routes each decoded [`Event`] of an active session:
//!
//! | Event            | Route                                  |
//! |------------------|----------------------------------------|
//! | `Command`        | [`CommandRegistry::invoke`]            |
//! | `Join`           | [`Roster::join`]                       |
//! | `Leave`          | [`Roster::leave`]                      |
//! | `RosterSnapshot` | [`Roster::replace`]                    |
//! | `ProtocolError`  | logged                                 |
//! | `Hello`          | logged (only meaningful as first frame) |
//!
//! Frames that fail to decode or have an unrecognised shape are logged and
//! dropped. Handler errors are not caught here; they end the session.
//!
//! [`CommandRegistry::invoke`]: crate::framework::command::CommandRegistry::invoke

use std::sync::Arc;

use tracing::{Instrument, Level, debug, info, span, trace, warn};

use crate::error::SessionResult;
use crate::foundation::event::Event;
use crate::foundation::identity::Roster;
use crate::framework::registry::Registry;
use crate::transport::connection::ConnectionHandle;

/// Routes inbound frames of one session.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry commands are routed to.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Decodes and routes one raw frame.
    pub async fn dispatch_frame(
        &self,
        raw: &str,
        roster: &mut Roster,
        conn: &ConnectionHandle,
    ) -> SessionResult<()> {
        match Event::decode(raw) {
            Ok(Some(event)) => self.dispatch(event, roster, conn).await,
            Ok(None) => {
                debug!(frame = %raw, "Ignoring frame of unrecognised shape");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, frame = %raw, "Dropping undecodable frame");
                Ok(())
            }
        }
    }

    /// Routes one decoded event.
    pub async fn dispatch(
        &self,
        event: Event,
        roster: &mut Roster,
        conn: &ConnectionHandle,
    ) -> SessionResult<()> {
        let span = span!(Level::DEBUG, "dispatch", event_name = %event.event_name());
        self.route(event, roster, conn).instrument(span).await
    }

    async fn route(
        &self,
        event: Event,
        roster: &mut Roster,
        conn: &ConnectionHandle,
    ) -> SessionResult<()> {
        match event {
            Event::Command(invocation) => {
                self.registry.commands().invoke(&invocation, conn).await?;
            }
            Event::Join(identity) => {
                let name = identity.name.clone();
                if roster.join(identity) {
                    debug!(player = %name, online = roster.len(), "Joined");
                } else {
                    trace!(player = %name, "Join for present player");
                }
            }
            Event::Leave(identity) => {
                if roster.leave(&identity) {
                    debug!(player = %identity.name, online = roster.len(), "Left");
                } else {
                    trace!(player = %identity.name, "Leave for absent player");
                }
            }
            Event::RosterSnapshot(players) => {
                roster.replace(players);
                debug!(online = roster.len(), "Roster replaced from snapshot");
            }
            Event::ProtocolError { message } => {
                warn!(error = %message, "Server reported an error");
            }
            Event::Hello { ok } => {
                info!(ok, "Ignoring hello after handshake");
            }
        }

        Ok(())
    }
}
