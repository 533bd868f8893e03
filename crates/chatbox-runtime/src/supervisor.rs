//! Connection supervisor.
//!
//! Owns the connection lifecycle and never gives up on it:
//!
//! ```text
//! Connecting ─▶ AwaitingHello ─▶ Active
//!     ▲                             │
//!     └──── sleep(reconnect_delay) ◀┘  (any failure)
//! ```
//!
//! Every failure takes the same path. It is classified into a
//! [`FailureKind`] for the log, the connection is dropped, and after a fixed
//! delay a fresh connection is opened. There is no retry cap and no backoff.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use chatbox_core::{
    Clock, Connector, Dispatcher, FailureKind, Registry, SessionError, SystemClock,
};

use crate::session::Session;

/// Timings for the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Bounded wait for one inbound frame. An expired wait is an idle period.
    pub receive_timeout: Duration,
    /// Fixed delay between a failure and the next connection attempt.
    pub reconnect_delay: Duration,
    /// How long to wait for the hello frame.
    pub handshake_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

/// Keeps one session alive at a time, forever.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: SupervisorConfig,
    attempts: AtomicU64,
}

impl Supervisor {
    /// Creates a supervisor using the system clock.
    pub fn new(
        connector: Arc<dyn Connector>,
        registry: Arc<Registry>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            connector,
            dispatcher: Dispatcher::new(registry),
            clock: Arc::new(SystemClock),
            config,
            attempts: AtomicU64::new(0),
        }
    }

    /// Replaces the wall clock the scheduler reads.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the reconnect settings.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Reconnects forever. Only returns if the future is dropped.
    pub async fn run_forever(&self) {
        loop {
            let error = self.run_session().await;
            self.report(&error);
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Like [`run_forever`](Self::run_forever), but stops once `shutdown`
    /// completes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run_forever() => {}
            _ = shutdown => {
                info!(attempts = self.attempts(), "Supervisor stopped");
            }
        }
    }

    /// One full lifecycle: connect, handshake, active loop.
    ///
    /// Returns whatever ended it.
    pub async fn run_session(&self) -> SessionError {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        info!(attempt, endpoint = %self.connector.describe(), "Connecting");

        let mut conn = match self.connector.connect().await {
            Ok(conn) => conn,
            Err(e) => return SessionError::Transport(e),
        };

        let session = Session::new(
            &self.dispatcher,
            self.clock.as_ref(),
            self.config.receive_timeout,
            self.config.handshake_timeout,
        );
        let error = session.run(&mut conn).await;
        conn.close().await;
        error
    }

    fn report(&self, error: &SessionError) {
        let kind = error.kind();
        let attempt = self.attempts();
        let delay = self.config.reconnect_delay;
        match kind {
            FailureKind::ClosedCleanly => {
                info!(attempt, kind = %kind, ?delay, "Connection closed, reconnecting");
            }
            _ => {
                warn!(attempt, kind = %kind, error = %error, ?delay, "Session failed, reconnecting");
            }
        }
    }
}
