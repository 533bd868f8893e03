//! Command registry.
//!
//! A command name maps to an ordered list of handlers. Registering a name
//! twice appends; invoking a name runs its handlers strictly in
//! registration order and stops at the first error.
//!
//! ```rust,ignore
//! let mut commands = CommandRegistry::new();
//! commands.register("ping", |cmd: CommandInvocation, conn: ConnectionHandle| async move {
//!     conn.tell(&cmd.invoker.name, "bot", "&apong")?;
//!     anyhow::Ok(())
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{SessionError, SessionResult};
use crate::foundation::event::CommandInvocation;
use crate::transport::connection::ConnectionHandle;

/// Business logic behind a command.
///
/// Handlers are expected to turn their own failures into a reply to the
/// invoker. An `Err` returned here ends the whole session.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Handles one invocation.
    async fn handle(
        &self,
        invocation: CommandInvocation,
        conn: ConnectionHandle,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandInvocation, ConnectionHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        invocation: CommandInvocation,
        conn: ConnectionHandle,
    ) -> anyhow::Result<()> {
        (self)(invocation, conn).await
    }
}

/// Shared command handler.
pub type BoxedCommandHandler = Arc<dyn CommandHandler>;

/// Maps command names to ordered handler lists.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<String, Vec<BoxedCommandHandler>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for `name`.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: CommandHandler,
    {
        self.register_boxed(name, Arc::new(handler));
    }

    /// Appends an already shared handler for `name`.
    pub fn register_boxed(&mut self, name: impl Into<String>, handler: BoxedCommandHandler) {
        self.handlers.entry(name.into()).or_default().push(handler);
    }

    /// Number of handlers registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs every handler for the invoked name, in registration order.
    ///
    /// An unregistered name is a no-op. The first handler error stops the
    /// remaining handlers and is returned as [`SessionError::Handler`].
    /// Returns how many handlers completed.
    pub async fn invoke(
        &self,
        invocation: &CommandInvocation,
        conn: &ConnectionHandle,
    ) -> SessionResult<usize> {
        let Some(handlers) = self.handlers.get(&invocation.name) else {
            trace!(command = %invocation.name, "No handlers registered");
            return Ok(0);
        };

        debug!(
            command = %invocation.name,
            invoker = %invocation.invoker.name,
            handlers = handlers.len(),
            "Invoking command"
        );

        for handler in handlers {
            handler
                .handle(invocation.clone(), conn.clone())
                .await
                .map_err(|source| SessionError::Handler {
                    command: invocation.name.clone(),
                    source,
                })?;
        }

        Ok(handlers.len())
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::identity::Identity;
    use parking_lot::Mutex;

    fn invocation(name: &str) -> CommandInvocation {
        CommandInvocation::new(name, vec![], Identity::new("alice", "a"))
    }

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
        fail: bool,
    ) -> impl CommandHandler {
        let log = Arc::clone(log);
        move |_cmd: CommandInvocation, _conn: ConnectionHandle| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(tag);
                if fail {
                    anyhow::bail!("{tag} failed");
                }
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut commands = CommandRegistry::new();
        commands.register("x", recorder(&log, "A", false));
        commands.register("x", recorder(&log, "B", false));
        let (conn, _rx) = ConnectionHandle::channel();

        let ran = commands.invoke(&invocation("x"), &conn).await.unwrap();

        assert_eq!(ran, 2);
        assert_eq!(*log.lock(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut commands = CommandRegistry::new();
        commands.register("x", recorder(&log, "A", true));
        commands.register("x", recorder(&log, "B", false));
        let (conn, _rx) = ConnectionHandle::channel();

        let err = commands.invoke(&invocation("x"), &conn).await.unwrap_err();

        assert!(matches!(err, SessionError::Handler { ref command, .. } if command == "x"));
        assert_eq!(*log.lock(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_unregistered_command_is_noop() {
        let commands = CommandRegistry::new();
        let (conn, mut rx) = ConnectionHandle::channel();

        let ran = commands.invoke(&invocation("nope"), &conn).await.unwrap();

        assert_eq!(ran, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_replies_through_handle() {
        let mut commands = CommandRegistry::new();
        commands.register("ping", |cmd: CommandInvocation, conn: ConnectionHandle| async move {
            conn.tell(&cmd.invoker.name, "bot", "pong")?;
            anyhow::Ok(())
        });
        let (conn, mut rx) = ConnectionHandle::channel();

        commands.invoke(&invocation("ping"), &conn).await.unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame, crate::OutboundFrame::tell("alice", "bot", "pong"));
        assert_eq!(commands.names(), vec!["ping"]);
    }
}
