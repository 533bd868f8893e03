//! # Chatbox Core
//!
//! The engine of the chatbox client.
//!
//! This crate holds everything that does not need a network: the data
//! model, the command registry, the background scheduler and the inbound
//! dispatcher. Concrete transports live in `chatbox-transport`; the
//! connection supervisor lives in `chatbox-runtime`.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Identities**: remote participants keyed by a stable id ([`Identity`], [`Roster`])
//! - **Events**: frames decoded once into a tagged union ([`Event`], [`CommandInvocation`])
//! - **Outbound frames**: what handlers write back ([`OutboundFrame`])
//!
//! ### Framework Layer
//!
//! - **Commands**: name to ordered handler list ([`CommandRegistry`], [`CommandHandler`])
//! - **Jobs**: interval groups with catch-up ([`Scheduler`], [`Job`], [`TickClock`])
//! - **Dispatcher**: event routing ([`Dispatcher`])
//! - **Registry**: the frozen startup bundle ([`Registry`], [`RegistryBuilder`])
//!
//! ### Transport Layer
//!
//! - **Seams**: [`Connection`], [`Connector`], [`Received`]
//! - **Handle**: [`ConnectionHandle`] for enqueueing outbound frames
//!
//! ## Single Loop
//!
//! One session runs one loop that alternates between two kinds of work and
//! never does both at once:
//!
//! ```text
//!            ┌──────────── recv(T) ─────────────┐
//!            │                                  │
//!        Frame(raw)                            Idle
//!            │                                  │
//!            ▼                                  ▼
//!     ┌────────────┐                     ┌───────────┐
//!     │ Dispatcher │──▶ Roster           │ Scheduler │──▶ due jobs
//!     └────────────┘──▶ Commands         └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatbox_core::{CommandInvocation, ConnectionHandle, Registry};
//!
//! let registry = Registry::builder()
//!     .command("ping", |cmd: CommandInvocation, conn: ConnectionHandle| async move {
//!         conn.tell(&cmd.invoker.name, "bot", "&apong")?;
//!         anyhow::Ok(())
//!     })
//!     .job(60, "heartbeat", |_conn: ConnectionHandle| async { anyhow::Ok(()) })
//!     .build()?;
//! ```

pub mod error;
pub mod foundation;
pub mod framework;
pub mod transport;

// Re-export foundation types
pub use foundation::{CommandInvocation, Event, Identity, OutboundFrame, Roster, TellMode};

// Re-export framework types
pub use framework::{
    BoxedCommandHandler, BoxedJob, Clock, CommandHandler, CommandRegistry, Dispatcher, Job,
    ManualClock, Registry, RegistryBuilder, ScheduledJob, Scheduler, SystemClock, TickClock,
};

// Re-export transport types
pub use transport::{
    BoxedConnection, Connection, ConnectionHandle, Connector, OutboundReceiver, Received,
};

// Re-export error types
pub use error::{
    ABNORMAL_CLOSE_CODE, DecodeError, FailureKind, SchedulerError, SessionError, SessionResult,
    TransportError, TransportResult,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{FailureKind, SessionError, TransportError};
    pub use super::foundation::*;
    pub use super::framework::{
        Clock, CommandHandler, CommandRegistry, Dispatcher, Job, Registry, RegistryBuilder,
        Scheduler, SystemClock, TickClock,
    };
    pub use super::transport::{Connection, ConnectionHandle, Connector, Received};
}
