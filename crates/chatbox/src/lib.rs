//! # Chatbox
//!
//! A long-running client for an event-stream chat service.
//!
//! ## Overview
//!
//! A chatbox holds one persistent connection to the chat service, routes the
//! commands players type to registered handlers, and runs periodic jobs
//! whenever the connection is quiet. When anything goes wrong it drops the
//! connection and starts over after a fixed delay, forever.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌────────────┐     ┌──────────────────┐
//! │ Supervisor │────▶│  Session   │────▶│ Dispatcher       │──▶ Roster, command handlers
//! │ (reconnect)│     │ (one conn) │     ├──────────────────┤
//! └────────────┘     └────────────┘────▶│ Scheduler (idle) │──▶ jobs
//!                                       └──────────────────┘
//! ```
//!
//! - **Supervisor**: connect, handshake, classify failures, reconnect
//! - **Session**: one connection's loop, alternating frames and idle periods
//! - **Dispatcher**: decodes frames and updates the roster or invokes commands
//! - **Scheduler**: interval jobs with catch-up, run only while idle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatbox::prelude::*;
//!
//! async fn ping(cmd: CommandInvocation, conn: ConnectionHandle) -> anyhow::Result<()> {
//!     conn.tell(&cmd.invoker.name, "bot", "&apong")?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = ChatboxRuntime::new();
//!     runtime.register(|registry| registry.command("ping", ping));
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `ws-client`: WebSocket connection to the chat service (default)
//! - `http-client`: JSON-over-HTTP client for plugins
//! - `json-log`: JSON log lines

pub use chatbox_core as core;
pub use chatbox_runtime as runtime;
pub use chatbox_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use chatbox::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use chatbox_runtime::{ChatboxRuntime, Plugin, RuntimeError, RuntimeResult};

    // Handlers and jobs
    pub use chatbox_core::{
        CommandHandler, CommandInvocation, ConnectionHandle, Job, OutboundFrame, Registry,
        RegistryBuilder, TellMode,
    };

    // Participants
    pub use chatbox_core::{Identity, Roster};
}
