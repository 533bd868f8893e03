//! Chatbox Runtime - connection supervision and process setup.
//!
//! This crate provides:
//! - The connection supervisor and session loop (`Supervisor`, `Session`)
//! - Runtime orchestration (`ChatboxRuntime`)
//! - Plugin registration from `[plugins.<name>]` tables (`Plugin`)
//! - Configuration loading (`ConfigLoader`)
//! - Logging configuration (`LoggingBuilder`)
//!
//! ```ignore
//! use chatbox_runtime::ChatboxRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = ChatboxRuntime::new();
//!
//!     runtime.register(|registry| registry.command("ping", ping));
//!
//!     // Reconnects forever, until Ctrl+C
//!     runtime.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Failure Handling
//!
//! Nothing inside a session is retried in place. Any failure, from a
//! rejected handshake to a command handler error, ends the session; the
//! supervisor logs its [`FailureKind`](chatbox_core::FailureKind), waits a
//! fixed delay and connects again.

pub mod config;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod runtime;
pub mod session;
pub mod supervisor;

// Re-exports
pub use config::{ChatboxConfig, ConfigError, ConfigLoader, ConfigResult, ConnectionConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use plugin::Plugin;
pub use runtime::{ChatboxRuntime, RuntimeBuilder, wait_for_shutdown};
pub use session::Session;
pub use supervisor::{Supervisor, SupervisorConfig};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
