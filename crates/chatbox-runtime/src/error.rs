//! Runtime error types.

use thiserror::Error;

use chatbox_core::SchedulerError;

use crate::config::ConfigError;

/// Errors that can occur while setting up or running the client.
///
/// Session failures are not here: the supervisor absorbs them and
/// reconnects.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A `[plugins.<name>]` table did not match the plugin's schema.
    #[error("Failed to deserialize config for plugin '{plugin}': {reason}")]
    PluginConfigDeserialize { plugin: String, reason: String },

    /// A plugin failed to initialise.
    #[error("Plugin '{plugin}' failed to initialize: {reason}")]
    Plugin { plugin: String, reason: String },

    /// A command or job registration was rejected.
    #[error("Registry error: {0}")]
    Registry(#[from] SchedulerError),

    /// No connector was supplied and no built-in transport is enabled.
    #[error("No connector configured: enable the `ws-client` feature or supply one")]
    NoConnector,
}

impl RuntimeError {
    /// Creates a plugin initialisation error.
    pub fn plugin(plugin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
