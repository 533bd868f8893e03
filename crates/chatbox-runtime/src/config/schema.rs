//! Configuration schema definitions.
//!
//! ```toml
//! [connection]
//! endpoint = "wss://chat.sc3.io/v2/"
//! token_file = "key"
//! receive_timeout_ms = 1000
//! reconnect_delay_ms = 5000
//!
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [logging.filters]
//! chatbox_transport = "debug"
//!
//! [plugins.switchcraft]
//! data_dir = "data"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use crate::error::{RuntimeError, RuntimeResult};
use crate::supervisor::SupervisorConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatboxConfig {
    /// Chat service connection.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Free-form per-plugin tables, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

impl ChatboxConfig {
    /// Deserialises the `[plugins.<name>]` table.
    ///
    /// A missing table yields `T::default()`.
    pub fn plugin<T>(&self, name: &str) -> RuntimeResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.plugins.get(name) {
            None => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                RuntimeError::PluginConfigDeserialize {
                    plugin: name.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Chat service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint prefix; the token is appended to it.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// The secret token. Takes precedence over `token_file`.
    #[serde(default)]
    pub token: Option<String>,

    /// File holding the token, read when `token` is unset.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Bounded wait for one inbound frame, in milliseconds.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Fixed delay before reconnecting, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// How long to wait for the hello frame, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            token_file: default_token_file(),
            receive_timeout_ms: default_receive_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Resolves the secret token.
    ///
    /// Relative token files are looked up under `base_dir`.
    pub fn resolve_token(&self, base_dir: &Path) -> ConfigResult<String> {
        if let Some(token) = self.token.as_deref().map(str::trim)
            && !token.is_empty()
        {
            return Ok(token.to_string());
        }

        let path = if self.token_file.is_absolute() {
            self.token_file.clone()
        } else {
            base_dir.join(&self.token_file)
        };

        match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => Ok(content.trim().to_string()),
            Ok(_) => Err(ConfigError::MissingToken(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigError::MissingToken(path))
            }
            Err(source) => Err(ConfigError::TokenFile { path, source }),
        }
    }

    /// Full endpoint URL: `endpoint` followed by the token.
    pub fn url(&self, base_dir: &Path) -> ConfigResult<String> {
        let token = self.resolve_token(base_dir)?;
        Ok(format!("{}{}", self.endpoint, token))
    }

    /// Timing settings for the supervisor.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        }
    }
}

fn default_endpoint() -> String {
    "wss://chat.sc3.io/v2/".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("key")
}

fn default_receive_timeout_ms() -> u64 {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_handshake_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Logging
// =============================================================================

/// Log level names accepted in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation policy for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` overrides it.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `chatbox_transport = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of each event.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            filters: HashMap::new(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inline_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key"), "from-file\n").unwrap();
        let config = ConnectionConfig {
            token: Some(" inline ".into()),
            ..Default::default()
        };

        assert_eq!(
            config.url(dir.path()).unwrap(),
            "wss://chat.sc3.io/v2/inline"
        );
    }

    #[test]
    fn test_token_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key"), "abc123\n").unwrap();

        let config = ConnectionConfig::default();
        assert_eq!(config.resolve_token(dir.path()).unwrap(), "abc123");
    }

    #[test]
    fn test_missing_or_empty_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectionConfig::default();
        assert!(matches!(
            config.resolve_token(dir.path()),
            Err(ConfigError::MissingToken(_))
        ));

        std::fs::write(dir.path().join("key"), "  \n").unwrap();
        assert!(matches!(
            config.resolve_token(dir.path()),
            Err(ConfigError::MissingToken(_))
        ));
    }

    #[test]
    fn test_supervisor_timings() {
        let config = ConnectionConfig {
            receive_timeout_ms: 250,
            ..Default::default()
        };
        let sup = config.supervisor_config();
        assert_eq!(sup.receive_timeout, Duration::from_millis(250));
        assert_eq!(sup.reconnect_delay, Duration::from_secs(5));
        assert_eq!(sup.handshake_timeout, Duration::from_secs(30));
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct DemoPlugin {
        #[serde(default)]
        interval: u64,
    }

    #[test]
    fn test_plugin_tables() {
        let mut config = ChatboxConfig::default();
        assert_eq!(
            config.plugin::<DemoPlugin>("demo").unwrap(),
            DemoPlugin::default()
        );

        config
            .plugins
            .insert("demo".into(), json!({ "interval": 5 }));
        assert_eq!(config.plugin::<DemoPlugin>("demo").unwrap().interval, 5);

        config
            .plugins
            .insert("demo".into(), json!({ "interval": "soon" }));
        assert!(matches!(
            config.plugin::<DemoPlugin>("demo"),
            Err(RuntimeError::PluginConfigDeserialize { .. })
        ));
    }
}
