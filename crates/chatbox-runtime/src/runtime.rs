//! Top-level runtime: configuration, logging, registry and supervisor.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chatbox_runtime::ChatboxRuntime;
//!
//! // Auto-loads chatbox.toml from the current directory
//! let mut runtime = ChatboxRuntime::new();
//!
//! // Custom configuration path
//! let mut runtime = ChatboxRuntime::builder()
//!     .config_file("deploy/chatbox.toml")
//!     .profile("production")
//!     .build()?;
//!
//! runtime.register_plugin::<MyPlugin>()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal;
use tracing::{debug, info, warn};

use chatbox_core::{Connector, RegistryBuilder};

use crate::config::{ChatboxConfig, ConfigLoader, ConfigResult};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::plugin::Plugin;
use crate::supervisor::Supervisor;

/// The chatbox client runtime.
///
/// Collects plugin registrations, then hands a frozen registry to a
/// [`Supervisor`] that keeps the connection alive until shutdown.
///
/// ```rust,ignore
/// let mut runtime = ChatboxRuntime::from_config(&config);
/// runtime.register(|registry| registry.command("ping", ping));
/// runtime.run().await?;
/// ```
pub struct ChatboxRuntime {
    config: ChatboxConfig,
    base_dir: PathBuf,
    registry: RegistryBuilder,
    connector: Option<Arc<dyn Connector>>,
}

impl ChatboxRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Falls back to defaults if no usable configuration is found.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                ChatboxConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initialises logging.
    ///
    /// Relative paths resolve against the current directory.
    pub fn from_config(config: &ChatboxConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            plugins = config.plugins.len(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            registry: RegistryBuilder::new(),
            connector: None,
        }
    }

    /// Sets the directory relative paths (token file, plugin data) resolve
    /// against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Uses `connector` instead of a websocket to `connection.endpoint`.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ChatboxConfig {
        &self.config
    }

    /// Directory relative paths in the configuration resolve against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Registers a plugin configured from `[plugins.<name>]`.
    ///
    /// A missing table means the plugin's default configuration.
    pub fn register_plugin<P: Plugin>(&mut self) -> RuntimeResult<()> {
        let name = P::name();
        if !self.config.plugins.contains_key(name) {
            warn!(plugin = name, "No configuration found for plugin, using default");
        }
        let config: P::Config = self.config.plugin(name)?;
        let plugin = P::from_config(config, &self.base_dir)?;

        self.register(|registry| plugin.register(registry));
        info!(plugin = name, "Registered plugin");
        Ok(())
    }

    /// Adds commands and jobs directly.
    pub fn register<F>(&mut self, f: F)
    where
        F: FnOnce(RegistryBuilder) -> RegistryBuilder,
    {
        let registry = std::mem::take(&mut self.registry);
        self.registry = f(registry);
    }

    /// Freezes the registry and builds the supervisor.
    ///
    /// Registration is closed afterwards; later calls see an empty registry.
    pub fn supervisor(&mut self) -> RuntimeResult<Supervisor> {
        let registry = std::mem::take(&mut self.registry).build()?;
        debug!(
            commands = registry.commands().names().len(),
            jobs = registry.scheduler().job_count(),
            "Registry frozen"
        );

        let connector = match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => self.default_connector()?,
        };

        Ok(Supervisor::new(
            connector,
            registry,
            self.config.connection.supervisor_config(),
        ))
    }

    #[cfg(feature = "ws-client")]
    fn default_connector(&self) -> RuntimeResult<Arc<dyn Connector>> {
        let url = self.config.connection.url(&self.base_dir)?;
        Ok(Arc::new(chatbox_transport::WsConnector::new(url)))
    }

    #[cfg(not(feature = "ws-client"))]
    fn default_connector(&self) -> RuntimeResult<Arc<dyn Connector>> {
        Err(RuntimeError::NoConnector)
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&mut self) -> RuntimeResult<()> {
        let supervisor = self.supervisor()?;
        info!("Chatbox runtime is now running. Press Ctrl+C to stop.");
        supervisor.run_until(wait_for_shutdown()).await;
        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let supervisor = self.supervisor()?;
        supervisor.run_until(shutdown).await;
        info!("Runtime stopped");
        Ok(())
    }
}

impl Default for ChatboxRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`ChatboxRuntime`] with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = ChatboxRuntime::builder()
///     .config_file("deploy/chatbox.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    base_dir: Option<PathBuf>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            base_dir: None,
        }
    }

    /// Loads this file instead of searching. Relative paths then resolve
    /// against its directory.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.base_dir = Some(parent.to_path_buf());
        }
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Overrides the directory relative paths resolve against.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ChatboxConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> ConfigResult<ChatboxRuntime> {
        let config = self.config_loader.load()?;
        let runtime = ChatboxRuntime::from_config(&config);
        Ok(match self.base_dir {
            Some(dir) => runtime.with_base_dir(dir),
            None => runtime,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatbox_core::{
        BoxedConnection, CommandInvocation, ConnectionHandle, TransportError, TransportResult,
    };
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Unreachable {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self) -> TransportResult<BoxedConnection> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::ConnectionFailed {
                url: "test".into(),
                reason: "unreachable".into(),
            })
        }
    }

    #[derive(Debug, Default, Deserialize)]
    struct GreeterConfig {
        #[serde(default)]
        greeting: String,
    }

    struct Greeter {
        greeting: String,
    }

    impl Plugin for Greeter {
        type Config = GreeterConfig;

        fn name() -> &'static str {
            "greeter"
        }

        fn from_config(config: Self::Config, _base_dir: &Path) -> RuntimeResult<Self> {
            if config.greeting.is_empty() {
                return Err(RuntimeError::plugin("greeter", "greeting must not be empty"));
            }
            Ok(Self {
                greeting: config.greeting,
            })
        }

        fn register(self, registry: RegistryBuilder) -> RegistryBuilder {
            let greeting = self.greeting;
            registry.command("hi", move |cmd: CommandInvocation, conn: ConnectionHandle| {
                let text = format!("{greeting}, {}", cmd.invoker.name);
                async move {
                    conn.tell(&cmd.invoker.name, "greeter", text)?;
                    anyhow::Ok(())
                }
            })
        }
    }

    #[test]
    fn test_plugin_reads_its_table() {
        let mut config = ChatboxConfig::default();
        let mut runtime = ChatboxRuntime::from_config(&config);
        assert!(matches!(
            runtime.register_plugin::<Greeter>(),
            Err(RuntimeError::Plugin { .. })
        ));

        config
            .plugins
            .insert("greeter".into(), serde_json::json!({ "greeting": "hello" }));
        let mut runtime = ChatboxRuntime::from_config(&config)
            .with_connector(Arc::new(Unreachable::default()));
        runtime.register_plugin::<Greeter>().unwrap();

        let supervisor = runtime.supervisor().unwrap();
        assert_eq!(supervisor.config().reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_reserved_interval_fails_build() {
        let mut runtime = ChatboxRuntime::from_config(&ChatboxConfig::default())
            .with_connector(Arc::new(Unreachable::default()));
        runtime.register(|registry| {
            registry.job(0, "zero", |_conn: ConnectionHandle| async { anyhow::Ok(()) })
        });

        assert!(matches!(
            runtime.supervisor(),
            Err(RuntimeError::Registry(_))
        ));
    }

    #[cfg(feature = "ws-client")]
    #[test]
    fn test_missing_token_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime =
            ChatboxRuntime::from_config(&ChatboxConfig::default()).with_base_dir(dir.path());

        assert!(matches!(
            runtime.supervisor(),
            Err(RuntimeError::Config(crate::config::ConfigError::MissingToken(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_keeps_retrying() {
        let connector = Arc::new(Unreachable::default());
        let mut runtime = ChatboxRuntime::from_config(&ChatboxConfig::default())
            .with_connector(connector.clone());

        runtime
            .run_until(tokio::time::sleep(Duration::from_secs(11)))
            .await
            .unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_builder_uses_config_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatbox.toml");
        std::fs::write(
            &path,
            "[connection]\ntoken_file = \"secret\"\nreconnect_delay_ms = 250\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("secret"), "tok\n").unwrap();

        let runtime = ChatboxRuntime::builder()
            .config_file(&path)
            .without_env()
            .build()
            .unwrap();

        assert_eq!(runtime.base_dir(), dir.path());
        assert_eq!(
            runtime.config().connection.url(runtime.base_dir()).unwrap(),
            "wss://chat.sc3.io/v2/tok"
        );
        assert_eq!(runtime.config().connection.reconnect_delay_ms, 250);
    }
}
