//! Plugins: bundles of commands and jobs configured from `[plugins.<name>]`.

use std::path::Path;

use chatbox_core::RegistryBuilder;

use crate::error::RuntimeResult;

/// A plugin registered through [`ChatboxRuntime::register_plugin`].
///
/// The runtime looks up `[plugins.<name>]`, deserialises it into
/// [`Plugin::Config`] (or uses the default when the table is missing), builds
/// the plugin and lets it add its commands and jobs to the registry.
///
/// [`ChatboxRuntime::register_plugin`]: crate::ChatboxRuntime::register_plugin
pub trait Plugin: Sized {
    /// The plugin's configuration table.
    type Config: serde::de::DeserializeOwned + Default;

    /// Config key under `[plugins]`.
    fn name() -> &'static str;

    /// Creates the plugin. Relative paths in the config resolve against
    /// `base_dir`.
    fn from_config(config: Self::Config, base_dir: &Path) -> RuntimeResult<Self>;

    /// Adds commands and jobs.
    fn register(self, registry: RegistryBuilder) -> RegistryBuilder;
}
