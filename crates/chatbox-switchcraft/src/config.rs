//! Configuration for the SwitchCraft plugin.
//!
//! Loaded from `[plugins.switchcraft]`; every field has a default.
//!
//! # Example Configuration
//!
//! ```toml
//! [plugins.switchcraft]
//! data_dir = "data"
//!
//! [plugins.switchcraft.calc]
//! enabled = true
//!
//! [plugins.switchcraft.kauth]
//! enabled = true
//! key_file = "krist_key.txt"
//! interval_secs = 10
//! sweep_to = "kpk8qmvoy7"
//!
//! [plugins.switchcraft.kauth.trusted_names]
//! switchcraft = "kqxhx5yn9v"
//!
//! [plugins.switchcraft.tracker]
//! enabled = true
//! dynmap_url = "https://dynmap.sc3.io"
//! interval_secs = 5
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use chatbox_runtime::{RuntimeError, RuntimeResult};

use crate::PLUGIN_NAME;
use crate::dynmap::{DEFAULT_DYNMAP_URL, DEFAULT_PROFILE_URL};
use crate::krist::DEFAULT_KRIST_URL;

/// `[plugins.switchcraft]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchcraftConfig {
    /// Directory for the tracking store. Relative to the config file.
    pub data_dir: PathBuf,

    /// Timeout for web API requests, in milliseconds.
    pub http_timeout_ms: u64,

    pub calc: CalcConfig,
    pub kauth: KauthConfig,
    pub tracker: TrackerConfig,
}

impl Default for SwitchcraftConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            http_timeout_ms: 30_000,
            calc: CalcConfig::default(),
            kauth: KauthConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl SwitchcraftConfig {
    /// Checks intervals and URLs before anything is built.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.http_timeout_ms == 0 {
            return Err(RuntimeError::plugin(PLUGIN_NAME, "http_timeout_ms must be positive"));
        }
        if self.kauth.enabled {
            check_job("kauth", self.kauth.interval_secs, &[self.kauth.node_url.as_str()])?;
            if self.kauth.sweep_to.as_deref().is_some_and(|to| to.trim().is_empty()) {
                return Err(RuntimeError::plugin(PLUGIN_NAME, "kauth.sweep_to is empty"));
            }
        }
        if self.tracker.enabled {
            check_job(
                "tracker",
                self.tracker.interval_secs,
                &[
                    self.tracker.dynmap_url.as_str(),
                    self.tracker.profile_url.as_str(),
                ],
            )?;
        }
        Ok(())
    }
}

fn check_job(job: &str, interval_secs: u64, urls: &[&str]) -> RuntimeResult<()> {
    if interval_secs == 0 {
        return Err(RuntimeError::plugin(
            PLUGIN_NAME,
            format!("{job}.interval_secs must be positive"),
        ));
    }
    for url in urls {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RuntimeError::plugin(
                PLUGIN_NAME,
                format!("{job}: '{url}' is not an http(s) URL"),
            ));
        }
    }
    Ok(())
}

/// Resolves `path` against `base_dir` unless it is absolute.
pub(crate) fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// `[plugins.switchcraft.calc]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
    pub enabled: bool,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// `[plugins.switchcraft.kauth]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KauthConfig {
    /// Off by default: it needs a wallet key.
    pub enabled: bool,

    /// File holding the Krist private key.
    pub key_file: PathBuf,

    pub node_url: String,

    pub interval_secs: u64,

    /// Names whose `return=` targets are honoured, mapped to the address
    /// that owns them.
    pub trusted_names: HashMap<String, String>,

    /// Address the kept balance is forwarded to. Unset keeps it in the
    /// wallet.
    pub sweep_to: Option<String>,
}

impl Default for KauthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_file: PathBuf::from("krist_key.txt"),
            node_url: DEFAULT_KRIST_URL.to_string(),
            interval_secs: 10,
            trusted_names: HashMap::from([(
                "switchcraft".to_string(),
                "kqxhx5yn9v".to_string(),
            )]),
            sweep_to: None,
        }
    }
}

impl KauthConfig {
    /// Reads the trimmed private key.
    pub fn read_key(&self, base_dir: &Path) -> RuntimeResult<String> {
        let path = resolve(base_dir, &self.key_file);
        let key = std::fs::read_to_string(&path).map_err(|e| {
            RuntimeError::plugin(
                PLUGIN_NAME,
                format!("cannot read Krist key {}: {e}", path.display()),
            )
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(RuntimeError::plugin(
                PLUGIN_NAME,
                format!("Krist key file {} is empty", path.display()),
            ));
        }
        Ok(key.to_string())
    }
}

/// `[plugins.switchcraft.tracker]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub dynmap_url: String,
    pub profile_url: String,
    pub interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dynmap_url: DEFAULT_DYNMAP_URL.to_string(),
            profile_url: DEFAULT_PROFILE_URL.to_string(),
            interval_secs: 5,
        }
    }
}
