//! # SwitchCraft plugin for chatbox
//!
//! Commands and background jobs for the SwitchCraft server's chatbox:
//!
//! - `calc <expression>`: arithmetic with Python-style operators
//! - `track <player>`: last position seen on the web map
//! - `trackhealth`: statistics of the tracking store
//! - the dynmap tracking job, which keeps that store current
//! - the kauth job, which refunds Krist wallet authentication requests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatbox_runtime::ChatboxRuntime;
//! use chatbox_switchcraft::SwitchcraftPlugin;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = ChatboxRuntime::new();
//!     runtime.register_plugin::<SwitchcraftPlugin>()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Everything here reaches the session only through [`CommandHandler`] and
//! [`Job`] registrations; failures are logged or turned into replies and
//! never end the session.
//!
//! [`CommandHandler`]: chatbox_core::CommandHandler
//! [`Job`]: chatbox_core::Job

pub mod calc;
pub mod config;
pub mod dynmap;
pub mod error;
pub mod krist;
pub mod markup;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use chatbox_core::{CommandInvocation, ConnectionHandle, RegistryBuilder, SystemClock};
use chatbox_runtime::{Plugin, RuntimeError, RuntimeResult};
use chatbox_transport::JsonClient;

pub use config::SwitchcraftConfig;
pub use error::{SwitchcraftError, SwitchcraftResult};
pub use markup::{Color, Markup, Style};

use crate::dynmap::tracker::{TrackerJob, track_command, trackhealth_command};
use crate::dynmap::{DynmapClient, MojangClient, Tracker, TrackingStore};
use crate::krist::{KauthJob, KristClient};

/// Key under `[plugins]`.
pub const PLUGIN_NAME: &str = "switchcraft";

/// The plugin, built from [`SwitchcraftConfig`].
#[derive(Debug)]
pub struct SwitchcraftPlugin {
    calc: bool,
    tracker: Option<(u64, Arc<Tracker>)>,
    kauth: Option<(u64, KauthJob)>,
}

impl Plugin for SwitchcraftPlugin {
    type Config = SwitchcraftConfig;

    fn name() -> &'static str {
        PLUGIN_NAME
    }

    fn from_config(config: Self::Config, base_dir: &Path) -> RuntimeResult<Self> {
        config.validate()?;

        let http = JsonClient::with_timeout(Duration::from_millis(config.http_timeout_ms))
            .map_err(|e| RuntimeError::plugin(PLUGIN_NAME, e))?;

        let tracker = config.tracker.enabled.then(|| {
            let data_dir = crate::config::resolve(base_dir, &config.data_dir);
            info!(data_dir = %data_dir.display(), "Dynmap tracking enabled");
            let tracker = Tracker::new(
                Arc::new(DynmapClient::new(http.clone(), &config.tracker.dynmap_url)),
                Arc::new(MojangClient::new(http.clone(), &config.tracker.profile_url)),
                TrackingStore::in_dir(data_dir),
                Arc::new(SystemClock),
            );
            (config.tracker.interval_secs, Arc::new(tracker))
        });

        let kauth = if config.kauth.enabled {
            let key = config.kauth.read_key(base_dir)?;
            let client = KristClient::new(http, &config.kauth.node_url, key);
            info!(
                node = %config.kauth.node_url,
                sweep_to = ?config.kauth.sweep_to,
                "kauth enabled"
            );
            let mut job = KauthJob::new(Arc::new(client), config.kauth.trusted_names);
            if let Some(address) = config.kauth.sweep_to {
                job = job.with_sweep(address);
            }
            Some((config.kauth.interval_secs, job))
        } else {
            None
        };

        Ok(Self {
            calc: config.calc.enabled,
            tracker,
            kauth,
        })
    }

    fn register(self, mut registry: RegistryBuilder) -> RegistryBuilder {
        if self.calc {
            registry = registry.command("calc", calc::calc_command);
        }

        if let Some((interval, tracker)) = self.tracker {
            let track = Arc::clone(&tracker);
            let health = Arc::clone(&tracker);
            registry = registry
                .command("track", move |cmd: CommandInvocation, conn: ConnectionHandle| {
                    track_command(Arc::clone(&track), cmd, conn)
                })
                .command(
                    "trackhealth",
                    move |cmd: CommandInvocation, conn: ConnectionHandle| {
                        trackhealth_command(Arc::clone(&health), cmd, conn)
                    },
                )
                .job(interval, "dynmap-tracker", TrackerJob::new(tracker));
        }

        if let Some((interval, job)) = self.kauth {
            registry = registry.job(interval, "kauth", job);
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registration() {
        let dir = tempfile::tempdir().unwrap();
        let plugin =
            SwitchcraftPlugin::from_config(SwitchcraftConfig::default(), dir.path()).unwrap();
        assert!(plugin.kauth.is_none());

        let registry = plugin.register(RegistryBuilder::new()).build().unwrap();
        assert_eq!(
            registry.commands().names(),
            vec!["calc", "track", "trackhealth"]
        );
    }

    #[test]
    fn test_kauth_needs_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SwitchcraftConfig::default();
        config.kauth.enabled = true;
        config.tracker.enabled = false;
        config.calc.enabled = false;

        assert!(matches!(
            SwitchcraftPlugin::from_config(config.clone(), dir.path()),
            Err(RuntimeError::Plugin { .. })
        ));

        std::fs::write(dir.path().join("krist_key.txt"), "abc\n").unwrap();
        let plugin = SwitchcraftPlugin::from_config(config, dir.path()).unwrap();
        let registry = plugin.register(RegistryBuilder::new()).build().unwrap();
        assert!(registry.commands().names().is_empty());
    }
}
