//! Player position tracking over the web map, and the `track` /
//! `trackhealth` reports.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info, warn};

use chatbox_core::{Clock, CommandInvocation, ConnectionHandle, Job};

use crate::dynmap::api::{DynmapApi, ProfileApi};
use crate::dynmap::model::DynmapConfiguration;
use crate::dynmap::store::{Position, StoreHealth, TrackingData, TrackingStore};
use crate::error::{SwitchcraftError, SwitchcraftResult};

/// Sender label for replies.
pub const SENDER: &str = "track";

/// Cached name lookups older than this are refreshed.
pub const NAME_TTL_SECS: f64 = 60.0 * 60.0 * 24.0;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,16}$").expect("valid regex"));

#[derive(Debug)]
struct TrackerState {
    configuration: Option<Arc<DynmapConfiguration>>,
    /// Unix seconds of the previous update fetch.
    last_update: u64,
    /// When the store last absorbed an update.
    last_fix: f64,
}

/// Polls the web map and keeps the tracking store current.
pub struct Tracker {
    dynmap: Arc<dyn DynmapApi>,
    profiles: Arc<dyn ProfileApi>,
    store: TrackingStore,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl Tracker {
    pub fn new(
        dynmap: Arc<dyn DynmapApi>,
        profiles: Arc<dyn ProfileApi>,
        store: TrackingStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            dynmap,
            profiles,
            store,
            clock,
            state: Mutex::new(TrackerState {
                configuration: None,
                last_update: 0,
                last_fix: now,
            }),
        }
    }

    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    /// World list, fetched once per process.
    async fn configuration(&self) -> SwitchcraftResult<Arc<DynmapConfiguration>> {
        let cached = self.state.lock().configuration.clone();
        if let Some(configuration) = cached {
            return Ok(configuration);
        }
        let configuration = Arc::new(self.dynmap.configuration().await?);
        info!(worlds = configuration.worlds.len(), "Loaded dynmap configuration");
        self.state.lock().configuration = Some(Arc::clone(&configuration));
        Ok(configuration)
    }

    /// UUID for `username`, via the store's name cache.
    ///
    /// A fresh cache entry is used as is. Otherwise the profile API is asked;
    /// an unknown name falls back to a stale entry, and a failed lookup
    /// yields `None`.
    async fn resolve(&self, data: &mut TrackingData, username: &str) -> Option<String> {
        let now = self.clock.now();
        let cached = data.name(username).cloned();
        if let Some(entry) = &cached
            && now - entry.refreshed < NAME_TTL_SECS
        {
            return Some(entry.uuid.clone());
        }

        match self.profiles.uuid_for(username).await {
            Ok(Some(uuid)) => {
                data.remember_name(username, &uuid, now);
                Some(uuid)
            }
            Ok(None) => cached.map(|entry| entry.uuid),
            Err(e) => {
                warn!(username, error = %e, "Profile lookup failed");
                None
            }
        }
    }

    /// Fetches one update and records it. Returns how many movements were
    /// logged.
    pub async fn refresh(&self) -> SwitchcraftResult<usize> {
        let configuration = self.configuration().await?;
        let world = configuration
            .worlds
            .first()
            .ok_or_else(|| SwitchcraftError::unexpected("dynmap", "no worlds configured"))?;

        let since = self.state.lock().last_update;
        let listing = self.dynmap.updates(&world.name, since).await?;
        let now = self.clock.now();
        self.state.lock().last_update = now.max(0.0) as u64;

        let mut store = self.store.open().await?;
        let mut moved = 0;
        for player in &listing.players {
            let Some(account) = player.account.as_deref() else {
                continue;
            };
            if !configuration.has_world(&player.world) {
                continue;
            }
            let Some(uuid) = self.resolve(&mut store.data, account).await else {
                continue;
            };
            let position = Position {
                username: account.to_string(),
                timestamp: now,
                x: player.x,
                y: player.y,
                z: player.z,
                world: player.world.clone(),
            };
            if store.data.record(&uuid, position) {
                moved += 1;
            }
        }
        store.commit().await?;

        self.state.lock().last_fix = self.clock.now();
        debug!(players = listing.players.len(), moved, "Tracking update applied");
        Ok(moved)
    }

    /// The `track <player>` report.
    pub async fn report(&self, username: &str) -> SwitchcraftResult<String> {
        let latest = if USERNAME.is_match(username) {
            let mut store = self.store.open().await?;
            let uuid = self.resolve(&mut store.data, username).await;
            let latest = uuid.and_then(|uuid| store.data.latest(&uuid).cloned());
            // Writes only when the lookup refreshed the name cache.
            store.commit().await?;
            latest
        } else {
            None
        };

        let now = self.clock.now();
        let last_fix = self.state.lock().last_fix;
        Ok(format_report(username, latest.as_ref(), now, last_fix))
    }

    /// The `trackhealth` report.
    pub async fn health(&self) -> SwitchcraftResult<String> {
        let store = self.store.open().await?;
        Ok(format_health(&store.data.health()))
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("store", &self.store.path())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// The periodic tracking update.
#[derive(Debug, Clone)]
pub struct TrackerJob(Arc<Tracker>);

impl TrackerJob {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self(tracker)
    }
}

#[async_trait]
impl Job for TrackerJob {
    async fn run(&self, _conn: ConnectionHandle) -> anyhow::Result<()> {
        if let Err(e) = self.0.refresh().await {
            warn!(error = %e, "Tracking update failed");
        }
        Ok(())
    }
}

/// Handler for `track <player>`.
pub async fn track_command(
    tracker: Arc<Tracker>,
    cmd: CommandInvocation,
    conn: ConnectionHandle,
) -> anyhow::Result<()> {
    let text = match cmd.args.first() {
        None => "&cusage: \\track <player>".to_string(),
        Some(username) => tracker.report(username).await.unwrap_or_else(|e| {
            warn!(player = %cmd.invoker.name, username, error = %e, "Tracking report failed");
            format!("&csomething broke: {e}")
        }),
    };
    conn.tell(&cmd.invoker.name, SENDER, text)?;
    Ok(())
}

/// Handler for `trackhealth`.
pub async fn trackhealth_command(
    tracker: Arc<Tracker>,
    cmd: CommandInvocation,
    conn: ConnectionHandle,
) -> anyhow::Result<()> {
    let text = tracker.health().await.unwrap_or_else(|e| {
        warn!(error = %e, "Tracking health report failed");
        format!("&csomething broke: {e}")
    });
    conn.tell(&cmd.invoker.name, SENDER, text)?;
    Ok(())
}

/// `1d 2h 3m 4s`; leading zero units are omitted, seconds always shown.
pub fn format_dhms(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if hours > 0 || !out.is_empty() {
        out.push_str(&format!("{hours}h "));
    }
    if minutes > 0 || !out.is_empty() {
        out.push_str(&format!("{minutes}m "));
    }
    out.push_str(&format!("{seconds}s"));
    out
}

/// Highlight and base colour codes for a sample `age` seconds old.
pub fn staleness_colors(age: f64) -> (&'static str, &'static str) {
    if age < 10.0 {
        ("&7", "&8")
    } else if age < 30.0 {
        ("&e", "&6")
    } else {
        ("&c", "&4")
    }
}

pub fn format_report(username: &str, latest: Option<&Position>, now: f64, last_fix: f64) -> String {
    let mut out = String::from("&8-&f\n");
    match latest {
        None => out.push_str(&format!("&cno data for {username}\n")),
        Some(position) => {
            let age = now - position.timestamp;
            let (highlight, base) = staleness_colors(age);
            out.push_str(&format!(
                "&a{username} {base}last seen {highlight}{}{base} ago\n",
                format_dhms(age)
            ));
            out.push_str(&format!(
                "&7(&c{:.2}&7, &c{:.2}&7, &c{:.2}&7) in &a{}\n",
                position.x, position.y, position.z, position.world
            ));
        }
    }
    out.push_str(&format!("&8last update &7{:.1}s &8ago\n", now - last_fix));
    out
}

pub fn format_health(health: &StoreHealth) -> String {
    format!(
        "&8-&f\n\
         &a{} &7players tracked\n\
         &a{} &7tracking updates (&a{} &7last id)\n    \
         &a{:.2}% &7ID efficiency\n\
         &a{} &7names tracked\n",
        health.players,
        health.movements,
        health.last_ord,
        health.efficiency() * 100.0,
        health.names,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynmap::model::{DynmapPlayer, DynmapWorld, PlayerListing};
    use async_trait::async_trait;
    use chatbox_core::{Identity, ManualClock, OutboundFrame};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeMap {
        players: Mutex<Vec<DynmapPlayer>>,
        config_fetches: Mutex<usize>,
        since: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl DynmapApi for FakeMap {
        async fn configuration(&self) -> SwitchcraftResult<DynmapConfiguration> {
            *self.config_fetches.lock() += 1;
            Ok(DynmapConfiguration {
                worlds: vec![DynmapWorld {
                    name: "SwitchCraft".into(),
                    title: "SwitchCraft".into(),
                }],
            })
        }

        async fn updates(&self, world: &str, since: u64) -> SwitchcraftResult<PlayerListing> {
            assert_eq!(world, "SwitchCraft");
            self.since.lock().push(since);
            Ok(PlayerListing {
                players: self.players.lock().clone(),
            })
        }
    }

    #[derive(Default)]
    struct FakeProfiles {
        known: HashMap<String, String>,
        lookups: Mutex<usize>,
    }

    #[async_trait]
    impl ProfileApi for FakeProfiles {
        async fn uuid_for(&self, username: &str) -> SwitchcraftResult<Option<String>> {
            *self.lookups.lock() += 1;
            Ok(self.known.get(&username.to_lowercase()).cloned())
        }
    }

    fn player(account: Option<&str>, world: &str, x: f64) -> DynmapPlayer {
        DynmapPlayer {
            world: world.into(),
            x,
            y: 70.0,
            z: -12.5,
            account: account.map(Into::into),
        }
    }

    struct Fixture {
        map: Arc<FakeMap>,
        profiles: Arc<FakeProfiles>,
        clock: Arc<ManualClock>,
        tracker: Tracker,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let map = Arc::new(FakeMap::default());
        let profiles = Arc::new(FakeProfiles {
            known: HashMap::from([("alice".to_string(), "uuid-alice".to_string())]),
            ..FakeProfiles::default()
        });
        let clock = Arc::new(ManualClock::new(1_000.0));
        let tracker = Tracker::new(
            map.clone(),
            profiles.clone(),
            TrackingStore::in_dir(dir.path()),
            clock.clone(),
        );
        Fixture {
            map,
            profiles,
            clock,
            tracker,
            _dir: dir,
        }
    }

    #[test]
    fn test_dhms() {
        assert_eq!(format_dhms(4.9), "4s");
        assert_eq!(format_dhms(60.0), "1m 0s");
        assert_eq!(format_dhms(3_600.0 + 5.0), "1h 0m 5s");
        assert_eq!(format_dhms(86_400.0 + 7_384.0), "1d 2h 3m 4s");
        assert_eq!(format_dhms(-3.0), "0s");
    }

    #[test]
    fn test_staleness_colors() {
        assert_eq!(staleness_colors(9.9), ("&7", "&8"));
        assert_eq!(staleness_colors(10.0), ("&e", "&6"));
        assert_eq!(staleness_colors(30.0), ("&c", "&4"));
    }

    #[test]
    fn test_health_format() {
        let text = format_health(&StoreHealth {
            players: 2,
            movements: 3,
            last_ord: 4,
            names: 5,
        });
        assert_eq!(
            text,
            "&8-&f\n&a2 &7players tracked\n&a3 &7tracking updates (&a4 &7last id)\n    \
             &a75.00% &7ID efficiency\n&a5 &7names tracked\n"
        );
    }

    #[tokio::test]
    async fn test_refresh_records_known_players_in_mapped_worlds() {
        let f = fixture();
        *f.map.players.lock() = vec![
            player(Some("alice"), "SwitchCraft", 1.0),
            player(Some("bob"), "SwitchCraft", 2.0),
            player(None, "SwitchCraft", 3.0),
            player(Some("alice"), "-some-other-bogus-world-", 4.0),
        ];

        assert_eq!(f.tracker.refresh().await.unwrap(), 1);
        f.clock.advance(5.0);
        assert_eq!(f.tracker.refresh().await.unwrap(), 0);

        assert_eq!(*f.map.config_fetches.lock(), 1);
        assert_eq!(*f.map.since.lock(), vec![0, 1_000]);

        let store = f.tracker.store().open().await.unwrap();
        assert_eq!(store.data.latest("uuid-alice").unwrap().timestamp, 1_005.0);
        assert_eq!(store.data.health().movements, 1);
        assert_eq!(store.data.health().names, 1);
    }

    #[tokio::test]
    async fn test_refresh_appends_movements() {
        let f = fixture();
        *f.map.players.lock() = vec![player(Some("alice"), "SwitchCraft", 1.0)];
        f.tracker.refresh().await.unwrap();
        let log = f.tracker.store().log_path().to_path_buf();
        let first = tokio::fs::read(&log).await.unwrap();

        *f.map.players.lock() = vec![player(Some("alice"), "SwitchCraft", 2.0)];
        f.clock.advance(5.0);
        assert_eq!(f.tracker.refresh().await.unwrap(), 1);

        let second = tokio::fs::read(&log).await.unwrap();
        assert!(second.starts_with(&first));
        let rows = f.tracker.store().movements().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].ord, rows[0].position.x), (1, 1.0));
        assert_eq!((rows[1].ord, rows[1].position.x), (2, 2.0));
        assert_eq!(rows[1].uuid, "uuid-alice");
    }

    #[tokio::test]
    async fn test_report_with_cached_name_leaves_store_alone() {
        let f = fixture();
        *f.map.players.lock() = vec![player(Some("alice"), "SwitchCraft", 1.0)];
        f.tracker.refresh().await.unwrap();

        // Commits write compact JSON, so a rewrite would change the layout.
        let snapshot = f.tracker.store().path().to_path_buf();
        let value: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&snapshot).await.unwrap()).unwrap();
        let pretty = serde_json::to_string_pretty(&value).unwrap();
        tokio::fs::write(&snapshot, &pretty).await.unwrap();

        f.clock.advance(60.0);
        f.tracker.report("Alice").await.unwrap();
        assert_eq!(*f.profiles.lookups.lock(), 1);
        assert_eq!(tokio::fs::read_to_string(&snapshot).await.unwrap(), pretty);

        // An expired entry is refreshed and written back.
        f.clock.advance(NAME_TTL_SECS);
        f.tracker.report("Alice").await.unwrap();
        assert_eq!(*f.profiles.lookups.lock(), 2);
        assert_ne!(tokio::fs::read_to_string(&snapshot).await.unwrap(), pretty);
    }

    #[tokio::test]
    async fn test_track_report() {
        let f = fixture();
        *f.map.players.lock() = vec![player(Some("alice"), "SwitchCraft", 1.0)];
        f.tracker.refresh().await.unwrap();
        f.clock.advance(15.0);

        let report = f.tracker.report("Alice").await.unwrap();
        assert_eq!(
            report,
            "&8-&f\n\
             &aAlice &6last seen &e15s&6 ago\n\
             &7(&c1.00&7, &c70.00&7, &c-12.50&7) in &aSwitchCraft\n\
             &8last update &715.0s &8ago\n"
        );

        let missing = f.tracker.report("nobody").await.unwrap();
        assert!(missing.starts_with("&8-&f\n&cno data for nobody\n"));
        let bogus = f.tracker.report("../etc").await.unwrap();
        assert!(bogus.contains("&cno data for ../etc"));
    }

    #[tokio::test]
    async fn test_trackhealth_report() {
        let f = fixture();
        *f.map.players.lock() = vec![player(Some("alice"), "SwitchCraft", 1.0)];
        f.tracker.refresh().await.unwrap();
        *f.map.players.lock() = vec![player(Some("alice"), "SwitchCraft", 2.0)];
        f.tracker.refresh().await.unwrap();

        let report = f.tracker.health().await.unwrap();
        assert!(report.contains("&a1 &7players tracked"));
        assert!(report.contains("&a2 &7tracking updates (&a2 &7last id)"));
        assert!(report.contains("&a100.00% &7ID efficiency"));
    }

    #[tokio::test]
    async fn test_commands_reply_to_invoker() {
        let f = fixture();
        let tracker = Arc::new(f.tracker);
        let (conn, mut rx) = ConnectionHandle::channel();
        let invoker = Identity::new("carol", "uuid-carol");

        track_command(
            Arc::clone(&tracker),
            CommandInvocation::new("track", vec![], invoker.clone()),
            conn.clone(),
        )
        .await
        .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundFrame::tell("carol", SENDER, "&cusage: \\track <player>")
        );

        TrackerJob::new(Arc::clone(&tracker)).run(conn.clone()).await.unwrap();
        trackhealth_command(
            Arc::clone(&tracker),
            CommandInvocation::new("trackhealth", vec![], invoker),
            conn,
        )
        .await
        .unwrap();
        let OutboundFrame::Tell { user, text, .. } = rx.try_recv().unwrap();
        assert_eq!(user, "carol");
        assert!(text.starts_with("&8-&f\n&a0 &7players tracked"));
    }
}
