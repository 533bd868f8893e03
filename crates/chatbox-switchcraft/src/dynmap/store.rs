//! Tracking store: a snapshot document and an append-only movement log in
//! the data directory.
//!
//! `tracking.json` holds the latest position per player, the name cache and
//! the log counters; it is replaced through a temporary file and a rename.
//! `movements.jsonl` holds one [`Movement`] per line and is only ever
//! appended to, so a commit costs the size of the snapshot plus the new
//! rows, whatever the length of the log.
//!
//! [`TrackingStore::open`] loads the snapshot under a lock and hands back a
//! [`StoreGuard`]; [`StoreGuard::commit`] writes whatever changed. Callers
//! open, update and commit within one call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

use crate::error::{SwitchcraftError, SwitchcraftResult};

/// A position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub username: String,
    /// Unix seconds.
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub world: String,
}

impl Position {
    fn same_place(&self, other: &Position) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z && self.world == other.world
    }
}

/// One row of the movement log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub ord: u64,
    pub uuid: String,
    #[serde(flatten)]
    pub position: Position,
}

/// A cached username lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameEntry {
    pub uuid: String,
    pub username: String,
    /// Unix seconds of the last successful lookup.
    pub refreshed: f64,
}

/// Counts reported by `trackhealth`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreHealth {
    pub players: usize,
    pub movements: u64,
    pub last_ord: u64,
    pub names: usize,
}

impl StoreHealth {
    /// Share of log ids still present, between 0 and 1.
    pub fn efficiency(&self) -> f64 {
        if self.last_ord == 0 {
            0.0
        } else {
            self.movements as f64 / self.last_ord as f64
        }
    }
}

/// The snapshot document, plus the rows and changes not yet committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    /// Latest position per UUID.
    #[serde(default)]
    latest: BTreeMap<String, Position>,
    /// Keyed by lowercase username.
    #[serde(default)]
    names: BTreeMap<String, NameEntry>,
    /// Rows in the movement log.
    #[serde(default)]
    movements: u64,
    #[serde(default)]
    last_ord: u64,

    #[serde(skip)]
    appended: Vec<Movement>,
    #[serde(skip)]
    changed: bool,
}

impl TrackingData {
    /// Records a sample as the latest for `uuid`. A sample that differs from
    /// the previous latest is also appended to the log; returns whether it
    /// was.
    pub fn record(&mut self, uuid: &str, position: Position) -> bool {
        let moved = self
            .latest
            .get(uuid)
            .is_none_or(|previous| !previous.same_place(&position));
        if moved {
            self.last_ord += 1;
            self.movements += 1;
            self.appended.push(Movement {
                ord: self.last_ord,
                uuid: uuid.to_string(),
                position: position.clone(),
            });
        }
        self.latest.insert(uuid.to_string(), position);
        self.changed = true;
        moved
    }

    /// Latest position recorded for `uuid`.
    pub fn latest(&self, uuid: &str) -> Option<&Position> {
        self.latest.get(uuid)
    }

    pub fn last_ord(&self) -> u64 {
        self.last_ord
    }

    /// Cached lookup for `username`, case-insensitive.
    pub fn name(&self, username: &str) -> Option<&NameEntry> {
        self.names.get(&username.to_lowercase())
    }

    /// Caches a lookup, replacing any previous entry for the name.
    pub fn remember_name(&mut self, username: &str, uuid: &str, now: f64) {
        self.names.insert(
            username.to_lowercase(),
            NameEntry {
                uuid: uuid.to_string(),
                username: username.to_string(),
                refreshed: now,
            },
        );
        self.changed = true;
    }

    /// Whether anything was recorded since the store was opened.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn health(&self) -> StoreHealth {
        StoreHealth {
            players: self.latest.len(),
            movements: self.movements,
            last_ord: self.last_ord,
            names: self.names.len(),
        }
    }
}

/// Location of the tracking files.
#[derive(Debug)]
pub struct TrackingStore {
    snapshot: PathBuf,
    log: PathBuf,
    lock: Mutex<()>,
}

impl TrackingStore {
    pub const SNAPSHOT_FILE: &'static str = "tracking.json";
    pub const LOG_FILE: &'static str = "movements.jsonl";

    /// A store at `data_dir/tracking.json` and `data_dir/movements.jsonl`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            snapshot: data_dir.join(Self::SNAPSHOT_FILE),
            log: data_dir.join(Self::LOG_FILE),
            lock: Mutex::new(()),
        }
    }

    /// The snapshot document.
    pub fn path(&self) -> &Path {
        &self.snapshot
    }

    /// The movement log.
    pub fn log_path(&self) -> &Path {
        &self.log
    }

    /// Loads the snapshot. A missing file opens as empty.
    pub async fn open(&self) -> SwitchcraftResult<StoreGuard<'_>> {
        let lock = self.lock.lock().await;
        let data = match tokio::fs::read(&self.snapshot).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| SwitchcraftError::Store {
                path: self.snapshot.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TrackingData::default(),
            Err(e) => return Err(SwitchcraftError::io(&self.snapshot, e)),
        };
        trace!(path = %self.snapshot.display(), "Opened tracking store");
        Ok(StoreGuard {
            _lock: lock,
            store: self,
            data,
        })
    }

    /// Reads the whole movement log, oldest first.
    pub async fn movements(&self) -> SwitchcraftResult<Vec<Movement>> {
        let _lock = self.lock.lock().await;
        let text = match tokio::fs::read_to_string(&self.log).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SwitchcraftError::io(&self.log, e)),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|source| SwitchcraftError::Store {
                    path: self.log.clone(),
                    source,
                })
            })
            .collect()
    }
}

/// An open store. Dropping it without [`commit`](Self::commit) discards
/// changes.
#[derive(Debug)]
pub struct StoreGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    store: &'a TrackingStore,
    pub data: TrackingData,
}

impl StoreGuard<'_> {
    /// Writes the snapshot and appends new movements. Returns whether
    /// anything was written.
    ///
    /// The snapshot goes first, so log ids stay unique if the append fails;
    /// the rows lost that way show up as a drop in id efficiency.
    pub async fn commit(self) -> SwitchcraftResult<bool> {
        if !self.data.changed {
            return Ok(false);
        }

        let snapshot = &self.store.snapshot;
        if let Some(dir) = snapshot.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SwitchcraftError::io(dir, e))?;
        }

        let bytes = serde_json::to_vec(&self.data).map_err(|source| SwitchcraftError::Store {
            path: snapshot.clone(),
            source,
        })?;
        let tmp = snapshot.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SwitchcraftError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, snapshot)
            .await
            .map_err(|e| SwitchcraftError::io(snapshot, e))?;

        if !self.data.appended.is_empty() {
            self.append(&self.data.appended).await?;
        }

        trace!(
            path = %snapshot.display(),
            appended = self.data.appended.len(),
            "Committed tracking store"
        );
        Ok(true)
    }

    async fn append(&self, rows: &[Movement]) -> SwitchcraftResult<()> {
        let log = &self.store.log;
        let mut lines = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut lines, row).map_err(|source| SwitchcraftError::Store {
                path: log.clone(),
                source,
            })?;
            lines.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .await
            .map_err(|e| SwitchcraftError::io(log, e))?;
        file.write_all(&lines)
            .await
            .map_err(|e| SwitchcraftError::io(log, e))?;
        file.flush().await.map_err(|e| SwitchcraftError::io(log, e))
    }
}
