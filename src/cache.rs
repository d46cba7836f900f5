// Persisted tracking state for CTFs that already triggered a notification.
//
// The cache file is the sole durable state: a human-readable JSON object
// mapping event id to its tracking record, rewritten in full on every save.
// Ids that never passed eligibility are deliberately absent so they get
// re-evaluated on every run.
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One entry per CTF id that passed eligibility classification at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCtf {
    pub slug: String,
    /// ISO timestamp of the last check that touched this entry.
    pub checked: String,
    /// Scheduled start as reported by the catalog, kept verbatim so a
    /// malformed upstream value round-trips and fails per-record at reminder
    /// time instead of poisoning the whole file.
    pub starts_at: Option<String>,
    // Missing in cache files written before reminders existed.
    #[serde(default)]
    pub reminder_sent: bool,
}

impl TrackedCtf {
    pub fn new(slug: &str, starts_at: Option<String>) -> Self {
        Self {
            slug: slug.to_string(),
            checked: Utc::now().to_rfc3339(),
            starts_at,
            reminder_sent: false,
        }
    }
}

/// In-memory view of the tracking map. Only the watch cycle mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchCache {
    pub ctfs: HashMap<String, TrackedCtf>,
}

impl WatchCache {
    pub fn is_tracked(&self, id: &str) -> bool {
        self.ctfs.contains_key(id)
    }
}

/// Pure persistence for the tracking map. No business logic lives here.
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache. Never fails the caller: a missing file is a first run
    /// and a malformed file (e.g. a crash mid-write of an earlier version)
    /// degrades to an empty cache with a warning.
    pub fn load(&self) -> WatchCache {
        if !self.path.exists() {
            return WatchCache::default();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|json| Ok(serde_json::from_str::<HashMap<String, TrackedCtf>>(&json)?));

        match parsed {
            Ok(ctfs) => WatchCache { ctfs },
            Err(e) => {
                log::warn!(
                    "Cache file {} is unreadable, starting from an empty cache: {}",
                    self.path.display(),
                    e
                );
                WatchCache::default()
            }
        }
    }

    /// Persist the full map. Atomic from a reader's point of view: the JSON
    /// is written to a sidecar tmp file and renamed over the target, so a
    /// writer crash never corrupts the previously committed state.
    pub fn save(&self, cache: &WatchCache) -> Result<()> {
        let json = serde_json::to_string_pretty(&cache.ctfs)?;
        Self::atomic_write(&self.path, json)
    }

    fn atomic_write<C: AsRef<[u8]>>(path: &Path, contents: C) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}
