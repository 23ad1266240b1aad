//! Expiry registry — per-resource state cache.
//!
//! Persisted as `~/.renewbot/state.json`. Each entry records the last
//! observed expiry and when it was read, which lets the scheduling gate
//! decline a run *before* a browser is ever launched: a cached expiry two or
//! more days out cannot have moved closer on its own.
//!
//! The registry is loaded fresh on every read and written atomically
//! (temp-file + rename) so an externally-cancelled run never leaves a
//! partial file behind.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Expiry as last observed on the resource page.
    pub expiry: NaiveDate,
    /// When that observation happened.
    pub last_checked: DateTime<Utc>,
    /// Most recent verified renewal, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renewed: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    /// A cached expiry can pre-empt a browser launch only while it is still
    /// ahead of the calendar: once `today >= expiry - 1 day` the live page
    /// must be consulted. Records observed before the current date are also
    /// distrusted; the expiry may have been pushed out by a manual renewal.
    pub fn can_skip_without_browser(&self, today: NaiveDate) -> bool {
        let delta_days = (self.expiry - today).num_days();
        delta_days >= 2 && self.last_checked.date_naive() == today
    }
}

pub struct Registry {
    path: PathBuf,
}

impl Registry {
    /// Registry at the default location (`~/.renewbot/state.json`).
    pub fn open_default() -> Option<Self> {
        dirs::home_dir().map(|h| Self::open(h.join(".renewbot").join("state.json")))
    }

    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the full map. Missing or unparsable files yield an empty map;
    /// the registry is an optimization, never a hard dependency.
    fn load(&self) -> HashMap<String, ResourceRecord> {
        if !self.path.exists() {
            return HashMap::new();
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) => {
                warn!("registry: failed to read {}: {}", self.path.display(), e);
                return HashMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "registry: failed to parse {}: {} — starting empty",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        }
    }

    fn save(&self, map: &HashMap<String, ResourceRecord>) {
        if let Err(e) = atomic_write_json(&self.path, map) {
            warn!("registry: not saved: {}", e);
        }
    }

    pub fn get(&self, server_id: &str) -> Option<ResourceRecord> {
        self.load().remove(server_id)
    }

    /// Record a fresh observation of the resource's expiry.
    pub fn record_observation(&self, server_id: &str, expiry: NaiveDate) {
        let mut map = self.load();
        let entry = map.entry(server_id.to_string()).or_insert(ResourceRecord {
            expiry,
            last_checked: Utc::now(),
            last_renewed: None,
        });
        entry.expiry = expiry;
        entry.last_checked = Utc::now();
        self.save(&map);
        info!("registry: {} expiry recorded as {}", server_id, expiry);
    }

    /// Record a verified renewal (new expiry confirmed on the page).
    pub fn record_renewal(&self, server_id: &str, new_expiry: NaiveDate) {
        let mut map = self.load();
        let now = Utc::now();
        let entry = map.entry(server_id.to_string()).or_insert(ResourceRecord {
            expiry: new_expiry,
            last_checked: now,
            last_renewed: None,
        });
        entry.expiry = new_expiry;
        entry.last_checked = now;
        entry.last_renewed = Some(now);
        self.save(&map);
        info!("registry: {} renewed through {}", server_id, new_expiry);
    }
}

/// Write `value` as pretty JSON via temp-file + rename so readers never see
/// a partial file.
fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
