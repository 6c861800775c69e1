//! Persisted record of what has already been seen.
//!
//! The state file is a JSON object keyed by source id:
//!
//! ```text
//! {
//!   "comfyui": {
//!     "releases": { "value": "v0.3.10", "updated_at": "2026-10-01T08:00:00Z" },
//!     "commits":  { "value": "4f1c...", "updated_at": "2026-10-01T08:00:00Z" }
//!   }
//! }
//! ```
//!
//! Missing sources and missing kinds mean "never seen". Unknown keys are
//! ignored on load. Mutation is in-memory only until [`StateStore::flush`].

use crate::error::StateError;
use crate::models::WatchKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Last-notified identifier for one watch-kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-source cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releases: Option<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<Marker>,
}

impl SeenRecord {
    fn slot(&self, kind: WatchKind) -> &Option<Marker> {
        match kind {
            WatchKind::Releases => &self.releases,
            WatchKind::Tags => &self.tags,
            WatchKind::Commits => &self.commits,
        }
    }

    fn slot_mut(&mut self, kind: WatchKind) -> &mut Option<Marker> {
        match kind {
            WatchKind::Releases => &mut self.releases,
            WatchKind::Tags => &mut self.tags,
            WatchKind::Commits => &mut self.commits,
        }
    }
}

/// Exclusively owned state for one run.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: BTreeMap<String, SeenRecord>,
    dirty: bool,
}

impl StateStore {
    /// An empty store that will be written to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing or blank file yields an empty store. A file that exists but
    /// does not parse is `StateError::Corrupt`: starting over from an empty
    /// baseline would re-notify everything.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting fresh", path.display());
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };

        if content.trim().is_empty() {
            info!("State file {} is empty, starting fresh", path.display());
            return Ok(Self::empty(path));
        }

        let records: Option<BTreeMap<String, SeenRecord>> = serde_json::from_str(&content)
            .map_err(|source| StateError::Corrupt {
                path: path.clone(),
                source,
            })?;

        let records = records.unwrap_or_default();
        debug!("Loaded state for {} sources", records.len());

        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last-seen marker for a source and kind.
    pub fn get(&self, source_id: &str, kind: WatchKind) -> Option<&str> {
        self.records
            .get(source_id)
            .and_then(|r| r.slot(kind).as_ref())
            .map(|m| m.value.as_str())
    }

    /// Move a marker forward. No I/O happens until `flush`.
    pub fn advance(&mut self, source_id: &str, kind: WatchKind, marker: &str) {
        let slot = self
            .records
            .entry(source_id.to_string())
            .or_default()
            .slot_mut(kind);

        if slot.as_ref().is_some_and(|m| m.value == marker) {
            return;
        }

        debug!(source = source_id, %kind, marker, "advancing marker");
        *slot = Some(Marker {
            value: marker.to_string(),
            updated_at: Utc::now(),
        });
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Atomically replace the state file with the current contents.
    pub fn flush(&mut self) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&self.records).map_err(|source| {
            StateError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        info!("State saved to {}", self.path.display());
        self.dirty = false;
        Ok(())
    }
}
