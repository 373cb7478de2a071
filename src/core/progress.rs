//! Per-agent record of discovered endings.
//!
//! Storage is an injected [`ProgressStore`]. Every store failure is logged
//! and absorbed here: the tracker keeps an in-memory copy, so gameplay
//! carries on with session-only progress when persistence is gone.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schema::agent::AgentId;
use crate::schema::scene::SceneId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt progress record '{key}': {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A string key/value store, the shape of a browser's local storage.
pub trait ProgressStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same contents, which is how tests
/// model "a later session on the same device".
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<FxHashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut FxHashMap<String, String>) -> T,
    ) -> Result<T, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(f(&mut entries))
    }
}

impl ProgressStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<FileStore, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl ProgressStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Ending discovery numbers for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Progress {
    pub found: usize,
    pub total: usize,
    /// `round(found / total * 100)`, 0 when there are no endings.
    pub percentage: u32,
}

impl Progress {
    pub fn new(found: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            (found as f64 / total as f64 * 100.0).round() as u32
        };
        Self {
            found,
            total,
            percentage,
        }
    }

    /// Every ending found, and there is at least one.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.found >= self.total
    }
}

/// Durable, idempotent set of discovered endings per agent.
pub struct ProgressTracker {
    prefix: String,
    store: Box<dyn ProgressStore>,
    cache: FxHashMap<AgentId, Vec<SceneId>>,
    degraded: bool,
}

impl ProgressTracker {
    pub fn new(prefix: impl Into<String>, store: Box<dyn ProgressStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
            cache: FxHashMap::default(),
            degraded: false,
        }
    }

    /// Storage key for an agent's record.
    pub fn key_for(&self, agent: &AgentId) -> String {
        format!("{}{}", self.prefix, agent)
    }

    /// True once any store operation has failed in this session.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn degrade(&mut self, action: &str, err: &StoreError) {
        if !self.degraded {
            warn!(error = %err, action, "progress storage unavailable, keeping progress in memory");
        } else {
            debug!(error = %err, action, "progress storage still unavailable");
        }
        self.degraded = true;
    }

    fn read_stored(&mut self, agent: &AgentId) -> Vec<SceneId> {
        let key = self.key_for(agent);
        let raw = match self.store.get(&key) {
            Ok(raw) => raw,
            Err(err) => {
                self.degrade("read", &err);
                return Vec::new();
            }
        };
        let Some(raw) = raw else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<SceneId>>(&raw) {
            Ok(ids) => ids,
            Err(source) => {
                self.degrade("parse", &StoreError::Corrupt { key, source });
                Vec::new()
            }
        }
    }

    /// Endings found by `agent`, in discovery order: the stored record
    /// followed by anything only held in memory.
    pub fn found_endings(&mut self, agent: &AgentId) -> Vec<SceneId> {
        let mut found = self.read_stored(agent);
        if let Some(cached) = self.cache.get(agent) {
            for id in cached {
                if !found.contains(id) {
                    found.push(id.clone());
                }
            }
        }
        found
    }

    /// Add `scene` to the agent's set and persist it. Returns whether it was
    /// new. Never fails: storage errors leave the ending in memory only.
    pub fn record_ending(&mut self, agent: &AgentId, scene: &SceneId) -> bool {
        let mut found = self.found_endings(agent);
        if found.contains(scene) {
            return false;
        }
        found.push(scene.clone());

        let key = self.key_for(agent);
        let written = serde_json::to_string(&found)
            .map_err(|source| StoreError::Corrupt {
                key: key.clone(),
                source,
            })
            .and_then(|json| self.store.set(&key, &json));
        if let Err(err) = written {
            self.degrade("write", &err);
        }

        info!(agent = %agent, scene = %scene, found = found.len(), "ending recorded");
        self.cache.insert(agent.clone(), found);
        true
    }

    pub fn progress(&mut self, agent: &AgentId, total: usize) -> Progress {
        Progress::new(self.found_endings(agent).len(), total)
    }

    /// Forget every ending for `agent`. Irreversible.
    pub fn reset(&mut self, agent: &AgentId) {
        self.cache.remove(agent);
        let key = self.key_for(agent);
        if let Err(err) = self.store.remove(&key) {
            self.degrade("remove", &err);
        }
        info!(agent = %agent, "progress reset");
    }
}
