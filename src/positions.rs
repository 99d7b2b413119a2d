use crate::model::{ConversationId, NodeKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("position store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("position store holds malformed data: {0}")]
    Json(#[from] serde_json::Error),
}

/// A point in viewport-relative coordinates, each axis in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub nx: f32,
    pub ny: f32,
}

impl NormalizedPoint {
    pub fn new(nx: f32, ny: f32) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) };
        Self {
            nx: clamp(nx),
            ny: clamp(ny),
        }
    }
}

/// User-dragged overrides keyed by tree root, then node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualPositions {
    roots: BTreeMap<ConversationId, BTreeMap<NodeKey, NormalizedPoint>>,
}

impl ManualPositions {
    pub fn get(&self, root: ConversationId, node: NodeKey) -> Option<NormalizedPoint> {
        self.roots.get(&root)?.get(&node).copied()
    }

    pub fn set(&mut self, root: ConversationId, node: NodeKey, point: NormalizedPoint) {
        let point = NormalizedPoint::new(point.nx, point.ny);
        self.roots.entry(root).or_default().insert(node, point);
    }

    pub fn len(&self) -> usize {
        self.roots.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every override under `root`. Other roots are untouched.
    pub fn reset_root(&mut self, root: ConversationId) -> usize {
        self.roots.remove(&root).map_or(0, |nodes| nodes.len())
    }

    /// Removes overrides for conversations that no longer exist. Cluster
    /// placeholders are kept; their children may still be unresolved.
    pub fn prune(&mut self, live: &HashSet<ConversationId>) -> usize {
        let mut removed = 0;
        for nodes in self.roots.values_mut() {
            let before = nodes.len();
            nodes.retain(|key, _| match key {
                NodeKey::Conversation(id) => live.contains(id),
                NodeKey::Cluster(_) => true,
            });
            removed += before - nodes.len();
        }
        self.roots.retain(|_, nodes| !nodes.is_empty());
        if removed > 0 {
            debug!(removed, "pruned stale manual positions");
        }
        removed
    }
}

/// External key-value store holding the manual position map.
pub trait PositionStore {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    fn save(&mut self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, serde_json::Value>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl PositionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.clone());
        self.writes += 1;
        Ok(())
    }
}

/// One pretty-printed JSON file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' { ch } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl PositionStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&mut self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(value)?;
        std::fs::write(self.path_for(key), contents)?;
        Ok(())
    }
}

pub fn load_positions(store: &dyn PositionStore, key: &str) -> ManualPositions {
    match store.load(key) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!(%err, "discarding unreadable manual positions");
            ManualPositions::default()
        }),
        Ok(None) => ManualPositions::default(),
        Err(err) => {
            warn!(%err, "manual positions unavailable");
            ManualPositions::default()
        }
    }
}

/// Trailing-edge debounce for position writes: each change restarts the
/// window, and a write happens once the window elapses without changes.
#[derive(Debug, Clone)]
pub struct DebouncedWriter {
    window: Duration,
    dirty_since: Option<Instant>,
}

impl DebouncedWriter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            dirty_since: None,
        }
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty_since = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.dirty_since.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.dirty_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.window)
    }

    /// Writes if the window has elapsed. Returns whether a write happened.
    pub fn poll(
        &mut self,
        now: Instant,
        store: &mut dyn PositionStore,
        key: &str,
        positions: &ManualPositions,
    ) -> Result<bool, StoreError> {
        if !self.is_due(now) {
            return Ok(false);
        }
        self.flush(store, key, positions)?;
        Ok(true)
    }

    pub fn flush(
        &mut self,
        store: &mut dyn PositionStore,
        key: &str,
        positions: &ManualPositions,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(positions)?;
        store.save(key, &value)?;
        self.dirty_since = None;
        debug!(entries = positions.len(), "manual positions persisted");
        Ok(())
    }
}
