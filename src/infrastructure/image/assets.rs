//! Bundled asset access and the per-asset reference table.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::ports::AssetSource;

#[derive(Debug, Clone)]
struct AssetRef {
    count: usize,
    origin: String,
}

/// Reference counts of assets currently being served, with the bundle that
/// last requested each one.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    refs: Mutex<HashMap<String, AssetRef>>,
}

impl AssetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reference to `name` requested from bundle `origin`. The
    /// entry is removed when the last lease is dropped.
    pub fn acquire(self: &Arc<Self>, name: &str, origin: &str) -> AssetLease {
        let mut refs = self.refs.lock();
        let entry = refs.entry(name.to_string()).or_insert_with(|| AssetRef {
            count: 0,
            origin: origin.to_string(),
        });
        entry.count += 1;
        entry.origin = origin.to_string();
        trace!(name, origin, count = entry.count, "Acquired asset reference");

        AssetLease {
            registry: Arc::clone(self),
            name: name.to_string(),
            origin: origin.to_string(),
        }
    }

    /// Number of live references to `name`.
    #[must_use]
    pub fn ref_count(&self, name: &str) -> usize {
        self.refs.lock().get(name).map_or(0, |r| r.count)
    }

    /// Bundle that most recently requested `name` while it was referenced.
    #[must_use]
    pub fn origin_of(&self, name: &str) -> Option<String> {
        self.refs.lock().get(name).map(|r| r.origin.clone())
    }

    fn release(&self, name: &str) {
        let mut refs = self.refs.lock();
        if let Some(entry) = refs.get_mut(name) {
            entry.count = entry.count.saturating_sub(1);
            if entry.count == 0 {
                refs.remove(name);
                trace!(name, "Released last asset reference");
            }
        }
    }
}

/// Live reference to an asset; releases it on drop.
#[derive(Debug)]
pub struct AssetLease {
    registry: Arc<AssetRegistry>,
    name: String,
    origin: String,
}

impl AssetLease {
    /// Asset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bundle this lease was acquired for.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Drop for AssetLease {
    fn drop(&mut self) {
        self.registry.release(&self.name);
    }
}

/// Serves assets from a directory.
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    bundle_id: String,
    root: PathBuf,
}

impl DirAssetSource {
    /// Creates a source rooted at `root`.
    #[must_use]
    pub fn new(bundle_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            root: root.into(),
        }
    }
}

impl AssetSource for DirAssetSource {
    fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    fn open(&self, name: &str) -> std::io::Result<Vec<u8>> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("invalid asset name: {name}"),
            ));
        }
        std::fs::read(self.root.join(relative))
    }
}
