//! Package descriptor cache.
//!
//! Parsed `package.json` files are cached with mtime/size stamps so a
//! long-lived session notices edits without re-reading on every lookup.

use crate::require::PackageDescriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// File stamp for cache invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PkgJsonStamp {
    /// Modification time in milliseconds since epoch.
    pub mtime_ms: Option<u64>,
    /// File size in bytes.
    pub size: Option<u64>,
}

impl PkgJsonStamp {
    /// Create stamp from a path by reading its metadata.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_path(path: &Path) -> Self {
        let Ok(meta) = path.metadata() else {
            return Self::default();
        };
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);
        Self {
            mtime_ms,
            size: Some(meta.len()),
        }
    }

    /// Check if the stamp matches the current file state.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let current = Self::from_path(path);
        if current.size.is_none() {
            return false;
        }
        self.mtime_ms.map_or(true, |m| current.mtime_ms == Some(m))
            && self.size.map_or(true, |s| current.size == Some(s))
    }
}

/// Cache of parsed package descriptors keyed by `package.json` path.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait DescriptorCache: Send + Sync + std::fmt::Debug {
    /// Look up a descriptor. Returns None if not cached or if the stamp is stale.
    fn get(&self, path: &Path) -> Option<Arc<PackageDescriptor>>;

    /// Store a descriptor.
    fn set(&self, path: &Path, descriptor: Arc<PackageDescriptor>);
}

/// No-op cache implementation (always misses, never stores).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDescriptorCache;

impl DescriptorCache for NoDescriptorCache {
    fn get(&self, _path: &Path) -> Option<Arc<PackageDescriptor>> {
        None
    }

    fn set(&self, _path: &Path, _descriptor: Arc<PackageDescriptor>) {}
}

#[derive(Debug, Clone)]
struct CachedDescriptor {
    descriptor: Arc<PackageDescriptor>,
    stamp: PkgJsonStamp,
}

/// In-memory descriptor cache with stamp validation.
#[derive(Debug, Default)]
pub struct MemoryDescriptorCache {
    entries: RwLock<HashMap<PathBuf, CachedDescriptor>>,
}

impl MemoryDescriptorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate one entry. Returns true if an entry was removed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(path).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DescriptorCache for MemoryDescriptorCache {
    fn get(&self, path: &Path) -> Option<Arc<PackageDescriptor>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(path)?;
        if entry.stamp.matches(path) {
            Some(Arc::clone(&entry.descriptor))
        } else {
            // overwritten on the next read from disk
            debug!(path = %path.display(), "package.json stamp stale, treating as miss");
            None
        }
    }

    fn set(&self, path: &Path, descriptor: Arc<PackageDescriptor>) {
        let stamp = PkgJsonStamp::from_path(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(path.to_path_buf(), CachedDescriptor { descriptor, stamp });
    }
}
