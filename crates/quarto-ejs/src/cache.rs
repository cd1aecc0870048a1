/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Artifact caches keyed by template source path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use hashlink::LruCache;

use crate::artifact::Artifact;

/// Storage for compiled artifacts.
///
/// Implementations are shared by every compile running through a
/// [`Compiler`](crate::compiler::Compiler), so they synchronize internally.
pub trait ArtifactCache: Send + Sync {
    fn get(&self, path: &Path) -> Option<Arc<Artifact>>;

    fn set(&self, path: PathBuf, artifact: Arc<Artifact>);

    /// Drop every entry.
    fn reset(&self);
}

/// Unbounded cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<PathBuf, Arc<Artifact>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactCache for MemoryCache {
    fn get(&self, path: &Path) -> Option<Arc<Artifact>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(path).cloned()
    }

    fn set(&self, path: PathBuf, artifact: Arc<Artifact>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(path, artifact);
    }

    fn reset(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Cache holding at most `capacity` artifacts, evicting the least recently
/// used one.
pub struct LruArtifactCache {
    entries: Mutex<LruCache<PathBuf, Arc<Artifact>>>,
}

impl LruArtifactCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LruArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruArtifactCache")
            .field("len", &self.len())
            .finish()
    }
}

impl ArtifactCache for LruArtifactCache {
    fn get(&self, path: &Path) -> Option<Arc<Artifact>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(path).cloned()
    }

    fn set(&self, path: PathBuf, artifact: Arc<Artifact>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(path, artifact);
    }

    fn reset(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
