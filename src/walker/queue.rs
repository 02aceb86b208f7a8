//! Directory tasks and duplicate suppression
//!
//! A [`DirTask`] is a directory waiting to be listed. The [`VisitedSet`]
//! guarantees each directory is handed out at most once, even when symlinks
//! make the same directory reachable under several names.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A task to list a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirTask {
    /// Full path to the directory
    pub path: PathBuf,

    /// Depth from root (0 = root)
    pub depth: u32,
}

impl DirTask {
    /// Create a new directory task
    pub fn new(path: PathBuf, depth: u32) -> Self {
        Self { path, depth }
    }

    /// Create the root task
    pub fn root(path: PathBuf) -> Self {
        Self::new(path, 0)
    }

    /// Task for a child of this directory
    pub fn child(&self, path: PathBuf) -> Self {
        Self::new(path, self.depth + 1)
    }
}

/// Canonical paths of every directory already enqueued
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: Mutex<HashSet<PathBuf>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check and mark `path`.
    ///
    /// Returns `true` the first time a canonical path is offered. Paths that
    /// cannot be canonicalized (dangling link, permission race) fall back to
    /// the literal path.
    pub fn insert(&self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.seen.lock().insert(key)
    }

    /// Number of distinct directories marked
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
