//! Watched-file allow-list and watch directory computation.
//!
//! Event paths are matched against the configured names by path suffix,
//! so `plan-data.json` matches `/repo/plan-data.json` and `data/plan.json`
//! matches `/repo/data/plan.json`. Only the parent directories of the
//! watched files are watched, non-recursively.
//!
//! Paths autopush writes itself (the log file) can be registered as
//! ignored; events for them are dropped before they are counted.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    relative: PathBuf,
}

/// The files autopush is allowed to publish.
#[derive(Debug, Clone)]
pub struct AllowList {
    root: PathBuf,
    entries: Vec<Entry>,
    /// Parent directories of the entries, resolved against the root.
    watch_dirs: BTreeSet<PathBuf>,
    ignored: BTreeSet<PathBuf>,
}

impl AllowList {
    /// Build from names relative to `root`. Duplicates are ignored.
    ///
    /// `./` components are dropped, so `./plan.json` and `plan.json` are the
    /// same entry.
    pub fn new(root: impl Into<PathBuf>, files: &[String]) -> Self {
        let root = root.into();
        let mut entries: Vec<Entry> = Vec::new();
        let mut watch_dirs = BTreeSet::new();

        for name in files {
            let relative: PathBuf = Path::new(name.trim())
                .components()
                .filter(|component| !matches!(component, Component::CurDir))
                .collect();
            let name = relative.to_string_lossy().into_owned();
            if name.is_empty() || entries.iter().any(|e| e.name == name) {
                continue;
            }
            let dir = match relative.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => root.join(parent),
                _ => root.clone(),
            };
            watch_dirs.insert(dir);
            entries.push(Entry { name, relative });
        }

        Self {
            root,
            entries,
            watch_dirs,
            ignored: BTreeSet::new(),
        }
    }

    /// Drop events for `path` without counting or logging them.
    pub fn ignore(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignored.insert(path.into());
        self
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.contains(path)
    }

    /// The configured name `path` refers to, if any.
    ///
    /// When several names match (e.g. `plan.json` and `data/plan.json`),
    /// the most specific one wins.
    pub fn matches(&self, path: &Path) -> Option<&str> {
        self.entries
            .iter()
            .filter(|entry| path.ends_with(&entry.relative))
            .max_by_key(|entry| entry.relative.components().count())
            .map(|entry| entry.name.as_str())
    }

    /// Absolute location of a configured name.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Directories to watch non-recursively.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        self.watch_dirs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
