use dashmap::DashMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::adapter::FileAdapter;
use super::entry::CacheEntry;
use super::options::{FileOptions, LoadingPolicy};
use crate::context;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Indexed view of one registered directory
///
/// Keys are leading-slash contexts relative to the root (`/a.txt`,
/// `/sub/b.txt`). Live subtrees keep no index and resolve on every request.
pub struct DirectorySubtree {
    root: PathBuf,
    adapter: Arc<dyn FileAdapter>,
    options: FileOptions,
    files: DashMap<String, Arc<CacheEntry>>,
}

impl DirectorySubtree {
    pub fn new(
        root: &Path,
        adapter: Arc<dyn FileAdapter>,
        options: FileOptions,
    ) -> Result<Self, DirectoryError> {
        if !root.is_dir() {
            return Err(DirectoryError::NotADirectory(root.to_path_buf()));
        }
        let root = root.canonicalize()?;

        let subtree = Self {
            root,
            adapter,
            options,
            files: DashMap::new(),
        };

        if subtree.options.policy != LoadingPolicy::Live {
            subtree.index()?;
        }

        info!(
            root = %subtree.root.display(),
            policy = %subtree.options.policy,
            recursive = subtree.options.recursive,
            indexed = subtree.files.len(),
            "Indexed directory"
        );

        Ok(subtree)
    }

    fn index(&self) -> Result<(), DirectoryError> {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        for item in WalkDir::new(&self.root).min_depth(1).max_depth(max_depth) {
            let item = item?;
            let servable = if item.path_is_symlink() {
                self.contains_file(item.path())
            } else {
                item.file_type().is_file()
            };
            if !servable {
                continue;
            }
            let path = item.into_path();
            let key = self.key_for(&path);
            self.files.insert(key, Arc::new(self.new_entry(path)));
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    pub fn policy(&self) -> LoadingPolicy {
        self.options.policy
    }

    /// Copy of the current index
    pub fn files(&self) -> HashMap<String, Arc<CacheEntry>> {
        self.files
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }

    /// Resolve a relative request path to a file under the root
    ///
    /// The parent directory must be the root itself, or a descendant of it
    /// when the subtree is recursive. Anything else, including `..` escapes
    /// and symlinks leading outside the root, resolves to `None`. The file
    /// name is matched against adapter names case-insensitively, preferring
    /// an exact match.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let normalized = context::normalize(relative, false, false);

        let mut segments: Vec<&str> = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        debug!(root = %self.root.display(), path = relative, "Rejected path escaping root");
                        return None;
                    }
                }
                other => segments.push(other),
            }
        }

        let name = segments.pop()?;
        if !segments.is_empty() && !self.options.recursive {
            return None;
        }

        let parent = segments
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
            .canonicalize()
            .ok()?;
        let contained = if self.options.recursive {
            parent.starts_with(&self.root)
        } else {
            parent == self.root
        };
        if !contained {
            debug!(root = %self.root.display(), path = relative, "Rejected path outside root");
            return None;
        }

        let mut fallback = None;
        for item in fs::read_dir(&parent).ok()?.flatten() {
            let path = item.path();
            if !self.contains_file(&path) {
                continue;
            }
            let candidate = self.adapter.name_for(&path);
            if candidate == name {
                return Some(path);
            }
            if fallback.is_none() && candidate.to_lowercase() == name.to_lowercase() {
                fallback = Some(path);
            }
        }
        fallback
    }

    /// Whether `path` is a regular file whose real location is under the root
    fn contains_file(&self, path: &Path) -> bool {
        match path.canonicalize() {
            Ok(real) if real.starts_with(&self.root) => real.is_file(),
            Ok(real) => {
                debug!(root = %self.root.display(), path = %path.display(), target = %real.display(), "Rejected file outside root");
                false
            }
            Err(_) => false,
        }
    }

    /// Entry serving `relative`, created on first use
    ///
    /// Indexed entries whose file was deleted are dropped from the index.
    pub fn entry_for(&self, relative: &str) -> Option<Arc<CacheEntry>> {
        let context = context::normalize(relative, true, false);

        let indexed = self.files.get(&context).map(|item| item.value().clone());
        if let Some(entry) = indexed {
            if entry.exists() {
                return Some(entry);
            }
            self.files.remove(&context);
            debug!(context = %context, path = %entry.path().display(), "Dropped deleted file from index");
            return None;
        }

        let path = self.resolve(relative)?;
        if self.options.policy == LoadingPolicy::Live {
            return Some(Arc::new(self.new_entry(path)));
        }

        let key = self.key_for(&path);
        let entry = self
            .files
            .entry(key)
            .or_insert_with(|| Arc::new(self.new_entry(path)))
            .value()
            .clone();
        Some(entry)
    }

    /// Clear cached bytes of expired entries, returning how many were cleared
    pub fn sweep(&self, now: Instant) -> usize {
        let mut cleared = 0;
        for item in self.files.iter() {
            if item.value().is_expired(now) && item.value().clear().is_ok() {
                cleared += 1;
            }
        }
        cleared
    }

    /// Earliest expiry among cached entries
    pub fn next_expiry(&self) -> Option<Instant> {
        self.files.iter().filter_map(|item| item.value().expiry()).min()
    }

    /// Whether any indexed entry holds expired bytes
    pub fn has_expired(&self, now: Instant) -> bool {
        self.files.iter().any(|item| item.value().is_expired(now))
    }

    fn new_entry(&self, path: PathBuf) -> CacheEntry {
        CacheEntry::new(path, self.adapter.clone(), &self.options)
    }

    fn key_for(&self, path: &Path) -> String {
        let relative_parent = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.root).ok())
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();
        context::join(true, false, &[relative_parent, self.adapter.name_for(path)])
    }
}

impl std::fmt::Debug for DirectorySubtree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySubtree")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("indexed", &self.files.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::adapter::{DefaultAdapter, StripExtension};
    use rstest::rstest;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("top.txt"), "top").unwrap();
        fs::create_dir(dir.path().join("sd")).unwrap();
        fs::write(dir.path().join("sd").join("nested.txt"), "nested").unwrap();
        dir
    }

    fn subtree(root: &Path, policy: LoadingPolicy, recursive: bool) -> DirectorySubtree {
        let opts = FileOptions::builder().policy(policy).recursive(recursive).build();
        DirectorySubtree::new(root, Arc::new(DefaultAdapter), opts).unwrap()
    }

    #[test]
    fn test_flat_index_skips_subdirectories() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Preload, false);
        let files = tree.files();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key("/top.txt"));
    }

    #[test]
    fn test_recursive_index_keys_by_relative_parent() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Preload, true);
        let files = tree.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files["/sd/nested.txt"].get_bytes().unwrap(), "nested");
    }

    #[test]
    fn test_live_builds_no_index() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Live, true);
        assert!(tree.files().is_empty());
        assert_eq!(tree.entry_for("sd/nested.txt").unwrap().get_bytes().unwrap(), "nested");
        assert!(tree.files().is_empty());
    }

    #[test]
    fn test_rejects_non_directory() {
        let dir = fixture();
        let result = DirectorySubtree::new(
            &dir.path().join("top.txt"),
            Arc::new(DefaultAdapter),
            FileOptions::default(),
        );
        assert!(matches!(result, Err(DirectoryError::NotADirectory(_))));
    }

    #[test]
    fn test_resolve_guards_traversal() {
        let outer = TempDir::new().unwrap();
        fs::write(outer.path().join("secret.txt"), "secret").unwrap();
        let root = outer.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::create_dir(root.join("sd")).unwrap();
        fs::write(root.join("sd").join("x.txt"), "x").unwrap();

        let tree = subtree(&root, LoadingPolicy::Live, true);
        assert!(tree.resolve("../secret.txt").is_none());
        assert!(tree.resolve("sd/../../secret.txt").is_none());
        assert!(tree.resolve("..\\secret.txt").is_none());
        assert!(tree.resolve("sd/../sd/x.txt").is_some());
        assert!(tree.resolve("").is_none());
        assert!(tree.resolve("sd").is_none());
    }

    #[test]
    fn test_non_recursive_rejects_nested_paths() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Live, false);
        assert!(tree.resolve("top.txt").is_some());
        assert!(tree.resolve("sd/nested.txt").is_none());
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Live, false);
        let path = tree.resolve("TOP.TXT").unwrap();
        assert_eq!(path.file_name().unwrap(), "top.txt");
    }

    #[test]
    fn test_resolve_uses_adapter_names() {
        let dir = fixture();
        let opts = FileOptions::builder().recursive(true).build();
        let tree = DirectorySubtree::new(dir.path(), Arc::new(StripExtension), opts).unwrap();
        assert!(tree.resolve("top").is_some());
        assert!(tree.resolve("sd/nested").is_some());
        assert!(tree.resolve("top.txt").is_none());
    }

    #[test]
    fn test_entry_for_adds_new_files_lazily() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Modify, false);
        assert!(tree.entry_for("late.txt").is_none());

        fs::write(dir.path().join("late.txt"), "late").unwrap();
        let entry = tree.entry_for("late.txt").unwrap();
        assert_eq!(entry.get_bytes().unwrap(), "late");
        assert!(tree.files().contains_key("/late.txt"));
    }

    #[test]
    fn test_entry_for_case_variant_reuses_indexed_entry() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Preload, false);
        let exact = tree.entry_for("top.txt").unwrap();
        let variant = tree.entry_for("Top.Txt").unwrap();
        assert!(Arc::ptr_eq(&exact, &variant));
        assert_eq!(tree.files().len(), 1);
    }

    #[test]
    fn test_entry_for_drops_deleted_files() {
        let dir = fixture();
        let tree = subtree(dir.path(), LoadingPolicy::Preload, false);
        fs::remove_file(dir.path().join("top.txt")).unwrap();

        assert!(tree.entry_for("top.txt").is_none());
        assert!(tree.files().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_outside_root_is_rejected() {
        let outer = TempDir::new().unwrap();
        let elsewhere = outer.path().join("elsewhere");
        fs::create_dir(&elsewhere).unwrap();
        fs::write(elsewhere.join("x.txt"), "x").unwrap();
        let root = outer.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("link")).unwrap();

        let tree = subtree(&root, LoadingPolicy::Live, true);
        assert!(tree.resolve("link/x.txt").is_none());
    }

    #[cfg(unix)]
    #[rstest]
    #[case(LoadingPolicy::Live)]
    #[case(LoadingPolicy::Modify)]
    #[case(LoadingPolicy::Cache)]
    fn test_symlinked_file_outside_root_is_rejected(#[case] policy: LoadingPolicy) {
        let outer = TempDir::new().unwrap();
        fs::write(outer.path().join("secret.txt"), "SECRET").unwrap();
        let root = outer.path().join("public");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("plain.txt"), "plain").unwrap();
        std::os::unix::fs::symlink("../secret.txt", root.join("leak.txt")).unwrap();
        std::os::unix::fs::symlink("plain.txt", root.join("alias.txt")).unwrap();

        let tree = subtree(&root, policy, false);
        assert!(tree.resolve("leak.txt").is_none());
        assert!(tree.entry_for("leak.txt").is_none());
        assert!(!tree.files().contains_key("/leak.txt"));

        // links that stay inside the root are served
        assert_eq!(tree.entry_for("alias.txt").unwrap().get_bytes().unwrap(), "plain");
    }
}
