use dashmap::DashMap;
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use super::adapter::{DefaultAdapter, FileAdapter, base_name};
use super::directory::{DirectoryError, DirectorySubtree};
use super::entry::CacheEntry;
use super::exchange::{DefaultResponder, Exchange, ExchangeError, Responder, ServedFile};
use super::options::{FileOptions, LoadingPolicy};
use crate::context;
use crate::observability::Metrics;

const NO_SWEEP: u64 = u64::MAX;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to register directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: DirectoryError,
    },
}

/// Registered file or directory, as reported by [`FileHandler::snapshot`]
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub context: String,
    pub path: PathBuf,
    pub policy: LoadingPolicy,
    /// Whether any cache entry under this registration holds expired bytes
    pub expired: bool,
    /// Indexed entries (directories only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySnapshot {
    pub files: Vec<Registration>,
    pub directories: Vec<Registration>,
}

/// Serves registered files and directories by context
///
/// Single files and directory subtrees live in two concurrent maps keyed by
/// leading-slash context. A request is answered by an exact file match if
/// there is one, otherwise by the longest directory context that prefixes it.
///
/// ```no_run
/// use fileserve::files::{FileHandler, FileOptions, LoadingPolicy};
///
/// let handler = FileHandler::new();
/// let opts = FileOptions::builder().policy(LoadingPolicy::Modify).build();
/// handler.add_directory("public", Some("docs"), &opts)?;
///
/// let served = handler.dispatch("/docs/index.html");
/// # Ok::<(), fileserve::files::RegistryError>(())
/// ```
pub struct FileHandler {
    adapter: Arc<dyn FileAdapter>,
    responder: Arc<dyn Responder>,
    files: DashMap<String, Arc<CacheEntry>>,
    directories: DashMap<String, Arc<DirectorySubtree>>,
    /// Earliest instant a cached entry can go stale, as nanoseconds past
    /// `created`; `NO_SWEEP` while nothing is pending
    next_sweep: AtomicU64,
    created: Instant,
    /// Held for the duration of a sweep
    sweeping: Mutex<()>,
    metrics: Arc<Metrics>,
}

impl FileHandler {
    pub fn new() -> Self {
        Self::with_adapter(Arc::new(DefaultAdapter))
    }

    pub fn with_adapter(adapter: Arc<dyn FileAdapter>) -> Self {
        Self {
            adapter,
            responder: Arc::new(DefaultResponder),
            files: DashMap::new(),
            directories: DashMap::new(),
            next_sweep: AtomicU64::new(NO_SWEEP),
            created: Instant::now(),
            sweeping: Mutex::new(()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn adapter(&self) -> &Arc<dyn FileAdapter> {
        &self.adapter
    }

    /// Register a single file, returning its context
    ///
    /// The file is served at `options.context` joined with `name`, or with
    /// the adapter name when `name` is `None`. Replaces any file already
    /// registered at that context.
    pub fn add_file(
        &self,
        path: impl Into<PathBuf>,
        name: Option<&str>,
        options: &FileOptions,
    ) -> String {
        let path = path.into();
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| self.adapter.name_for(&path));
        let key = context::join(true, false, &[options.context.as_str(), name.as_str()]);

        let entry = CacheEntry::new(path, self.adapter.clone(), options);
        info!(context = %key, path = %entry.path().display(), policy = %entry.policy(), "Registered file");
        self.files.insert(key.clone(), Arc::new(entry));
        key
    }

    /// Register several files under the same options
    pub fn add_files<I, P>(&self, paths: I, options: &FileOptions) -> Vec<String>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths
            .into_iter()
            .map(|path| self.add_file(path, None, options))
            .collect()
    }

    /// Register a directory subtree, returning its context
    ///
    /// The directory is served at `options.context` joined with `name`, or
    /// with the directory's own name when `name` is `None`.
    pub fn add_directory(
        &self,
        dir: impl AsRef<Path>,
        name: Option<&str>,
        options: &FileOptions,
    ) -> Result<String, RegistryError> {
        let dir = dir.as_ref();
        let subtree = DirectorySubtree::new(dir, self.adapter.clone(), options.clone()).map_err(
            |source| RegistryError::Directory {
                path: dir.to_path_buf(),
                source,
            },
        )?;

        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| base_name(subtree.root()));
        let key = context::join(true, false, &[options.context.as_str(), name.as_str()]);

        info!(context = %key, root = %subtree.root().display(), "Registered directory");
        self.directories.insert(key.clone(), Arc::new(subtree));
        Ok(key)
    }

    pub fn remove_file(&self, context: &str) -> bool {
        let key = context::normalize(context, true, false);
        let removed = self.files.remove(&key).is_some();
        if removed {
            info!(context = %key, "Removed file");
        }
        removed
    }

    /// Remove a file registered without an explicit name
    pub fn remove_file_path(&self, path: impl AsRef<Path>, options: &FileOptions) -> bool {
        let name = self.adapter.name_for(path.as_ref());
        self.remove_file(&context::join(true, false, &[options.context.as_str(), name.as_str()]))
    }

    pub fn remove_directory(&self, context: &str) -> bool {
        let key = context::normalize(context, true, false);
        let removed = self.directories.remove(&key).is_some();
        if removed {
            info!(context = %key, "Removed directory");
        }
        removed
    }

    /// Remove a directory registered under its own name at `context`
    pub fn remove_directory_path(&self, dir: impl AsRef<Path>, context: &str) -> bool {
        let dir = dir.as_ref();
        let name = base_name(&dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));
        self.remove_directory(&context::join(true, false, &[context, name.as_str()]))
    }

    /// Resolve a request path to a file and its bytes, then sweep
    pub fn dispatch(&self, request_path: &str) -> Option<ServedFile> {
        let served = self.lookup(request_path);
        self.sweep_if_due();
        served
    }

    /// Host entry point: resolve the exchange path, respond and close
    pub fn handle(&self, exchange: &mut dyn Exchange) -> Result<(), ExchangeError> {
        let served = request_context(exchange.path(), exchange.mount_context())
            .and_then(|path| self.lookup(&path));
        let result = self.responder.respond(exchange, served.as_ref());
        exchange.close();
        self.sweep_if_due();
        result
    }

    fn lookup(&self, request_path: &str) -> Option<ServedFile> {
        let context = context::normalize(request_path, true, false);
        let served = self.resolve_entry(&context).and_then(|entry| self.read(&entry));

        match &served {
            Some(file) => self.metrics.file_served(file.bytes.len()),
            None => self.metrics.file_not_found(),
        }
        served
    }

    fn resolve_entry(&self, context: &str) -> Option<Arc<CacheEntry>> {
        let exact = self.files.get(context).map(|item| item.value().clone());
        if exact.is_some() {
            return exact;
        }

        let (prefix, subtree) = self.longest_directory(context)?;
        let relative = context::strip_context(context, &prefix)?;
        debug!(context, directory = %prefix, relative, "Matched directory");
        subtree.entry_for(relative)
    }

    /// Longest registered directory context prefixing `context`, ties broken
    /// by the lexicographically smallest key
    fn longest_directory(&self, context: &str) -> Option<(String, Arc<DirectorySubtree>)> {
        let mut best: Option<(String, Arc<DirectorySubtree>)> = None;
        for item in self.directories.iter() {
            let key = item.key();
            if context::strip_context(context, key).is_none() {
                continue;
            }
            let better = match &best {
                None => true,
                Some((current, _)) => {
                    key.len() > current.len() || (key.len() == current.len() && key < current)
                }
            };
            if better {
                best = Some((key.clone(), item.value().clone()));
            }
        }
        best
    }

    fn read(&self, entry: &CacheEntry) -> Option<ServedFile> {
        if entry.is_expired(Instant::now()) {
            // only cache entries expire, and those always accept clear
            let _ = entry.clear();
        }
        let bytes = entry.get_bytes()?;
        if let Some(expiry) = entry.expiry() {
            self.schedule_sweep(expiry);
        }
        Some(ServedFile {
            path: entry.path().to_path_buf(),
            bytes,
        })
    }

    fn schedule_sweep(&self, at: Instant) {
        self.next_sweep.fetch_min(self.offset(at), Ordering::AcqRel);
    }

    fn offset(&self, at: Instant) -> u64 {
        u64::try_from(at.saturating_duration_since(self.created).as_nanos()).unwrap_or(NO_SWEEP - 1)
    }

    fn sweep_is_due(&self) -> bool {
        self.next_sweep.load(Ordering::Acquire) <= self.offset(Instant::now())
    }

    /// Sweep when the deadline has passed and no other sweep is running
    fn sweep_if_due(&self) {
        if !self.sweep_is_due() {
            return;
        }
        let Some(_guard) = self.sweeping.try_lock() else {
            return;
        };
        // a sweep that just finished may have moved the deadline
        if self.sweep_is_due() {
            self.sweep_locked(Instant::now());
        }
    }

    /// Clear every expired cache entry, returning how many were cleared
    pub fn sweep(&self) -> usize {
        let _guard = self.sweeping.lock();
        self.sweep_locked(Instant::now())
    }

    fn sweep_locked(&self, now: Instant) -> usize {
        // reset first so deadlines scheduled during the scan survive it
        self.next_sweep.store(NO_SWEEP, Ordering::Release);

        let mut cleared = 0;
        for item in self.files.iter() {
            if item.value().is_expired(now) && item.value().clear().is_ok() {
                cleared += 1;
            }
        }
        for item in self.directories.iter() {
            cleared += item.value().sweep(now);
        }

        let file_expiries = self.files.iter().filter_map(|item| item.value().expiry());
        let dir_expiries = self
            .directories
            .iter()
            .filter_map(|item| item.value().next_expiry());
        if let Some(at) = file_expiries.chain(dir_expiries).min() {
            self.schedule_sweep(at);
        }

        if cleared > 0 {
            self.metrics.entries_swept(cleared);
            debug!(cleared, "Swept expired cache entries");
        }
        cleared
    }

    /// Registered contexts, sorted
    pub fn snapshot(&self) -> RegistrySnapshot {
        let now = Instant::now();
        let mut files: Vec<Registration> = self
            .files
            .iter()
            .map(|item| Registration {
                context: item.key().clone(),
                path: item.value().path().to_path_buf(),
                policy: item.value().policy(),
                expired: item.value().is_expired(now),
                indexed: None,
            })
            .collect();
        let mut directories: Vec<Registration> = self
            .directories
            .iter()
            .map(|item| Registration {
                context: item.key().clone(),
                path: item.value().root().to_path_buf(),
                policy: item.value().policy(),
                expired: item.value().has_expired(now),
                indexed: Some(item.value().files().len()),
            })
            .collect();
        files.sort_by(|a, b| a.context.cmp(&b.context));
        directories.sort_by(|a, b| a.context.cmp(&b.context));
        RegistrySnapshot { files, directories }
    }

    pub fn file_entry(&self, context: &str) -> Option<Arc<CacheEntry>> {
        let key = context::normalize(context, true, false);
        self.files.get(&key).map(|item| item.value().clone())
    }

    pub fn directory(&self, context: &str) -> Option<Arc<DirectorySubtree>> {
        let key = context::normalize(context, true, false);
        self.directories.get(&key).map(|item| item.value().clone())
    }
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded request context relative to the mount, or `None` when the path
/// lies outside it
fn request_context(raw: &str, mount: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let path = context::normalize(&decoded, true, false);
    let mount = context::normalize(mount, true, false);
    let relative = context::strip_context(&path, &mount)?;
    Some(context::normalize(relative, true, false))
}
