use bytes::Bytes;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

use super::adapter::{AdapterError, FileAdapter};
use super::options::{FileOptions, LoadingPolicy};

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("{op} is not supported for {policy} entries")]
    Unsupported {
        op: &'static str,
        policy: LoadingPolicy,
    },
}

#[derive(Debug, Default)]
struct EntryState {
    bytes: Option<Bytes>,
    /// Modification time the cached bytes were read at (modify only)
    last_modified: Option<SystemTime>,
    /// Instant the cached bytes go stale (cache only)
    expiry: Option<Instant>,
}

/// One served file and its cached content
///
/// The loading policy decides when bytes are read:
///
/// | policy  | first read        | re-read                          |
/// |---------|-------------------|----------------------------------|
/// | preload | registration      | never                            |
/// | modify  | registration      | modification time changed        |
/// | cache   | first request     | expiry passed or bytes cleared   |
/// | live    | every request     | every request                    |
///
/// All state sits behind one per-entry lock. Buffers are [`Bytes`], so a
/// reader always holds a complete snapshot even while a reload replaces it.
pub struct CacheEntry {
    path: PathBuf,
    adapter: Arc<dyn FileAdapter>,
    policy: LoadingPolicy,
    cache_duration: Duration,
    state: RwLock<EntryState>,
}

impl CacheEntry {
    pub fn new(path: PathBuf, adapter: Arc<dyn FileAdapter>, options: &FileOptions) -> Self {
        let entry = Self {
            path,
            adapter,
            policy: options.policy,
            cache_duration: options.cache_duration,
            state: RwLock::new(EntryState::default()),
        };

        if matches!(entry.policy, LoadingPolicy::Preload | LoadingPolicy::Modify) {
            let mut state = entry.state.write();
            if entry.policy == LoadingPolicy::Modify {
                state.last_modified = modified_time(&entry.path);
            }
            state.bytes = entry.load_logged();
        }

        entry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> LoadingPolicy {
        self.policy
    }

    /// Whether the backing file still exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Current bytes for the file, applying the loading policy
    pub fn get_bytes(&self) -> Option<Bytes> {
        match self.policy {
            LoadingPolicy::Preload => self.state.read().bytes.clone(),
            LoadingPolicy::Modify => self.get_modified(),
            LoadingPolicy::Cache => self.get_cached(),
            LoadingPolicy::Live => self.load().ok(),
        }
    }

    fn get_modified(&self) -> Option<Bytes> {
        let Some(current) = modified_time(&self.path) else {
            // file is gone, keep serving what we have
            return self.state.read().bytes.clone();
        };

        {
            let state = self.state.read();
            if state.last_modified == Some(current) {
                return state.bytes.clone();
            }
        }

        let mut state = self.state.write();
        if state.last_modified != Some(current) {
            debug!(path = %self.path.display(), "File modified, reloading");
            state.last_modified = Some(current);
            state.bytes = self.load_logged();
        }
        state.bytes.clone()
    }

    fn get_cached(&self) -> Option<Bytes> {
        {
            let state = self.state.read();
            if state.bytes.is_some() && !is_past(state.expiry, Instant::now()) {
                return state.bytes.clone();
            }
        }

        let mut state = self.state.write();
        let now = Instant::now();
        if state.bytes.is_none() || is_past(state.expiry, now) {
            debug!(path = %self.path.display(), "Cache expired, reloading");
            state.bytes = self.load_logged();
            state.expiry = Some(now + self.cache_duration);
        }
        state.bytes.clone()
    }

    /// Re-read the file now, regardless of watermark or expiry
    pub fn reload(&self) -> Result<(), EntryError> {
        self.ensure_reloadable("reload")?;
        let mut state = self.state.write();
        match self.policy {
            LoadingPolicy::Modify => state.last_modified = modified_time(&self.path),
            _ => state.expiry = Some(Instant::now() + self.cache_duration),
        }
        state.bytes = self.load_logged();
        Ok(())
    }

    /// Drop cached bytes; the next `get_bytes` reads the file again
    ///
    /// The expiry of a cache entry is left untouched.
    pub fn clear(&self) -> Result<(), EntryError> {
        self.ensure_reloadable("clear")?;
        let mut state = self.state.write();
        state.bytes = None;
        state.last_modified = None;
        Ok(())
    }

    /// Whether this is a cache entry holding bytes past their expiry
    pub fn is_expired(&self, now: Instant) -> bool {
        if self.policy != LoadingPolicy::Cache {
            return false;
        }
        let state = self.state.read();
        state.bytes.is_some() && is_past(state.expiry, now)
    }

    /// Expiry of the currently cached bytes (cache only)
    pub fn expiry(&self) -> Option<Instant> {
        let state = self.state.read();
        state.bytes.as_ref().and(state.expiry)
    }

    fn ensure_reloadable(&self, op: &'static str) -> Result<(), EntryError> {
        if self.policy.is_reloadable() {
            Ok(())
        } else {
            Err(EntryError::Unsupported {
                op,
                policy: self.policy,
            })
        }
    }

    fn load(&self) -> Result<Bytes, AdapterError> {
        let raw = fs::read(&self.path)?;
        self.adapter.transform(&self.path, Bytes::from(raw))
    }

    fn load_logged(&self) -> Option<Bytes> {
        match self.load() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to load file");
                None
            }
        }
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("cache_duration", &self.cache_duration)
            .field("expired", &self.is_expired(Instant::now()))
            .finish()
    }
}

fn is_past(expiry: Option<Instant>, now: Instant) -> bool {
    expiry.is_none_or(|at| now >= at)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
