use bytes::Bytes;
use std::path::Path;
use thiserror::Error;

/// Adapter errors
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transform failed for {path}: {reason}")]
    Transform { path: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// File adapter trait for naming and post-processing served files
///
/// Adapters decide the name a file is reachable under and may rewrite its
/// content before it is cached or served. They carry no routing or cache
/// state, so one adapter instance is shared by every entry of a handler.
pub trait FileAdapter: Send + Sync {
    /// Name the file is served under (not used for directories)
    fn name_for(&self, path: &Path) -> String {
        base_name(path)
    }

    /// Bytes served for the file, given its raw content
    fn transform(&self, _path: &Path, raw: Bytes) -> Result<Bytes, AdapterError> {
        Ok(raw)
    }
}

/// Base name of `path`, falling back to the full path text for roots
/// (`/`, `C:\`) that have no file name component.
pub fn base_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Serves files under their own name with unchanged content
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdapter;

impl FileAdapter for DefaultAdapter {}

/// Serves `page.html` as `page`
#[derive(Debug, Clone, Copy, Default)]
pub struct StripExtension;

impl FileAdapter for StripExtension {
    fn name_for(&self, path: &Path) -> String {
        match path.file_stem() {
            Some(stem) if path.file_name().is_some() => stem.to_string_lossy().into_owned(),
            _ => base_name(path),
        }
    }
}
