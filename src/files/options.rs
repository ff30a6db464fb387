use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// When a cached file's bytes are (re)read from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingPolicy {
    /// Read once at registration, never again
    Preload,
    /// Read at registration and whenever the modification time changes
    Modify,
    /// Read on request, kept for `cache_duration`
    Cache,
    /// Read on every request
    #[default]
    Live,
}

impl LoadingPolicy {
    /// Whether `reload`/`clear` are valid for entries under this policy
    pub fn is_reloadable(self) -> bool {
        matches!(self, LoadingPolicy::Modify | LoadingPolicy::Cache)
    }
}

impl fmt::Display for LoadingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadingPolicy::Preload => "preload",
            LoadingPolicy::Modify => "modify",
            LoadingPolicy::Cache => "cache",
            LoadingPolicy::Live => "live",
        };
        f.write_str(name)
    }
}

/// Registration options for files and directories
///
/// Built once and shared read-only; registrations never copy or mutate it.
///
/// ```
/// use fileserve::files::{FileOptions, LoadingPolicy};
/// use std::time::Duration;
///
/// let opts = FileOptions::builder()
///     .context("static")
///     .policy(LoadingPolicy::Cache)
///     .cache_duration(Duration::from_secs(30))
///     .build();
/// assert_eq!(opts.context, "static");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Builder)]
pub struct FileOptions {
    /// Context the file or directory is served under, relative to the handler
    #[builder(into, default)]
    pub context: String,
    #[builder(default)]
    pub policy: LoadingPolicy,
    /// Only used with [`LoadingPolicy::Cache`]
    #[builder(default)]
    pub cache_duration: Duration,
    /// Also index subdirectories when adding a directory
    #[builder(default)]
    pub recursive: bool,
}
