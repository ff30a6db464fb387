//! File serving cache
//!
//! Maps request contexts to registered files and directory subtrees, and
//! decides when file content is read from disk.
//!
//! ## Key Components
//!
//! - [`FileHandler`] - Registry of files and directories, dispatches requests
//! - [`DirectorySubtree`] - Indexed view of one registered directory
//! - [`CacheEntry`] - Per-file cache implementing the [`LoadingPolicy`] modes
//! - [`FileAdapter`] - Naming and content transform hook
//! - [`Exchange`] / [`Responder`] - Contract with the host HTTP runtime
//!
//! ## Example
//!
//! ```rust,ignore
//! use fileserve::files::{FileHandler, FileOptions, LoadingPolicy};
//!
//! let handler = FileHandler::new();
//! handler.add_file("static/index.html", Some("index"), &FileOptions::default());
//! handler.add_directory("public", None, &FileOptions::builder()
//!     .policy(LoadingPolicy::Cache)
//!     .cache_duration(Duration::from_secs(30))
//!     .recursive(true)
//!     .build())?;
//!
//! let served = handler.dispatch("/public/css/site.css");
//! ```

mod adapter;
mod directory;
mod entry;
mod exchange;
mod options;
mod registry;

pub use adapter::{AdapterError, DefaultAdapter, FileAdapter, StripExtension, base_name};
pub use directory::{DirectoryError, DirectorySubtree};
pub use entry::{CacheEntry, EntryError};
pub use exchange::{
    BufferedExchange, DefaultResponder, Exchange, ExchangeError, Responder, ServedFile,
};
pub use options::{FileOptions, LoadingPolicy};
pub use registry::{FileHandler, Registration, RegistryError, RegistrySnapshot};
