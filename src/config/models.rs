use crate::files::{FileOptions, LoadingPolicy};
use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    /// Individually served files
    #[serde(default)]
    pub files: Vec<MountConfig>,
    /// Served directory subtrees
    #[serde(default)]
    pub directories: Vec<MountConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Context the file handler is mounted under
    #[serde(default)]
    pub mount: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            mount: String::new(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

/// Adapter selection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// Serve `page.html` as `page`
    #[serde(default)]
    pub strip_extensions: bool,
}

/// One file or directory to serve
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MountConfig {
    pub path: PathBuf,
    /// Name to serve under (defaults to the file or directory name)
    pub name: Option<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub policy: LoadingPolicy,
    /// Only valid with `policy = "cache"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_duration: Option<HumanDuration>,
    /// Directories only
    #[serde(default)]
    pub recursive: bool,
}

impl MountConfig {
    pub fn options(&self) -> FileOptions {
        FileOptions::builder()
            .context(self.context.clone())
            .policy(self.policy)
            .cache_duration(self.cache_duration.unwrap_or_default().as_duration())
            .recursive(self.recursive)
            .build()
    }
}
