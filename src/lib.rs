pub mod config;
pub mod context;
pub mod files;
pub mod humanize;
pub mod observability;
pub mod server;
