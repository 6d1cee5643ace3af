//! sync-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod config;
pub mod engine;
pub mod http;
pub mod init;
pub mod native_fs;
pub mod service;
pub mod watcher;

// Re-export key types for convenience
pub use config::{Config, ConfigError, ConfigStore};
pub use engine::{Engine, EngineTiming, StopHandle};
pub use http::HttpGateway;
pub use native_fs::NativeFs;
pub use watcher::{WatchError, WatchSet};
