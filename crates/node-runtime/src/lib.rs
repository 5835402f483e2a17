//! # Node Runtime Library
//!
//! Everything the `node-runtime` binary does, exposed for integration tests.
//!
//! ## Modules
//!
//! - `config` - TOML configuration with environment overrides
//! - `telemetry` - tracing subscriber setup
//! - `storage` - device keys, client trust store, master device registry
//! - `handlers` - built-in message handlers
//! - `node` - container wiring and the master/client run loops

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod handlers;
pub mod node;
pub mod storage;
pub mod telemetry;

pub use config::{ConfigError, NodeConfig, Role};
pub use handlers::DeviceConnectedLogger;
pub use node::Node;
pub use storage::{FileDeviceRegistry, FileTrustStore, StorageError};
pub use telemetry::{init_logging, LogConfig};
