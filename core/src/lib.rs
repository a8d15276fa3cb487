//! Restomod Core - Shared types for the configurator research pipeline
//!
//! This crate provides:
//! - Research subjects, queries, results and configurator snapshots
//! - Fallback image table and resolver
//! - Parsing of sectioned research text
//! - Vehicle category heuristic
//! - IPC client for daemon communication

pub mod category;
pub mod error;
pub mod fallback;
pub mod ipc;
pub mod sections;
pub mod types;

pub use category::VehicleCategory;
pub use error::Error;
pub use fallback::{FallbackEntry, FallbackImageResolver, FallbackImageTable, FALLBACK_TABLE_FILE};
pub use ipc::{is_daemon_running, restomod_home, socket_path, IpcClient, IpcError};
pub use sections::parse_research_text;
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::fallback::{FallbackImageResolver, FallbackImageTable};
    pub use crate::ipc::{IpcClient, IpcError};
    pub use crate::types::*;
}
