//! Async LSP client used to drive a single language server process:
//! lifecycle (spawn/initialize/shutdown), document synchronization,
//! diagnostics caching, and workspace file watching.
//!
//! Scoped to exactly one server per workspace root — this bridge does not
//! multiplex requests across several language servers the way a full editor
//! backend would.

pub mod capabilities;
pub mod client;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod watcher;

pub use capabilities::{client_capabilities, CapabilitySnapshot};
pub use client::{ClientState, LspClient, ServerConfig};
pub use diagnostics::DiagnosticsCache;
pub use document::DocumentSync;
pub use error::{Error, Result};
pub use watcher::{WatcherRegistration, WatcherRegistry, WorkspaceWatcher};
