//! The MCP-facing tool implementations: `definition`, `references`,
//! `diagnostics`, `hover`, `rename_symbol`, `edit_file`. Each is a thin,
//! independently testable function over a shared [`ToolContext`]; the `mcp`
//! crate wires these into its tool-dispatch table.

pub mod context;
pub mod definition;
pub mod diagnostics;
pub mod edit_file;
pub mod error;
pub mod hover;
pub mod references;
pub mod rename;

pub use context::ToolContext;
pub use error::{Result, ToolError};
