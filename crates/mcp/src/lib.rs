//! Model Context Protocol surface over the tool layer in `lspbridge_tools`:
//! a stdio transport (sharing framing with the LSP connection) and an HTTP
//! transport (axum), both backed by the same tool registry and dispatch
//! table.

pub mod error;
pub mod http;
pub mod registry;
pub mod stdio;

pub use error::{Error, Result};
