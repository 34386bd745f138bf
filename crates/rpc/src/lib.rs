//! Generic async JSON-RPC 2.0 message pump.
//!
//! This crate knows nothing about LSP or MCP specifically: it provides
//! `Content-Length`-framed wire encoding ([`transport`]), the envelope types
//! ([`message`]), and a request/response/notification multiplexer
//! ([`dispatcher`]) usable over any `AsyncRead + AsyncWrite` pair. The `lsp`
//! and `mcp` crates each supply the typed methods and wire this up to a
//! child process or to stdio respectively.

mod dispatcher;
mod error;
mod message;
mod transport;

pub use dispatcher::{Dispatcher, DispatcherHandlers};
pub use error::{Error, Result};
pub use message::{
    error_codes, AnyNotification, AnyRequest, AnyResponse, Frame, FrameError, JsonValue,
    RequestId, ResponseError,
};
pub use transport::{FrameReader, FrameWriter};
