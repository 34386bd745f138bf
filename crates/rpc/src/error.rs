use crate::message::ResponseError;

/// Error taxonomy for the RPC pump, matching the kinds a caller needs to
/// branch on rather than exposing implementation detail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport is gone: EOF, a broken pipe, or a fatal I/O error.
    #[error("transport closed")]
    TransportClosed,

    /// A frame violated the framing contract (bad header, length mismatch).
    #[error("transport protocol violation: {0}")]
    TransportProtocol(String),

    /// The server replied with a JSON-RPC error object.
    #[error("rpc error: {0}")]
    Rpc(#[from] ResponseError),

    /// The caller's context was cancelled before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// A call-site deadline elapsed before a response arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The dispatcher (or the whole session) was closed while a call was in flight.
    #[error("session closed")]
    SessionClosed,

    /// Catch-all for protocol-shaped but otherwise uncategorized failures;
    /// primarily used by test doubles to simulate arbitrary faults.
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
