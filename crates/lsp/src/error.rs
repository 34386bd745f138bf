use lsp_types::Uri;

/// Error taxonomy for the LSP client layer. Wire-level failures bubble up
/// from [`lspbridge_rpc::Error`] unchanged; everything else here is specific
/// to LSP semantics (lifecycle ordering, missing capabilities, stale docs).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Rpc(#[from] lspbridge_rpc::Error),

    #[error("failed to spawn language server: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("language server exited before it became ready")]
    ServerExited,

    #[error("language server did not become ready within the configured timeout")]
    ReadyTimeout,

    #[error("client is not initialized")]
    NotInitialized,

    #[error("initialize was already called on this client")]
    AlreadyInitialized,

    #[error("document not open: {0}")]
    DocumentNotOpen(Uri),

    #[error("document already open: {0}")]
    DocumentAlreadyOpen(Uri),

    #[error("server does not support capability: {0}")]
    UnsupportedCapability(&'static str),

    #[error("invalid URI: {0}")]
    InvalidUri(String),
}

pub type Result<T> = std::result::Result<T, Error>;
