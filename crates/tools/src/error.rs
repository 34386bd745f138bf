/// Error taxonomy surfaced to the MCP layer as a tool call failure. Kept
/// separate from [`lspbridge_lsp::Error`] so a malformed tool argument
/// (`InvalidInput`) is distinguishable from a genuine protocol failure.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("language server is not ready")]
    NotReady,

    #[error("failed to apply edit: {0}")]
    ApplyEditFailed(String),

    #[error("tool not supported by this language server: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Lsp(#[from] lspbridge_lsp::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;
