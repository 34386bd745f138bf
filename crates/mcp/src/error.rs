#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Rpc(#[from] lspbridge_rpc::Error),

    #[error(transparent)]
    Tool(#[from] lspbridge_tools::ToolError),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
