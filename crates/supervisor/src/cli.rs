use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Mode {
    Stdio,
    Http,
}

/// Bridges an MCP client to a single language server process.
#[derive(Debug, Parser)]
#[command(name = "lspbridge", version, about)]
pub struct Cli {
    /// Root directory of the workspace the language server should index.
    #[arg(long)]
    pub workspace: PathBuf,

    /// Command used to launch the language server.
    #[arg(long)]
    pub lsp: String,

    /// Which MCP transport to expose.
    #[arg(long, value_enum, default_value_t = Mode::Stdio)]
    pub mode: Mode,

    /// Port to bind when `--mode http`.
    #[arg(long, default_value_t = 7535)]
    pub port: u16,

    /// Raise the default log filter to `debug` (overridden by `RUST_LOG` if set).
    #[arg(long)]
    pub verbose: bool,

    /// Arguments passed through to the language server, after `--`.
    #[arg(last = true)]
    pub lsp_args: Vec<String>,
}
