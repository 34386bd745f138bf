mod cli;
mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lspbridge_lsp::{
    DiagnosticsCache, DocumentSync, LspClient, ServerConfig, WatcherRegistration, WatcherRegistry,
    WorkspaceWatcher,
};
use lspbridge_tools::ToolContext;
use lspbridge_worker::HandlerPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("lspbridge: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(cli))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main(cli: cli::Cli) -> anyhow::Result<()> {
    let workspace_root = cli
        .workspace
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("invalid --workspace {}: {e}", cli.workspace.display()))?;
    if !workspace_root.is_dir() {
        anyhow::bail!("--workspace {} is not a directory", workspace_root.display());
    }

    let shutdown = CancellationToken::new();
    lifecycle::watch_parent(shutdown.clone());
    install_signal_handlers(shutdown.clone());

    let pool = Arc::new(HandlerPool::new(8));

    let server_config = ServerConfig {
        command: cli.lsp.clone(),
        args: cli.lsp_args.clone(),
        workspace_root: workspace_root.clone(),
    };
    let client = LspClient::spawn(&server_config, pool.clone()).await?;

    // Registered before `initialize` so a server that starts publishing the
    // moment it's `initialized` never has its diagnostics missed.
    let diagnostics = Arc::new(DiagnosticsCache::new());
    let diag_for_handler = diagnostics.clone();
    client.handlers().on_notify(
        "textDocument/publishDiagnostics",
        move |params: serde_json::Value| {
            if let Ok(p) =
                serde_json::from_value::<lsp_types::PublishDiagnosticsParams>(params)
            {
                diag_for_handler.update(p.uri, p.diagnostics);
            }
        },
    );

    let root_uri = url::Url::from_file_path(&workspace_root)
        .ok()
        .and_then(|u| u.as_str().parse().ok());
    client.initialize(&workspace_root, root_uri).await?;

    // `initialize` installs the default handler stubs; override the
    // `(un)registerCapability` ones now so dynamic watch registrations are
    // actually threaded into the registry instead of acknowledged and dropped.
    let watcher_registry = Arc::new(WatcherRegistry::new());
    install_watch_registration_handlers(&client, watcher_registry.clone());

    // Opens the readiness gate in the background: tool calls block behind
    // `ToolContext::ensure_ready` rather than delaying startup here.
    tokio::spawn(client.clone().drive_readiness(diagnostics.clone()));

    let documents = Arc::new(DocumentSync::new(client.clone()));
    let _watcher = WorkspaceWatcher::start(workspace_root.clone(), watcher_registry, client.clone())?;

    let ctx = ToolContext::new(client.clone(), documents, diagnostics, workspace_root);

    let serve_result = match cli.mode {
        cli::Mode::Stdio => {
            tokio::select! {
                result = lspbridge_mcp::stdio::serve(ctx, pool) => result.map_err(anyhow::Error::from),
                _ = shutdown.cancelled() => Ok(()),
            }
        }
        cli::Mode::Http => {
            tokio::select! {
                result = lspbridge_mcp::http::serve(ctx, cli.port, shutdown.clone()) => result.map_err(anyhow::Error::from),
                _ = shutdown.cancelled() => Ok(()),
            }
        }
    };

    if let Err(e) = &serve_result {
        error!(error = %e, "mcp surface exited with an error");
    }

    info!("shutting down language server");
    if let Err(e) = client.shutdown(SHUTDOWN_TIMEOUT).await {
        error!(error = %e, "error during language server shutdown");
    }

    serve_result
}

/// Overrides the client's no-op `client/registerCapability` /
/// `client/unregisterCapability` stubs with ones that additionally thread
/// `workspace/didChangeWatchedFiles` registrations into `registry`, so a
/// server that dynamically narrows (or widens) its watch interest is
/// actually honored instead of silently accepted and discarded.
fn install_watch_registration_handlers(client: &Arc<LspClient>, registry: Arc<WatcherRegistry>) {
    let register_registry = registry.clone();
    client.handlers().on_request("client/registerCapability", move |params| {
        let registry = register_registry.clone();
        async move {
            if let Ok(parsed) = serde_json::from_value::<lsp_types::RegistrationParams>(params) {
                for reg in parsed.registrations {
                    if reg.method != "workspace/didChangeWatchedFiles" {
                        continue;
                    }
                    let Some(options) = reg.register_options else {
                        continue;
                    };
                    match serde_json::from_value::<lsp_types::DidChangeWatchedFilesRegistrationOptions>(options) {
                        Ok(opts) => {
                            for (i, watcher) in opts.watchers.into_iter().enumerate() {
                                let glob = match watcher.glob_pattern {
                                    lsp_types::GlobPattern::String(s) => s,
                                    lsp_types::GlobPattern::Relative(_) => {
                                        warn!("relative glob patterns in didChangeWatchedFiles registrations are not supported; ignoring");
                                        continue;
                                    }
                                };
                                let kind = watcher.kind.map(|k| k.bits()).unwrap_or(0b111);
                                registry.register(WatcherRegistration {
                                    id: format!("{}-{i}", reg.id),
                                    glob,
                                    kind,
                                });
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to parse didChangeWatchedFiles registration options"),
                    }
                }
            }
            Ok(serde_json::Value::Null)
        }
    });

    let unregister_registry = registry.clone();
    client.handlers().on_request("client/unregisterCapability", move |params| {
        let registry = unregister_registry.clone();
        async move {
            if let Ok(parsed) = serde_json::from_value::<lsp_types::UnregistrationParams>(params) {
                for unreg in parsed.unregisterations {
                    registry.unregister(&unreg.id);
                }
            }
            Ok(serde_json::Value::Null)
        }
    });
}

fn install_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        shutdown.cancel();
    });
}
