//! Owns one language server child process: spawns it, drives the
//! `initialize`/`shutdown`/`exit` lifecycle, and exposes typed request and
//! notification helpers built on [`lspbridge_rpc::Dispatcher`].

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lsp_types::notification::Notification as LspNotification;
use lsp_types::request::Request as LspRequest;
use lsp_types::{InitializeParams, InitializeResult, InitializedParams, Uri};
use lspbridge_rpc::{Dispatcher, DispatcherHandlers};
use lspbridge_worker::HandlerPool;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capabilities::{client_capabilities, CapabilitySnapshot};
use crate::diagnostics::DiagnosticsCache;
use crate::error::{Error, Result};

/// How long the readiness gate waits for a lull in `publishDiagnostics`
/// traffic before treating the server as settled.
const READY_QUIET_INTERVAL: Duration = Duration::from_millis(500);

/// Hard upper bound on the readiness gate, regardless of whether diagnostics
/// ever quiesce — required by the gate's contract so a server that publishes
/// diagnostics continuously (or never stops touching files) can't wedge tool
/// admission forever.
const READY_HARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state, advertised so callers can fail fast (`NotInitialized`)
/// instead of racing a half-started server. `Initialized` and `Ready` are
/// distinct: the former means the `initialize`/`initialized` handshake
/// completed, the latter means the readiness gate has additionally opened
/// (see [`LspClient::drive_readiness`]) and tool calls may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unstarted,
    Initializing,
    Initialized,
    Ready,
    ShuttingDown,
    Closed,
}

impl ClientState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Unstarted,
            1 => Self::Initializing,
            2 => Self::Initialized,
            3 => Self::Ready,
            4 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }

    fn tag(self) -> u8 {
        self as u8
    }
}

/// The command line used to spawn a language server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub workspace_root: std::path::PathBuf,
}

/// A running language server connection.
///
/// The child's stdout is owned by a reader task inside the dispatcher; its
/// stderr is drained to `tracing` so server-side diagnostics aren't silently
/// lost down a closed pipe.
pub struct LspClient {
    dispatcher: Dispatcher<tokio::process::ChildStdin>,
    handlers: DispatcherHandlers,
    state: AtomicU8,
    capabilities: CapabilitySnapshot,
    child: tokio::sync::Mutex<Option<Child>>,
    ready: tokio::sync::watch::Sender<bool>,
}

impl LspClient {
    /// Spawns the server process and starts its reader/stderr-drain tasks.
    /// Does not perform the `initialize` handshake; call [`Self::initialize`]
    /// once the caller is ready to hand over root/capabilities.
    pub async fn spawn(config: &ServerConfig, pool: Arc<HandlerPool>) -> Result<Arc<Self>> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .current_dir(&config.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::Spawn)?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        tokio::spawn(drain_stderr(stderr));

        let (dispatcher, handlers) = Dispatcher::spawn(stdout, stdin, pool);
        let (ready, _) = tokio::sync::watch::channel(false);

        Ok(Arc::new(Self {
            dispatcher,
            handlers,
            state: AtomicU8::new(ClientState::Unstarted.tag()),
            capabilities: CapabilitySnapshot::new(),
            child: tokio::sync::Mutex::new(Some(child)),
            ready,
        }))
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_tag(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state.tag(), Ordering::Release);
    }

    /// Registers handlers for the server-initiated requests/notifications
    /// this bridge actually supports, then runs `initialize`/`initialized`.
    pub async fn initialize(
        &self,
        workspace_root: &Path,
        root_uri: Option<Uri>,
    ) -> Result<InitializeResult> {
        if self.state() != ClientState::Unstarted {
            return Err(Error::AlreadyInitialized);
        }
        self.set_state(ClientState::Initializing);
        self.install_default_handlers();

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            root_path: Some(workspace_root.display().to_string()),
            capabilities: client_capabilities(),
            initialization_options: None,
            trace: None,
            workspace_folders: None,
            client_info: Some(lsp_types::ClientInfo {
                name: "lspbridge".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
            locale: None,
        };

        let cancel = CancellationToken::new();
        let result = self
            .request::<lsp_types::request::Initialize>(params, &cancel)
            .await?;
        self.capabilities.set(result.capabilities.clone());

        self.dispatcher
            .notify(
                lsp_types::notification::Initialized::METHOD,
                serde_json::to_value(InitializedParams {})?,
            )
            .await?;

        self.set_state(ClientState::Initialized);
        info!(server = %result.server_info.as_ref().map(|i| i.name.as_str()).unwrap_or("unknown"), "language server initialized, awaiting readiness gate");
        Ok(result)
    }

    /// Drives the readiness gate: issues a benign probe, then waits until
    /// `publishDiagnostics` traffic quiesces for [`READY_QUIET_INTERVAL`] or
    /// [`READY_HARD_TIMEOUT`] elapses, whichever comes first, before opening
    /// the gate. Meant to be spawned as a background task right after
    /// [`Self::initialize`] returns; tool calls admitted via [`Self::wait_ready`]
    /// block until this completes.
    pub async fn drive_readiness(self: Arc<Self>, diagnostics: Arc<DiagnosticsCache>) {
        let cancel = CancellationToken::new();
        if let Err(e) = self
            .request::<lsp_types::request::WorkspaceSymbolRequest>(
                lsp_types::WorkspaceSymbolParams {
                    query: String::new(),
                    work_done_progress_params: Default::default(),
                    partial_result_params: Default::default(),
                },
                &cancel,
            )
            .await
        {
            debug!(error = %e, "readiness probe request failed; falling back to the diagnostics quiet-interval wait");
        }

        let deadline = tokio::time::Instant::now() + READY_HARD_TIMEOUT;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let wait_budget = READY_QUIET_INTERVAL.min(deadline - now);
            let baseline = diagnostics.generation();
            if diagnostics
                .wait_for_update(baseline, wait_budget)
                .await
                .is_none()
            {
                break;
            }
        }

        self.set_state(ClientState::Ready);
        let _ = self.ready.send(true);
        info!("language server readiness gate opened");
    }

    /// Blocks until the readiness gate has opened or `deadline` elapses.
    /// Tool calls should route through this before issuing any LSP request.
    pub async fn wait_ready(&self, deadline: Duration) -> Result<()> {
        match self.state() {
            ClientState::Ready => return Ok(()),
            ClientState::ShuttingDown | ClientState::Closed => return Err(Error::NotInitialized),
            _ => {}
        }
        let mut rx = self.ready.subscribe();
        if *rx.borrow() {
            return Ok(());
        }
        tokio::time::timeout(deadline, rx.changed())
            .await
            .map_err(|_| Error::ReadyTimeout)?
            .map_err(|_| Error::NotInitialized)?;
        Ok(())
    }

    /// Issues a graceful `shutdown`/`exit` sequence and reaps the child.
    /// Any failure past `shutdown` still proceeds to `exit` and kill, since
    /// the point of this method is to guarantee the process is gone.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.set_state(ClientState::ShuttingDown);
        let cancel = CancellationToken::new();

        let shutdown = self.request::<lsp_types::request::Shutdown>((), &cancel);
        if tokio::time::timeout(timeout, shutdown).await.is_err() {
            warn!("shutdown request timed out, proceeding to exit/kill");
        }

        let _ = self
            .dispatcher
            .notify(lsp_types::notification::Exit::METHOD, serde_json::Value::Null)
            .await;

        self.dispatcher.close();

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(status)) => debug!(?status, "language server exited"),
                _ => {
                    warn!("language server did not exit in time, killing");
                    let _ = child.kill().await;
                }
            }
        }
        self.set_state(ClientState::Closed);
        Ok(())
    }

    /// Sends a typed request and awaits the typed response.
    pub async fn request<R>(&self, params: R::Params, cancel: &CancellationToken) -> Result<R::Result>
    where
        R: LspRequest,
        R::Params: serde::Serialize,
        R::Result: serde::de::DeserializeOwned,
    {
        if self.state() == ClientState::Closed {
            return Err(Error::NotInitialized);
        }
        let raw = self
            .dispatcher
            .call(R::METHOD, serde_json::to_value(params)?, cancel)
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Sends a typed notification.
    pub async fn notify<N>(&self, params: N::Params) -> Result<()>
    where
        N: LspNotification,
        N::Params: serde::Serialize,
    {
        self.dispatcher
            .notify(N::METHOD, serde_json::to_value(params)?)
            .await?;
        Ok(())
    }

    pub fn capabilities(&self) -> &CapabilitySnapshot {
        &self.capabilities
    }

    pub fn handlers(&self) -> &DispatcherHandlers {
        &self.handlers
    }

    /// Registers the handlers every bridge session needs regardless of
    /// which tools are used: `window/workDoneProgress/create`,
    /// `client/registerCapability`/`client/unregisterCapability` (acked
    /// here with a no-op stub; callers that care about dynamic
    /// `workspace/didChangeWatchedFiles` registrations install their own
    /// handler afterwards, which replaces this stub), and
    /// `workspace/configuration` (answered with an empty array per item,
    /// since this bridge has no settings to serve).
    fn install_default_handlers(&self) {
        self.handlers
            .on_request("window/workDoneProgress/create", |_params| async move {
                Ok(serde_json::Value::Null)
            });
        self.handlers
            .on_request("client/registerCapability", |_params| async move {
                Ok(serde_json::Value::Null)
            });
        self.handlers
            .on_request("client/unregisterCapability", |_params| async move {
                Ok(serde_json::Value::Null)
            });
        self.handlers
            .on_request("workspace/configuration", |params| async move {
                let count = params
                    .get("items")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0);
                Ok(serde_json::Value::Array(vec![
                    serde_json::Value::Null;
                    count
                ]))
            });
        self.handlers
            .on_request("workspace/workspaceFolders", |_params| async move {
                Ok(serde_json::Value::Null)
            });
    }
}

async fn drain_stderr(stderr: tokio::process::ChildStderr) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "lsp::stderr", "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "error reading language server stderr");
                break;
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Rpc(lspbridge_rpc::Error::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tag_round_trips() {
        for state in [
            ClientState::Unstarted,
            ClientState::Initializing,
            ClientState::Initialized,
            ClientState::Ready,
            ClientState::ShuttingDown,
            ClientState::Closed,
        ] {
            assert_eq!(ClientState::from_tag(state.tag()), state);
        }
    }
}
