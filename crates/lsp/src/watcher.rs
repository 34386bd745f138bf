//! Workspace file watcher feeding `workspace/didChangeWatchedFiles`.
//!
//! The server tells us what to watch (via `client/registerCapability` with
//! `workspace/didChangeWatchedFiles`, or a fixed default set if it never
//! asks); we translate filesystem events the server would otherwise have to
//! poll for itself. Events are debounced ~100ms so a single editor save
//! (which can emit several raw inotify events) becomes one notification, and
//! anything `.gitignore`-excluded is dropped before it ever reaches the glob
//! match.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use lsp_types::{
    DidChangeWatchedFilesParams, FileChangeType, FileEvent, Uri,
};
use notify_debouncer_full::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::client::LspClient;
use crate::error::Result;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// A single `did-change-watched-files` registration, as requested by the
/// server via dynamic capability registration.
#[derive(Clone)]
pub struct WatcherRegistration {
    pub id: String,
    pub glob: String,
    pub kind: u8,
}

struct CompiledRegistrations {
    set: GlobSet,
    kinds: Vec<u8>,
}

fn compile(regs: &[WatcherRegistration]) -> CompiledRegistrations {
    let mut builder = GlobSetBuilder::new();
    let mut kinds = Vec::with_capacity(regs.len());
    for reg in regs {
        match Glob::new(&reg.glob) {
            Ok(glob) => {
                builder.add(glob);
                kinds.push(reg.kind);
            }
            Err(e) => warn!(glob = %reg.glob, error = %e, "ignoring invalid watch glob"),
        }
    }
    CompiledRegistrations {
        set: builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap()),
        kinds,
    }
}

/// Dynamic set of active watch registrations, swappable as the server
/// (un)registers interest at runtime.
pub struct WatcherRegistry {
    registrations: RwLock<Vec<WatcherRegistration>>,
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Watch-kind bitmask (create | change | delete), per the LSP `WatchKind`
/// bit values — used as the default registration's `kind` until/unless the
/// server dynamically registers its own narrower interest.
const DEFAULT_WATCH_KIND: u8 = 0b111;

impl WatcherRegistry {
    /// Starts with a catch-all `**/*` registration so a server that never
    /// calls `client/registerCapability` for `workspace/didChangeWatchedFiles`
    /// still gets every non-ignored change forwarded. A server that does
    /// register narrows this via `register`/`unregister` like any other.
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(vec![WatcherRegistration {
                id: "default".into(),
                glob: "**/*".into(),
                kind: DEFAULT_WATCH_KIND,
            }]),
        }
    }

    pub fn register(&self, reg: WatcherRegistration) {
        self.registrations.write().push(reg);
    }

    pub fn unregister(&self, id: &str) {
        self.registrations.write().retain(|r| r.id != id);
    }

    fn snapshot(&self) -> Vec<WatcherRegistration> {
        self.registrations.read().clone()
    }
}

/// Watches `root` for filesystem changes and forwards matching ones to
/// `client` as `workspace/didChangeWatchedFiles` notifications.
pub struct WorkspaceWatcher {
    _debouncer: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::RecommendedCache,
    >,
}

impl WorkspaceWatcher {
    pub fn start(
        root: PathBuf,
        registry: Arc<WatcherRegistry>,
        client: Arc<LspClient>,
    ) -> Result<Self> {
        let walk_root = root.clone();
        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => handle_events(&walk_root, events, &registry, &client),
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "workspace watcher error");
                    }
                }
            },
        )
        .map_err(|e| crate::error::Error::Rpc(lspbridge_rpc::Error::Protocol(e.to_string())))?;

        debouncer
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| crate::error::Error::Rpc(lspbridge_rpc::Error::Protocol(e.to_string())))?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

fn handle_events(
    root: &Path,
    events: Vec<notify_debouncer_full::DebouncedEvent>,
    registry: &WatcherRegistry,
    client: &Arc<LspClient>,
) {
    let regs = registry.snapshot();
    if regs.is_empty() {
        return;
    }
    let compiled = compile(&regs);
    let mut ignore_builder = ignore::gitignore::GitignoreBuilder::new(root);
    ignore_builder.add(root.join(".gitignore"));
    let gitignore = ignore_builder.build().unwrap_or_else(|_| {
        ignore::gitignore::GitignoreBuilder::new(root).build().unwrap()
    });

    let mut changes = Vec::new();
    for event in events {
        for path in &event.paths {
            if gitignore.matched(path, path.is_dir()).is_ignore() {
                continue;
            }
            let matches: Vec<usize> = compiled.set.matches(path);
            if matches.is_empty() {
                continue;
            }
            let Some(uri) = path_to_uri(path) else {
                continue;
            };
            let change_type = match event.event.kind {
                notify_debouncer_full::notify::EventKind::Create(_) => FileChangeType::CREATED,
                notify_debouncer_full::notify::EventKind::Remove(_) => FileChangeType::DELETED,
                _ => FileChangeType::CHANGED,
            };
            changes.push(FileEvent {
                uri,
                typ: change_type,
            });
        }
    }

    if changes.is_empty() {
        return;
    }
    debug!(count = changes.len(), "forwarding watched file changes");
    let client = client.clone();
    tokio::spawn(async move {
        let _ = client
            .notify::<lsp_types::notification::DidChangeWatchedFiles>(
                DidChangeWatchedFilesParams { changes },
            )
            .await;
    });
}

fn path_to_uri(path: &Path) -> Option<Uri> {
    let url = url::Url::from_file_path(path).ok()?;
    url.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_register_and_unregister() {
        let registry = WatcherRegistry::new();
        registry.register(WatcherRegistration {
            id: "a".into(),
            glob: "**/*.rs".into(),
            kind: 7,
        });
        assert_eq!(registry.snapshot().len(), 1);
        registry.unregister("a");
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn compile_skips_invalid_glob() {
        let compiled = compile(&[WatcherRegistration {
            id: "a".into(),
            glob: "[".into(),
            kind: 1,
        }]);
        assert_eq!(compiled.kinds.len(), 0);
    }

    #[test]
    fn compile_matches_rust_files() {
        let compiled = compile(&[WatcherRegistration {
            id: "a".into(),
            glob: "**/*.rs".into(),
            kind: 7,
        }]);
        assert!(!compiled.set.matches("src/main.rs").is_empty());
        assert!(compiled.set.matches("src/main.py").is_empty());
    }
}
