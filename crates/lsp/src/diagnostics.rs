//! Caches the most recent diagnostics per URI, sourced from either
//! server-pushed `textDocument/publishDiagnostics` notifications or a pulled
//! `textDocument/diagnostic` response, and lets callers wait for a fresh
//! batch after an edit.

use std::collections::HashMap;
use std::time::Instant;

use lsp_types::{Diagnostic, Uri};
use parking_lot::RwLock;
use tokio::sync::watch;

struct Entry {
    diagnostics: Vec<Diagnostic>,
    received_at: Instant,
}

/// Diagnostics are published per-URI with no ordering guarantee relative to
/// other URIs, so the cache itself needs no cross-URI locking — only a
/// consistent read/write pair per entry, which `RwLock<HashMap<..>>` gives
/// us directly.
pub struct DiagnosticsCache {
    entries: RwLock<HashMap<Uri, Entry>>,
    updates: watch::Sender<u64>,
    generation: std::sync::atomic::AtomicU64,
}

impl Default for DiagnosticsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            updates: tx,
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Records a fresh batch of diagnostics for `uri`, replacing whatever was
    /// cached before, and wakes anyone waiting on [`Self::wait_for_update`].
    pub fn update(&self, uri: Uri, diagnostics: Vec<Diagnostic>) {
        self.entries.write().insert(
            uri,
            Entry {
                diagnostics,
                received_at: Instant::now(),
            },
        );
        let gen = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        let _ = self.updates.send(gen);
    }

    pub fn get(&self, uri: &Uri) -> Vec<Diagnostic> {
        self.entries
            .read()
            .get(uri)
            .map(|e| e.diagnostics.clone())
            .unwrap_or_default()
    }

    pub fn age(&self, uri: &Uri) -> Option<std::time::Duration> {
        self.entries.read().get(uri).map(|e| e.received_at.elapsed())
    }

    /// Blocks until at least one diagnostics update (for any URI) has been
    /// recorded since `since`, or `timeout` elapses. Used by the
    /// `diagnostics` tool to wait briefly for a just-edited file's fresh
    /// results rather than returning a stale cache entry.
    pub async fn wait_for_update(&self, since: u64, timeout: std::time::Duration) -> Option<u64> {
        let mut rx = self.updates.subscribe();
        let current = *rx.borrow();
        if current != since {
            return Some(current);
        }
        tokio::time::timeout(timeout, rx.changed()).await.ok()?;
        Some(*rx.borrow())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{DiagnosticSeverity, Position, Range};

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn diag(message: &str) -> Diagnostic {
        Diagnostic {
            range: Range::new(Position::new(0, 0), Position::new(0, 1)),
            severity: Some(DiagnosticSeverity::ERROR),
            message: message.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn get_on_unknown_uri_is_empty() {
        let cache = DiagnosticsCache::new();
        assert!(cache.get(&uri("file:///a.rs")).is_empty());
    }

    #[test]
    fn update_replaces_entry() {
        let cache = DiagnosticsCache::new();
        let u = uri("file:///a.rs");
        cache.update(u.clone(), vec![diag("first")]);
        assert_eq!(cache.get(&u).len(), 1);
        cache.update(u.clone(), vec![diag("a"), diag("b")]);
        assert_eq!(cache.get(&u).len(), 2);
    }

    #[tokio::test]
    async fn wait_for_update_resolves_on_new_generation() {
        let cache = DiagnosticsCache::new();
        let baseline = cache.generation();
        cache.update(uri("file:///a.rs"), vec![diag("x")]);
        let result = cache
            .wait_for_update(baseline, std::time::Duration::from_millis(50))
            .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn wait_for_update_times_out_without_new_data() {
        let cache = DiagnosticsCache::new();
        let baseline = cache.generation();
        let result = cache
            .wait_for_update(baseline, std::time::Duration::from_millis(20))
            .await;
        assert!(result.is_none());
    }
}
