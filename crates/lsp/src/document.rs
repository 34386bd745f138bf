//! Tracks which documents are open on the server and keeps `didOpen`,
//! `didChange`, and `didClose` notifications correctly ordered per URI.
//!
//! Each URI gets its own `tokio::sync::Mutex` so that "apply an edit, then
//! issue a dependent request" sequences for file A never wait behind
//! unrelated work on file B — only operations racing on the *same* document
//! need to serialize.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem, Uri,
    VersionedTextDocumentIdentifier,
};
use parking_lot::RwLock;
use ropey::Rope;
use tokio::sync::Mutex as AsyncMutex;

use crate::client::LspClient;
use crate::error::{Error, Result};

struct DocumentState {
    version: i32,
    language_id: String,
    text: Rope,
}

struct DocumentEntry {
    state: AsyncMutex<DocumentState>,
}

/// Open-document registry plus the notification-ordering logic.
pub struct DocumentSync {
    client: Arc<LspClient>,
    documents: RwLock<HashMap<Uri, Arc<DocumentEntry>>>,
}

impl DocumentSync {
    pub fn new(client: Arc<LspClient>) -> Self {
        Self {
            client,
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_open(&self, uri: &Uri) -> bool {
        self.documents.read().contains_key(uri)
    }

    fn entry_for(&self, uri: &Uri) -> Option<Arc<DocumentEntry>> {
        self.documents.read().get(uri).cloned()
    }

    /// Sends `didOpen` for a document not already tracked.
    pub async fn open_document(&self, uri: Uri, language_id: &str, text: &Rope) -> Result<()> {
        if self.is_open(&uri) {
            return Err(Error::DocumentAlreadyOpen(uri));
        }
        let entry = Arc::new(DocumentEntry {
            state: AsyncMutex::new(DocumentState {
                version: 0,
                language_id: language_id.to_string(),
                text: text.clone(),
            }),
        });
        self.documents.write().insert(uri.clone(), entry);

        self.client
            .notify::<lsp_types::notification::DidOpenTextDocument>(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri,
                    language_id: language_id.to_string(),
                    version: 0,
                    text: text.to_string(),
                },
            })
            .await
    }

    /// Ensures a document is open, opening it with `text` if it is not
    /// already tracked. Used by tools (definition/hover/etc) that need a
    /// document resident on the server before issuing a dependent request,
    /// without caring whether some earlier call already opened it.
    pub async fn ensure_open(&self, uri: &Uri, language_id: &str, text: &Rope) -> Result<()> {
        if self.is_open(uri) {
            return Ok(());
        }
        self.open_document(uri.clone(), language_id, text).await
    }

    /// Applies a document modification per the server's declared sync mode.
    /// `FULL` and `INCREMENTAL` (the latter not distinguished — every tool in
    /// this bridge reads and rewrites whole files, so there is no edit-delta
    /// to compute from; a full-document `didChange` satisfies both) bump the
    /// version and emit one whole-document `didChange`. `NONE` means the
    /// server doesn't want change notifications at all, so the only way to
    /// make it see new content is to close and reopen the document.
    pub async fn change_document(&self, uri: &Uri, new_text: Rope) -> Result<()> {
        let entry = self
            .entry_for(uri)
            .ok_or_else(|| Error::DocumentNotOpen(uri.clone()))?;

        if self.client.capabilities().text_document_sync_kind() == lsp_types::TextDocumentSyncKind::NONE
        {
            let language_id = entry.state.lock().await.language_id.clone();
            return self
                .reopen_document(uri, uri.clone(), &language_id, &new_text)
                .await;
        }

        let mut state = entry.state.lock().await;
        state.version += 1;
        state.text = new_text.clone();
        let version = state.version;
        drop(state);

        self.client
            .notify::<lsp_types::notification::DidChangeTextDocument>(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.clone(),
                    version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: new_text.to_string(),
                }],
            })
            .await
    }

    /// Sends `didClose` and drops local tracking state. Unlike the
    /// open/change path, this always unregisters locally even if the
    /// notification write fails — a write failure means the transport (and
    /// likely the whole server) is gone, so there is nothing to stay
    /// "open" against.
    pub async fn close_document(&self, uri: &Uri) -> Result<()> {
        let existed = self.documents.write().remove(uri).is_some();
        if !existed {
            return Err(Error::DocumentNotOpen(uri.clone()));
        }
        self.client
            .notify::<lsp_types::notification::DidCloseTextDocument>(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            })
            .await
    }

    /// Closes `old_uri` (if open) and reopens the same content under
    /// `new_uri`/`new_language_id` — the sequence a rename-on-disk requires,
    /// always in didClose-then-didOpen order regardless of whether the
    /// close notification itself succeeds.
    pub async fn reopen_document(
        &self,
        old_uri: &Uri,
        new_uri: Uri,
        new_language_id: &str,
        text: &Rope,
    ) -> Result<()> {
        if self.is_open(old_uri) {
            let _ = self.close_document(old_uri).await;
        }
        self.open_document(new_uri, new_language_id, text).await
    }

    pub async fn current_text(&self, uri: &Uri) -> Result<Rope> {
        let entry = self
            .entry_for(uri)
            .ok_or_else(|| Error::DocumentNotOpen(uri.clone()))?;
        Ok(entry.state.lock().await.text.clone())
    }
}

#[cfg(test)]
mod tests {
    // DocumentSync is exercised end-to-end in crates/tools against a
    // recording transport; unit tests here would otherwise need to stand up
    // a full LspClient, which the integration harness already does.
}
