//! The fixed `ClientCapabilities` payload this bridge advertises on
//! `initialize`, plus the readiness gate that watches what the server
//! actually replied with.

use arc_swap::ArcSwapOption;
use lsp_types::{
    ClientCapabilities, DiagnosticClientCapabilities, DocumentSymbolClientCapabilities,
    DynamicRegistrationClientCapabilities, GeneralClientCapabilities,
    GotoCapability, HoverClientCapabilities, MarkupKind, PublishDiagnosticsClientCapabilities,
    RenameClientCapabilities, ServerCapabilities, SynchronizationClientCapabilities,
    TextDocumentClientCapabilities, TextDocumentSyncClientCapabilities, WorkspaceClientCapabilities,
    WorkspaceEditClientCapabilities,
};

/// Builds the capability set this bridge advertises to every language
/// server it spawns. Kept deliberately narrow: only what the `tools` crate
/// actually exercises (definition, references, hover, rename, diagnostics,
/// file watching), so a server's feature negotiation isn't misled into
/// offering things we'd never call.
pub fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(SynchronizationClientCapabilities {
                dynamic_registration: Some(false),
                will_save: Some(false),
                will_save_wait_until: Some(false),
                did_save: Some(true),
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(false),
                prepare_support: Some(true),
                prepare_support_default_behavior: None,
                honors_change_annotations: Some(false),
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                tag_support: None,
                version_support: Some(true),
                code_description_support: Some(true),
                data_support: Some(true),
            }),
            diagnostic: Some(DiagnosticClientCapabilities {
                dynamic_registration: Some(false),
                related_document_support: Some(true),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                resource_operations: Some(vec![]),
                failure_handling: None,
                normalizes_line_endings: Some(true),
                change_annotation_support: None,
            }),
            did_change_watched_files: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            symbol: None,
            ..Default::default()
        }),
        general: Some(GeneralClientCapabilities {
            position_encodings: None,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Lock-free snapshot of a server's advertised [`ServerCapabilities`],
/// published once on `initialize` and read on every subsequent tool call to
/// gate unsupported requests up front.
#[derive(Default)]
pub struct CapabilitySnapshot {
    inner: ArcSwapOption<ServerCapabilities>,
}

impl CapabilitySnapshot {
    pub fn new() -> Self {
        Self {
            inner: ArcSwapOption::empty(),
        }
    }

    pub fn set(&self, caps: ServerCapabilities) {
        self.inner.store(Some(std::sync::Arc::new(caps)));
    }

    pub fn get(&self) -> Option<std::sync::Arc<ServerCapabilities>> {
        self.inner.load_full()
    }

    pub fn supports_rename(&self) -> bool {
        self.get()
            .map(|c| c.rename_provider.is_some())
            .unwrap_or(false)
    }

    pub fn supports_hover(&self) -> bool {
        self.get()
            .map(|c| c.hover_provider.is_some())
            .unwrap_or(false)
    }

    pub fn supports_definition(&self) -> bool {
        self.get()
            .map(|c| c.definition_provider.is_some())
            .unwrap_or(false)
    }

    pub fn supports_references(&self) -> bool {
        self.get()
            .map(|c| c.references_provider.is_some())
            .unwrap_or(false)
    }

    pub fn supports_pull_diagnostics(&self) -> bool {
        self.get()
            .map(|c| c.diagnostic_provider.is_some())
            .unwrap_or(false)
    }

    /// The document sync mode the server declared, defaulting to `FULL`
    /// (this bridge's baseline behavior) when the server's `initialize`
    /// response hasn't been recorded yet or left the field unset.
    pub fn text_document_sync_kind(&self) -> lsp_types::TextDocumentSyncKind {
        self.get()
            .and_then(|c| c.text_document_sync.clone())
            .map(|sync| match sync {
                lsp_types::TextDocumentSyncCapability::Kind(kind) => kind,
                lsp_types::TextDocumentSyncCapability::Options(opts) => opts
                    .change
                    .unwrap_or(lsp_types::TextDocumentSyncKind::FULL),
            })
            .unwrap_or(lsp_types::TextDocumentSyncKind::FULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_starts_empty() {
        let snap = CapabilitySnapshot::new();
        assert!(snap.get().is_none());
        assert!(!snap.supports_rename());
    }

    #[test]
    fn snapshot_reflects_published_capabilities() {
        let snap = CapabilitySnapshot::new();
        snap.set(ServerCapabilities {
            rename_provider: Some(lsp_types::OneOf::Left(true)),
            ..Default::default()
        });
        assert!(snap.supports_rename());
        assert!(!snap.supports_hover());
    }

    #[test]
    fn sync_kind_defaults_to_full_when_unset() {
        let snap = CapabilitySnapshot::new();
        assert_eq!(
            snap.text_document_sync_kind(),
            lsp_types::TextDocumentSyncKind::FULL
        );
        snap.set(ServerCapabilities::default());
        assert_eq!(
            snap.text_document_sync_kind(),
            lsp_types::TextDocumentSyncKind::FULL
        );
    }

    #[test]
    fn sync_kind_reflects_none_from_options_form() {
        let snap = CapabilitySnapshot::new();
        snap.set(ServerCapabilities {
            text_document_sync: Some(lsp_types::TextDocumentSyncCapability::Options(
                lsp_types::TextDocumentSyncOptions {
                    change: Some(lsp_types::TextDocumentSyncKind::NONE),
                    ..Default::default()
                },
            )),
            ..Default::default()
        });
        assert_eq!(
            snap.text_document_sync_kind(),
            lsp_types::TextDocumentSyncKind::NONE
        );
    }

    #[test]
    fn definition_and_references_follow_their_own_providers() {
        let snap = CapabilitySnapshot::new();
        snap.set(ServerCapabilities {
            definition_provider: Some(lsp_types::OneOf::Left(true)),
            ..Default::default()
        });
        assert!(snap.supports_definition());
        assert!(!snap.supports_references());
    }
}
