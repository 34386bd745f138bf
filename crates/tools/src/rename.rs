//! `rename_symbol` tool: renames every reference to a symbol across the
//! workspace. Applies the server's `WorkspaceEdit` to disk atomically —
//! either every touched file is rewritten, or (on any failure) every file
//! already rewritten is restored from its pre-edit snapshot.

use std::collections::HashMap;
use std::path::PathBuf;

use lsp_types::request::Rename;
use lsp_types::{
    OneOf, Position, RenameParams, TextDocumentIdentifier, TextDocumentPositionParams, TextEdit,
    Uri, WorkDoneProgressParams, WorkspaceEdit,
};

use crate::context::ToolContext;
use crate::error::{Result, ToolError};

pub struct RenameOutcome {
    pub files_changed: Vec<PathBuf>,
}

pub async fn rename_symbol(
    ctx: &ToolContext,
    path: &str,
    line: u32,
    character: u32,
    new_name: &str,
) -> Result<RenameOutcome> {
    ctx.ensure_ready().await?;
    if !ctx.client.capabilities().supports_rename() {
        return Err(ToolError::Unsupported("rename"));
    }
    let uri = ctx.resolve_uri(path)?;
    let fs_path = std::path::Path::new(path);
    let text = ctx.load_text(&uri, fs_path).await?;
    ctx.documents
        .ensure_open(&uri, ToolContext::language_id_for(fs_path), &text)
        .await?;

    let cancel = ToolContext::cancel_immediately();
    let edit = ctx
        .client
        .request::<Rename>(
            RenameParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: Position { line, character },
                },
                new_name: new_name.to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
            },
            &cancel,
        )
        .await?
        .ok_or_else(|| ToolError::ApplyEditFailed("server returned no edit".into()))?;

    apply_workspace_edit(ctx, edit).await
}

async fn apply_workspace_edit(ctx: &ToolContext, edit: WorkspaceEdit) -> Result<RenameOutcome> {
    let per_file = collect_edits(edit)?;

    let mut backups: Vec<(PathBuf, String)> = Vec::new();
    let mut changed = Vec::new();

    for (uri, edits) in per_file {
        let fs_path = uri_to_path(&uri)?;
        let result = apply_one_file(&fs_path, &edits).await;
        match result {
            Ok((original, updated)) => {
                if ctx.documents.is_open(&uri) {
                    if let Err(e) = ctx
                        .documents
                        .change_document(&uri, ropey::Rope::from_str(&updated))
                        .await
                    {
                        tracing::warn!(%uri, error = %e, "failed to sync renamed document into the open-document cache");
                    }
                }
                backups.push((fs_path.clone(), original));
                changed.push(fs_path);
            }
            Err(e) => {
                rollback(&backups).await;
                return Err(e);
            }
        }
    }

    Ok(RenameOutcome {
        files_changed: changed,
    })
}

fn collect_edits(edit: WorkspaceEdit) -> Result<HashMap<Uri, Vec<TextEdit>>> {
    if let Some(changes) = edit.changes {
        return Ok(changes);
    }
    if let Some(doc_changes) = edit.document_changes {
        let mut out = HashMap::new();
        match doc_changes {
            lsp_types::DocumentChanges::Edits(edits) => {
                for e in edits {
                    out.entry(e.text_document.uri)
                        .or_insert_with(Vec::new)
                        .extend(e.edits.into_iter().filter_map(|e| match e {
                            OneOf::Left(edit) => Some(edit),
                            OneOf::Right(annotated) => Some(TextEdit {
                                range: annotated.text_edit.range,
                                new_text: annotated.text_edit.new_text,
                            }),
                        }));
                }
            }
            lsp_types::DocumentChanges::Operations(_) => {
                return Err(ToolError::Unsupported(
                    "rename producing file create/rename/delete operations",
                ));
            }
        }
        return Ok(out);
    }
    Ok(HashMap::new())
}

fn uri_to_path(uri: &Uri) -> Result<PathBuf> {
    let url: url::Url = uri
        .as_str()
        .parse()
        .map_err(|_| ToolError::InvalidInput(format!("invalid uri in workspace edit: {uri}")))?;
    url.to_file_path()
        .map_err(|_| ToolError::InvalidInput(format!("non-file uri in workspace edit: {uri}")))
}

/// Applies edits to one file's text and writes it, returning the file's
/// pre-edit content (so the caller can restore it if a later file fails)
/// alongside the text actually written. Edits are applied in descending
/// (line, character) order so earlier offsets in the same file are
/// unaffected by later edits.
async fn apply_one_file(path: &std::path::Path, edits: &[TextEdit]) -> Result<(String, String)> {
    let original = tokio::fs::read_to_string(path).await?;
    let mut rope = ropey::Rope::from_str(&original);

    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| {
        b.range
            .start
            .line
            .cmp(&a.range.start.line)
            .then(b.range.start.character.cmp(&a.range.start.character))
    });

    for edit in sorted {
        let start = position_to_char_idx(&rope, edit.range.start);
        let end = position_to_char_idx(&rope, edit.range.end);
        rope.remove(start..end);
        rope.insert(start, &edit.new_text);
    }

    let updated = rope.to_string();
    tokio::fs::write(path, &updated).await?;
    Ok((original, updated))
}

fn position_to_char_idx(rope: &ropey::Rope, pos: lsp_types::Position) -> usize {
    let line_idx = (pos.line as usize).min(rope.len_lines().saturating_sub(1));
    let line_start = rope.line_to_char(line_idx);
    line_start + pos.character as usize
}

async fn rollback(backups: &[(PathBuf, String)]) {
    for (path, original) in backups {
        if let Err(e) = tokio::fs::write(path, original).await {
            tracing::error!(path = %path.display(), error = %e, "failed to roll back file during rename rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Range;

    #[test]
    fn position_to_char_idx_accounts_for_line_offsets() {
        let rope = ropey::Rope::from_str("abc\ndef\n");
        let idx = position_to_char_idx(&rope, lsp_types::Position::new(1, 2));
        assert_eq!(idx, 4 + 2);
    }

    #[tokio::test]
    async fn rollback_restores_already_written_files_on_later_failure() {
        // Mirrors what `apply_workspace_edit` does when file N+1 fails to
        // write after files 1..=N already succeeded: the backups collected
        // from the successful writes must bring every file back to its
        // pre-edit content.
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.ts");
        tokio::fs::write(&a_path, "export const foo = 1;\n")
            .await
            .unwrap();

        let (original, _updated) = apply_one_file(
            &a_path,
            &[TextEdit {
                range: Range::new(
                    lsp_types::Position::new(0, 13),
                    lsp_types::Position::new(0, 16),
                ),
                new_text: "bar".into(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(original, "export const foo = 1;\n");
        assert_eq!(
            tokio::fs::read_to_string(&a_path).await.unwrap(),
            "export const bar = 1;\n"
        );

        // b.ts's write would fail here (e.g. its parent directory vanished
        // mid-rename); the caller rolls back every file already written.
        rollback(&[(a_path.clone(), original)]).await;

        let restored = tokio::fs::read_to_string(&a_path).await.unwrap();
        assert_eq!(
            restored, "export const foo = 1;\n",
            "a.ts must be rolled back once a later file's write fails"
        );
    }

    #[tokio::test]
    async fn apply_one_file_rewrites_in_descending_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "hello world\n").await.unwrap();

        let edits = vec![
            TextEdit {
                range: Range::new(
                    lsp_types::Position::new(0, 0),
                    lsp_types::Position::new(0, 5),
                ),
                new_text: "HELLO".into(),
            },
            TextEdit {
                range: Range::new(
                    lsp_types::Position::new(0, 6),
                    lsp_types::Position::new(0, 11),
                ),
                new_text: "WORLD".into(),
            },
        ];

        let (original, updated) = apply_one_file(&file, &edits).await.unwrap();
        assert_eq!(original, "hello world\n");
        assert_eq!(updated, "HELLO WORLD\n");
        let result = tokio::fs::read_to_string(&file).await.unwrap();
        assert_eq!(result, "HELLO WORLD\n");
    }
}
