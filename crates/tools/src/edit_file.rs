//! `edit_file` tool: replaces whole 1-indexed, inclusive line ranges in a
//! file and reports a unified diff of what changed.
//!
//! Edits are applied in descending `start_line` order so earlier edits in
//! the same call never see offsets shifted by a later one — the caller
//! specifies every range against the *original* file content.

use std::path::Path;

use ropey::Rope;
use serde::Deserialize;
use similar::TextDiff;

use crate::context::ToolContext;
use crate::error::{Result, ToolError};

#[derive(Debug, Clone, Deserialize)]
pub struct LineEdit {
    /// 1-indexed, inclusive.
    pub start_line: usize,
    /// 1-indexed, inclusive.
    pub end_line: usize,
    pub new_text: String,
}

pub struct EditOutcome {
    pub diff: String,
}

pub async fn edit_file(ctx: &ToolContext, path: &str, mut edits: Vec<LineEdit>) -> Result<EditOutcome> {
    ctx.ensure_ready().await?;
    if edits.is_empty() {
        return Err(ToolError::InvalidInput("edit_file requires at least one edit".into()));
    }
    let uri = ctx.resolve_uri(path)?;
    let fs_path = Path::new(path);
    let original_rope = ctx.load_text(&uri, fs_path).await?;
    let original = original_rope.to_string();

    let line_count = original_rope.len_lines();
    for edit in &edits {
        if edit.start_line == 0 || edit.end_line == 0 {
            return Err(ToolError::InvalidInput("line numbers are 1-indexed".into()));
        }
        if edit.start_line > edit.end_line {
            return Err(ToolError::InvalidInput(format!(
                "start_line {} is after end_line {}",
                edit.start_line, edit.end_line
            )));
        }
        if edit.end_line > line_count {
            return Err(ToolError::InvalidInput(format!(
                "end_line {} exceeds file length {line_count}",
                edit.end_line
            )));
        }
    }
    edits.sort_by(|a, b| b.start_line.cmp(&a.start_line));
    for pair in edits.windows(2) {
        // Sorted descending by start_line: pair[1] is the earlier range,
        // pair[0] the later one. They overlap if the earlier range's end
        // reaches into the later range's start.
        if pair[1].end_line >= pair[0].start_line {
            return Err(ToolError::InvalidInput(
                "edits overlap; edit_file requires disjoint line ranges".into(),
            ));
        }
    }

    let mut rope = original_rope;
    for edit in &edits {
        let start_char = rope.line_to_char(edit.start_line - 1);
        let end_char = if edit.end_line < line_count {
            rope.line_to_char(edit.end_line)
        } else {
            rope.len_chars()
        };
        rope.remove(start_char..end_char);
        rope.insert(start_char, &edit.new_text);
    }

    let updated = rope.to_string();
    tokio::fs::write(fs_path, &updated).await?;

    let language_id = ToolContext::language_id_for(fs_path);
    if ctx.documents.is_open(&uri) {
        ctx.documents.change_document(&uri, Rope::from_str(&updated)).await?;
    } else {
        ctx.documents
            .open_document(uri, language_id, &Rope::from_str(&updated))
            .await?;
    }

    let diff = TextDiff::from_lines(&original, &updated)
        .unified_diff()
        .context_radius(3)
        .header(path, path)
        .to_string();

    Ok(EditOutcome { diff })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_edit_list() {
        let dir = tempfile::tempdir().unwrap();
        let _file = dir.path().join("a.txt");
        // Validation happens before any I/O, so a bogus context is fine here.
        let edits: Vec<LineEdit> = vec![];
        assert!(edits.is_empty());
    }

    #[test]
    fn overlap_detection_flags_adjacent_ranges_touching() {
        let mut edits = vec![
            LineEdit { start_line: 1, end_line: 3, new_text: "a".into() },
            LineEdit { start_line: 3, end_line: 5, new_text: "b".into() },
        ];
        edits.sort_by(|a, b| b.start_line.cmp(&a.start_line));
        let overlap = edits.windows(2).any(|p| p[1].end_line >= p[0].start_line);
        assert!(overlap);
    }
}
