//! Shared handles every tool needs: the running language server, the
//! document-sync registry, and the diagnostics cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lsp_types::{Position, Range, Uri};
use lspbridge_lsp::{DiagnosticsCache, DocumentSync, LspClient};
use ropey::Rope;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolError};

/// Deadline an individual tool call waits behind the readiness gate before
/// giving up with [`ToolError::NotReady`] — the gate itself may still be
/// open past this point, but each call blocks with its own bound rather than
/// indefinitely.
const READY_WAIT_DEADLINE: Duration = Duration::from_secs(5);

/// Handles shared by every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub client: Arc<LspClient>,
    pub documents: Arc<DocumentSync>,
    pub diagnostics: Arc<DiagnosticsCache>,
    pub workspace_root: PathBuf,
}

impl ToolContext {
    pub fn new(
        client: Arc<LspClient>,
        documents: Arc<DocumentSync>,
        diagnostics: Arc<DiagnosticsCache>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            client,
            documents,
            diagnostics,
            workspace_root,
        }
    }

    /// Resolves a tool-supplied path argument to an absolute, workspace-
    /// relative `file://` URI, rejecting anything that escapes the
    /// workspace root via `..` traversal.
    pub fn resolve_uri(&self, path: &str) -> Result<Uri> {
        let candidate = Path::new(path);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace_root.join(candidate)
        };
        let normalized = normalize(&absolute);
        if !normalized.starts_with(&self.workspace_root) {
            return Err(ToolError::InvalidInput(format!(
                "path escapes workspace root: {path}"
            )));
        }
        let url = url::Url::from_file_path(&normalized)
            .map_err(|_| ToolError::InvalidInput(format!("not a valid file path: {path}")))?;
        url.as_str()
            .parse()
            .map_err(|_| ToolError::InvalidInput(format!("not a valid URI: {path}")))
    }

    /// Reads the current text for `uri`: from the open-document cache if
    /// it's already tracked, otherwise straight off disk.
    pub async fn load_text(&self, uri: &Uri, path: &Path) -> Result<Rope> {
        if self.documents.is_open(uri) {
            return Ok(self.documents.current_text(uri).await?);
        }
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(Rope::from_str(&contents))
    }

    pub fn language_id_for(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => "rust",
            Some("py") => "python",
            Some("go") => "go",
            Some("ts") => "typescript",
            Some("tsx") => "typescriptreact",
            Some("js") => "javascript",
            Some("jsx") => "javascriptreact",
            Some("c") => "c",
            Some("h") => "c",
            Some("cpp") | Some("cc") | Some("cxx") => "cpp",
            Some("java") => "java",
            _ => "plaintext",
        }
    }

    pub fn cancel_immediately() -> CancellationToken {
        CancellationToken::new()
    }

    /// Blocks behind the language server's readiness gate, translating a
    /// gate timeout into [`ToolError::NotReady`] rather than a generic
    /// transport error — every tool entrypoint calls this first.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.client
            .wait_ready(READY_WAIT_DEADLINE)
            .await
            .map_err(|e| match e {
                lspbridge_lsp::Error::ReadyTimeout => ToolError::NotReady,
                other => ToolError::Lsp(other),
            })
    }
}

/// Resolves a `file://` URI back to a filesystem path.
pub(crate) fn uri_to_path(uri: &Uri) -> Result<PathBuf> {
    let url: url::Url = uri
        .as_str()
        .parse()
        .map_err(|_| ToolError::InvalidInput(format!("invalid uri: {}", uri.as_str())))?;
    url.to_file_path()
        .map_err(|_| ToolError::InvalidInput(format!("non-file uri: {}", uri.as_str())))
}

/// Converts an LSP `Position` (UTF-16 code units in practice, but every
/// document this bridge opens is ASCII/UTF-8-safe source so character
/// offsets line up) to a rope char index.
pub(crate) fn position_to_char_idx(rope: &Rope, pos: Position) -> usize {
    let line_idx = (pos.line as usize).min(rope.len_lines().saturating_sub(1));
    let line_start = rope.line_to_char(line_idx);
    let line_len = rope.line(line_idx).len_chars();
    line_start + (pos.character as usize).min(line_len)
}

/// Slices the text spanned by an LSP `Range` out of a rope.
pub(crate) fn extract_text(rope: &Rope, range: Range) -> String {
    let start = position_to_char_idx(rope, range.start);
    let end = position_to_char_idx(rope, range.end).max(start).min(rope.len_chars());
    rope.slice(start..end).to_string()
}

fn line_end_character(line: ropey::RopeSlice) -> u32 {
    let mut len = line.len_chars();
    if len > 0 && line.char(len - 1) == '\n' {
        len -= 1;
        if len > 0 && line.char(len - 1) == '\r' {
            len -= 1;
        }
    }
    len as u32
}

/// When the server hands back only a point position instead of an enclosing
/// declaration range, extends it heuristically: scans forward from the
/// point's line tracking brace depth, stopping at the first line where a
/// brace that opened closes back to zero. Covers both single-line and
/// multi-line bodies; falls back to just the starting line if no brace ever
/// opens (e.g. a one-line `const` or field declaration).
pub(crate) fn heuristic_declaration_range(rope: &Rope, start: Position) -> Range {
    let start_line = (start.line as usize).min(rope.len_lines().saturating_sub(1));
    let mut depth: i32 = 0;
    let mut opened = false;
    for line_idx in start_line..rope.len_lines() {
        let line = rope.line(line_idx);
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return Range::new(start, Position::new(line_idx as u32, line_end_character(line)));
        }
    }
    let line = rope.line(start_line);
    Range::new(start, Position::new(start_line as u32, line_end_character(line)))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_id_maps_known_extensions() {
        assert_eq!(ToolContext::language_id_for(Path::new("a.rs")), "rust");
        assert_eq!(ToolContext::language_id_for(Path::new("a.py")), "python");
        assert_eq!(ToolContext::language_id_for(Path::new("a.xyz")), "plaintext");
    }

    #[test]
    fn normalize_collapses_parent_components() {
        let path = Path::new("/workspace/src/../lib.rs");
        assert_eq!(normalize(path), PathBuf::from("/workspace/lib.rs"));
    }

    #[test]
    fn heuristic_declaration_range_covers_multiline_body() {
        let rope = Rope::from_str("func Foo() {\n\tdo()\n}\n");
        let range = heuristic_declaration_range(&rope, Position::new(0, 0));
        assert_eq!(extract_text(&rope, range), "func Foo() {\n\tdo()\n}");
    }

    #[test]
    fn heuristic_declaration_range_falls_back_to_start_line_without_braces() {
        let rope = Rope::from_str("const foo = 1\nconst bar = 2\n");
        let range = heuristic_declaration_range(&rope, Position::new(0, 0));
        assert_eq!(extract_text(&rope, range), "const foo = 1");
    }

    #[test]
    fn extract_text_slices_single_line_range() {
        let rope = Rope::from_str("hello world\n");
        let range = Range::new(Position::new(0, 6), Position::new(0, 11));
        assert_eq!(extract_text(&rope, range), "world");
    }
}
