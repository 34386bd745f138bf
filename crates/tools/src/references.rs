//! `references` tool: all usages of the symbol at a given position.

use std::collections::HashMap;

use lsp_types::request::References;
use lsp_types::{
    Location, PartialResultParams, Position, ReferenceContext, ReferenceParams,
    TextDocumentIdentifier, TextDocumentPositionParams, Uri, WorkDoneProgressParams,
};
use ropey::Rope;
use serde::Serialize;

use crate::context::{uri_to_path, ToolContext};
use crate::error::{Result, ToolError};

/// A single usage site, with one line of source as context.
#[derive(Debug, Serialize)]
pub struct ReferenceOccurrence {
    pub range: lsp_types::Range,
    pub line_text: String,
}

/// All usages within one file, grouped together.
#[derive(Debug, Serialize)]
pub struct ReferenceGroup {
    pub uri: Uri,
    pub occurrences: Vec<ReferenceOccurrence>,
}

pub async fn references(
    ctx: &ToolContext,
    path: &str,
    line: u32,
    character: u32,
    include_declaration: bool,
) -> Result<Vec<ReferenceGroup>> {
    ctx.ensure_ready().await?;
    if !ctx.client.capabilities().supports_references() {
        return Err(ToolError::Unsupported("references"));
    }

    let uri = ctx.resolve_uri(path)?;
    let fs_path = std::path::Path::new(path);
    let text = ctx.load_text(&uri, fs_path).await?;
    ctx.documents
        .ensure_open(&uri, ToolContext::language_id_for(fs_path), &text)
        .await?;

    let cancel = ToolContext::cancel_immediately();
    let response = ctx
        .client
        .request::<References>(
            ReferenceParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: Position { line, character },
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
                context: ReferenceContext {
                    include_declaration,
                },
            },
            &cancel,
        )
        .await?;

    group_by_file(ctx, response.unwrap_or_default()).await
}

/// Groups reference locations by file (preserving first-seen file order)
/// and attaches a one-line source-context snippet to each occurrence.
async fn group_by_file(ctx: &ToolContext, locations: Vec<Location>) -> Result<Vec<ReferenceGroup>> {
    let mut order: Vec<Uri> = Vec::new();
    let mut by_uri: HashMap<String, Vec<Location>> = HashMap::new();
    for loc in locations {
        let key = loc.uri.as_str().to_string();
        if !by_uri.contains_key(&key) {
            order.push(loc.uri.clone());
        }
        by_uri.entry(key).or_default().push(loc);
    }

    let mut groups = Vec::with_capacity(order.len());
    for uri in order {
        let locs = by_uri.remove(uri.as_str()).unwrap_or_default();
        let fs_path = uri_to_path(&uri)?;
        let text = ctx.load_text(&uri, &fs_path).await?;
        let occurrences = locs
            .into_iter()
            .map(|loc| ReferenceOccurrence {
                line_text: line_context(&text, loc.range.start.line),
                range: loc.range,
            })
            .collect();
        groups.push(ReferenceGroup { uri, occurrences });
    }
    Ok(groups)
}

fn line_context(rope: &Rope, line: u32) -> String {
    let idx = (line as usize).min(rope.len_lines().saturating_sub(1));
    rope.line(idx)
        .to_string()
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_context_strips_trailing_newline() {
        let rope = Rope::from_str("fn foo() {}\nfn bar() {}\n");
        assert_eq!(line_context(&rope, 0), "fn foo() {}");
        assert_eq!(line_context(&rope, 1), "fn bar() {}");
    }

    #[test]
    fn line_context_clamps_out_of_range_line() {
        let rope = Rope::from_str("only line\n");
        assert_eq!(line_context(&rope, 5), "only line");
    }
}
