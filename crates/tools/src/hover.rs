//! `hover` tool: type/doc info at a position.

use lsp_types::request::HoverRequest;
use lsp_types::{
    HoverParams, Position, TextDocumentIdentifier, TextDocumentPositionParams,
    WorkDoneProgressParams,
};

use crate::context::ToolContext;
use crate::error::{Result, ToolError};

pub async fn hover(ctx: &ToolContext, path: &str, line: u32, character: u32) -> Result<String> {
    ctx.ensure_ready().await?;
    if !ctx.client.capabilities().supports_hover() {
        return Err(ToolError::Unsupported("hover"));
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
        .request::<HoverRequest>(
            HoverParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: Position { line, character },
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
            },
            &cancel,
        )
        .await?;

    Ok(response
        .map(|h| render_hover_contents(h.contents))
        .unwrap_or_default())
}

fn render_hover_contents(contents: lsp_types::HoverContents) -> String {
    use lsp_types::{HoverContents, MarkedString};
    match contents {
        HoverContents::Scalar(MarkedString::String(s)) => s,
        HoverContents::Scalar(MarkedString::LanguageString(ls)) => ls.value,
        HoverContents::Array(items) => items
            .into_iter()
            .map(|item| match item {
                MarkedString::String(s) => s,
                MarkedString::LanguageString(ls) => ls.value,
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}
