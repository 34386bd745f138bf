//! `diagnostics` tool: current diagnostics for a file, pulled from the
//! server's `textDocument/diagnostic` when it supports pull diagnostics,
//! otherwise served from the push-notification cache populated by
//! `textDocument/publishDiagnostics`, each rendered with configurable
//! surrounding source context.

use std::time::Duration;

use lsp_types::request::DocumentDiagnosticRequest;
use lsp_types::{
    DocumentDiagnosticParams, DocumentDiagnosticReportResult, FullDocumentDiagnosticReport,
    PartialResultParams, TextDocumentIdentifier, WorkDoneProgressParams,
};
use ropey::Rope;
use serde::Serialize;

use crate::context::ToolContext;
use crate::error::Result;

const FRESHNESS_WAIT: Duration = Duration::from_millis(300);

/// A diagnostic paired with the surrounding source lines it's rendered
/// against.
#[derive(Debug, Serialize)]
pub struct RenderedDiagnostic {
    pub diagnostic: lsp_types::Diagnostic,
    pub context: String,
}

pub async fn diagnostics(
    ctx: &ToolContext,
    path: &str,
    context_lines: u32,
    show_line_numbers: bool,
) -> Result<Vec<RenderedDiagnostic>> {
    ctx.ensure_ready().await?;

    let uri = ctx.resolve_uri(path)?;
    let fs_path = std::path::Path::new(path);
    let text = ctx.load_text(&uri, fs_path).await?;
    ctx.documents
        .ensure_open(&uri, ToolContext::language_id_for(fs_path), &text)
        .await?;

    let diags = if ctx.client.capabilities().supports_pull_diagnostics() {
        let cancel = ToolContext::cancel_immediately();
        let result = ctx
            .client
            .request::<DocumentDiagnosticRequest>(
                DocumentDiagnosticParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    identifier: None,
                    previous_result_id: None,
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    partial_result_params: PartialResultParams::default(),
                },
                &cancel,
            )
            .await?;
        extract_pulled(result)
    } else {
        // Only wait for a fresh publish if nothing is cached yet — a caller
        // polling repeatedly after the first fetch shouldn't pay the wait
        // every time.
        let cached = ctx.diagnostics.get(&uri);
        if cached.is_empty() {
            let baseline = ctx.diagnostics.generation();
            ctx.diagnostics
                .wait_for_update(baseline, FRESHNESS_WAIT)
                .await;
            ctx.diagnostics.get(&uri)
        } else {
            cached
        }
    };

    Ok(diags
        .into_iter()
        .map(|d| render(&text, d, context_lines, show_line_numbers))
        .collect())
}

fn render(
    text: &Rope,
    diagnostic: lsp_types::Diagnostic,
    context_lines: u32,
    show_line_numbers: bool,
) -> RenderedDiagnostic {
    let last_line = text.len_lines().saturating_sub(1) as u32;
    let first = diagnostic.range.start.line.saturating_sub(context_lines);
    let last = (diagnostic.range.end.line + context_lines).min(last_line);

    let mut context = String::new();
    for line_idx in first..=last {
        let line = text.line(line_idx as usize).to_string();
        let line = line.trim_end_matches(['\n', '\r']);
        if show_line_numbers {
            context.push_str(&format!("{:>5} | {line}\n", line_idx + 1));
        } else {
            context.push_str(line);
            context.push('\n');
        }
    }

    RenderedDiagnostic { diagnostic, context }
}

fn extract_pulled(result: DocumentDiagnosticReportResult) -> Vec<lsp_types::Diagnostic> {
    match result {
        DocumentDiagnosticReportResult::Report(report) => match report {
            lsp_types::DocumentDiagnosticReport::Full(full) => {
                full_items(full.full_document_diagnostic_report)
            }
            lsp_types::DocumentDiagnosticReport::Unchanged(_) => Vec::new(),
        },
        DocumentDiagnosticReportResult::Partial(_) => Vec::new(),
    }
}

fn full_items(report: FullDocumentDiagnosticReport) -> Vec<lsp_types::Diagnostic> {
    report.items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic_at(start_line: u32, end_line: u32) -> lsp_types::Diagnostic {
        lsp_types::Diagnostic {
            range: lsp_types::Range::new(
                lsp_types::Position::new(start_line, 0),
                lsp_types::Position::new(end_line, 0),
            ),
            ..lsp_types::Diagnostic::default()
        }
    }

    #[test]
    fn render_includes_surrounding_context_lines() {
        let text = Rope::from_str("a\nb\nc\nd\ne\n");
        let rendered = render(&text, diagnostic_at(2, 2), 1, false);
        assert_eq!(rendered.context, "b\nc\nd\n");
    }

    #[test]
    fn render_shows_line_numbers_when_requested() {
        let text = Rope::from_str("a\nb\nc\n");
        let rendered = render(&text, diagnostic_at(1, 1), 0, true);
        assert_eq!(rendered.context, "    2 | b\n");
    }

    #[test]
    fn render_clamps_to_file_bounds() {
        let text = Rope::from_str("only\n");
        let rendered = render(&text, diagnostic_at(0, 0), 5, false);
        assert_eq!(rendered.context, "only\n");
    }
}
