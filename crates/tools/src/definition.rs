//! `definition` tool: resolves a symbol position (or, failing that, a
//! symbol name searched via `workspace/symbol`) to its declaration site.

use lsp_types::request::{GotoDefinition, WorkspaceSymbolRequest};
use lsp_types::{
    GotoDefinitionParams, GotoDefinitionResponse, Location, PartialResultParams, Position,
    TextDocumentIdentifier, TextDocumentPositionParams, Uri, WorkDoneProgressParams,
    WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use serde::Serialize;

use crate::context::{extract_text, heuristic_declaration_range, uri_to_path, ToolContext};
use crate::error::{Result, ToolError};

#[derive(Debug, Serialize)]
pub struct DefinitionHit {
    pub uri: Uri,
    pub range: lsp_types::Range,
    /// The declaration's source text — the enclosing range the server gave
    /// us (`LocationLink::target_range`) when it gave us one, else a
    /// brace-balance extension from the point position.
    pub text: String,
}

/// A location candidate before its declaration text has been fetched:
/// `point_range` is where the server says the symbol itself sits,
/// `enclosing_range` is the broader declaration range when the server
/// supplied one (only `LocationLink` responses carry this distinction).
struct RawHit {
    uri: Uri,
    point_range: lsp_types::Range,
    enclosing_range: Option<lsp_types::Range>,
}

/// Looks up a definition either by exact cursor position, or — when no
/// position is given — by resolving `symbol_name` through
/// `workspace/symbol` and picking the best-ranked match.
///
/// Ranking for the name-based path: exact (case-sensitive) name match
/// first, then case-insensitive match, then substring match; ties broken by
/// shorter containing-file path, on the reasoning that a shorter path is
/// more likely to be the primary definition than a re-export or generated
/// file deep in a vendor tree.
pub async fn definition(
    ctx: &ToolContext,
    path: Option<&str>,
    position: Option<(u32, u32)>,
    symbol_name: Option<&str>,
) -> Result<Vec<DefinitionHit>> {
    ctx.ensure_ready().await?;
    if !ctx.client.capabilities().supports_definition() {
        return Err(ToolError::Unsupported("definition"));
    }

    let raw = match (path, position) {
        (Some(path), Some((line, character))) => by_position(ctx, path, line, character).await?,
        _ => {
            let name = symbol_name.ok_or_else(|| {
                ToolError::InvalidInput(
                    "definition requires either (path, position) or symbol_name".into(),
                )
            })?;
            by_symbol_name(ctx, name).await?
        }
    };

    resolve_hits(ctx, raw).await
}

async fn by_position(
    ctx: &ToolContext,
    path: &str,
    line: u32,
    character: u32,
) -> Result<Vec<RawHit>> {
    let uri = ctx.resolve_uri(path)?;
    let fs_path = std::path::Path::new(path);
    let text = ctx.load_text(&uri, fs_path).await?;
    ctx.documents
        .ensure_open(&uri, ToolContext::language_id_for(fs_path), &text)
        .await?;

    let cancel = ToolContext::cancel_immediately();
    let response = ctx
        .client
        .request::<GotoDefinition>(
            GotoDefinitionParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    position: Position { line, character },
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            },
            &cancel,
        )
        .await?;

    Ok(flatten_response(response))
}

async fn by_symbol_name(ctx: &ToolContext, name: &str) -> Result<Vec<RawHit>> {
    let cancel = ToolContext::cancel_immediately();
    let response = ctx
        .client
        .request::<WorkspaceSymbolRequest>(
            WorkspaceSymbolParams {
                query: name.to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            },
            &cancel,
        )
        .await?;

    let mut candidates: Vec<(u8, usize, RawHit)> = match response {
        Some(WorkspaceSymbolResponse::Flat(symbols)) => symbols
            .into_iter()
            .map(|s| {
                let rank = rank_name(&s.name, name);
                let path_len = s.location.uri.as_str().len();
                (
                    rank,
                    path_len,
                    RawHit {
                        uri: s.location.uri,
                        point_range: s.location.range,
                        enclosing_range: None,
                    },
                )
            })
            .collect(),
        Some(WorkspaceSymbolResponse::Nested(symbols)) => symbols
            .into_iter()
            .filter_map(|s| {
                let rank = rank_name(&s.name, name);
                match s.location {
                    lsp_types::OneOf::Left(loc) => {
                        let path_len = loc.uri.as_str().len();
                        Some((
                            rank,
                            path_len,
                            RawHit {
                                uri: loc.uri,
                                point_range: loc.range,
                                enclosing_range: None,
                            },
                        ))
                    }
                    lsp_types::OneOf::Right(_) => None,
                }
            })
            .collect(),
        None => Vec::new(),
    };

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    Ok(candidates.into_iter().map(|(_, _, hit)| hit).collect())
}

/// Fetches each candidate's file and extracts the declaration text: the
/// server's own enclosing range when it gave one, else a heuristic
/// brace-balance extension from the point position.
async fn resolve_hits(ctx: &ToolContext, raw: Vec<RawHit>) -> Result<Vec<DefinitionHit>> {
    let mut hits = Vec::with_capacity(raw.len());
    for candidate in raw {
        let fs_path = uri_to_path(&candidate.uri)?;
        let text = ctx.load_text(&candidate.uri, &fs_path).await?;
        let range = candidate
            .enclosing_range
            .unwrap_or_else(|| heuristic_declaration_range(&text, candidate.point_range.start));
        hits.push(DefinitionHit {
            uri: candidate.uri,
            text: extract_text(&text, range),
            range,
        });
    }
    Ok(hits)
}

fn rank_name(candidate: &str, query: &str) -> u8 {
    if candidate == query {
        0
    } else if candidate.eq_ignore_ascii_case(query) {
        1
    } else if candidate.contains(query) {
        2
    } else {
        3
    }
}

fn flatten_response(response: Option<GotoDefinitionResponse>) -> Vec<RawHit> {
    match response {
        Some(GotoDefinitionResponse::Scalar(loc)) => vec![to_hit(loc)],
        Some(GotoDefinitionResponse::Array(locs)) => locs.into_iter().map(to_hit).collect(),
        Some(GotoDefinitionResponse::Link(links)) => links
            .into_iter()
            .map(|l| RawHit {
                uri: l.target_uri,
                point_range: l.target_selection_range,
                enclosing_range: Some(l.target_range),
            })
            .collect(),
        None => Vec::new(),
    }
}

fn to_hit(loc: Location) -> RawHit {
    RawHit {
        uri: loc.uri,
        point_range: loc.range,
        enclosing_range: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_name_prefers_exact_then_insensitive_then_substring() {
        assert_eq!(rank_name("Foo", "Foo"), 0);
        assert_eq!(rank_name("foo", "Foo"), 1);
        assert_eq!(rank_name("FooBar", "Foo"), 2);
        assert_eq!(rank_name("Baz", "Foo"), 3);
    }
}
