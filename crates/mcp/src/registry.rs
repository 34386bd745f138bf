//! Tool registration and dispatch table: the JSON Schema each tool
//! advertises via `tools/list`, and the glue that turns a `tools/call`
//! argument object into a `lspbridge_tools` function call.

use lspbridge_tools::ToolContext;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// A single advertised tool: its schema plus a dispatch closure.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "definition",
            description: "Resolve a symbol's declaration site, either by (path, line, character) or by symbol_name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "line": {"type": "integer", "minimum": 0},
                    "character": {"type": "integer", "minimum": 0},
                    "symbol_name": {"type": "string"}
                },
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "references",
            description: "Find every reference to the symbol at a position",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "line": {"type": "integer", "minimum": 0},
                    "character": {"type": "integer", "minimum": 0},
                    "include_declaration": {"type": "boolean", "default": false}
                },
                "required": ["path", "line", "character"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "hover",
            description: "Show type/doc information for the symbol at a position",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "line": {"type": "integer", "minimum": 0},
                    "character": {"type": "integer", "minimum": 0}
                },
                "required": ["path", "line", "character"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "diagnostics",
            description: "Get current diagnostics for a file, each rendered with surrounding source context",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "context_lines": {"type": "integer", "minimum": 0, "default": 2},
                    "show_line_numbers": {"type": "boolean", "default": true}
                },
                "required": ["path"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "rename_symbol",
            description: "Rename the symbol at a position across the workspace",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "line": {"type": "integer", "minimum": 0},
                    "character": {"type": "integer", "minimum": 0},
                    "new_name": {"type": "string"}
                },
                "required": ["path", "line", "character", "new_name"],
                "additionalProperties": false
            }),
        },
        ToolSpec {
            name: "edit_file",
            description: "Replace 1-indexed, inclusive line ranges in a file",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "edits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "start_line": {"type": "integer", "minimum": 1},
                                "end_line": {"type": "integer", "minimum": 1},
                                "new_text": {"type": "string"}
                            },
                            "required": ["start_line", "end_line", "new_text"]
                        }
                    }
                },
                "required": ["path", "edits"],
                "additionalProperties": false
            }),
        },
    ]
}

/// Executes a named tool against decoded JSON arguments, returning the
/// MCP-facing JSON result.
pub async fn dispatch(ctx: &ToolContext, name: &str, arguments: Value) -> Result<Value> {
    match name {
        "definition" => {
            #[derive(serde::Deserialize)]
            struct Args {
                path: Option<String>,
                line: Option<u32>,
                character: Option<u32>,
                symbol_name: Option<String>,
            }
            let args: Args = serde_json::from_value(arguments)?;
            let position = match (args.line, args.character) {
                (Some(l), Some(c)) => Some((l, c)),
                _ => None,
            };
            let hits = lspbridge_tools::definition::definition(
                ctx,
                args.path.as_deref(),
                position,
                args.symbol_name.as_deref(),
            )
            .await?;
            Ok(serde_json::to_value(hits)?)
        }
        "references" => {
            #[derive(serde::Deserialize)]
            struct Args {
                path: String,
                line: u32,
                character: u32,
                #[serde(default)]
                include_declaration: bool,
            }
            let args: Args = serde_json::from_value(arguments)?;
            let locations = lspbridge_tools::references::references(
                ctx,
                &args.path,
                args.line,
                args.character,
                args.include_declaration,
            )
            .await?;
            Ok(serde_json::to_value(locations)?)
        }
        "hover" => {
            #[derive(serde::Deserialize)]
            struct Args {
                path: String,
                line: u32,
                character: u32,
            }
            let args: Args = serde_json::from_value(arguments)?;
            let text = lspbridge_tools::hover::hover(ctx, &args.path, args.line, args.character).await?;
            Ok(json!({ "contents": text }))
        }
        "diagnostics" => {
            fn default_context_lines() -> u32 {
                2
            }
            fn default_show_line_numbers() -> bool {
                true
            }

            #[derive(serde::Deserialize)]
            struct Args {
                path: String,
                #[serde(default = "default_context_lines")]
                context_lines: u32,
                #[serde(default = "default_show_line_numbers")]
                show_line_numbers: bool,
            }
            let args: Args = serde_json::from_value(arguments)?;
            let diags = lspbridge_tools::diagnostics::diagnostics(
                ctx,
                &args.path,
                args.context_lines,
                args.show_line_numbers,
            )
            .await?;
            Ok(serde_json::to_value(diags)?)
        }
        "rename_symbol" => {
            #[derive(serde::Deserialize)]
            struct Args {
                path: String,
                line: u32,
                character: u32,
                new_name: String,
            }
            let args: Args = serde_json::from_value(arguments)?;
            let outcome = lspbridge_tools::rename::rename_symbol(
                ctx,
                &args.path,
                args.line,
                args.character,
                &args.new_name,
            )
            .await?;
            Ok(json!({
                "files_changed": outcome.files_changed.iter().map(|p| p.display().to_string()).collect::<Vec<_>>()
            }))
        }
        "edit_file" => {
            #[derive(serde::Deserialize)]
            struct Args {
                path: String,
                edits: Vec<lspbridge_tools::edit_file::LineEdit>,
            }
            let args: Args = serde_json::from_value(arguments)?;
            let outcome = lspbridge_tools::edit_file::edit_file(ctx, &args.path, args.edits).await?;
            Ok(json!({ "diff": outcome.diff }))
        }
        other => Err(Error::UnknownTool(other.to_string())),
    }
}
