// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Parameter encoding and result decoding for each protocol verb.

use lsp_types::{
    ClientCapabilities, ClientInfo, CompletionClientCapabilities, CompletionItem,
    CompletionParams, CompletionResponse, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, ExecuteCommandParams,
    HoverClientCapabilities, HoverParams, InitializeParams, NumberOrString, PartialResultParams,
    Position, ProgressToken, TextDocumentClientCapabilities, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams,
    TextDocumentSyncClientCapabilities, Uri, VersionedTextDocumentIdentifier,
    WindowClientCapabilities, WorkDoneProgressParams, WorkspaceClientCapabilities,
    WorkspaceFolder,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};

/// Handshake request.
pub const INITIALIZE: &str = "initialize";
/// Handshake acknowledgement.
pub const INITIALIZED: &str = "initialized";
/// Document opened.
pub const DID_OPEN: &str = "textDocument/didOpen";
/// Document content replaced.
pub const DID_CHANGE: &str = "textDocument/didChange";
/// Document saved.
pub const DID_SAVE: &str = "textDocument/didSave";
/// Document closed.
pub const DID_CLOSE: &str = "textDocument/didClose";
/// Server-side command execution.
pub const EXECUTE_COMMAND: &str = "workspace/executeCommand";
/// Completion query.
pub const COMPLETION: &str = "textDocument/completion";
/// Hover query.
pub const HOVER: &str = "textDocument/hover";
/// Graceful shutdown request.
pub const SHUTDOWN: &str = "shutdown";
/// Final notification after `shutdown`.
pub const EXIT: &str = "exit";

/// Who the client is and which workspace it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Client name sent in `clientInfo`.
    pub client_name: String,
    /// Client version sent in `clientInfo`.
    pub client_version: String,
    /// Workspace folder name.
    pub workspace_name: String,
    /// Workspace folder URI, e.g. `file:///home/me/project`.
    pub workspace_uri: String,
}

impl Identity {
    /// Bundles the four handshake strings.
    pub fn new(
        client_name: impl Into<String>,
        client_version: impl Into<String>,
        workspace_name: impl Into<String>,
        workspace_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            client_version: client_version.into(),
            workspace_name: workspace_name.into(),
            workspace_uri: workspace_uri.into(),
        }
    }
}

/// Parses a document or workspace URI.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if the string is not a valid URI.
pub fn parse_uri(uri: &str) -> Result<Uri> {
    uri.parse().map_err(|e| SessionError::InvalidUri {
        uri: uri.to_string(),
        reason: format!("{e}"),
    })
}

/// A fresh work-done token. Each call gets its own so progress reports
/// from concurrent calls can be told apart.
#[must_use]
pub fn progress_token() -> ProgressToken {
    NumberOrString::String(uuid::Uuid::new_v4().to_string())
}

fn work_done() -> WorkDoneProgressParams {
    WorkDoneProgressParams {
        work_done_token: Some(progress_token()),
    }
}

/// Serializes typed params into the JSON carried by an envelope.
///
/// # Errors
///
/// Returns [`SessionError::Encode`] if serialization fails.
pub fn encode<P: Serialize>(method: &str, params: &P) -> Result<Value> {
    serde_json::to_value(params).map_err(|source| SessionError::Encode {
        method: method.to_string(),
        source,
    })
}

/// Deserializes a call result into its typed shape.
///
/// # Errors
///
/// Returns [`SessionError::Decode`] if the value does not fit `R`.
pub fn decode<R: DeserializeOwned>(method: &str, value: Value) -> Result<R> {
    serde_json::from_value(value).map_err(|source| SessionError::Decode {
        method: method.to_string(),
        source,
    })
}

/// Builds `initialize` params announcing the client and its single workspace.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if the workspace URI does not parse.
pub fn initialize(identity: &Identity) -> Result<InitializeParams> {
    let workspace_uri = parse_uri(&identity.workspace_uri)?;

    Ok(InitializeParams {
        process_id: Some(std::process::id()),
        client_info: Some(ClientInfo {
            name: identity.client_name.clone(),
            version: Some(identity.client_version.clone()),
        }),
        capabilities: ClientCapabilities {
            text_document: Some(TextDocumentClientCapabilities {
                synchronization: Some(TextDocumentSyncClientCapabilities {
                    did_save: Some(true),
                    ..Default::default()
                }),
                completion: Some(CompletionClientCapabilities::default()),
                hover: Some(HoverClientCapabilities::default()),
                ..Default::default()
            }),
            window: Some(WindowClientCapabilities {
                work_done_progress: Some(true),
                ..Default::default()
            }),
            workspace: Some(WorkspaceClientCapabilities {
                workspace_folders: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        },
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: workspace_uri,
            name: identity.workspace_name.clone(),
        }]),
        ..Default::default()
    })
}

/// `textDocument/didOpen` params.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if `uri` does not parse.
pub fn did_open(
    uri: &str,
    language: &str,
    version: i32,
    text: &str,
) -> Result<DidOpenTextDocumentParams> {
    Ok(DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: parse_uri(uri)?,
            language_id: language.to_string(),
            version,
            text: text.to_string(),
        },
    })
}

/// `textDocument/didChange` params replacing the whole document.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if `uri` does not parse.
pub fn did_change(uri: &str, version: i32, text: &str) -> Result<DidChangeTextDocumentParams> {
    Ok(DidChangeTextDocumentParams {
        text_document: VersionedTextDocumentIdentifier {
            uri: parse_uri(uri)?,
            version,
        },
        content_changes: vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: text.to_string(),
        }],
    })
}

/// `textDocument/didSave` params carrying the saved text.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if `uri` does not parse.
pub fn did_save(uri: &str, text: &str) -> Result<DidSaveTextDocumentParams> {
    Ok(DidSaveTextDocumentParams {
        text_document: TextDocumentIdentifier { uri: parse_uri(uri)? },
        text: Some(text.to_string()),
    })
}

/// `textDocument/didClose` params.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if `uri` does not parse.
pub fn did_close(uri: &str) -> Result<DidCloseTextDocumentParams> {
    Ok(DidCloseTextDocumentParams {
        text_document: TextDocumentIdentifier { uri: parse_uri(uri)? },
    })
}

/// `workspace/executeCommand` params. Arguments pass through untouched.
#[must_use]
pub fn execute_command(command: &str, arguments: Vec<Value>) -> ExecuteCommandParams {
    ExecuteCommandParams {
        command: command.to_string(),
        arguments,
        work_done_progress_params: work_done(),
    }
}

fn position(uri: &str, line: u32, character: u32) -> Result<TextDocumentPositionParams> {
    Ok(TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: parse_uri(uri)? },
        position: Position { line, character },
    })
}

/// `textDocument/completion` params.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if `uri` does not parse.
pub fn completion(uri: &str, line: u32, character: u32) -> Result<CompletionParams> {
    Ok(CompletionParams {
        text_document_position: position(uri, line, character)?,
        work_done_progress_params: work_done(),
        partial_result_params: PartialResultParams::default(),
        context: None,
    })
}

/// `textDocument/hover` params.
///
/// # Errors
///
/// Returns [`SessionError::InvalidUri`] if `uri` does not parse.
pub fn hover(uri: &str, line: u32, character: u32) -> Result<HoverParams> {
    Ok(HoverParams {
        text_document_position_params: position(uri, line, character)?,
        work_done_progress_params: work_done(),
    })
}

/// Flattens the three legal completion answers (array, list, `null`).
#[must_use]
pub fn completion_items(response: Option<CompletionResponse>) -> Vec<CompletionItem> {
    match response {
        Some(CompletionResponse::Array(items)) => items,
        Some(CompletionResponse::List(list)) => list.items,
        None => Vec::new(),
    }
}
