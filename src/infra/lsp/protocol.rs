//! JSON-RPC 2.0 Protocol Implementation for LSP
//!
//! Envelope types plus the subset of LSP request/response shapes symlens consumes.
//! Domain types (Position, Range, TextEdit, WorkspaceEdit) live in models/lsp.rs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

pub use crate::models::lsp::{Position, Range, TextEdit, WorkspaceEdit};

// ============================================================================
// JSON-RPC 2.0 Core Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Successful reply; `result` is always serialized, `null` included.
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Request ID - can be number or string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ResponseError {}

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // LSP-specific error codes
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const CONTENT_MODIFIED: i32 = -32801;

    /// Synthesized locally when the connection drops with calls in flight
    pub const SERVER_TERMINATED: i32 = -32099;
}

/// Incoming message from LSP server
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Request(Request),
    Notification(Notification),
}

impl Message {
    pub fn parse(body: &[u8]) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        let has_method = value.get("method").is_some();

        match (has_id, has_method) {
            (true, true) => Ok(Message::Request(serde_json::from_value(value)?)),
            (_, false) if value.get("result").is_some() || value.get("error").is_some() => {
                Ok(Message::Response(serde_json::from_value(value)?))
            }
            (false, true) => Ok(Message::Notification(serde_json::from_value(value)?)),
            _ => {
                use serde::de::Error;
                Err(serde_json::Error::custom("Invalid LSP message"))
            }
        }
    }
}

// ============================================================================
// LSP Initialize Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

impl TextDocumentIdentifier {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentPositionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub uri: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub process_id: Option<u32>,
    pub root_uri: Option<String>,
    pub capabilities: ClientCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowClientCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_document: Option<TextDocumentClientCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceClientCapabilities>,
}

impl ClientCapabilities {
    /// Capabilities for symbol discovery, navigation and rename.
    pub fn symbol_navigation() -> Self {
        use serde_json::json;

        Self {
            window: Some(WindowClientCapabilities {
                work_done_progress: Some(true),
            }),
            text_document: Some(TextDocumentClientCapabilities {
                synchronization: Some(json!({ "didSave": true, "dynamicRegistration": false })),
                hover: Some(json!({ "contentFormat": ["markdown", "plaintext"] })),
                definition: Some(json!({ "linkSupport": true })),
                references: Some(json!({})),
                document_symbol: Some(json!({
                    "hierarchicalDocumentSymbolSupport": true,
                    "symbolKind": { "valueSet": (1..=26).collect::<Vec<u32>>() }
                })),
                rename: Some(json!({ "prepareSupport": false })),
            }),
            workspace: Some(WorkspaceClientCapabilities {
                workspace_edit: Some(json!({ "documentChanges": true })),
                workspace_folders: Some(true),
                configuration: Some(true),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WindowClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_done_progress: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronization: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_symbol: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_edit: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_folders: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<bool>,
}

/// Server capabilities (from initialize response)
///
/// Providers are `bool | options`, kept as raw values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_document_sync: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover_provider: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_provider: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references_provider: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_symbol_provider: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_provider: Option<Value>,
}

fn provider_enabled(provider: &Option<Value>) -> bool {
    !matches!(provider, None | Some(Value::Null) | Some(Value::Bool(false)))
}

impl ServerCapabilities {
    pub fn supports(&self, feature: &str) -> bool {
        match feature {
            "documentSymbolProvider" => provider_enabled(&self.document_symbol_provider),
            "hoverProvider" => provider_enabled(&self.hover_provider),
            "definitionProvider" => provider_enabled(&self.definition_provider),
            "referencesProvider" => provider_enabled(&self.references_provider),
            "renameProvider" => provider_enabled(&self.rename_provider),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ============================================================================
// Document Synchronization
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenTextDocumentParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentContentChangeEvent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeTextDocumentParams {
    pub text_document: crate::models::lsp::VersionedTextDocumentIdentifier,
    pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

// ============================================================================
// Request Params
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbolParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceContext {
    pub include_declaration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceParams {
    #[serde(flatten)]
    pub position: TextDocumentPositionParams,
    pub context: ReferenceContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    #[serde(flatten)]
    pub position: TextDocumentPositionParams,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationParams {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// `window/logMessage` severity
#[derive(Debug, Clone, Copy, Serialize_repr, Deserialize_repr, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
    Debug = 5,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    #[serde(rename = "type")]
    pub typ: MessageType,
    pub message: String,
}

// ============================================================================
// LSP Symbol Types
// ============================================================================

/// Location in a document (LSP wire format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspLocation {
    pub uri: String,
    /// Required by LSP but omitted by a few servers
    #[serde(default)]
    pub range: Range,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    pub target_uri: String,
    pub target_range: Range,
    pub target_selection_range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_selection_range: Option<Range>,
}

impl LocationLink {
    pub fn to_location(&self) -> LspLocation {
        LspLocation {
            uri: self.target_uri.clone(),
            range: self.target_selection_range,
        }
    }
}

/// `textDocument/definition` result shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GotoDefinitionResponse {
    Scalar(LspLocation),
    Array(Vec<LspLocation>),
    Links(Vec<LocationLink>),
}

impl GotoDefinitionResponse {
    pub fn into_locations(self) -> Vec<LspLocation> {
        match self {
            Self::Scalar(location) => vec![location],
            Self::Array(locations) => locations,
            Self::Links(links) => links.iter().map(LocationLink::to_location).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbol {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Raw LSP kind number; unknown values map to `Variable` on conversion
    pub kind: u32,
    pub range: Range,
    pub selection_range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DocumentSymbol>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInformation {
    pub name: String,
    pub kind: u32,
    pub location: LspLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// `textDocument/documentSymbol` result shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentSymbolResponse {
    Nested(Vec<DocumentSymbol>),
    Flat(Vec<SymbolInformation>),
}

// ============================================================================
// LSP Hover Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hover {
    pub contents: HoverContents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoverContents {
    Markup(MarkupContent),
    Scalar(MarkedString),
    Array(Vec<MarkedString>),
}

impl HoverContents {
    /// Flatten to display text, joining multiple parts with blank lines.
    pub fn to_text(&self) -> String {
        match self {
            Self::Markup(markup) => markup.value.clone(),
            Self::Scalar(marked) => marked.text().to_string(),
            Self::Array(parts) => parts
                .iter()
                .map(MarkedString::text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupContent {
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkedString {
    String(String),
    LanguageString { language: String, value: String },
}

impl MarkedString {
    pub fn text(&self) -> &str {
        match self {
            Self::String(s) => s,
            Self::LanguageString { value, .. } => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::new(1, "initialize", Some(serde_json::json!({})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn test_null_result_reply_is_serialized() {
        let resp = Response::ok(RequestId::Number(3), Value::Null);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\":null"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_message_dispatch() {
        let resp = Message::parse(br#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(matches!(resp, Message::Response(_)));

        let req = Message::parse(
            br#"{"jsonrpc":"2.0","id":"a","method":"workspace/configuration","params":{}}"#,
        )
        .unwrap();
        assert!(matches!(req, Message::Request(r) if r.id == RequestId::String("a".into())));

        let note = Message::parse(br#"{"jsonrpc":"2.0","method":"window/logMessage"}"#).unwrap();
        assert!(matches!(note, Message::Notification(_)));

        assert!(Message::parse(br#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(Message::parse(b"not json").is_err());
    }

    #[test]
    fn test_error_response() {
        let json =
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let Message::Response(resp) = Message::parse(json).unwrap() else {
            panic!("expected response");
        };
        assert!(!resp.is_success());
        assert_eq!(resp.into_result().unwrap_err().code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_definition_response_shapes() {
        let scalar: GotoDefinitionResponse = serde_json::from_str(
            r#"{"uri":"file:///a.tf","range":{"start":{"line":1,"character":0},"end":{"line":1,"character":3}}}"#,
        )
        .unwrap();
        assert_eq!(scalar.into_locations().len(), 1);

        let links: GotoDefinitionResponse = serde_json::from_str(
            r#"[{"targetUri":"file:///b.tf",
                "targetRange":{"start":{"line":0,"character":0},"end":{"line":5,"character":1}},
                "targetSelectionRange":{"start":{"line":0,"character":9},"end":{"line":0,"character":12}}}]"#,
        )
        .unwrap();
        let locations = links.into_locations();
        assert_eq!(locations[0].uri, "file:///b.tf");
        assert_eq!(locations[0].range.start.character, 9);
    }

    #[test]
    fn test_document_symbol_response_shapes() {
        let nested: DocumentSymbolResponse = serde_json::from_str(
            r#"[{"name":"a","kind":5,
                "range":{"start":{"line":0,"character":0},"end":{"line":2,"character":1}},
                "selectionRange":{"start":{"line":0,"character":6},"end":{"line":0,"character":7}}}]"#,
        )
        .unwrap();
        assert!(matches!(nested, DocumentSymbolResponse::Nested(_)));

        let flat: DocumentSymbolResponse = serde_json::from_str(
            r#"[{"name":"a","kind":12,"containerName":"m",
                "location":{"uri":"file:///a.py","range":{"start":{"line":0,"character":0},"end":{"line":1,"character":0}}}}]"#,
        )
        .unwrap();
        assert!(matches!(flat, DocumentSymbolResponse::Flat(_)));
    }

    #[test]
    fn test_capability_checks() {
        let caps: ServerCapabilities = serde_json::from_str(
            r#"{"documentSymbolProvider":{"label":"x"},"renameProvider":false}"#,
        )
        .unwrap();
        assert!(caps.supports("documentSymbolProvider"));
        assert!(!caps.supports("renameProvider"));
        assert!(!caps.supports("hoverProvider"));
    }

    #[test]
    fn test_hover_contents_text() {
        let hover: Hover =
            serde_json::from_str(r#"{"contents":{"kind":"markdown","value":"**x**"}}"#).unwrap();
        assert_eq!(hover.contents.to_text(), "**x**");

        let hover: Hover = serde_json::from_str(
            r#"{"contents":["plain",{"language":"hcl","value":"var x"}]}"#,
        )
        .unwrap();
        assert_eq!(hover.contents.to_text(), "plain\n\nvar x");
    }

    #[test]
    fn test_log_message_type() {
        let params: LogMessageParams =
            serde_json::from_str(r#"{"type":2,"message":"careful"}"#).unwrap();
        assert_eq!(params.typ, MessageType::Warning);
    }
}
