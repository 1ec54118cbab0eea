//! LSP Common Types
//!
//! Positions, ranges and edits shared by the protocol layer and the editor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ============================================================================
// Core LSP Types
// ============================================================================

/// Position within a document (0-indexed, LSP standard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Convert 1-indexed CLI input to 0-indexed LSP position
    pub fn from_cli(line: u32, column: u32) -> Self {
        Self {
            line: line.saturating_sub(1),
            character: column.saturating_sub(1),
        }
    }

    /// Convert 0-indexed LSP position to 1-indexed display position
    pub fn to_display(&self) -> (u32, u32) {
        (self.line + 1, self.character + 1)
    }
}

/// Range within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line, 0),
        }
    }

    pub fn point(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

// ============================================================================
// Text Edit Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    pub fn new(range: Range, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedTextDocumentIdentifier {
    pub uri: String,
    #[serde(default)]
    pub version: Option<i32>,
}

/// One entry of `documentChanges`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentEdit {
    pub text_document: VersionedTextDocumentIdentifier,
    pub edits: Vec<TextEdit>,
}

/// `documentChanges` may mix text edits with create/rename/delete operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentChange {
    Edit(TextDocumentEdit),
    Other(serde_json::Value),
}

/// Workspace-wide edit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEdit {
    /// URI to TextEdit[] mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<HashMap<String, Vec<TextEdit>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<Vec<DocumentChange>>,
}

impl WorkspaceEdit {
    /// Text edits grouped per file URI.
    ///
    /// When `documentChanges` is present it supersedes `changes`. Resource
    /// operations are not text edits; see [`WorkspaceEdit::resource_operations`].
    pub fn edits_by_uri(&self) -> HashMap<String, Vec<TextEdit>> {
        let Some(document_changes) = &self.document_changes else {
            return self.changes.clone().unwrap_or_default();
        };

        let mut by_uri: HashMap<String, Vec<TextEdit>> = HashMap::new();
        for change in document_changes {
            if let DocumentChange::Edit(doc_edit) = change {
                by_uri
                    .entry(doc_edit.text_document.uri.clone())
                    .or_default()
                    .extend(doc_edit.edits.iter().cloned());
            }
        }
        by_uri
    }

    /// Create, rename and delete operations, as `"<kind> <uri>"`
    pub fn resource_operations(&self) -> Vec<String> {
        self.document_changes
            .iter()
            .flatten()
            .filter_map(|change| match change {
                DocumentChange::Edit(_) => None,
                DocumentChange::Other(op) => {
                    let field = |name: &str| op.get(name).and_then(|v| v.as_str());
                    let kind = field("kind").unwrap_or("unknown");
                    let target = field("uri").or_else(|| field("oldUri")).unwrap_or("?");
                    Some(format!("{} {}", kind, target))
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.edits_by_uri().values().all(|edits| edits.is_empty())
    }

    /// Extract per-file change summaries
    pub fn to_file_changes(&self) -> Vec<FileChange> {
        let mut changes: Vec<FileChange> = self
            .edits_by_uri()
            .into_iter()
            .map(|(uri, edits)| FileChange {
                file: uri_to_path(&uri),
                edit_count: edits.len(),
            })
            .collect();
        changes.sort_by(|a, b| a.file.cmp(&b.file));
        changes
    }
}

/// Per-file change summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file: PathBuf,
    pub edit_count: usize,
}

// ============================================================================
// Hover Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverInfo {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

// ============================================================================
// URI Utilities
// ============================================================================

/// `C:`, `C:/…` or `C:\…`
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Convert a file path to a `file://` URI.
///
/// Relative paths are resolved against the current directory. Drive-letter paths are
/// treated as absolute on every platform and get a leading `/` (`file:///C:/…`).
pub fn path_to_uri(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let abs_path = if path.is_absolute() || has_drive_prefix(&raw) {
        raw.into_owned()
    } else {
        std::env::current_dir()
            .unwrap_or_default()
            .join(path)
            .to_string_lossy()
            .into_owned()
    };

    let mut normalized = abs_path.replace('\\', "/");
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }

    let encoded: String = normalized
        .chars()
        .map(|c| match c {
            '/' | '.' | '-' | '_' | '~' | ':' => c.to_string(),
            c if c.is_ascii_alphanumeric() => c.to_string(),
            c => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect();

    format!("file://{encoded}")
}

/// Convert a `file://` URI back to a path.
///
/// `file:///C:/x` yields `C:/x` regardless of the host platform.
pub fn uri_to_path(uri: &str) -> PathBuf {
    let path = match uri.strip_prefix("file://") {
        Some(p) => p,
        None => {
            tracing::warn!("Invalid file URI (missing file:// prefix): {}", uri);
            return PathBuf::from(uri);
        }
    };

    let decoded = percent_decode(path);
    let path = match decoded.strip_prefix('/') {
        Some(rest) if has_drive_prefix(rest) => rest,
        _ => decoded.as_str(),
    };

    if cfg!(windows) {
        PathBuf::from(path.replace('/', "\\"))
    } else {
        PathBuf::from(path)
    }
}

fn percent_decode(input: &str) -> String {
    let mut result = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();

    while let Some(byte) = bytes.next() {
        if byte == b'%' {
            let mut lookahead = bytes.clone();
            let high = lookahead.next().and_then(hex_value);
            let low = lookahead.next().and_then(hex_value);
            if let (Some(h), Some(l)) = (high, low) {
                result.push((h << 4) | l);
                bytes = lookahead;
                continue;
            }
        }
        result.push(byte);
    }

    String::from_utf8_lossy(&result).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}
