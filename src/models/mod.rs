//! Data models for symlens
//!
//! Plain serializable types shared by every layer.

pub mod config;
pub mod lsp;
pub mod symbol;

pub use config::SymlensConfig;
pub use lsp::{FileChange, HoverInfo, Position, Range, TextEdit, WorkspaceEdit};
pub use symbol::{Language, Location, SymbolKind, SymbolNode};
