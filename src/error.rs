//! Error types for symlens

use std::path::PathBuf;

use thiserror::Error;

use crate::models::symbol::Language;

pub type SymlensResult<T> = std::result::Result<T, SymlensError>;

#[derive(Debug, Error)]
pub enum SymlensError {
    #[error("{0}")]
    Lsp(#[from] LspError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Project(#[from] ProjectError),

    #[error("Symbol not found: '{name_path}' in {file}")]
    SymbolNotFound { name_path: String, file: String },

    #[error("Ambiguous name path '{name_path}' in {file}: {count} symbols match, be more specific")]
    AmbiguousMatch {
        name_path: String,
        file: String,
        count: usize,
    },

    #[error("Invalid range in {file}: {message}")]
    InvalidRange { file: String, message: String },

    /// The server asked for something other than text edits
    #[error("Unsupported workspace edit: {0}")]
    UnsupportedEdit(String),

    /// A multi-file edit stopped after writing some files
    #[error("Edit failed after writing {written:?}: {source}")]
    PartialEdit {
        written: Vec<String>,
        source: Box<SymlensError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SymlensError {
    pub fn not_found(name_path: &str, file: &str) -> Self {
        Self::SymbolNotFound {
            name_path: name_path.to_string(),
            file: file.to_string(),
        }
    }

    pub fn invalid_range(file: &str, message: impl Into<String>) -> Self {
        Self::InvalidRange {
            file: file.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lsp(e) if e.is_transport() => "transport_error",
            Self::Lsp(_) => "protocol_error",
            Self::Config(_) => "config_error",
            Self::Project(ProjectError::PathNotFound(_)) | Self::SymbolNotFound { .. } => {
                "not_found"
            }
            Self::Project(_) => "project_error",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::InvalidRange { .. } => "range_error",
            Self::UnsupportedEdit(_) => "unsupported_edit",
            Self::PartialEdit { .. } => "partial_edit",
            Self::Io(_) => "io_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum LspError {
    #[error("Failed to start server: {0}")]
    ServerStart(String),

    #[error("Server not installed: {name}. Install: {install_hint}")]
    ServerNotInstalled { name: String, install_hint: String },

    #[error("Failed to download {server}: {message}")]
    Download { server: String, message: String },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("{language} ({server}) does not support '{feature}'")]
    FeatureNotSupported {
        language: Language,
        server: String,
        feature: String,
    },

    #[error("{language} language server terminated unexpectedly")]
    ServerTerminated { language: Language },

    #[error("{0}")]
    Timeout(String),

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Server error [{code}]: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LspError {
    const CANCELLED_ERROR_CODE: i32 = -32800;

    pub fn error_code(&self) -> i32 {
        match self {
            Self::ServerError { code, .. } => *code,
            Self::ServerTerminated { .. } => -32099,
            Self::Timeout(_) => -32001,
            Self::RequestCancelled => Self::CANCELLED_ERROR_CODE,
            _ => -32000,
        }
    }

    /// Spawn and IO failures, fatal to the connection they happened on.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ServerStart(_)
                | Self::ServerNotInstalled { .. }
                | Self::Download { .. }
                | Self::ServerTerminated { .. }
                | Self::Timeout(_)
                | Self::RequestCancelled
                | Self::Io(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::RequestCancelled)
            || matches!(self, Self::ServerError { code, .. } if *code == Self::CANCELLED_ERROR_CODE)
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ServerTerminated { .. } | Self::Timeout(_) | Self::RequestCancelled
        ) || self.is_cancelled()
    }

    pub fn needs_restart(&self) -> bool {
        matches!(self, Self::ServerTerminated { .. }) || self.is_server_shutdown()
    }

    fn is_server_shutdown(&self) -> bool {
        matches!(self, Self::ServerError { message, .. }
            if message.to_lowercase().contains("shutdown")
               || message.to_lowercase().contains("server stopped"))
    }

    pub fn affected_language(&self) -> Option<Language> {
        match self {
            Self::ServerTerminated { language } => Some(*language),
            Self::FeatureNotSupported { language, .. } => Some(*language),
            _ => None,
        }
    }

    pub fn feature_not_supported(language: Language, server: &str, feature: &str) -> Self {
        Self::FeatureNotSupported {
            language,
            server: server.to_string(),
            feature: feature.to_string(),
        }
    }

    pub fn server_error_friendly(code: i32, message: String) -> Self {
        let friendly_message = match code {
            -32601 => format!("Method not supported by server: {}", message),
            -32002 => "Server initializing. Try again in a moment.".to_string(),
            -32603 | -32801 => Self::classify_internal_error(&message),
            _ => message,
        };

        Self::ServerError {
            code,
            message: friendly_message,
        }
    }

    fn classify_internal_error(message: &str) -> String {
        let msg = message.trim();
        let lower = msg.to_lowercase();

        if msg.is_empty() || lower == "internal error" || lower == "internal error." {
            return "Operation failed. The position may be invalid.".to_string();
        }

        if lower.contains("invalid offset") || lower.contains("out of bounds") {
            "Invalid position: line or column exceeds file bounds.".to_string()
        } else if lower.contains("content modified") || lower.contains("version mismatch") {
            "File changed during operation. Please retry.".to_string()
        } else {
            msg.to_string()
        }
    }
}

impl From<crate::infra::lsp::protocol::ResponseError> for LspError {
    fn from(err: crate::infra::lsp::protocol::ResponseError) -> Self {
        LspError::server_error_friendly(err.code, err.message)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project already initialized at: {0}")]
    AlreadyExists(PathBuf),

    #[error("Project root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Path is outside project root: {0}")]
    OutsideRoot(String),

    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Path is ignored: {0}")]
    Ignored(String),

    #[error("Binary file: {0}")]
    BinaryFile(String),

    #[error("File too large ({size_kb}KB > {limit_kb}KB limit): {path}")]
    FileTooLarge {
        path: String,
        size_kb: u64,
        limit_kb: u64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_terminated_error() {
        let err = LspError::ServerTerminated {
            language: Language::Rust,
        };
        assert!(err.is_recoverable());
        assert!(err.is_transport());
        assert_eq!(err.affected_language(), Some(Language::Rust));
        assert_eq!(err.error_code(), -32099);
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = LspError::Timeout("test".to_string());
        assert!(err.is_recoverable());
        assert!(!err.needs_restart());
    }

    #[test]
    fn test_server_terminated_needs_restart() {
        let err = LspError::ServerTerminated {
            language: Language::Terraform,
        };
        assert!(err.needs_restart());
    }

    #[test]
    fn test_feature_not_supported_has_language() {
        let err = LspError::feature_not_supported(
            Language::Python,
            "pyright",
            "documentSymbolProvider",
        );
        assert!(!err.is_recoverable());
        assert_eq!(err.affected_language(), Some(Language::Python));
    }

    #[test]
    fn test_cancelled_error() {
        let err = LspError::RequestCancelled;
        assert!(err.is_cancelled());

        let server_cancelled = LspError::ServerError {
            code: -32800,
            message: "cancelled".to_string(),
        };
        assert!(server_cancelled.is_cancelled());
        assert!(server_cancelled.is_recoverable());
    }

    #[test]
    fn test_server_shutdown_needs_restart() {
        let stopped_err = LspError::ServerError {
            code: -32000,
            message: "Server stopped unexpectedly".to_string(),
        };
        assert!(stopped_err.needs_restart());
    }

    #[test]
    fn test_classify_internal_error() {
        assert_eq!(
            LspError::classify_internal_error("internal error"),
            "Operation failed. The position may be invalid."
        );
        assert_eq!(
            LspError::classify_internal_error("content modified"),
            "File changed during operation. Please retry."
        );
    }

    #[test]
    fn test_error_codes_follow_taxonomy() {
        assert_eq!(
            SymlensError::from(LspError::Io(std::io::Error::other("pipe"))).code(),
            "transport_error"
        );
        assert_eq!(
            SymlensError::from(LspError::ServerError {
                code: -32602,
                message: "bad params".into()
            })
            .code(),
            "protocol_error"
        );
        assert_eq!(SymlensError::not_found("a/b", "main.tf").code(), "not_found");
        assert_eq!(
            SymlensError::AmbiguousMatch {
                name_path: "b".into(),
                file: "main.tf".into(),
                count: 2
            }
            .code(),
            "ambiguous_match"
        );
        assert_eq!(
            SymlensError::invalid_range("main.tf", "line 9 >= 3").code(),
            "range_error"
        );
        assert_eq!(
            SymlensError::UnsupportedEdit("create file:///c.tf".into()).code(),
            "unsupported_edit"
        );
    }
}
