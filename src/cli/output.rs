//! Output formatting for CLI commands

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ConfigError, LspError, ProjectError, SymlensError};
use crate::models::symbol::SymbolNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown output format '{}' (expected json or text)", other)),
        }
    }
}

/// Human-readable rendering for `--format text`
pub trait TextOutput {
    fn to_text(&self) -> String;
}

/// Output context for consistent formatting across commands
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    format: OutputFormat,
}

impl OutputContext {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print a successful response; JSON output carries the fields at top level
    pub fn print_success<T: Serialize + TextOutput>(&self, data: &T) {
        match self.format {
            OutputFormat::Json => {
                let mut response = serde_json::to_value(data).unwrap_or(serde_json::json!({}));
                if let Some(obj) = response.as_object_mut() {
                    obj.insert("success".to_string(), serde_json::json!(true));
                }
                print_json(&response);
            }
            OutputFormat::Text => println!("{}", data.to_text().trim_end()),
        }
    }

    /// Print an error response with its stable code
    pub fn print_error(&self, code: &str, message: &str) {
        match self.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "success": false,
                "code": code,
                "error": message
            })),
            OutputFormat::Text => eprintln!("error[{}]: {}", code, message),
        }
    }
}

/// Stable code for an error surfaced by a command
pub fn error_code(error: &anyhow::Error) -> &'static str {
    if let Some(e) = error.downcast_ref::<SymlensError>() {
        e.code()
    } else if let Some(e) = error.downcast_ref::<LspError>() {
        if e.is_transport() {
            "transport_error"
        } else {
            "protocol_error"
        }
    } else if let Some(e) = error.downcast_ref::<ProjectError>() {
        match e {
            ProjectError::PathNotFound(_) => "not_found",
            _ => "project_error",
        }
    } else if error.downcast_ref::<ConfigError>().is_some() {
        "config_error"
    } else {
        "error"
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

/// Indented `kind name_path (file:line)` lines for a symbol tree
pub fn symbol_tree_text(symbols: &[SymbolNode]) -> String {
    fn render(out: &mut String, symbol: &SymbolNode, depth: usize) {
        let _ = writeln!(
            out,
            "{}{} {} ({})",
            "  ".repeat(depth),
            symbol.kind,
            symbol.name_path,
            symbol.location()
        );
        for child in &symbol.children {
            render(out, child, depth + 1);
        }
    }

    let mut out = String::new();
    for symbol in symbols {
        render(&mut out, symbol, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lsp::Range;
    use crate::models::symbol::SymbolKind;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_error_code() {
        let not_found = anyhow::Error::new(SymlensError::not_found("A/b", "a.py"));
        assert_eq!(error_code(&not_found), "not_found");

        let outside = anyhow::Error::new(ProjectError::OutsideRoot("../x".to_string()));
        assert_eq!(error_code(&outside), "project_error");

        let timeout = anyhow::Error::new(LspError::Timeout("documentSymbol".to_string()));
        assert_eq!(error_code(&timeout), "transport_error");

        assert_eq!(error_code(&anyhow::anyhow!("plain")), "error");
    }

    #[test]
    fn test_symbol_tree_text() {
        let mut class = SymbolNode::new("Config", SymbolKind::Class, "app.py", Range::lines(0, 4))
            .with_children(vec![SymbolNode::new(
                "load",
                SymbolKind::Method,
                "app.py",
                Range::lines(1, 2),
            )]);
        class.compute_paths(None);

        let text = symbol_tree_text(&[class]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("class Config (app.py:1"));
        assert!(lines[1].starts_with("  method Config/load (app.py:2"));
    }
}
