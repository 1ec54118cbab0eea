//! Edit command implementation
//!
//! Symbol-relative and line-relative edits. Lines are 1-based and inclusive.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::app::App;
use crate::cli::TextOutput;
use crate::models::symbol::SymbolNode;

#[derive(Args, Debug)]
pub struct EditArgs {
    #[command(subcommand)]
    pub command: EditCommand,
}

/// New text: `--content`, `--content-file`, or stdin when neither is given
#[derive(Args, Debug)]
pub struct ContentArgs {
    /// Text to write
    #[arg(short, long, conflicts_with = "content_file")]
    pub content: Option<String>,

    /// Read the text from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,
}

impl ContentArgs {
    async fn read(self) -> Result<String> {
        if let Some(content) = self.content {
            return Ok(content);
        }
        if let Some(path) = self.content_file {
            return tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()));
        }
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("Failed to read content from stdin")?;
        Ok(content)
    }
}

#[derive(Subcommand, Debug)]
pub enum EditCommand {
    /// Replace the lines spanned by a symbol
    ReplaceBody {
        /// Name path of the symbol ("Config/load")
        name_path: String,
        /// File containing the symbol
        file: String,
        #[command(flatten)]
        content: ContentArgs,
    },

    /// Insert text on the line after a symbol
    InsertAfter {
        name_path: String,
        file: String,
        #[command(flatten)]
        content: ContentArgs,
    },

    /// Insert text on the line before a symbol
    InsertBefore {
        name_path: String,
        file: String,
        #[command(flatten)]
        content: ContentArgs,
    },

    /// Delete lines START..=END
    DeleteLines { file: String, start: usize, end: usize },

    /// Replace lines START..=END
    ReplaceLines {
        file: String,
        start: usize,
        end: usize,
        #[command(flatten)]
        content: ContentArgs,
    },

    /// Insert text before LINE (one past the last line appends)
    InsertAtLine {
        file: String,
        line: usize,
        #[command(flatten)]
        content: ContentArgs,
    },
}

#[derive(Serialize)]
struct EditResponse {
    status: &'static str,
    operation: &'static str,
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<SymbolNode>,
}

impl TextOutput for EditResponse {
    fn to_text(&self) -> String {
        match &self.symbol {
            Some(symbol) => format!("{} {} in {}", self.operation, symbol.name_path, self.file),
            None => format!("{} in {}", self.operation, self.file),
        }
    }
}

/// 1-based CLI line to 0-based
fn zero_based(line: usize) -> Result<usize> {
    match line.checked_sub(1) {
        Some(line) => Ok(line),
        None => bail!("Line numbers start at 1"),
    }
}

pub async fn execute(args: EditArgs, app: &App) -> Result<()> {
    let editor = &app.editor;

    let response = match args.command {
        EditCommand::ReplaceBody {
            name_path,
            file,
            content,
        } => {
            let body = content.read().await?;
            let symbol = editor.replace_symbol_body(&name_path, &file, &body).await?;
            EditResponse {
                status: "edited",
                operation: "replace-body",
                file,
                symbol: Some(symbol),
            }
        }

        EditCommand::InsertAfter {
            name_path,
            file,
            content,
        } => {
            let text = content.read().await?;
            let symbol = editor.insert_after_symbol(&name_path, &file, &text).await?;
            EditResponse {
                status: "edited",
                operation: "insert-after",
                file,
                symbol: Some(symbol),
            }
        }

        EditCommand::InsertBefore {
            name_path,
            file,
            content,
        } => {
            let text = content.read().await?;
            let symbol = editor.insert_before_symbol(&name_path, &file, &text).await?;
            EditResponse {
                status: "edited",
                operation: "insert-before",
                file,
                symbol: Some(symbol),
            }
        }

        EditCommand::DeleteLines { file, start, end } => {
            editor
                .delete_lines(&file, zero_based(start)?, zero_based(end)?)
                .await?;
            EditResponse {
                status: "edited",
                operation: "delete-lines",
                file,
                symbol: None,
            }
        }

        EditCommand::ReplaceLines {
            file,
            start,
            end,
            content,
        } => {
            let text = content.read().await?;
            editor
                .replace_lines(&file, zero_based(start)?, zero_based(end)?, &text)
                .await?;
            EditResponse {
                status: "edited",
                operation: "replace-lines",
                file,
                symbol: None,
            }
        }

        EditCommand::InsertAtLine {
            file,
            line,
            content,
        } => {
            let text = content.read().await?;
            editor.insert_at_line(&file, zero_based(line)?, &text).await?;
            EditResponse {
                status: "edited",
                operation: "insert-at-line",
                file,
                symbol: None,
            }
        }
    };

    app.output.print_success(&response);
    Ok(())
}
