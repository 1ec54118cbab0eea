//! Rename command - LSP-powered symbol renaming

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;
use crate::models::lsp::FileChange;

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Name path of the symbol ("Config/load")
    pub name_path: String,

    /// File containing the symbol
    pub file: String,

    /// New name for the symbol
    pub new_name: String,
}

#[derive(Serialize)]
struct RenameResponse {
    old_name: String,
    new_name: String,
    affected_files: usize,
    changes: Vec<FileChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl TextOutput for RenameResponse {
    fn to_text(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        let mut lines = vec![format!(
            "Renamed {} to {} in {} files",
            self.old_name, self.new_name, self.affected_files
        )];
        lines.extend(
            self.changes
                .iter()
                .map(|c| format!("  {} ({} edits)", c.file.display(), c.edit_count)),
        );
        lines.join("\n")
    }
}

pub async fn execute(args: RenameArgs, app: &App) -> Result<()> {
    let old_name = args
        .name_path
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    if old_name == args.new_name {
        app.output.print_success(&RenameResponse {
            old_name,
            new_name: args.new_name,
            affected_files: 0,
            changes: Vec::new(),
            message: Some("Symbol is already named the same. No changes needed.".to_string()),
        });
        return Ok(());
    }

    let outcome = app
        .editor
        .rename_symbol(&args.name_path, &args.file, &args.new_name)
        .await?;

    app.output.print_success(&RenameResponse {
        old_name: outcome.symbol.name,
        new_name: outcome.new_name,
        affected_files: outcome.files.len(),
        changes: outcome.files,
        message: None,
    });
    Ok(())
}
