//! Hover command implementation

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::cli::TextOutput;

#[derive(Args, Debug)]
pub struct HoverArgs {
    /// Name path of the symbol ("Config/load")
    pub name_path: String,

    /// File containing the symbol
    pub file: String,
}

#[derive(Serialize)]
struct HoverResponse {
    symbol: String,
    content: Option<String>,
}

impl TextOutput for HoverResponse {
    fn to_text(&self) -> String {
        self.content
            .clone()
            .unwrap_or_else(|| "No hover information".to_string())
    }
}

pub async fn execute(args: HoverArgs, app: &App) -> Result<()> {
    let hover = app.navigator.hover(&args.name_path, &args.file).await?;

    app.output.print_success(&HoverResponse {
        symbol: args.name_path,
        content: hover.map(|h| h.content),
    });
    Ok(())
}
